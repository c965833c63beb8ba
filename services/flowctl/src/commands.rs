//! `login`, `logout` and `status`

use std::time::Duration;

use anyhow::{Context, Result};
use flowctl_auth::flow::canonical_base_url;
use flowctl_auth::{
    BrowserLauncher, ENV_API_KEY, Error as AuthError, LoginOptions, SystemBrowser, TokenManager,
    TokenStore,
};
use tracing::{debug, warn};

use crate::config::AuthConfig;

/// Opens the system browser and falls back to printing the URL.
struct TerminalBrowser {
    launch: bool,
}

impl BrowserLauncher for TerminalBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        if self.launch {
            match SystemBrowser.open(url) {
                Ok(()) => {
                    eprintln!("Opening browser and waiting for authentication...");
                    return Ok(());
                }
                Err(e) => {
                    print_manual_url(url);
                    return Err(e);
                }
            }
        }
        print_manual_url(url);
        Ok(())
    }
}

fn print_manual_url(url: &str) {
    eprintln!("Open this URL in your browser to continue:\n\n  {url}\n");
    eprintln!("Waiting for authentication...");
}

/// Run the browser login unless a session is already stored.
pub async fn login(
    client: &reqwest::Client,
    store: &TokenStore,
    auth: &AuthConfig,
    base_url: Option<String>,
    no_browser: bool,
) -> Result<()> {
    let base_url = base_url.unwrap_or_else(|| auth.default_base_url.clone());

    match store.read().await {
        Ok(Some(existing)) => {
            if existing.base_url == canonical_base_url(&base_url) {
                println!("Already authenticated with {}", existing.base_url);
            } else {
                println!(
                    "Already authenticated with {}. Run `flowctl logout` first to log in to {base_url}.",
                    existing.base_url
                );
            }
            return Ok(());
        }
        Ok(None) => {}
        Err(e @ AuthError::CredentialParse(_)) => {
            warn!(error = %e, "stored credentials are unreadable, starting a new login");
        }
        Err(e) => return Err(e).context("failed to load stored credentials"),
    }

    let options = LoginOptions {
        timeout: Some(Duration::from_secs(auth.login_timeout_secs)),
        ..LoginOptions::default()
    };
    let browser = TerminalBrowser {
        launch: auth.open_browser && !no_browser,
    };

    eprintln!("Starting authentication with {base_url}");
    flowctl_auth::login(client, store, &base_url, &browser, &options)
        .await
        .context("Authentication failed")?;

    println!("Authentication successful!");
    Ok(())
}

/// Delete the stored session.
pub async fn logout(store: &TokenStore) -> Result<()> {
    let removed = store
        .delete()
        .await
        .with_context(|| format!("failed to remove {}", store.path().display()))?;

    if removed {
        println!("Logged out successfully");
    } else {
        println!("No token was stored.");
    }
    Ok(())
}

/// Report which credential source is in effect and whether it is usable.
pub async fn status(manager: &TokenManager) -> Result<()> {
    if manager.env().is_active() {
        let base_url = manager.base_url().await?;
        println!("Using {ENV_API_KEY} for {base_url}");
        return Ok(());
    }

    match manager.valid_record().await {
        Ok(record) => {
            let remaining = record.remaining_millis(flowctl_auth::credentials::now_millis());
            println!(
                "Authenticated with {} (access token valid for {} more minutes)",
                record.base_url,
                remaining / 60_000
            );
            Ok(())
        }
        Err(e) if e.requires_login() => {
            debug!(error = %e, "no usable session");
            println!("Not authenticated: {e}");
            Ok(())
        }
        Err(e) => Err(e).context("failed to load stored credentials"),
    }
}
