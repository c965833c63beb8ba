//! flowctl
//!
//! Command-line client for the Spaceflows API. This binary carries the
//! authentication commands; every other command reaches the API through
//! `TokenManager::auth_headers()` and `TokenManager::base_url()`.

mod cli;
mod commands;
mod config;

use anyhow::{Context, Result};
use flowctl_auth::{EnvOverride, TokenManager, TokenStore};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Command;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = cli::parse(&args)?;

    if invocation.command == Command::Help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let config_path = Config::resolve_path(invocation.config_path.as_deref());
    debug!(path = ?config_path, "loading configuration");
    let config = Config::load_from(config_path.as_ref()).context("failed to load configuration")?;

    let store = match &config.auth.token_path {
        Some(path) => TokenStore::new(path.clone()),
        None => TokenStore::open_default()?,
    };
    info!(token_path = %store.path().display(), "credential store");

    let client = reqwest::Client::builder()
        .user_agent(concat!("flowctl/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    match invocation.command {
        Command::Login {
            base_url,
            no_browser,
        } => commands::login(&client, &store, &config.auth, base_url, no_browser).await,
        Command::Logout => commands::logout(&store).await,
        Command::Status => {
            let manager = TokenManager::new(store, client, EnvOverride::from_env());
            commands::status(&manager).await
        }
        Command::Help => Ok(()),
    }
}
