//! Authorization Code + PKCE login flow
//!
//! Phases, in order:
//! `Discovering -> Listening -> Registering -> AwaitingRedirect -> Exchanging -> Persisted`,
//! with `Failed` reachable from any of them. The loopback listener is bound
//! before registration because the registered redirect URI carries its port.
//!
//! All per-login secrets (state nonce, PKCE verifier) live on this task's
//! stack and are dropped when the flow ends, successfully or not.

use std::time::Duration;

use common::Secret;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::callback::{CallbackListener, CallbackParams};
use crate::constants::{CLIENT_NAME, DEFAULT_LOGIN_TIMEOUT_SECS, SCOPES};
use crate::credentials::{CredentialRecord, TokenStore, now_millis};
use crate::discovery::discover;
use crate::error::{Error, Result};
use crate::pkce::{compute_challenge, generate_state, generate_verifier};
use crate::registration::{ClientRegistration, register_client};
use crate::token::{CodeExchange, exchange_code};

/// Where a login currently stands. Used for logging the failure point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    Discovering,
    Listening,
    Registering,
    AwaitingRedirect,
    Exchanging,
    Persisted,
    Failed,
}

impl LoginPhase {
    pub fn label(&self) -> &'static str {
        match self {
            LoginPhase::Discovering => "discovering",
            LoginPhase::Listening => "listening",
            LoginPhase::Registering => "registering",
            LoginPhase::AwaitingRedirect => "awaiting_redirect",
            LoginPhase::Exchanging => "exchanging",
            LoginPhase::Persisted => "persisted",
            LoginPhase::Failed => "failed",
        }
    }
}

/// Opens the authorization URL for the user.
///
/// A failed open is not fatal: the flow logs it and keeps waiting, since the
/// user can still paste the URL into a browser by hand.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Launches the platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Per-login settings.
#[derive(Debug, Clone)]
pub struct LoginOptions {
    pub client_name: String,
    pub scope: String,
    /// Upper bound on waiting for the browser redirect. `None` waits until
    /// the process is interrupted.
    pub timeout: Option<Duration>,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            client_name: CLIENT_NAME.to_string(),
            scope: SCOPES.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS)),
        }
    }
}

/// Strip trailing slashes so records and requests agree on one spelling.
pub fn canonical_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Run the full browser login against `base_url` and persist the result.
///
/// Any record already in `store` is overwritten on success and left alone
/// on failure.
pub async fn login(
    client: &reqwest::Client,
    store: &TokenStore,
    base_url: &str,
    browser: &dyn BrowserLauncher,
    options: &LoginOptions,
) -> Result<CredentialRecord> {
    let base_url = canonical_base_url(base_url);
    let mut phase = LoginPhase::Discovering;

    match run_login(client, store, &base_url, browser, options, &mut phase).await {
        Ok(record) => {
            info!(base_url = %record.base_url, client_id = %record.client_id, "login complete");
            Ok(record)
        }
        Err(e) => {
            let failed_at = phase;
            advance(&mut phase, LoginPhase::Failed);
            warn!(phase = failed_at.label(), error = %e, "login failed");
            Err(e)
        }
    }
}

fn advance(phase: &mut LoginPhase, next: LoginPhase) {
    debug!(from = phase.label(), to = next.label(), "login phase");
    *phase = next;
}

async fn run_login(
    client: &reqwest::Client,
    store: &TokenStore,
    base_url: &str,
    browser: &dyn BrowserLauncher,
    options: &LoginOptions,
    phase: &mut LoginPhase,
) -> Result<CredentialRecord> {
    let endpoints = discover(client, base_url).await?;

    advance(phase, LoginPhase::Listening);
    let listener = CallbackListener::bind().await?;
    let redirect_uri = listener.redirect_uri();
    debug!(redirect_uri = %redirect_uri, "redirect URI set");

    advance(phase, LoginPhase::Registering);
    let client_id = register_client(
        client,
        &endpoints.registration_endpoint,
        &ClientRegistration {
            client_name: &options.client_name,
            redirect_uri: &redirect_uri,
            scope: &options.scope,
        },
    )
    .await?;

    let verifier = Secret::new(generate_verifier());
    let state = Secret::new(generate_state());
    let authorize_url = build_authorization_url(
        &endpoints.authorization_endpoint,
        &AuthorizationRequest {
            client_id: &client_id,
            redirect_uri: &redirect_uri,
            scope: &options.scope,
            state: state.expose(),
            code_challenge: &compute_challenge(verifier.expose()),
        },
    )?;

    advance(phase, LoginPhase::AwaitingRedirect);
    if let Err(e) = browser.open(&authorize_url) {
        warn!(error = %e, "could not open browser, continue by visiting the authorization URL manually");
    }

    let params = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, listener.wait())
            .await
            .map_err(|_| Error::LoginTimeout(limit))??,
        None => listener.wait().await?,
    };
    let code = validate_callback(&params, state.expose())?;

    advance(phase, LoginPhase::Exchanging);
    let response = exchange_code(
        client,
        &endpoints.token_endpoint,
        &CodeExchange {
            code,
            redirect_uri: &redirect_uri,
            client_id: &client_id,
            code_verifier: verifier.expose(),
        },
    )
    .await?;

    let record = CredentialRecord::issue(
        response,
        client_id,
        base_url.to_string(),
        endpoints.token_endpoint,
        now_millis(),
    );
    store.write(&record).await?;

    advance(phase, LoginPhase::Persisted);
    Ok(record)
}

/// Query parameters of the authorization request.
#[derive(Debug)]
pub struct AuthorizationRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
    pub state: &'a str,
    pub code_challenge: &'a str,
}

/// Append the authorization request parameters to the discovered endpoint,
/// preserving any query it already carries.
pub fn build_authorization_url(
    authorization_endpoint: &str,
    request: &AuthorizationRequest<'_>,
) -> Result<String> {
    let mut url = Url::parse(authorization_endpoint).map_err(|e| {
        Error::Discovery(format!(
            "invalid authorization endpoint {authorization_endpoint}: {e}"
        ))
    })?;
    url.query_pairs_mut()
        .append_pair("client_id", request.client_id)
        .append_pair("redirect_uri", request.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", request.scope)
        .append_pair("state", request.state)
        .append_pair("code_challenge", request.code_challenge)
        .append_pair("code_challenge_method", "S256");
    Ok(url.into())
}

/// Check a redirect against the state this login generated and pull out the
/// authorization code.
///
/// The state check comes first so a forged or stale redirect is rejected
/// before anything it carries is trusted, including its error fields.
pub fn validate_callback<'a>(params: &'a CallbackParams, expected_state: &str) -> Result<&'a str> {
    if params.get("state") != Some(expected_state) {
        return Err(Error::StateMismatch);
    }

    if let Some(error) = params.get("error") {
        let message = params.get("error_description").unwrap_or(error);
        return Err(Error::AuthorizationDenied(message.to_string()));
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .ok_or(Error::MissingCode)
}
