//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (end of the login flow)
//! 2. Token refresh (from the lifecycle manager when a token nears expiry)
//!
//! Both operations POST form-encoded bodies to the token endpoint discovered
//! at login time. Refresh reuses the endpoint cached in the credential record.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time. The caller
/// converts this to an absolute unix millisecond timestamp when storing
/// the credential.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent when the server does not rotate or issue refresh tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
}

/// Parameters for the authorization code grant.
#[derive(Debug)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    /// Must be byte-identical to the redirect URI used at registration
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    /// The PKCE verifier, never the challenge
    pub code_verifier: &'a str,
}

/// Exchange an authorization code for tokens.
///
/// The code is only redeemable together with the verifier whose challenge
/// was sent in the authorization URL.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    exchange: &CodeExchange<'_>,
) -> Result<TokenResponse> {
    debug!(token_endpoint, client_id = exchange.client_id, "exchanging authorization code");

    let response = client
        .post(token_endpoint)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", exchange.code),
            ("redirect_uri", exchange.redirect_uri),
            ("client_id", exchange.client_id),
            ("code_verifier", exchange.code_verifier),
        ])
        .send()
        .await
        .map_err(|e| Error::TokenExchange(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Refresh an access token using a refresh token.
///
/// No retries: a failure surfaces to the caller, who decides whether to
/// retry or send the user back through login.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    refresh: &str,
    client_id: &str,
) -> Result<TokenResponse> {
    debug!(token_endpoint, client_id, "refreshing access token");

    let response = client
        .post(token_endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(|e| Error::Refresh(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Refresh(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Refresh(format!("invalid refresh response: {e}")))
}
