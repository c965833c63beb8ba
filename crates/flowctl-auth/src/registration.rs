//! Dynamic client registration (RFC 7591)
//!
//! Every login registers a fresh public client whose only redirect URI is
//! the loopback listener bound for that login. `token_endpoint_auth_method`
//! is `none` because PKCE stands in for a client secret.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// What to register.
#[derive(Debug, Clone)]
pub struct ClientRegistration<'a> {
    pub client_name: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: [&'a str; 1],
    grant_types: [&'static str; 2],
    response_types: [&'static str; 1],
    scope: &'a str,
    token_endpoint_auth_method: &'static str,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: Option<String>,
}

/// Register a public client and return its assigned `client_id`.
pub async fn register_client(
    client: &reqwest::Client,
    registration_endpoint: &str,
    registration: &ClientRegistration<'_>,
) -> Result<String> {
    let body = RegistrationRequest {
        client_name: registration.client_name,
        redirect_uris: [registration.redirect_uri],
        grant_types: ["authorization_code", "refresh_token"],
        response_types: ["code"],
        scope: registration.scope,
        token_endpoint_auth_method: "none",
    };

    let response = client
        .post(registration_endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Registration(format!("registration request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Registration(format!(
            "registration endpoint returned {status}: {body}"
        )));
    }

    let client_id = response
        .json::<RegistrationResponse>()
        .await
        .map_err(|e| Error::Registration(format!("invalid registration response: {e}")))?
        .client_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Registration("registration response has no client_id".into()))?;

    debug!(client_id = %client_id, "registered OAuth client");
    Ok(client_id)
}
