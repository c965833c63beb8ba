//! OAuth endpoint discovery
//!
//! Two dependent metadata fetches resolve everything a login needs from the
//! service's base URL alone:
//! 1. `<base>/.well-known/oauth-protected-resource` names the authorization
//!    server(s) (RFC 9728); the first one is used.
//! 2. `<issuer>/.well-known/oauth-authorization-server` lists the
//!    authorization, token and registration endpoints (RFC 8414).
//!
//! Nothing is cached. Each login discovers again; refresh uses the token
//! endpoint stored in the credential record instead.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::constants::{AUTHORIZATION_SERVER_PATH, PROTECTED_RESOURCE_PATH};
use crate::error::{Error, Result};

/// Endpoints resolved for one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ProtectedResourceMetadata {
    #[serde(default)]
    authorization_servers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationServerMetadata {
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    registration_endpoint: Option<String>,
}

/// Resolve the OAuth endpoints advertised for `base_url`.
pub async fn discover(client: &reqwest::Client, base_url: &str) -> Result<Endpoints> {
    let base = base_url.trim_end_matches('/');

    let resource: ProtectedResourceMetadata = fetch_json(
        client,
        &format!("{base}{PROTECTED_RESOURCE_PATH}"),
        "protected resource metadata",
    )
    .await?;

    let auth_server = resource
        .authorization_servers
        .into_iter()
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::Discovery("no authorization servers found in protected resource metadata".into())
        })?;
    debug!(auth_server = %auth_server, "using authorization server");

    let metadata: AuthorizationServerMetadata = fetch_json(
        client,
        &format!(
            "{}{AUTHORIZATION_SERVER_PATH}",
            auth_server.trim_end_matches('/')
        ),
        "authorization server metadata",
    )
    .await?;

    let endpoints = Endpoints {
        authorization_endpoint: required(metadata.authorization_endpoint, "authorization_endpoint")?,
        token_endpoint: required(metadata.token_endpoint, "token_endpoint")?,
        registration_endpoint: required(metadata.registration_endpoint, "registration_endpoint")?,
    };

    debug!(
        authorization_endpoint = %endpoints.authorization_endpoint,
        token_endpoint = %endpoints.token_endpoint,
        registration_endpoint = %endpoints.registration_endpoint,
        "discovered OAuth endpoints"
    );
    Ok(endpoints)
}

async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    what: &str,
) -> Result<T> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Discovery(format!("failed to fetch {what} from {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Discovery(format!(
            "failed to fetch {what}: {status} {body}"
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::Discovery(format!("invalid {what}: {e}")))
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::Discovery(format!(
            "missing {field} in authorization server metadata"
        ))
    })
}
