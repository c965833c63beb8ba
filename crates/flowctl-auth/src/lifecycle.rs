//! Stored-credential lifecycle
//!
//! `TokenManager` is the one accessor the rest of the CLI uses for bearer
//! credentials. It refreshes the stored access token when it is within
//! `REFRESH_SKEW_MILLIS` of expiry, and short-circuits the whole OAuth
//! subsystem when `FLOWCTL_API_KEY` is set for non-interactive use.
//!
//! There is no cross-process coordination beyond the store's write lock: two
//! invocations refreshing at once both hit the token endpoint and the last
//! write wins.

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, info};

use crate::constants::{ENV_API_KEY, ENV_BASE_URL};
use crate::credentials::{CredentialRecord, TokenStore, now_millis};
use crate::error::{Error, Result};
use crate::flow::canonical_base_url;
use crate::token::refresh_token;

/// API-key override read from the environment.
///
/// Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvOverride {
    api_key: Option<Secret<String>>,
    base_url: Option<String>,
}

/// Credentials resolved from an active override. Deliberately not `Debug`.
pub struct EnvCredentials<'a> {
    pub api_key: &'a str,
    pub base_url: String,
}

impl EnvOverride {
    /// Read `FLOWCTL_API_KEY` and `FLOWCTL_BASE_URL`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(ENV_API_KEY).ok(),
            std::env::var(ENV_BASE_URL).ok(),
        )
    }

    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()).map(Secret::new),
            base_url: base_url.filter(|u| !u.is_empty()),
        }
    }

    /// Whether an API key is configured, regardless of whether it is usable.
    /// Lets callers skip interactive steps.
    pub fn is_active(&self) -> bool {
        self.api_key.is_some()
    }

    /// The override's credentials, `None` when no key is set.
    ///
    /// A key without a base URL is a configuration error rather than a
    /// silent fallback to the stored session.
    pub fn resolve(&self) -> Result<Option<EnvCredentials<'_>>> {
        let Some(api_key) = &self.api_key else {
            return Ok(None);
        };
        let base_url = self.base_url.as_deref().ok_or_else(|| {
            Error::Configuration(format!("{ENV_BASE_URL} must be set when using {ENV_API_KEY}"))
        })?;
        Ok(Some(EnvCredentials {
            api_key: api_key.expose(),
            base_url: canonical_base_url(base_url),
        }))
    }
}

/// Hands out usable bearer credentials, refreshing the stored session as needed.
#[derive(Debug, Clone)]
pub struct TokenManager {
    store: TokenStore,
    client: reqwest::Client,
    env: EnvOverride,
}

impl TokenManager {
    pub fn new(store: TokenStore, client: reqwest::Client, env: EnvOverride) -> Self {
        Self { store, client, env }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn env(&self) -> &EnvOverride {
        &self.env
    }

    /// A stored access token that is not within the refresh skew of expiry.
    pub async fn valid_token(&self) -> Result<String> {
        Ok(self.valid_record().await?.access_token)
    }

    /// The stored record, refreshed first if its token is near expiry.
    pub async fn valid_record(&self) -> Result<CredentialRecord> {
        let record = self.store.read().await?.ok_or(Error::NotAuthenticated)?;

        if !record.needs_refresh(now_millis()) {
            return Ok(record);
        }

        debug!(base_url = %record.base_url, "access token expired or near expiry, refreshing");
        self.refresh(record).await
    }

    async fn refresh(&self, record: CredentialRecord) -> Result<CredentialRecord> {
        let refresh = record
            .refresh_token
            .as_deref()
            .ok_or(Error::NoRefreshToken)?;

        let response = refresh_token(
            &self.client,
            &record.token_endpoint,
            refresh,
            &record.client_id,
        )
        .await?;

        let updated = record.refreshed(response, now_millis());
        self.store.write(&updated).await?;
        info!(base_url = %updated.base_url, "access token refreshed");
        Ok(updated)
    }

    /// `Authorization: Bearer ...` for outbound API calls.
    ///
    /// With the environment override active the stored session is never read.
    pub async fn auth_headers(&self) -> Result<HeaderMap> {
        if let Some(env) = self.env.resolve()? {
            debug!("using API key from environment");
            return bearer_headers(env.api_key).ok_or_else(|| {
                Error::Configuration(format!("{ENV_API_KEY} is not a valid header value"))
            });
        }

        let token = self.valid_token().await?;
        bearer_headers(&token).ok_or_else(|| {
            Error::CredentialParse("stored access token is not a valid header value".into())
        })
    }

    /// The service root API calls should target.
    pub async fn base_url(&self) -> Result<String> {
        if let Some(env) = self.env.resolve()? {
            return Ok(env.base_url);
        }

        self.store
            .read()
            .await?
            .map(|record| record.base_url)
            .filter(|url| !url.is_empty())
            .ok_or(Error::NotAuthenticated)
    }
}

fn bearer_headers(token: &str) -> Option<HeaderMap> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
    value.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Some(headers)
}
