//! OAuth client library for the flowctl CLI
//!
//! Implements the Authorization Code + PKCE flow against a service that
//! advertises its authorization server through RFC 9728 metadata and
//! supports dynamic client registration, plus the local credential cache
//! that keeps the CLI signed in across invocations.
//!
//! Credential flow:
//! 1. `discovery::discover()` resolves the authorization, token and
//!    registration endpoints from the service base URL
//! 2. `callback::CallbackListener::bind()` reserves a loopback redirect URI
//! 3. `registration::register_client()` registers a public client for it
//! 4. The user authorizes in the browser; the listener captures the redirect
//! 5. `token::exchange_code()` trades the code + PKCE verifier for tokens
//! 6. `credentials::TokenStore::write()` persists the record
//! 7. `lifecycle::TokenManager` refreshes it on demand and hands out headers
//!
//! `flow::login()` runs steps 1-6.

pub mod callback;
pub mod constants;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod lifecycle;
pub mod pkce;
pub mod registration;
pub mod token;

#[cfg(test)]
mod test_support;

pub use callback::{CallbackListener, CallbackParams};
pub use constants::*;
pub use credentials::{CredentialRecord, TokenStore};
pub use discovery::{Endpoints, discover};
pub use error::{Error, Result};
pub use flow::{BrowserLauncher, LoginOptions, LoginPhase, SystemBrowser, login};
pub use lifecycle::{EnvOverride, TokenManager};
pub use pkce::{compute_challenge, generate_state, generate_verifier, random_token};
pub use registration::{ClientRegistration, register_client};
pub use token::{TokenResponse, exchange_code, refresh_token};
