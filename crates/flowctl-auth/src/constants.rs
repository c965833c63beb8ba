//! Flowctl OAuth constants
//!
//! Public client metadata sent during dynamic registration and the fixed
//! locations the CLI reads from. None of these are secrets; the issued
//! tokens live in the credential file.

/// Client name presented to the authorization server at registration
pub const CLIENT_NAME: &str = "Spaceflows CLI";

/// Scopes requested at registration and authorization time
pub const SCOPES: &str = "api apps:admin apps:view flows:edit";

/// Protected resource metadata path (RFC 9728), relative to the base URL
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// Authorization server metadata path (RFC 8414), relative to the issuer URL
pub const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";

/// Path the loopback listener serves the redirect on
pub const CALLBACK_PATH: &str = "/callback";

/// Directory under the user's home holding CLI state
pub const CONFIG_DIR_NAME: &str = ".spaceflows";

/// Credential file name inside `CONFIG_DIR_NAME`
pub const TOKEN_FILE_NAME: &str = "cli-token.json";

/// Static API key that bypasses the OAuth flow entirely
pub const ENV_API_KEY: &str = "FLOWCTL_API_KEY";

/// Base URL paired with `ENV_API_KEY`. Mandatory when the key is set.
pub const ENV_BASE_URL: &str = "FLOWCTL_BASE_URL";

/// Access tokens are refreshed this long before their recorded expiry so a
/// request started just before expiry still carries a live token.
pub const REFRESH_SKEW_MILLIS: u64 = 60_000;

/// Default bound on how long a login waits for the browser redirect.
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 300;
