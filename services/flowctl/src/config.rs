//! Configuration types and loading
//!
//! Precedence: CLI args > env vars > config file > defaults. The file is
//! optional; when the default location has none, defaults apply. A path
//! given explicitly (`--config` or `FLOWCTL_CONFIG`) must exist.
//!
//! Credentials never live here. The API key override is read from
//! `FLOWCTL_API_KEY` by the auth library.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use flowctl_auth::{CONFIG_DIR_NAME, DEFAULT_LOGIN_TIMEOUT_SECS};

/// Env var naming an explicit config file
const ENV_CONFIG_PATH: &str = "FLOWCTL_CONFIG";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Login and credential settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// Used by `login` when `--base-url` is not given
    #[serde(default = "default_base_url")]
    pub default_base_url: String,
    /// How long `login` waits for the browser redirect
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    /// Launch the system browser; when false the URL is only printed
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
    /// Override for `~/.spaceflows/cli-token.json`
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_base_url: default_base_url(),
            login_timeout_secs: default_login_timeout(),
            open_browser: default_open_browser(),
            token_path: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost".into()
}

fn default_login_timeout() -> u64 {
    DEFAULT_LOGIN_TIMEOUT_SECS
}

fn default_open_browser() -> bool {
    true
}

/// Where the config file was found, and whether the user asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Explicit(PathBuf),
    Default(PathBuf),
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a resolved location. A missing file at the default location
    /// yields defaults; a missing explicit file is an error.
    pub fn load_from(path: Option<&ConfigPath>) -> common::Result<Self> {
        match path {
            Some(ConfigPath::Explicit(path)) => Self::load(path),
            Some(ConfigPath::Default(path)) => match Self::load(path) {
                Err(e) if e.is_not_found() => Ok(Self::default()),
                other => other,
            },
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> common::Result<()> {
        let base_url = &self.auth.default_base_url;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "default_base_url must start with http:// or https://, got: {base_url}"
            )));
        }

        if self.auth.login_timeout_secs == 0 {
            return Err(common::Error::Config(
                "login_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve the config file path from CLI arg, `FLOWCTL_CONFIG`, or the
    /// per-user default. `None` when no home directory can be determined.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<ConfigPath> {
        Self::resolve_path_with(cli_path, std::env::var(ENV_CONFIG_PATH).ok(), dirs::home_dir())
    }

    fn resolve_path_with(
        cli_path: Option<&str>,
        env_path: Option<String>,
        home: Option<PathBuf>,
    ) -> Option<ConfigPath> {
        if let Some(p) = cli_path {
            return Some(ConfigPath::Explicit(PathBuf::from(p)));
        }
        if let Some(p) = env_path.filter(|p| !p.is_empty()) {
            return Some(ConfigPath::Explicit(PathBuf::from(p)));
        }
        home.map(|h| ConfigPath::Default(h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)))
    }
}
