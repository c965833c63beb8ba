//! Command-line parsing
//!
//! Hand-rolled: three subcommands and a handful of flags.

use anyhow::{Result, bail};

pub const USAGE: &str = "\
Usage: flowctl [--config PATH] <command>

Commands:
  login [--base-url URL] [--no-browser]   Authenticate with the Spaceflows API
  logout                                  Remove stored credentials
  status                                  Show the current authentication state

Environment:
  FLOWCTL_API_KEY, FLOWCTL_BASE_URL       Use a static API key instead of logging in
  FLOWCTL_CONFIG                          Config file path
  LOG_LEVEL                               Log filter (default: warn)";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Login {
        base_url: Option<String>,
        no_browser: bool,
    },
    Logout,
    Status,
    Help,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<String>,
    pub command: Command,
}

/// Parse arguments, excluding the program name.
pub fn parse(args: &[String]) -> Result<Invocation> {
    let mut config_path = None;
    let mut base_url = None;
    let mut no_browser = false;
    let mut command: Option<&str> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config_path = Some(value_for("--config", iter.next())?),
            "--base-url" => base_url = Some(value_for("--base-url", iter.next())?),
            "--no-browser" => no_browser = true,
            "-h" | "--help" | "help" => command = Some("help"),
            flag if flag.starts_with('-') => bail!("unknown flag: {flag}\n\n{USAGE}"),
            name if command.is_none() => command = Some(name),
            extra => bail!("unexpected argument: {extra}\n\n{USAGE}"),
        }
    }

    let login_flags = base_url.is_some() || no_browser;
    if login_flags && command != Some("login") {
        bail!("--base-url and --no-browser only apply to login");
    }

    let command = match command {
        Some("login") => Command::Login {
            base_url,
            no_browser,
        },
        Some("logout") => Command::Logout,
        Some("status") => Command::Status,
        Some("help") | None => Command::Help,
        Some(other) => bail!("unknown command: {other}\n\n{USAGE}"),
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

fn value_for(flag: &str, value: Option<&String>) -> Result<String> {
    match value {
        Some(v) if !v.starts_with("--") => Ok(v.clone()),
        _ => bail!("{flag} requires a value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_login_with_flags() {
        let inv = parse(&args(&[
            "--config",
            "/etc/flowctl.toml",
            "login",
            "--base-url",
            "https://api.example.com",
            "--no-browser",
        ]))
        .unwrap();

        assert_eq!(inv.config_path.as_deref(), Some("/etc/flowctl.toml"));
        assert_eq!(
            inv.command,
            Command::Login {
                base_url: Some("https://api.example.com".into()),
                no_browser: true,
            }
        );
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse(&args(&["logout"])).unwrap().command, Command::Logout);
        assert_eq!(parse(&args(&["status"])).unwrap().command, Command::Status);
        assert_eq!(parse(&args(&[])).unwrap().command, Command::Help);
        assert_eq!(parse(&args(&["--help"])).unwrap().command, Command::Help);
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse(&args(&["deploy"])).is_err());
        assert!(parse(&args(&["login", "--verbose"])).is_err());
        assert!(parse(&args(&["login", "extra"])).is_err());
    }

    #[test]
    fn flag_requires_value() {
        let err = parse(&args(&["login", "--base-url"])).unwrap_err();
        assert!(err.to_string().contains("--base-url requires a value"));
        assert!(parse(&args(&["--config", "--no-browser", "login"])).is_err());
    }

    #[test]
    fn login_flags_rejected_elsewhere() {
        assert!(parse(&args(&["logout", "--no-browser"])).is_err());
        assert!(parse(&args(&["status", "--base-url", "http://x"])).is_err());
        assert!(parse(&args(&["--no-browser"])).is_err());
    }

    #[test]
    fn login_keeps_base_url_without_browser_flag() {
        let inv = parse(&args(&["login", "--base-url", "http://localhost:8080"])).unwrap();
        assert_eq!(
            inv.command,
            Command::Login {
                base_url: Some("http://localhost:8080".into()),
                no_browser: false,
            }
        );

        let inv = parse(&args(&["login"])).unwrap();
        assert_eq!(
            inv.command,
            Command::Login {
                base_url: None,
                no_browser: false,
            }
        );
    }
}
