//! Command-line interface parsing for the BessZone gate
//!
//! Every server option can also come from the environment, so a deployment
//! only needs `KILL_SWITCH_GIST_URL` set to point the switch at its own
//! document.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use reqwest::Url;
use thiserror::Error;

use crate::killswitch::{ManagerConfig, DEFAULT_FLAG_URL, DEFAULT_REDIRECT_URL};
use crate::watcher::WatchConfig;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The bind address does not parse
    #[error("Invalid bind address: '{0}'. Expected host:port, e.g. 0.0.0.0:3000")]
    InvalidBind(String),

    /// A URL option is not an absolute http(s) URL
    #[error("Invalid URL for --{option}: '{value}'")]
    InvalidUrl { option: &'static str, value: String },

    /// A duration option that must be positive was zero
    #[error("--{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// BessZone - serve the site behind a remote kill switch
#[derive(Parser, Debug)]
#[command(name = "besszone")]
#[command(about = "BessZone site gate with a remote kill switch")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the site with the kill switch gate in front of every page
    Serve(ServeArgs),
    /// Poll a running site's status endpoint and report when it redirects
    Watch(WatchArgs),
}

/// Options for `besszone serve`
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "BESSZONE_BIND", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// URL of the kill switch JSON document
    #[arg(long, env = "KILL_SWITCH_GIST_URL")]
    pub flag_url: Option<String>,

    /// Redirect target when the document enables the switch without one
    #[arg(long, env = "KILL_SWITCH_FALLBACK_URL", default_value = DEFAULT_REDIRECT_URL)]
    pub fallback_redirect: String,

    /// Seconds a fetched status is reused (0 disables caching)
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub cache_secs: u64,

    /// Seconds before a flag fetch is abandoned
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub fetch_timeout_secs: u64,

    /// Token that enables POST /api/kill-switch-status/clear
    #[arg(long, env = "BESSZONE_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Environment name reported by /api/test
    #[arg(long, env = "BESSZONE_ENV", default_value = "development")]
    pub environment: String,
}

/// Options for `besszone watch`
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Base URL of the running site
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    pub site: String,

    /// Seconds between checks
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub interval_secs: u64,
}

/// Validated configuration for `serve`
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Flag manager settings
    pub manager: ManagerConfig,
    /// Whether the flag URL was given explicitly
    pub source_overridden: bool,
    /// Admin token, if the clear endpoint is enabled
    pub admin_token: Option<String>,
    /// Environment name
    pub environment: String,
}

impl ServerConfig {
    /// Validates `serve` arguments into a server configuration
    ///
    /// # Returns
    /// * `Ok(ServerConfig)` with every option checked
    /// * `Err(CliError)` for an unparseable address or URL, or a zero timeout
    pub fn from_args(args: &ServeArgs) -> Result<Self, CliError> {
        let bind = args
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| CliError::InvalidBind(args.bind.clone()))?;

        let source_url = match &args.flag_url {
            Some(url) => parse_http_url("flag-url", url)?,
            None => DEFAULT_FLAG_URL.to_string(),
        };
        let fallback_redirect = parse_http_url("fallback-redirect", &args.fallback_redirect)?;

        if args.fetch_timeout_secs == 0 {
            return Err(CliError::ZeroDuration("fetch-timeout-secs"));
        }

        Ok(ServerConfig {
            bind,
            manager: ManagerConfig {
                source_url,
                cache_duration: Duration::from_secs(args.cache_secs),
                fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
                fallback_redirect,
            },
            source_overridden: args.flag_url.is_some(),
            admin_token: args.admin_token.clone().filter(|token| !token.is_empty()),
            environment: args.environment.clone(),
        })
    }
}

/// Validates `watch` arguments
///
/// # Returns
/// * `Ok((site, WatchConfig))` with the site base URL and poll settings
/// * `Err(CliError)` for a bad URL or a zero interval
pub fn watch_config_from_args(args: &WatchArgs) -> Result<(String, WatchConfig), CliError> {
    let site = parse_http_url("site", &args.site)?;

    if args.interval_secs == 0 {
        return Err(CliError::ZeroDuration("interval-secs"));
    }

    Ok((
        site,
        WatchConfig {
            interval: Duration::from_secs(args.interval_secs),
        },
    ))
}

/// Checks that `value` is an absolute http or https URL, returning it unchanged
fn parse_http_url(option: &'static str, value: &str) -> Result<String, CliError> {
    let invalid = || CliError::InvalidUrl {
        option,
        value: value.to_string(),
    };

    let url = Url::parse(value).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" => Ok(value.to_string()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `serve` arguments as parsed with no flags and an empty environment
    fn base_serve_args() -> ServeArgs {
        ServeArgs {
            bind: "0.0.0.0:3000".to_string(),
            flag_url: None,
            fallback_redirect: DEFAULT_REDIRECT_URL.to_string(),
            cache_secs: 60,
            fetch_timeout_secs: 5,
            admin_token: None,
            environment: "development".to_string(),
        }
    }

    #[test]
    fn test_serve_defaults() {
        let config = ServerConfig::from_args(&base_serve_args()).unwrap();

        assert_eq!(config.bind, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.manager.source_url, DEFAULT_FLAG_URL);
        assert_eq!(config.manager.cache_duration, Duration::from_secs(60));
        assert_eq!(config.manager.fetch_timeout, Duration::from_secs(5));
        assert!(!config.source_overridden);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_serve_flags_parse() {
        // Every env-backed option is given on the command line, so ambient
        // variables cannot change the result
        let cli = Cli::parse_from([
            "besszone",
            "serve",
            "--bind",
            "127.0.0.1:8080",
            "--flag-url",
            "https://flags.example/kill.json",
            "--fallback-redirect",
            "https://fallback.example/",
            "--admin-token",
            "tok",
            "--environment",
            "staging",
        ]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let config = ServerConfig::from_args(&args).unwrap();

        assert_eq!(config.manager.source_url, "https://flags.example/kill.json");
        assert_eq!(config.manager.fallback_redirect, "https://fallback.example/");
        assert!(config.source_overridden);
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.admin_token.as_deref(), Some("tok"));
        assert_eq!(config.environment, "staging");
    }

    #[test]
    fn test_serve_invalid_bind() {
        let args = ServeArgs {
            bind: "not-an-address".to_string(),
            ..base_serve_args()
        };
        let err = ServerConfig::from_args(&args).unwrap_err();
        assert!(err.to_string().contains("not-an-address"));
    }

    #[test]
    fn test_serve_rejects_non_http_flag_url() {
        let args = ServeArgs {
            flag_url: Some("ftp://flags.example/kill.json".to_string()),
            ..base_serve_args()
        };
        let err = ServerConfig::from_args(&args).unwrap_err();
        assert!(matches!(err, CliError::InvalidUrl { option: "flag-url", .. }));
    }

    #[test]
    fn test_serve_rejects_relative_fallback() {
        let args = ServeArgs {
            fallback_redirect: "/maintenance".to_string(),
            ..base_serve_args()
        };
        let err = ServerConfig::from_args(&args).unwrap_err();
        assert!(matches!(err, CliError::InvalidUrl { option: "fallback-redirect", .. }));
    }

    #[test]
    fn test_serve_zero_timeout_rejected() {
        let args = ServeArgs {
            fetch_timeout_secs: 0,
            ..base_serve_args()
        };
        assert!(matches!(
            ServerConfig::from_args(&args),
            Err(CliError::ZeroDuration("fetch-timeout-secs"))
        ));
    }

    #[test]
    fn test_serve_zero_cache_allowed() {
        let args = ServeArgs {
            cache_secs: 0,
            ..base_serve_args()
        };
        let config = ServerConfig::from_args(&args).unwrap();
        assert_eq!(config.manager.cache_duration, Duration::ZERO);
    }

    #[test]
    fn test_empty_admin_token_disables_clear() {
        let args = ServeArgs {
            admin_token: Some(String::new()),
            ..base_serve_args()
        };
        let config = ServerConfig::from_args(&args).unwrap();
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_watch_defaults() {
        let cli = Cli::parse_from(["besszone", "watch"]);
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };

        let (site, config) = watch_config_from_args(&args).unwrap();

        assert_eq!(site, "http://127.0.0.1:3000");
        assert_eq!(config.interval, Duration::from_secs(30));
    }

    #[test]
    fn test_watch_zero_interval_rejected() {
        let cli = Cli::parse_from(["besszone", "watch", "--interval-secs", "0"]);
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };

        assert!(matches!(
            watch_config_from_args(&args),
            Err(CliError::ZeroDuration("interval-secs"))
        ));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["besszone"]).is_err());
    }
}
