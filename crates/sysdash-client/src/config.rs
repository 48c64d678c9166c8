use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use sysdash_core::responses::{DEFAULT_RESPONSE_CAPACITY, DEFAULT_RESPONSE_TTL};
use sysdash_core::{
    Codec, RequestStyle, DEFAULT_HANDSHAKE_GRACE, ResponseFormat, ResponseLogMode, StoreConfig, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_SERIES_CAPACITY,
};
use thiserror::Error;
use url::Url;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 18251;
pub const DEFAULT_PATH: &str = "/ws";
pub const DEFAULT_HEARTBEAT_SECS: u64 = 4 * 60;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;
/// Upper bound for `--response-ttl-secs`: one day.
pub const MAX_RESPONSE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Parser, Debug, Clone)]
#[command(name = "sysdash")]
#[command(about = "Terminal client for the system dashboard", long_about = None)]
pub struct Args {
    /// Full WebSocket endpoint; overrides host, port, path and tls
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub path: Option<String>,
    #[arg(long)]
    pub tls: bool,
    #[arg(long, default_value_t = DEFAULT_HEARTBEAT_SECS)]
    pub heartbeat_secs: u64,
    #[arg(long, default_value_t = DEFAULT_RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,
    /// How long to wait for the server to speak before subscribing anyway
    #[arg(long, default_value_t = DEFAULT_HANDSHAKE_GRACE.as_millis() as u64)]
    pub handshake_grace_ms: u64,
    #[arg(long, default_value_t = DEFAULT_SERIES_CAPACITY)]
    pub series_capacity: usize,
    #[arg(long, value_enum, default_value_t = ResponseMode::Ephemeral)]
    pub responses: ResponseMode,
    #[arg(long, default_value_t = DEFAULT_RESPONSE_TTL.as_secs())]
    pub response_ttl_secs: u64,
    #[arg(long, default_value_t = DEFAULT_RESPONSE_CAPACITY)]
    pub response_capacity: usize,
    #[arg(long, value_enum, default_value_t = RequestStyleArg::PageScoped)]
    pub request_style: RequestStyleArg,
    /// Page requested after every connect
    #[arg(long, default_value = "/")]
    pub location: String,
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Live terminal view (default)
    Watch,
    /// Send one request and print the notifications that follow
    Send {
        #[command(subcommand)]
        action: Action,
        #[arg(long, default_value_t = 3)]
        linger_secs: u64,
    },
    /// Print the synchronized state as JSON
    Snapshot {
        #[arg(long, default_value_t = 3)]
        linger_secs: u64,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start { name: String },
    Stop { name: String },
    Reset { name: String },
    Command {
        name: String,
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    Gc,
    Close,
    DeleteResponse { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResponseMode {
    Ephemeral,
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RequestStyleArg {
    PageScoped,
    Direct,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported url scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub url: Url,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub handshake_grace: Duration,
    pub max_frame_bytes: usize,
    pub store: StoreConfig,
    pub response_format: ResponseFormat,
    pub request_style: RequestStyle,
    pub location: String,
    pub password: Option<String>,
    pub log_stdout: bool,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn codec(&self) -> Codec {
        Codec::new(self.response_format)
    }
}

pub fn load_config(args: &Args) -> Result<Config, ConfigError> {
    load_config_with(args, |key| std::env::var(key).ok())
}

/// Same as `load_config` with an explicit environment lookup.
pub fn load_config_with<F>(args: &Args, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let url = resolve_url(args, &env)?;
    let response_mode = match args.responses {
        ResponseMode::Ephemeral => ResponseLogMode::Ephemeral {
            ttl: Duration::from_secs(args.response_ttl_secs.min(MAX_RESPONSE_TTL_SECS)),
            capacity: args.response_capacity,
        },
        ResponseMode::Persistent => ResponseLogMode::Persistent {
            capacity: args.response_capacity,
        },
    };
    let response_format = if response_mode.is_persistent() {
        ResponseFormat::Structured
    } else {
        ResponseFormat::Text
    };
    let request_style = match args.request_style {
        RequestStyleArg::PageScoped => RequestStyle::PageScoped,
        RequestStyleArg::Direct => RequestStyle::Direct,
    };
    Ok(Config {
        url,
        heartbeat_interval: Duration::from_secs(args.heartbeat_secs.max(1)),
        reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
        handshake_grace: Duration::from_millis(args.handshake_grace_ms),
        max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        store: StoreConfig {
            series_capacity: args.series_capacity.max(1),
            response_mode,
        },
        response_format,
        request_style,
        location: args.location.clone(),
        password: non_empty(env("SYSDASH_PASSWORD")),
        log_stdout: env("SYSDASH_LOG_STDOUT")
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(false),
        log_file: args.log_file.clone(),
    })
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn resolve_url<F>(args: &Args, env: &F) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = non_empty(args.url.clone()).or_else(|| non_empty(env("SYSDASH_URL"))) {
        return parse_ws_url(&url);
    }
    let host = non_empty(args.host.clone())
        .or_else(|| non_empty(env("SYSDASH_HOST")))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = args
        .port
        .or_else(|| env("SYSDASH_PORT").and_then(|value| value.trim().parse().ok()))
        .unwrap_or(DEFAULT_PORT);
    let path = non_empty(args.path.clone())
        .or_else(|| non_empty(env("SYSDASH_PATH")))
        .unwrap_or_else(|| DEFAULT_PATH.to_string());
    let tls = args.tls
        || env("SYSDASH_TLS")
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(false);
    derive_url(&host, port, &path, tls)
}

/// Builds the endpoint from its parts; `wss` when TLS is on.
pub fn derive_url(host: &str, port: u16, path: &str, tls: bool) -> Result<Url, ConfigError> {
    let scheme = if tls { "wss" } else { "ws" };
    let path = path.trim();
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    parse_ws_url(&format!("{scheme}://{}:{port}{path}", host.trim()))
}

/// Accepts `ws`/`wss`, and maps `http`/`https` onto them the way a browser
/// derives the socket from the page it was served on.
pub fn parse_ws_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["sysdash"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).expect("args")
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_dashboard_server() {
        let config = load_config_with(&args(&[]), env_of(&[])).expect("config");
        assert_eq!(config.url.as_str(), "ws://localhost:18251/ws");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(240));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.store.series_capacity, 50);
        assert_eq!(config.request_style, RequestStyle::PageScoped);
        assert_eq!(config.response_format, ResponseFormat::Text);
        assert_eq!(config.location, "/");
        assert!(config.password.is_none());
    }

    #[test]
    fn tls_switches_scheme() {
        let config = load_config_with(
            &args(&["--host", "dash.internal", "--port", "8443", "--path", "socket"]),
            env_of(&[("SYSDASH_TLS", "yes")]),
        )
        .expect("config");
        assert_eq!(config.url.as_str(), "wss://dash.internal:8443/socket");
    }

    #[test]
    fn explicit_url_wins_over_parts() {
        let config = load_config_with(
            &args(&["--url", "https://dash.example.com/ws", "--port", "1"]),
            env_of(&[("SYSDASH_HOST", "ignored")]),
        )
        .expect("config");
        assert_eq!(config.url.scheme(), "wss");
        assert_eq!(config.url.host_str(), Some("dash.example.com"));
    }

    #[test]
    fn rejects_foreign_schemes() {
        let err = load_config_with(&args(&["--url", "ftp://x/ws"]), env_of(&[])).expect_err("scheme");
        assert_eq!(err, ConfigError::UnsupportedScheme("ftp".to_string()));
    }

    #[test]
    fn persistent_mode_uses_structured_responses() {
        let config = load_config_with(
            &args(&["--responses", "persistent", "--response-capacity", "20"]),
            env_of(&[("SYSDASH_PASSWORD", "s3cret"), ("SYSDASH_LOG_STDOUT", "1")]),
        )
        .expect("config");
        assert_eq!(config.response_format, ResponseFormat::Structured);
        assert_eq!(
            config.store.response_mode,
            ResponseLogMode::Persistent { capacity: 20 }
        );
        assert_eq!(config.password.as_deref(), Some("s3cret"));
        assert!(config.log_stdout);
    }

    #[test]
    fn response_ttl_is_clamped() {
        let config = load_config_with(
            &args(&["--response-ttl-secs", "10000000000000"]),
            env_of(&[]),
        )
        .expect("config");
        assert_eq!(
            config.store.response_mode,
            ResponseLogMode::Ephemeral {
                ttl: Duration::from_secs(MAX_RESPONSE_TTL_SECS),
                capacity: DEFAULT_RESPONSE_CAPACITY,
            }
        );
        assert_eq!(config.handshake_grace, DEFAULT_HANDSHAKE_GRACE);
    }

    #[test]
    fn send_command_collects_trailing_args() {
        let parsed = args(&["send", "command", "worker-1", "ping", "-n", "3"]);
        assert_eq!(
            parsed.command,
            Some(Command::Send {
                action: Action::Command {
                    name: "worker-1".to_string(),
                    command: "ping".to_string(),
                    args: vec!["-n".to_string(), "3".to_string()],
                },
                linger_secs: 3,
            })
        );
    }

    #[test]
    fn bool_flags() {
        assert_eq!(parse_bool_flag(" ON "), Some(true));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }
}
