use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use clap::Parser;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "tab-bridge",
    version,
    about = "Tab Bridge (HTTP tool gateway in front of a framed-stdio browser host)"
)]
pub struct Args {
    #[arg(long, env = "TAB_BRIDGE_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, env = "TAB_BRIDGE_PORT", default_value_t = 18765)]
    pub port: u16,

    #[arg(long, env = "TAB_BRIDGE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    #[arg(long, env = "TAB_BRIDGE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "TAB_BRIDGE_TOOL_TIMEOUT_MS", default_value_t = 120_000)]
    pub tool_timeout_ms: u64,

    #[arg(long, env = "TAB_BRIDGE_GROUP_TIMEOUT_MS", default_value_t = 30_000)]
    pub group_timeout_ms: u64,

    #[arg(long, env = "TAB_BRIDGE_MAX_BODY_BYTES", default_value_t = 4 * 1024 * 1024)]
    pub max_body_bytes: usize,

    #[arg(long, env = "TAB_BRIDGE_RUNTIME_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub runtime_version: String,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    #[arg(long, env = "TAB_BRIDGE_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Token(String),
}

impl AuthMode {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Token(_) => "token",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: IpAddr,
    pub port: u16,
    pub auth_mode: AuthMode,
    /// Empty means loopback origins only.
    pub cors_origins: Vec<String>,
    pub tool_timeout: Duration,
    pub group_timeout: Duration,
    pub max_body_bytes: usize,
    pub runtime_version: String,
    pub log_filter: String,
    pub json_logs: bool,
}

impl RuntimeConfig {
    pub fn from_args(args: Args) -> Result<Self, String> {
        if args.port == 0 {
            return Err("port must be greater than 0".to_owned());
        }
        if args.tool_timeout_ms == 0 {
            return Err("tool_timeout_ms must be greater than 0".to_owned());
        }
        if args.group_timeout_ms == 0 {
            return Err("group_timeout_ms must be greater than 0".to_owned());
        }
        if args.max_body_bytes == 0 {
            return Err("max_body_bytes must be greater than 0".to_owned());
        }

        Ok(Self {
            host: args.host,
            port: args.port,
            auth_mode: resolve_auth_mode(args.auth_token),
            cors_origins: normalize_origins(args.cors_origins)?,
            tool_timeout: Duration::from_millis(args.tool_timeout_ms),
            group_timeout: Duration::from_millis(args.group_timeout_ms),
            max_body_bytes: args.max_body_bytes,
            runtime_version: args.runtime_version,
            log_filter: args.log_filter,
            json_logs: args.json_logs,
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn for_test(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            auth_mode: AuthMode::None,
            cors_origins: Vec::new(),
            tool_timeout: Duration::from_millis(2_000),
            group_timeout: Duration::from_millis(2_000),
            max_body_bytes: 512 * 1024,
            runtime_version: "test".to_owned(),
            log_filter: "warn".to_owned(),
            json_logs: false,
        }
    }
}

fn resolve_auth_mode(token: Option<String>) -> AuthMode {
    token
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map_or(AuthMode::None, AuthMode::Token)
}

/// Reduces each configured origin to `scheme://host[:port]`.
fn normalize_origins(origins: Vec<String>) -> Result<Vec<String>, String> {
    origins
        .into_iter()
        .map(|origin| origin.trim().to_owned())
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            let parsed = Url::parse(&origin)
                .map_err(|error| format!("invalid CORS origin {origin}: {error}"))?;
            if parsed.host_str().is_none() {
                return Err(format!("invalid CORS origin {origin}: missing host"));
            }
            Ok(parsed.origin().ascii_serialization())
        })
        .collect()
}
