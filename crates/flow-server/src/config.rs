//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "flow_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer token of the administrator principal. Without it no
    /// organization can be created.
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Timers and buffering for persistent subscriber connections.
#[derive(Debug, Clone, Deserialize)]
pub struct LivenessConfig {
    /// Period of the server-initiated heartbeat frame.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Read-idle period after which the server probes the client.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How long a probe may go unanswered before the connection is closed.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Per-connection outbound queue size. A connection whose queue is full
    /// when a notification is dispatched is treated as dead.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

/// Bounds for the polling fallback.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WatchConfig {
    /// Number of most recent events examined per poll, regardless of limit.
    #[serde(default = "default_scan_cap")]
    pub scan_cap: usize,

    #[serde(default = "default_watch_limit")]
    pub default_limit: usize,

    /// Largest accepted `limit`; larger requests are clamped.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    2222
}

fn default_db_path() -> String {
    "flow.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    90
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_scan_cap() -> usize {
    1000
}

fn default_watch_limit() -> usize {
    100
}

fn default_max_limit() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> flow_db::DbRuntimeSettings {
        flow_db::DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            scan_cap: default_scan_cap(),
            default_limit: default_watch_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `FLOW_HOST` overrides `server.host`
/// - `FLOW_PORT` overrides `server.port`
/// - `FLOW_DB_PATH` overrides `database.path`
/// - `FLOW_LOG_LEVEL` overrides `logging.level`
/// - `FLOW_LOG_JSON` overrides `logging.json` ("true" or "1" to enable)
/// - `FLOW_ADMIN_TOKEN` overrides `auth.admin_token`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns `ConfigError::Parse` on malformed TOML or mistyped values.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(parsed) = var("FLOW_HOST").and_then(|host| host.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = var("FLOW_PORT").and_then(|port| port.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(db_path) = var("FLOW_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("FLOW_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("FLOW_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(token) = var("FLOW_ADMIN_TOKEN").filter(|t| !t.trim().is_empty()) {
        config.auth.admin_token = Some(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.port, 2222);
        assert_eq!(config.database.path, "flow.db");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.liveness.heartbeat_interval_secs, 30);
        assert_eq!(config.liveness.idle_timeout_secs, 90);
        assert_eq!(config.watch.scan_cap, 1000);
        assert!(config.auth.admin_token.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
            [server]
            port = 9000

            [watch]
            scan_cap = 50

            [auth]
            admin_token = "root"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.watch.scan_cap, 50);
        assert_eq!(config.watch.default_limit, 100);
        assert_eq!(config.auth.admin_token.as_deref(), Some("root"));
    }

    #[test]
    fn mistyped_value_is_a_parse_error() {
        let err = parse_config("[server]\nport = \"high\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.database.pool_max_size, 8);
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut config = parse_config("[server]\nport = 9000").unwrap();
        let env: HashMap<&str, &str> = [
            ("FLOW_PORT", "7000"),
            ("FLOW_HOST", "0.0.0.0"),
            ("FLOW_DB_PATH", "/tmp/other.db"),
            ("FLOW_LOG_JSON", "1"),
            ("FLOW_ADMIN_TOKEN", "from-env"),
        ]
        .into_iter()
        .collect();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path, "/tmp/other.db");
        assert!(config.logging.json);
        assert_eq!(config.auth.admin_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| match k {
            "FLOW_PORT" => Some("not-a-port".to_string()),
            "FLOW_ADMIN_TOKEN" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.server.port, 2222);
        assert!(config.auth.admin_token.is_none());
    }
}
