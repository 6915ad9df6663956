use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Pre-compiled regex for hostname validation (compiled once at first use)
static HOSTNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][-a-zA-Z0-9\.]*[a-zA-Z0-9]$").unwrap());

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub jobs: Option<JobsSection>,
    #[serde(default)]
    pub llm: Option<LlmSection>,
    #[serde(default)]
    pub storage: Option<StorageSection>,
    #[serde(default)]
    pub thumbnails: Option<ThumbnailsSection>,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSection {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct JobsSection {
    #[serde(default)]
    pub poll_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThumbnailsSection {
    #[serde(default)]
    pub browser_binary: Option<String>,
    #[serde(default)]
    pub navigation_timeout_ms: Option<u64>,
    #[serde(default)]
    pub settle_delay_ms: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

/// Parse configuration from a string with optional format hint
#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try to parse config by attempting each enabled format
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s; // suppress unused warning
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete application configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub jobs: JobsConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub thumbnails: ThumbnailsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobsConfig {
    pub poll_delay_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmConfig {
    pub model: String,
    /// Resolved API key. Absent keys surface as configuration errors when a
    /// job actually needs the generative client, not at startup.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThumbnailsConfig {
    pub browser_binary: String,
    pub navigation_timeout_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 7600,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            database: DatabaseConfig {
                path: "shelfmark.sqlite".to_string(),
                max_connections: 10,
                connect_timeout_secs: 30,
            },
            jobs: JobsConfig {
                poll_delay_ms: 2000,
                max_attempts: 3,
            },
            llm: LlmConfig {
                model: "gemini-2.5-flash".to_string(),
                api_key: None,
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            thumbnails: ThumbnailsConfig {
                browser_binary: "chromium".to_string(),
                navigation_timeout_ms: 25_000,
                settle_delay_ms: 800,
            },
        }
    }
}

/// Helper macro to apply optional value if present
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
    ($target:expr, $source:expr, wrap) => {
        if let Some(v) = $source {
            $target = Some(v);
        }
    };
}

/// Load concrete `Config` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        if let Some(server) = raw.server {
            apply_opt!(cfg.server.host, server.host);
            apply_opt!(cfg.server.port, server.port);
        }
        if let Some(logging) = raw.logging {
            apply_opt!(cfg.logging.level, logging.level);
            apply_opt!(cfg.logging.json, logging.json);
        }
        if let Some(db) = raw.database {
            apply_opt!(cfg.database.path, db.path);
            apply_opt!(cfg.database.max_connections, db.max_connections);
            apply_opt!(cfg.database.connect_timeout_secs, db.connect_timeout_secs);
        }
        if let Some(jobs) = raw.jobs {
            apply_opt!(cfg.jobs.poll_delay_ms, jobs.poll_delay_ms);
            apply_opt!(cfg.jobs.max_attempts, jobs.max_attempts);
        }
        if let Some(llm) = raw.llm {
            apply_opt!(cfg.llm.model, llm.model);
            apply_opt!(cfg.llm.api_key, llm.api_key, wrap);
        }
        if let Some(storage) = raw.storage {
            apply_opt!(cfg.storage.data_dir, storage.data_dir);
        }
        if let Some(thumbs) = raw.thumbnails {
            apply_opt!(cfg.thumbnails.browser_binary, thumbs.browser_binary);
            apply_opt!(
                cfg.thumbnails.navigation_timeout_ms,
                thumbs.navigation_timeout_ms
            );
            apply_opt!(cfg.thumbnails.settle_delay_ms, thumbs.settle_delay_ms);
        }
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

/// Helper to parse env var as a specific type
#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

/// Helper to parse env var as bool
#[inline]
fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("invalid {}", key))),
        Err(_) => Ok(None),
    }
}

/// Helper to get env var as string
#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(()),
    }
}

/// Apply all environment variable overrides to config
fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    // Server
    if let Some(v) = env_str("SHELFMARK_SERVER_HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = env_parse::<u16>("SHELFMARK_SERVER_PORT")? {
        cfg.server.port = v;
    }

    // Logging
    if let Some(v) = env_str("SHELFMARK_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("SHELFMARK_LOG_JSON")? {
        cfg.logging.json = v;
    }

    // Database
    if let Some(v) = env_str("SHELFMARK_DATABASE_PATH") {
        cfg.database.path = v;
    }
    if let Some(v) = env_parse::<u32>("SHELFMARK_DATABASE_MAX_CONNECTIONS")? {
        cfg.database.max_connections = v;
    }
    if let Some(v) = env_parse::<u64>("SHELFMARK_DATABASE_CONNECT_TIMEOUT_SECS")? {
        cfg.database.connect_timeout_secs = v;
    }

    // Jobs
    if let Some(v) = env_parse::<u64>("SHELFMARK_JOBS_POLL_DELAY_MS")? {
        cfg.jobs.poll_delay_ms = v;
    }
    if let Some(v) = env_parse::<u32>("SHELFMARK_JOBS_MAX_ATTEMPTS")? {
        cfg.jobs.max_attempts = v;
    }

    // LLM
    if let Some(v) = env_str("SHELFMARK_LLM_MODEL") {
        cfg.llm.model = v;
    }
    if let Some(v) = env_str("GOOGLE_API_KEY") {
        cfg.llm.api_key = Some(v);
    }
    // The explicit variable wins over the conventional one.
    if let Some(v) = env_str("SHELFMARK_LLM_API_KEY") {
        cfg.llm.api_key = Some(v);
    }

    // Storage
    if let Some(v) = env_str("SHELFMARK_STORAGE_DATA_DIR") {
        cfg.storage.data_dir = v;
    }

    // Thumbnails
    if let Some(v) = env_str("SHELFMARK_THUMBNAILS_BROWSER_BINARY") {
        cfg.thumbnails.browser_binary = v;
    }
    if let Some(v) = env_parse::<u64>("SHELFMARK_THUMBNAILS_NAVIGATION_TIMEOUT_MS")? {
        cfg.thumbnails.navigation_timeout_ms = v;
    }
    if let Some(v) = env_parse::<u64>("SHELFMARK_THUMBNAILS_SETTLE_DELAY_MS")? {
        cfg.thumbnails.settle_delay_ms = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.server.port == 0 {
        return Err(ConfigError::Validation("server.port must be > 0".into()));
    }
    let host_ok = cfg.server.host.parse::<std::net::IpAddr>().is_ok()
        || HOSTNAME_REGEX.is_match(&cfg.server.host);
    if !host_ok {
        return Err(ConfigError::Validation(format!(
            "invalid server.host: {}",
            cfg.server.host
        )));
    }

    if cfg.database.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database.path must not be empty".into(),
        ));
    }
    if cfg.database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be > 0".into(),
        ));
    }

    if cfg.jobs.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "jobs.max_attempts must be > 0".into(),
        ));
    }
    if cfg.jobs.poll_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "jobs.poll_delay_ms must be > 0".into(),
        ));
    }

    if cfg.storage.data_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "storage.data_dir must not be empty".into(),
        ));
    }

    Ok(())
}
