use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Pre-compiled regex for queue and namespace names (compiled once at first use)
static QUEUE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:\-]*$").unwrap());

/// Queue used when neither the job nor the caller names one.
pub const DEFAULT_QUEUE_NAME: &str = "default";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_REDIS_NAMESPACE: &str = "resque";

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub jobs: Option<JobsSection>,
    #[serde(default)]
    pub redis: Option<RedisSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
pub struct JobsSection {
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub verbose: Option<bool>,
    #[serde(default)]
    pub logger: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedisSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
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
    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
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
        let _ = s;
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Resolved job configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobsConfig {
    /// Queue used by jobs that do not name their own.
    pub queue_name_for_jobs: String,
    /// Log a line for every single enqueue.
    pub verbose: bool,
    /// Named logger the enqueue lines are attributed to.
    pub logger: Option<String>,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue_name_for_jobs: DEFAULT_QUEUE_NAME.to_string(),
            verbose: false,
            logger: None,
            redis: RedisConfig {
                url: DEFAULT_REDIS_URL.to_string(),
                namespace: DEFAULT_REDIS_NAMESPACE.to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl JobsConfig {
    /// Shorthand for a default config routed to `queue`.
    #[must_use]
    pub fn with_queue(queue: impl Into<String>) -> Self {
        Self {
            queue_name_for_jobs: queue.into(),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(()),
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

/// Load concrete `JobsConfig` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<JobsConfig, ConfigError> {
    let mut cfg = JobsConfig::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        if let Some(jobs) = raw.jobs {
            apply_opt!(cfg.queue_name_for_jobs, jobs.queue_name);
            apply_opt!(cfg.verbose, jobs.verbose);
            apply_opt!(cfg.logger, jobs.logger, wrap);
        }
        if let Some(redis) = raw.redis {
            apply_opt!(cfg.redis.url, redis.url);
            apply_opt!(cfg.redis.namespace, redis.namespace);
        }
        if let Some(logging) = raw.logging {
            apply_opt!(cfg.logging.level, logging.level);
            apply_opt!(cfg.logging.json, logging.json);
        }
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
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

#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Apply all environment variable overrides to config
fn apply_env_overrides(cfg: &mut JobsConfig) -> Result<(), ConfigError> {
    // Jobs
    if let Some(v) = env_str("JOBKIT_QUEUE_NAME") {
        cfg.queue_name_for_jobs = v;
    }
    if let Some(v) = env_bool("JOBKIT_VERBOSE")? {
        cfg.verbose = v;
    }
    if let Some(v) = env_str("JOBKIT_LOGGER") {
        cfg.logger = if v.is_empty() { None } else { Some(v) };
    }

    // Redis
    if let Some(v) = env_str("JOBKIT_REDIS_URL") {
        cfg.redis.url = v;
    }
    if let Some(v) = env_str("JOBKIT_REDIS_NAMESPACE") {
        cfg.redis.namespace = v;
    }

    // Logging
    if let Some(v) = env_str("JOBKIT_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("JOBKIT_LOG_JSON")? {
        cfg.logging.json = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &JobsConfig) -> Result<(), ConfigError> {
    if !QUEUE_NAME_REGEX.is_match(&cfg.queue_name_for_jobs) {
        return Err(ConfigError::Validation(format!(
            "invalid jobs.queue_name: {:?}",
            cfg.queue_name_for_jobs
        )));
    }
    if !QUEUE_NAME_REGEX.is_match(&cfg.redis.namespace) {
        return Err(ConfigError::Validation(format!(
            "invalid redis.namespace: {:?}",
            cfg.redis.namespace
        )));
    }
    if let Some(logger) = &cfg.logger {
        if logger.trim().is_empty() {
            return Err(ConfigError::Validation(
                "jobs.logger must not be blank".to_string(),
            ));
        }
    }

    match url::Url::parse(&cfg.redis.url) {
        Ok(u) => match u.scheme() {
            "redis" | "rediss" | "unix" | "redis+unix" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "unsupported redis url scheme: {}",
                    other
                )))
            }
        },
        Err(_) => {
            return Err(ConfigError::Validation(format!(
                "invalid redis.url: {}",
                cfg.redis.url
            )))
        }
    }
    Ok(())
}
