//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::index::{IndexOptions, InsertMode, InsertQueueOptions};
use crate::segment::DEFAULT_MAX_SEGMENT_DOCS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Namespace index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub insert_mode: InsertMode,

    #[serde(default = "default_batch_backoff")]
    pub batch_backoff_ms: u64,

    #[serde(default = "default_batch_size_threshold")]
    pub batch_size_threshold: usize,

    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    #[serde(default = "default_max_segment_docs")]
    pub max_segment_docs: usize,

    pub default_query_limit: Option<usize>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_batch_backoff() -> u64 {
    2
}

fn default_batch_size_threshold() -> usize {
    InsertQueueOptions::default().batch_size_threshold
}

fn default_max_pending() -> usize {
    InsertQueueOptions::default().max_pending
}

fn default_max_segment_docs() -> usize {
    DEFAULT_MAX_SEGMENT_DOCS
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            insert_mode: InsertMode::default(),
            batch_backoff_ms: default_batch_backoff(),
            batch_size_threshold: default_batch_size_threshold(),
            max_pending: default_max_pending(),
            max_segment_docs: default_max_segment_docs(),
            default_query_limit: None,
        }
    }
}

impl IndexSection {
    /// Options for opening a namespace index
    pub fn to_options(&self) -> IndexOptions {
        IndexOptions {
            insert_mode: self.insert_mode,
            queue: InsertQueueOptions {
                batch_backoff: Duration::from_millis(self.batch_backoff_ms),
                batch_size_threshold: self.batch_size_threshold,
                max_pending: self.max_pending,
            },
            max_segment_docs: self.max_segment_docs,
            default_query_limit: self.default_query_limit,
            ..IndexOptions::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("nsindex").join("config.toml")),
            Some(PathBuf::from("/etc/nsindex/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Index overrides
        if let Some(mode) = lookup("NSINDEX_INSERT_MODE") {
            match mode.parse() {
                Ok(m) => self.index.insert_mode = m,
                Err(e) => tracing::warn!("Ignoring NSINDEX_INSERT_MODE: {}", e),
            }
        }
        if let Some(backoff) = lookup("NSINDEX_BATCH_BACKOFF_MS") {
            match backoff.parse() {
                Ok(ms) => self.index.batch_backoff_ms = ms,
                Err(_) => tracing::warn!("Ignoring NSINDEX_BATCH_BACKOFF_MS: {:?}", backoff),
            }
        }
        if let Some(threshold) = lookup("NSINDEX_BATCH_SIZE_THRESHOLD") {
            match threshold.parse() {
                Ok(n) => self.index.batch_size_threshold = n,
                Err(_) => {
                    tracing::warn!("Ignoring NSINDEX_BATCH_SIZE_THRESHOLD: {:?}", threshold)
                }
            }
        }

        // Logging overrides
        if let Some(level) = lookup("NSINDEX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("NSINDEX_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# nsindex Configuration
#
# Environment variables override these settings:
# - NSINDEX_INSERT_MODE
# - NSINDEX_BATCH_BACKOFF_MS
# - NSINDEX_BATCH_SIZE_THRESHOLD
# - NSINDEX_LOG_LEVEL
# - NSINDEX_LOG_FORMAT

[index]
# Namespace the CLI writes into
namespace = "default"

# Insert mode: async (return once enqueued) or sync (wait for the batch)
insert_mode = "async"

# How often pending writes are flushed (ms)
batch_backoff_ms = 2

# Pending writes that trigger an early flush
batch_size_threshold = 1024

# Pending writes beyond which new writes are refused
max_pending = 65536

# Documents per in-memory segment before it seals
max_segment_docs = 100000

# Limit applied to queries that do not set one
# default_query_limit = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
