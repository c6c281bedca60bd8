//! Bootstrap configuration
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Command-line and environment overrides are applied by the binaries through
//! clap (`env = ...`); this module owns the TOML layer and the defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default decision threshold for both scorers
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Model-run name used when a caller does not name one
pub const DEFAULT_MODEL_RUN: &str = "dual_v1";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub reviewer: ReviewerConfig,

    #[serde(default)]
    pub scorers: ScorerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Inference defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Probability threshold, exclusive range (0, 1)
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Model-run name predictions and annotations are filed under
    #[serde(default = "default_model_run")]
    pub model_run: String,
}

/// Reviewer identity used when a caller does not supply one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerConfig {
    #[serde(default = "default_reviewer_email")]
    pub email: String,

    #[serde(default = "default_reviewer_name")]
    pub full_name: String,
}

/// Scorer weight locations; a missing path wires the scorer as unavailable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default)]
    pub multilabel_weights: Option<PathBuf>,

    #[serde(default)]
    pub binary_weights: Option<PathBuf>,
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("cxr-review.db")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_model_run() -> String {
    DEFAULT_MODEL_RUN.to_string()
}

fn default_reviewer_email() -> String {
    "reviewer@example.com".to_string()
}

fn default_reviewer_name() -> String {
    "Default Reviewer".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            model_run: default_model_run(),
        }
    }
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            email: default_reviewer_email(),
            full_name: default_reviewer_name(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            port: default_port(),
            logging: LoggingConfig::default(),
            inference: InferenceConfig::default(),
            reviewer: ReviewerConfig::default(),
            scorers: ScorerConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path, or the default location
    ///
    /// A missing default file is not an error: compiled defaults are used and
    /// a warning is logged. An explicit path that does not exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    warn!("No config file found, using compiled defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values the inference and persistence layers cannot honor
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.inference.threshold)?;
        if self.inference.model_run.trim().is_empty() {
            return Err(Error::Config("inference.model_run must not be empty".to_string()));
        }
        if self.reviewer.email.trim().is_empty() {
            return Err(Error::Config("reviewer.email must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Threshold must lie strictly between 0 and 1
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold < 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "threshold must be in (0, 1), got {}",
            threshold
        )))
    }
}

/// `<config_dir>/cxr-review/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("cxr-review").join("config.toml"))
}

/// OS-dependent data directory for the database
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cxr-review"))
        .unwrap_or_else(|| PathBuf::from("./cxr_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.port, 5780);
        assert_eq!(config.inference.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.inference.model_run, DEFAULT_MODEL_RUN);
        assert_eq!(config.logging.level, "info");
        assert!(config.scorers.binary_weights.is_none());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 6000
            [inference]
            threshold = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.inference.threshold, 0.7);
        assert_eq!(config.inference.model_run, DEFAULT_MODEL_RUN);
    }

    #[test]
    fn test_threshold_bounds_are_exclusive() {
        assert!(validate_threshold(0.5).is_ok());
        assert!(validate_threshold(0.0).is_err());
        assert!(validate_threshold(1.0).is_err());
        assert!(validate_threshold(f64::NAN).is_err());
        let out_of_range = "[inference]\nthreshold = 1.5";
        assert!(TomlConfig::from_toml_str(out_of_range).is_err());
    }
}
