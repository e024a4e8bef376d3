//! Configuration loading using Figment
//!
//! Configuration is layered:
//! 1. built-in defaults
//! 2. a TOML file (default `config/areadetector.toml`, missing file is fine)
//! 3. environment variables prefixed with `ADDAQ_`, nested with `__`
//!
//! ```text
//! ADDAQ_APPLICATION__LOG_LEVEL=debug
//! ADDAQ_DETECTOR__STALL_TIMEOUT_SECS=30
//! ```
//!
//! # Example
//!
//! ```toml
//! [application]
//! name = "beamline"
//! log_level = "info"
//!
//! [detector]
//! stall_timeout_secs = 120.0
//! default_timeout_secs = 10.0
//! file_template = "%s/%s.h5"
//! poll_interval_secs = 0.1
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/areadetector.toml";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the schema.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// Values loaded but are out of range.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaqConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Detector lifecycle settings
    #[serde(default)]
    pub detector: DetectorConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Output directory for artifacts; a temporary directory when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "areadetector-daq".to_string(),
            log_level: "info".to_string(),
            data_dir: None,
        }
    }
}

/// Timing and naming used by the acquisition lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Seconds without a new committed frame before a session is declared stalled
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: f64,
    /// Base timeout for single hardware operations
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: f64,
    /// Writer file name template, expanded with directory and file name
    #[serde(default = "default_file_template")]
    pub file_template: String,
    /// Interval between collect calls while flying
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: default_stall_timeout(),
            default_timeout_secs: default_timeout(),
            file_template: default_file_template(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl DetectorConfig {
    /// Stall budget.
    pub fn stall_timeout(&self) -> Duration {
        secs(self.stall_timeout_secs)
    }

    /// Base timeout for hardware operations.
    pub fn default_timeout(&self) -> Duration {
        secs(self.default_timeout_secs)
    }

    /// Collect interval while flying.
    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_secs)
    }

    /// Same settings with a different stall budget.
    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout_secs = stall_timeout.as_secs_f64();
        self
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn default_stall_timeout() -> f64 {
    120.0
}

fn default_timeout() -> f64 {
    10.0
}

fn default_file_template() -> String {
    "%s/%s.h5".to_string()
}

fn default_poll_interval() -> f64 {
    0.1
}

impl DaqConfig {
    /// Load configuration from the default file location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(DaqConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ADDAQ_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that parsing cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let detector = &self.detector;
        for (field, value) in [
            ("stall_timeout_secs", detector.stall_timeout_secs),
            ("default_timeout_secs", detector.default_timeout_secs),
            ("poll_interval_secs", detector.poll_interval_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{field} must be a positive number of seconds, got {value}"
                )));
            }
        }

        if !detector.file_template.contains("%s") {
            return Err(ConfigError::ValidationError(format!(
                "file_template '{}' has no %s placeholder",
                detector.file_template
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DaqConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detector.stall_timeout(), Duration::from_secs(120));
        assert_eq!(config.detector.default_timeout(), Duration::from_secs(10));
        assert_eq!(config.detector.file_template, "%s/%s.h5");
    }

    #[test]
    fn test_load_from_toml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[detector]\nstall_timeout_secs = 0.5\n\n[application]\nname = \"bench\"\nlog_level = \"debug\""
        )
        .unwrap();

        let config = DaqConfig::load_from(file.path()).unwrap();
        assert_eq!(config.detector.stall_timeout(), Duration::from_millis(500));
        assert_eq!(config.detector.default_timeout_secs, 10.0);
        assert_eq!(config.application.name, "bench");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaqConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.detector, DetectorConfig::default());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = DaqConfig::load_from(path).unwrap();
        assert_eq!(config, DaqConfig::default());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = DaqConfig::default();
        config.application.log_level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn test_non_positive_stall_budget_rejected() {
        let mut config = DaqConfig::default();
        config.detector.stall_timeout_secs = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stall_timeout_secs"));
    }

    #[test]
    fn test_with_stall_timeout() {
        let detector = DetectorConfig::default().with_stall_timeout(Duration::from_millis(100));
        assert_eq!(detector.stall_timeout(), Duration::from_millis(100));
    }
}
