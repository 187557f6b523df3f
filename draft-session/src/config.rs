//! Configuration for the generation engine.

use serde::{Deserialize, Serialize};
use std::path::Path;

use draft_protocol::anomaly::DEFAULT_ANOMALY_CAPACITY;
use draft_protocol::DecoderConfig;

/// Error loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid YAML
    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value is out of range
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frame decoder settings
    pub decoder: DecoderConfig,
    /// Session settings
    pub session: SessionConfig,
    /// Error classifier settings
    pub classifier: ClassifierConfig,
    /// Draft review settings
    pub review: ReviewConfig,
}

impl EngineConfig {
    /// Load config from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decoder.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "decoder.max_frame_bytes must be greater than zero".to_string(),
            ));
        }
        if self.session.anomaly_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session.anomaly_capacity must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.review.low_confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "review.low_confidence_threshold must be within 0.0 - 1.0, got {}",
                self.review.low_confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum anomalies retained per session
    pub anomaly_capacity: usize,
    /// Default caller deadline for a generation (ms), if any
    pub deadline_ms: Option<u64>,
    /// Buffer size of the cancel command channel
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            anomaly_capacity: DEFAULT_ANOMALY_CAPACITY,
            deadline_ms: None,
            command_buffer: 8,
        }
    }
}

/// Retry hints attached by the error classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Suggested wait before retrying a rate-limited request (ms)
    pub rate_limit_retry_delay_ms: u64,
    /// Suggested maximum retries after rate limiting
    pub rate_limit_max_attempts: u32,
    /// Suggested retries after a timeout (0 disables the hint)
    pub timeout_retry_attempts: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rate_limit_retry_delay_ms: 30_000,
            rate_limit_max_attempts: 3,
            timeout_retry_attempts: 1,
        }
    }
}

/// Draft review settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Confidence below this raises a low-confidence warning
    pub low_confidence_threshold: f32,
    /// Whether exports with active warnings need explicit confirmation
    pub confirm_export_with_warnings: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 0.5,
            confirm_export_with_warnings: true,
        }
    }
}
