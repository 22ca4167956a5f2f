use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure for the detector.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub race_detection: RaceDetectionConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DetectorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: DetectorConfig =
            toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file is missing.
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Failed to load config from {:?}: {}. Using defaults.",
                    path.as_ref(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Get the default configuration as a TOML string.
    pub fn default_toml() -> Result<String> {
        let config = Self::default();
        toml::to_string_pretty(&config).context("Failed to serialize default config")
    }

    /// Validate the configuration for obvious misconfiguration.
    pub fn validate(&self) -> Result<()> {
        if self.capture.enabled && self.capture.buffer_size == 0 {
            anyhow::bail!("capture.buffer_size must be greater than 0 when capture is enabled");
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid log level: {}", other),
        }

        Ok(())
    }
}

impl FromStr for DetectorConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: DetectorConfig = toml::from_str(s).context("Failed to parse config")?;
        Ok(config)
    }
}

/// Controls whether accesses are recorded and checked at all.
///
/// When disabled, monitored values still serialize their accesses but keep no
/// clocks and never flag a thread.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RaceDetectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RaceDetectionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Race report capture.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: default_buffer_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub include_modules: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            include_modules: false,
        }
    }
}

// Default providers ---------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

// Tests ---------------------------------------------------------------------
