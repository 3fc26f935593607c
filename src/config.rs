//! # Configuration Management
//!
//! Centralized configuration for the secure channel.
//!
//! This module provides structured configuration for channel endpoints:
//! re-keying thresholds, payload limits, and logging options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides
//!
//! ## Security Considerations
//! - Re-key thresholds bound how much traffic a single symmetric series may
//!   protect; raising them trades key freshness for handshake overhead.
//! - The payload ceiling rejects length fields a hostile peer could use to
//!   force oversized allocations.

use crate::error::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Default re-key threshold: bytes carried by one symmetric series (64 MiB).
pub const DEFAULT_REKEY_AFTER_BYTES: u64 = 64 * 1024 * 1024;

/// Default re-key threshold: wall-clock lifetime of one symmetric series.
pub const DEFAULT_REKEY_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Max allowed payload size per message (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Channel configuration shared by client and service endpoints.
///
/// Both peers re-key independently: whichever side first crosses a threshold
/// initiates the rotation, so the values do not have to match across peers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Bytes of application payload after which a series change is forced.
    pub rekey_after_bytes: u64,

    /// Elapsed time after which a series change is forced.
    #[serde(with = "duration_serde")]
    pub rekey_interval: Duration,

    /// Maximum accepted payload size per message, in bytes.
    pub max_payload_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            rekey_after_bytes: DEFAULT_REKEY_AFTER_BYTES,
            rekey_interval: DEFAULT_REKEY_INTERVAL,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl ChannelConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ChannelError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ChannelError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ChannelError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(bytes) = std::env::var("SECURE_CHANNEL_REKEY_AFTER_BYTES") {
            if let Ok(val) = bytes.parse::<u64>() {
                config.rekey_after_bytes = val;
            }
        }

        if let Ok(interval) = std::env::var("SECURE_CHANNEL_REKEY_INTERVAL_SECS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.rekey_interval = Duration::from_secs(val);
            }
        }

        if let Ok(max) = std::env::var("SECURE_CHANNEL_MAX_PAYLOAD_SIZE") {
            if let Ok(val) = max.parse::<usize>() {
                config.max_payload_size = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.rekey_after_bytes == 0 {
            errors.push("Re-key byte threshold cannot be 0".to_string());
        }

        if self.rekey_interval.as_secs() < 1 {
            errors.push("Re-key interval too short (minimum: 1s)".to_string());
        } else if self.rekey_interval.as_secs() > 24 * 3600 {
            errors.push("Re-key interval too long (maximum: 24 hours)".to_string());
        }

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_payload_size
            ));
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ChannelError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
