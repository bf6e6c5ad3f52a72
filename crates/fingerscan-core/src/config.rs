//! Session configuration.
//!
//! [`SessionConfig`] collects the values that tune the capture session:
//! which device index is opened, how often the stop-capture loop re-polls,
//! and which products receive split four-finger treatment. Every field has a
//! default taken from [`constants`](crate::constants), so a configuration
//! file only needs to name the values it overrides.
//!
//! # Examples
//!
//! ```
//! use fingerscan_core::SessionConfig;
//!
//! let config = SessionConfig::from_json_str(r#"{ "stop_retry_interval_ms": 100 }"#).unwrap();
//! assert_eq!(config.stop_retry_interval_ms, 100);
//! assert_eq!(config.device_index, 0);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EXPORT_FILE_NAME, INITIALIZING_DEVICE_INDEX, SPLIT_FOUR_FINGER_MODE_THRESHOLD,
    SPLIT_FOUR_FINGER_PRODUCTS, SPLIT_FOUR_FINGER_SETTLE_MS, STOPPING_CAPTURE_DELAY_MS,
};
use crate::{Error, Result};

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Index of the scanner to describe and open.
    pub device_index: usize,

    /// Interval between stop-capture liveness polls, in milliseconds.
    pub stop_retry_interval_ms: u64,

    /// Product identifiers that use split four-finger capture modes.
    pub split_four_finger_products: Vec<String>,

    /// Supported-mode count that must be exceeded before split aliasing applies.
    pub split_mode_threshold: usize,

    /// Pause after signalling a split four-finger result, in milliseconds.
    pub split_settle_ms: u64,

    /// Base file name for exported images.
    pub export_file_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_index: INITIALIZING_DEVICE_INDEX,
            stop_retry_interval_ms: STOPPING_CAPTURE_DELAY_MS,
            split_four_finger_products: SPLIT_FOUR_FINGER_PRODUCTS
                .iter()
                .map(|product| product.to_string())
                .collect(),
            split_mode_threshold: SPLIT_FOUR_FINGER_MODE_THRESHOLD,
            split_settle_ms: SPLIT_FOUR_FINGER_SETTLE_MS,
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from JSON and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for malformed JSON and
    /// [`Error::Config`] when a value fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or any error from
    /// [`from_json_str`](Self::from_json_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check that the configured values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the retry interval is zero or the export
    /// file name is blank.
    pub fn validate(&self) -> Result<()> {
        if self.stop_retry_interval_ms == 0 {
            return Err(Error::Config(
                "stop_retry_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.export_file_name.trim().is_empty() {
            return Err(Error::Config("export_file_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Stop-capture poll interval as a [`Duration`].
    pub fn stop_retry_interval(&self) -> Duration {
        Duration::from_millis(self.stop_retry_interval_ms)
    }

    /// Split four-finger settle delay as a [`Duration`].
    pub fn split_settle_delay(&self) -> Duration {
        Duration::from_millis(self.split_settle_ms)
    }

    /// Whether the given product identifier gets split four-finger modes.
    pub fn is_split_four_finger_product(&self, product_id: &str) -> bool {
        self.split_four_finger_products
            .iter()
            .any(|product| product == product_id)
    }
}
