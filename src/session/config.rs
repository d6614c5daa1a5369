//! # Session Configuration
//!
//! Every knob of a print job, loadable from JSON. Missing fields take their
//! defaults, so `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "density": 4,
//!   "quantity": 2,
//!   "binarize": {"method": "bayer"},
//!   "row_pacing_ms": 20,
//!   "roll_catalog": {"6972842743589": [30.0, 12.0]}
//! }
//! ```
//!
//! | Field | Default | |
//! |-------|---------|---|
//! | `density` | model default | clamped to the model's range |
//! | `quantity` | 1 | copies of the page |
//! | `label_type` | from RFID, else 1 | 1 gap, 2 black mark, 3 continuous |
//! | `row_pacing_ms` | 20 | pause after every row |
//! | `poll_interval_ms` | 500 | print-status polling period |
//! | `completion_timeout_ms` | 30000 | give up waiting for the page |
//! | `request_timeout_ms` | 2000 | per-reply timeout |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NiimbotError;
use crate::printer::{RollCatalog, Rotation};
use crate::render::dither::Binarize;
use crate::render::encoder::EncodeOptions;

fn default_quantity() -> u16 {
    1
}

fn default_row_pacing_ms() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_completion_timeout_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub density: Option<u8>,
    #[serde(default = "default_quantity")]
    pub quantity: u16,
    #[serde(default)]
    pub label_type: Option<u8>,
    #[serde(default)]
    pub binarize: Binarize,
    /// Overrides the device profile's rotation direction
    #[serde(default)]
    pub rotation: Option<Rotation>,
    /// Send blank rows as empty-row commands
    #[serde(default)]
    pub compact_empty_rows: bool,

    #[serde(default = "default_row_pacing_ms")]
    pub row_pacing_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub query_info: bool,
    #[serde(default = "default_true")]
    pub query_rfid: bool,
    /// Barcode → label size, used to resolve RFID readings
    #[serde(default)]
    pub roll_catalog: RollCatalog,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            density: None,
            quantity: default_quantity(),
            label_type: None,
            binarize: Binarize::default(),
            rotation: None,
            compact_empty_rows: false,
            row_pacing_ms: default_row_pacing_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            completion_timeout_ms: default_completion_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            query_info: true,
            query_rfid: true,
            roll_catalog: RollCatalog::default(),
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, NiimbotError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| NiimbotError::Config(format!("Invalid session config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NiimbotError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            NiimbotError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), NiimbotError> {
        if self.quantity == 0 {
            return Err(NiimbotError::Config("quantity must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(NiimbotError::Config("poll_interval_ms must be positive".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(NiimbotError::Config("request_timeout_ms must be positive".into()));
        }
        if self.completion_timeout_ms < self.poll_interval_ms {
            return Err(NiimbotError::Config(
                "completion_timeout_ms is shorter than one poll interval".into(),
            ));
        }
        match self.label_type {
            Some(t) if !(1..=3).contains(&t) => {
                return Err(NiimbotError::Config(format!(
                    "label_type {} is not 1 (gap), 2 (black mark) or 3 (continuous)",
                    t
                )));
            }
            _ => {}
        }
        if self.row_pacing_ms == 0 {
            tracing::warn!("row pacing disabled; the printer buffer may overflow");
        }
        Ok(())
    }

    pub fn row_pacing(&self) -> Duration {
        Duration::from_millis(self.row_pacing_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Encoder settings carried by this configuration.
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            binarize: self.binarize,
            rotation: self.rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(SessionConfig::from_json("{}").unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.row_pacing(), Duration::from_millis(20));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.completion_timeout(), Duration::from_secs(30));
        assert_eq!(config.quantity, 1);
        assert!(config.query_rfid);
    }

    #[test]
    fn test_partial_json() {
        let config = SessionConfig::from_json(
            r#"{"density": 5, "rotation": "counter_clockwise",
                "binarize": {"method": "bayer"},
                "roll_catalog": {"6972842743589": [30.0, 12.0]}}"#,
        )
        .unwrap();
        assert_eq!(config.density, Some(5));
        assert_eq!(config.rotation, Some(Rotation::CounterClockwise));
        assert_eq!(config.binarize, Binarize::Bayer);
        assert_eq!(config.roll_catalog.lookup("6972842743589"), Some((30.0, 12.0)));
        assert_eq!(config.row_pacing_ms, 20);
    }

    #[test]
    fn test_rejects_bad_values() {
        for json in [
            r#"{"quantity": 0}"#,
            r#"{"poll_interval_ms": 0}"#,
            r#"{"label_type": 9}"#,
            r#"{"completion_timeout_ms": 100, "poll_interval_ms": 500}"#,
            r#"{"density": "dark"}"#,
        ] {
            assert!(
                matches!(SessionConfig::from_json(json), Err(NiimbotError::Config(_))),
                "{}",
                json
            );
        }
    }
}
