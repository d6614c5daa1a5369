//! # Printer Module
//!
//! This module provides printer and label registries and label detection.
//!
//! ## Modules
//!
//! - [`config`]: Device profiles (printhead, DPI, orientation, density)
//! - [`label`]: Label profiles and RFID readings
//! - [`detect`]: RFID-to-label-profile matching

pub mod config;
pub mod detect;
pub mod label;

pub use config::{DeviceProfile, PrintDirection, Rotation};
pub use detect::{DetectError, Detection, DetectionResult, ProfileDetector};
pub use label::{LabelProfile, RfidReading, RollCatalog};
