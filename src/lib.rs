//! # niimbot - NIIMBOT Label Printer Library
//!
//! A Rust library for printing on NIIMBOT thermal label printers (B1, B18,
//! B21, B3S, D11, D101, D110) over Bluetooth LE or USB serial. It provides:
//!
//! - **Protocol implementation**: packet framing, command builders, reply parsers
//! - **Profiles**: static device and label registries, RFID label detection
//! - **Encoding**: image to printhead rows with model-aware rotation
//! - **Transport**: BLE GATT, serial, and an in-memory mock
//! - **Sessions**: the print job state machine
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), niimbot::NiimbotError> {
//! use niimbot::{
//!     printer::DeviceProfile,
//!     session::{PrintSession, SessionConfig},
//!     transport::SerialTransport,
//! };
//!
//! let d11 = DeviceProfile::get("D11").unwrap();
//! let image = image::open("label.png")
//!     .map_err(|e| niimbot::NiimbotError::Image(e.to_string()))?
//!     .to_luma8();
//!
//! let session = PrintSession::new(
//!     SerialTransport::new("/dev/ttyACM0"),
//!     d11,
//!     SessionConfig::default(),
//! );
//! let report = session.print(&image).await.into_result()?;
//! println!("{} rows sent", report.rows_sent);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Packet framing, commands, replies |
//! | [`printer`] | Device/label profiles and RFID detection |
//! | [`render`] | Binarization and row encoding |
//! | [`transport`] | Communication backends |
//! | [`session`] | Print job state machine |
//! | [`error`] | Error types |

pub mod error;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use error::NiimbotError;
pub use printer::{DeviceProfile, LabelProfile};
pub use session::{PrintSession, SessionConfig};
