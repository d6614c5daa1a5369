//! # Printer Transport Layer
//!
//! Byte pipes between the session and a printer. A transport knows nothing
//! about packets: it writes frames out and hands inbound bytes over as they
//! arrive, in whatever chunks the link delivers them.
//!
//! ## Available Transports
//!
//! - [`ble`]: Bluetooth LE GATT, over a platform-provided [`ble::GattLink`]
//! - [`serial`]: USB/UART serial port at 115200 baud
//! - [`mock`]: In-memory printer for tests and dry runs
//!
//! ## Lifecycle
//!
//! ```text
//! connect() ──► Inbound ──► write() … write() ──► disconnect()
//! ```
//!
//! A session calls `connect` once and `disconnect` once. Writes are
//! sequential; pacing between rows is the session's job.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::NiimbotError;

pub mod ble;
pub mod mock;
pub mod serial;

pub use ble::{BleTransport, GattFilter, GattLink};
pub use mock::{MockHandle, MockTransport};
pub use serial::SerialTransport;

/// Queue of raw inbound bytes, as the link delivered them.
pub type Inbound = mpsc::Receiver<Bytes>;

/// Capacity of the inbound queue handed out by [`Transport::connect`].
pub const INBOUND_CAPACITY: usize = 64;

#[async_trait]
pub trait Transport: Send {
    /// Open the link and start receiving.
    async fn connect(&mut self) -> Result<Inbound, NiimbotError>;

    /// Close the link. Safe to call on a transport that never connected.
    async fn disconnect(&mut self) -> Result<(), NiimbotError>;

    /// Write one encoded frame.
    async fn write(&mut self, data: &[u8]) -> Result<(), NiimbotError>;

    /// Short description for logs ("serial:/dev/ttyACM0", "ble:D11-…").
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn connect(&mut self) -> Result<Inbound, NiimbotError> {
        (**self).connect().await
    }

    async fn disconnect(&mut self) -> Result<(), NiimbotError> {
        (**self).disconnect().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), NiimbotError> {
        (**self).write(data).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
