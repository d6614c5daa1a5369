//! # Bluetooth LE Transport
//!
//! NIIMBOT printers expose one GATT characteristic that takes writes and
//! sends notifications. Frames go out as writes; replies come back as
//! notifications, sometimes split across several of them.
//!
//! ## Platform Seam
//!
//! Scanning, pairing and the GATT calls themselves belong to the platform
//! (BlueZ, CoreBluetooth, WinRT, a mobile bridge). They are reached through
//! [`GattLink`]; this module adds the NIIMBOT specifics on top:
//!
//! - device filter (service UUID, optional name prefix)
//! - subscribe before the first write
//! - chunking to the negotiated MTU
//!
//! ## Chunked Writes
//!
//! A GATT write carries at most `MTU - 3` bytes (3 bytes of ATT header). A
//! bitmap row for a 384-dot head is 62 bytes on the wire, over the 20-byte
//! payload of the default 23-byte MTU, so frames are split transparently.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Inbound, Transport};
use crate::error::NiimbotError;

/// NIIMBOT print service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xe7810a71_73ae_499d_8c15_faa9aef0c3f2);

/// Write + notify characteristic of [`SERVICE_UUID`]
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xbef8d6c9_9c21_4c9e_b632_bd58c1009f9f);

/// ATT header bytes not available for payload
const ATT_OVERHEAD: usize = 3;

/// MTU every BLE link supports before negotiation
pub const DEFAULT_MTU: usize = 23;

/// Which peripheral to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattFilter {
    pub service: Uuid,
    /// Advertised name prefix, e.g. "D11" or "B1-"
    pub name_prefix: Option<String>,
}

impl Default for GattFilter {
    fn default() -> Self {
        Self {
            service: SERVICE_UUID,
            name_prefix: None,
        }
    }
}

impl GattFilter {
    pub fn with_name_prefix(prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: Some(prefix.into()),
            ..Default::default()
        }
    }

    /// Whether an advertised peripheral passes the filter.
    pub fn matches(&self, services: &[Uuid], name: Option<&str>) -> bool {
        let service_ok = services.contains(&self.service);
        let name_ok = match (&self.name_prefix, name) {
            (None, _) => true,
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        };
        service_ok && name_ok
    }
}

/// GATT operations provided by platform code.
#[async_trait]
pub trait GattLink: Send {
    /// Find and connect to a peripheral matching `filter`.
    async fn connect(&mut self, filter: &GattFilter) -> Result<(), NiimbotError>;

    /// Negotiated ATT MTU.
    fn mtu(&self) -> usize;

    /// Enable notifications; each notification value arrives as one item.
    async fn subscribe(&mut self, characteristic: Uuid)
    -> Result<mpsc::Receiver<Bytes>, NiimbotError>;

    /// Write without response.
    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<(), NiimbotError>;

    async fn disconnect(&mut self) -> Result<(), NiimbotError>;

    /// Peripheral name for logs, once connected.
    fn peer_name(&self) -> Option<&str> {
        None
    }
}

/// # BLE Printer Transport
///
/// ```no_run
/// # async fn demo(platform_link: impl niimbot::transport::GattLink) -> Result<(), niimbot::error::NiimbotError> {
/// use niimbot::transport::{BleTransport, GattFilter, Transport};
///
/// let mut transport = BleTransport::new(platform_link, GattFilter::with_name_prefix("D11"));
/// let inbound = transport.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct BleTransport<L: GattLink> {
    link: L,
    filter: GattFilter,
    characteristic: Uuid,
    connected: bool,
    name: String,
}

impl<L: GattLink> BleTransport<L> {
    pub fn new(link: L, filter: GattFilter) -> Self {
        let name = match &filter.name_prefix {
            Some(prefix) => format!("ble:{}*", prefix),
            None => "ble".to_string(),
        };
        Self {
            link,
            filter,
            characteristic: CHARACTERISTIC_UUID,
            connected: false,
            name,
        }
    }

    /// Use a different write/notify characteristic.
    pub fn with_characteristic(mut self, characteristic: Uuid) -> Self {
        self.characteristic = characteristic;
        self
    }

    /// Largest write the link accepts.
    pub fn chunk_size(&self) -> usize {
        self.link.mtu().max(DEFAULT_MTU) - ATT_OVERHEAD
    }

    /// The platform link, for inspection.
    pub fn link(&self) -> &L {
        &self.link
    }
}

#[async_trait]
impl<L: GattLink> Transport for BleTransport<L> {
    async fn connect(&mut self) -> Result<Inbound, NiimbotError> {
        tracing::debug!(service = %self.filter.service, prefix = ?self.filter.name_prefix, "ble connecting");
        self.link.connect(&self.filter).await?;
        self.connected = true;

        let inbound = match self.link.subscribe(self.characteristic).await {
            Ok(rx) => rx,
            Err(e) => {
                // Connected but useless; release the peripheral
                self.connected = false;
                if let Err(close) = self.link.disconnect().await {
                    tracing::warn!(error = %close, "disconnect after failed subscribe");
                }
                return Err(e);
            }
        };

        if let Some(peer) = self.link.peer_name() {
            self.name = format!("ble:{}", peer);
        }
        tracing::debug!(mtu = self.link.mtu(), transport = %self.name, "ble connected");
        Ok(inbound)
    }

    async fn disconnect(&mut self) -> Result<(), NiimbotError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.link.disconnect().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), NiimbotError> {
        if !self.connected {
            return Err(NiimbotError::Transport("BLE link is not connected".into()));
        }
        let chunk = self.chunk_size();
        for part in data.chunks(chunk) {
            self.link.write(self.characteristic, part).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
