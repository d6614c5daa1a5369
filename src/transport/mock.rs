//! # Mock Transport
//!
//! An in-memory printer. Every frame written to it is decoded, recorded and
//! handed to a responder closure, whose answer is queued on the inbound
//! side exactly as a real link would deliver it.
//!
//! [`printer_reply`] answers like a healthy printer with no RFID roll; wrap it
//! to script faults:
//!
//! ```
//! use niimbot::protocol::commands;
//! use niimbot::transport::mock::{self, MockReply, MockTransport};
//!
//! let transport = MockTransport::new(|req| match req.command {
//!     commands::PRINT_STATUS => MockReply::Silent,
//!     _ => mock::printer_reply(req),
//! });
//! let handle = transport.handle();
//! assert_eq!(handle.disconnects(), 0);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use super::{INBOUND_CAPACITY, Inbound, Transport};
use crate::error::NiimbotError;
use crate::protocol::commands::{self, InfoKey};
use crate::protocol::packet::{self, Packet};

/// What the mock does with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Queue these packets on the inbound side
    Packets(Vec<Packet>),
    /// Say nothing
    Silent,
    /// Fail the write with a transport error
    Fault(String),
}

impl MockReply {
    pub fn one(packet: Packet) -> Self {
        Self::Packets(vec![packet])
    }
}

type Responder = Box<dyn FnMut(&Packet) -> MockReply + Send>;

#[derive(Debug, Default)]
struct MockState {
    writes: Vec<Packet>,
    connects: usize,
    disconnects: usize,
}

/// Shared view of a [`MockTransport`], still readable after the transport
/// itself has been moved into a session.
#[derive(Debug, Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panic inside the responder poisons the lock; the state is still valid
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every packet written, in order.
    pub fn writes(&self) -> Vec<Packet> {
        self.lock().writes.clone()
    }

    /// Command bytes of every packet written, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.lock().writes.iter().map(|p| p.command).collect()
    }

    /// Number of writes carrying `command`.
    pub fn count(&self, command: u8) -> usize {
        self.lock()
            .writes
            .iter()
            .filter(|p| p.command == command)
            .count()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }
}

pub struct MockTransport {
    responder: Responder,
    handle: MockHandle,
    inbound: Option<mpsc::Sender<Bytes>>,
    pending: BytesMut,
    fragment: bool,
    connect_error: Option<String>,
}

impl MockTransport {
    pub fn new(responder: impl FnMut(&Packet) -> MockReply + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            handle: MockHandle::default(),
            inbound: None,
            pending: BytesMut::new(),
            fragment: false,
            connect_error: None,
        }
    }

    /// A healthy printer, see [`printer_reply`].
    pub fn printer() -> Self {
        Self::new(printer_reply)
    }

    /// Deliver every reply in two chunks, split mid-frame.
    pub fn fragmented(mut self) -> Self {
        self.fragment = true;
        self
    }

    /// Make `connect` fail.
    pub fn refuse_connect(mut self, reason: impl Into<String>) -> Self {
        self.connect_error = Some(reason.into());
        self
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }

    fn deliver(&self, reply: &Packet) -> Result<(), NiimbotError> {
        let tx = self
            .inbound
            .as_ref()
            .ok_or_else(|| NiimbotError::Transport("mock is not connected".into()))?;
        let frame = Bytes::from(reply.to_bytes()?);

        let chunks = if self.fragment && frame.len() > 1 {
            let mid = frame.len() / 2;
            vec![frame.slice(..mid), frame.slice(mid..)]
        } else {
            vec![frame]
        };
        for chunk in chunks {
            tx.try_send(chunk)
                .map_err(|e| NiimbotError::Transport(format!("mock inbound queue: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<Inbound, NiimbotError> {
        self.handle.lock().connects += 1;
        if let Some(reason) = &self.connect_error {
            return Err(NiimbotError::Transport(reason.clone()));
        }
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        self.inbound = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<(), NiimbotError> {
        self.handle.lock().disconnects += 1;
        self.inbound = None;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), NiimbotError> {
        if self.inbound.is_none() {
            return Err(NiimbotError::Transport("mock is not connected".into()));
        }
        self.pending.extend_from_slice(data);

        while let Some((request, used)) = packet::decode(&self.pending)? {
            let _ = self.pending.split_to(used);
            self.handle.lock().writes.push(request.clone());

            match (self.responder)(&request) {
                MockReply::Packets(replies) => {
                    for reply in &replies {
                        self.deliver(reply)?;
                    }
                }
                MockReply::Silent => {}
                MockReply::Fault(reason) => return Err(NiimbotError::Transport(reason)),
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Answer `request` the way a B1 with no RFID roll loaded does.
///
/// Print status reports the page finished on the first poll.
pub fn printer_reply(request: &Packet) -> MockReply {
    let Some(code) = commands::reply_code(request) else {
        return MockReply::Silent;
    };

    let payload = match request.command {
        commands::GET_INFO => info_payload(request.payload.first().copied().unwrap_or(0)),
        commands::GET_RFID => vec![0x00],
        commands::PRINT_STATUS => vec![0x00, 0x01, 100, 100],
        commands::HEARTBEAT => vec![0x00; 13],
        commands::CONNECT
        | commands::SET_DENSITY
        | commands::SET_LABEL_TYPE
        | commands::START_PRINT
        | commands::START_PAGE
        | commands::SET_PAGE_SIZE
        | commands::SET_QUANTITY
        | commands::END_PAGE
        | commands::END_PRINT => vec![0x01],
        _ => return MockReply::one(Packet::new(commands::REPLY_UNSUPPORTED, vec![0x00])),
    };
    MockReply::one(Packet::new(code, payload))
}

fn info_payload(key: u8) -> Vec<u8> {
    match key {
        k if k == InfoKey::DeviceType as u8 => vec![0x10, 0x00],
        k if k == InfoKey::SoftwareVersion as u8 => vec![0x01, 0x0E],
        k if k == InfoKey::HardwareVersion as u8 => vec![0x00, 0xD2],
        k if k == InfoKey::DeviceSerial as u8 => vec![0xC3, 0x10, 0x22, 0x07],
        k if k == InfoKey::Battery as u8 => vec![0x04],
        _ => vec![0x01],
    }
}
