//! # Request/Reply Link
//!
//! Sits between a [`Transport`] and the session: frames outgoing packets,
//! reassembles inbound bytes into packets and hands each reply to the
//! request waiting for it.
//!
//! ## Correlation
//!
//! ```text
//! request(set_density) ──► pending[0x31] = oneshot
//!                           │
//! inbound bytes ──► BytesMut ──► PacketCodec ──► route(packet)
//!                                                  │
//!                  pending.remove(packet.command) ◄┘
//! ```
//!
//! Error replies (`0xDB`) and "unsupported" replies (`0x00`) carry no
//! request code; they go to the request in flight. Anything nobody waits
//! for is logged and dropped.
//!
//! Timeouts are measured on the session [`Clock`], not the wall clock.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::codec::Decoder;

use super::clock::Clock;
use crate::error::{NiimbotError, ProtocolError};
use crate::protocol::commands::{self, InfoKey};
use crate::protocol::response::{self, Heartbeat, InfoValue, PrintStatus, RfidTag};
use crate::protocol::{Packet, PacketCodec};
use crate::transport::{Inbound, Transport};

pub struct Link<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    inbound: Option<Inbound>,
    buf: BytesMut,
    codec: PacketCodec,
    pending: HashMap<u8, oneshot::Sender<Packet>>,
    request_timeout: Duration,
}

impl<T: Transport, C: Clock> Link<T, C> {
    pub fn new(transport: T, clock: C, request_timeout: Duration) -> Self {
        Self {
            transport,
            clock,
            inbound: None,
            buf: BytesMut::new(),
            codec: PacketCodec,
            pending: HashMap::new(),
            request_timeout,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn name(&self) -> &str {
        self.transport.name()
    }

    pub fn is_connected(&self) -> bool {
        self.inbound.is_some()
    }

    pub async fn connect(&mut self) -> Result<(), NiimbotError> {
        let inbound = self.transport.connect().await?;
        self.inbound = Some(inbound);
        self.buf.clear();
        tracing::debug!(transport = self.transport.name(), "link up");
        Ok(())
    }

    /// Close the transport and forget outstanding requests.
    pub async fn disconnect(&mut self) -> Result<(), NiimbotError> {
        self.inbound = None;
        self.pending.clear();
        self.buf.clear();
        self.transport.disconnect().await
    }

    /// Write a packet without waiting for anything.
    pub async fn send(&mut self, packet: &Packet) -> Result<(), NiimbotError> {
        let frame = packet.to_bytes()?;
        tracing::trace!(
            command = commands::name(packet.command),
            len = packet.payload.len(),
            "send"
        );
        self.transport.write(&frame).await
    }

    /// Send `packet` and wait for its reply, with the link's request timeout.
    pub async fn request(&mut self, packet: &Packet) -> Result<Packet, NiimbotError> {
        let timeout = self.request_timeout;
        self.request_within(packet, timeout).await
    }

    /// Send `packet` and wait up to `timeout` for its reply.
    ///
    /// Device error and unsupported replies come back as
    /// [`NiimbotError::Protocol`].
    pub async fn request_within(
        &mut self,
        packet: &Packet,
        timeout: Duration,
    ) -> Result<Packet, NiimbotError> {
        let name = commands::name(packet.command);
        let code = commands::reply_code(packet).ok_or_else(|| {
            NiimbotError::Config(format!("{} does not get a reply; use send()", name))
        })?;
        if self.inbound.is_none() {
            return Err(NiimbotError::Transport("link is not connected".into()));
        }

        let (tx, mut rx) = oneshot::channel();
        if self.pending.insert(code, tx).is_some() {
            tracing::warn!(reply = code, "replacing a stale pending request");
        }
        if let Err(e) = self.send(packet).await {
            self.pending.remove(&code);
            return Err(e);
        }

        let deadline = self.clock.now() + timeout;
        loop {
            match rx.try_recv() {
                Ok(reply) => {
                    tracing::debug!(
                        command = name,
                        reply = reply.command,
                        payload = ?reply.payload,
                        "reply"
                    );
                    response::check(packet.command, &reply)?;
                    return Ok(reply);
                }
                Err(TryRecvError::Closed) => {
                    return Err(NiimbotError::Transport(format!(
                        "request {} abandoned",
                        name
                    )));
                }
                Err(TryRecvError::Empty) => {}
            }

            let remaining = deadline.saturating_sub(self.clock.now());
            if remaining.is_zero() {
                self.pending.remove(&code);
                return Err(NiimbotError::Timeout(format!(
                    "no reply to {} within {} ms",
                    name,
                    timeout.as_millis()
                )));
            }

            let chunk = {
                let Some(inbound) = self.inbound.as_mut() else {
                    return Err(NiimbotError::Transport("link is not connected".into()));
                };
                let clock = &self.clock;
                tokio::select! {
                    biased;
                    chunk = inbound.recv() => Some(chunk),
                    _ = clock.sleep(remaining) => None,
                }
            };

            match chunk {
                Some(Some(bytes)) => {
                    self.buf.extend_from_slice(&bytes);
                    self.dispatch();
                }
                Some(None) => {
                    self.pending.remove(&code);
                    self.inbound = None;
                    return Err(NiimbotError::Transport(format!(
                        "link closed while waiting for {}",
                        name
                    )));
                }
                None => {}
            }
        }
    }

    /// Decode every complete frame in the buffer and route it.
    fn dispatch(&mut self) {
        loop {
            match self.codec.decode(&mut self.buf) {
                Ok(Some(packet)) => self.route(packet),
                Ok(None) => break,
                Err(NiimbotError::Protocol(ProtocolError::InvalidHeader { skipped })) => {
                    tracing::warn!(skipped, "discarding bytes before frame header");
                    let n = skipped.min(self.buf.len());
                    self.buf.advance(n);
                }
                Err(e) => {
                    // Drop this frame's header and resync on the next one
                    tracing::warn!(error = %e, "discarding corrupt frame");
                    let n = 1.min(self.buf.len());
                    self.buf.advance(n);
                }
            }
        }
    }

    fn route(&mut self, packet: Packet) {
        if let Some(tx) = self.pending.remove(&packet.command) {
            let _ = tx.send(packet);
            return;
        }

        let generic = matches!(
            packet.command,
            commands::REPLY_ERROR | commands::REPLY_UNSUPPORTED
        );
        if generic && self.pending.len() == 1 {
            let code = self.pending.keys().next().copied();
            if let Some(tx) = code.and_then(|c| self.pending.remove(&c)) {
                let _ = tx.send(packet);
                return;
            }
        }

        tracing::warn!(
            command = packet.command,
            payload = ?packet.payload,
            "unsolicited packet dropped"
        );
    }

    // ------------------------------------------------------------------------
    // Typed requests
    // ------------------------------------------------------------------------

    /// Connect handshake. Firmware that does not know the command is fine.
    pub async fn handshake(&mut self) -> Result<(), NiimbotError> {
        match self.request(&commands::connect()).await {
            Ok(_) => Ok(()),
            Err(NiimbotError::Protocol(ProtocolError::Unsupported(_))) => {
                tracing::debug!("connect command not supported, continuing");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Send a command whose reply is a one-byte acknowledgement.
    pub async fn acknowledge(&mut self, packet: &Packet) -> Result<bool, NiimbotError> {
        let reply = self.request(packet).await?;
        Ok(response::parse_ack(&reply)?)
    }

    /// Query device properties. Keys the device rejects are left out.
    pub async fn device_info(
        &mut self,
        keys: &[InfoKey],
    ) -> Result<Vec<(InfoKey, InfoValue)>, NiimbotError> {
        let mut info = Vec::with_capacity(keys.len());
        for &key in keys {
            match self.request(&commands::get_info(key)).await {
                Ok(reply) => info.push((key, response::parse_info(key, &reply)?)),
                Err(NiimbotError::Protocol(
                    e @ (ProtocolError::Unsupported(_) | ProtocolError::DeviceError { .. }),
                )) => {
                    tracing::debug!(?key, error = %e, "info key rejected");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(info)
    }

    /// Read the roll's RFID tag; `None` when no tag is present.
    pub async fn read_rfid(&mut self) -> Result<Option<RfidTag>, NiimbotError> {
        let reply = self.request(&commands::get_rfid()).await?;
        Ok(RfidTag::parse(&reply)?)
    }

    pub async fn heartbeat(&mut self) -> Result<Heartbeat, NiimbotError> {
        let reply = self.request(&commands::heartbeat()).await?;
        Ok(Heartbeat::parse(&reply)?)
    }

    pub async fn print_status(&mut self) -> Result<PrintStatus, NiimbotError> {
        let reply = self.request(&commands::print_status()).await?;
        Ok(PrintStatus::parse(&reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;
    use crate::transport::mock::{self, MockReply, MockTransport};
    use pretty_assertions::assert_eq;

    fn link(mock: MockTransport) -> Link<MockTransport, ManualClock> {
        Link::new(mock, ManualClock::new(), Duration::from_millis(2000))
    }

    #[tokio::test]
    async fn test_request_gets_matching_reply() {
        let mut link = link(MockTransport::printer().fragmented());
        link.connect().await.unwrap();
        let status = link.print_status().await.unwrap();
        assert!(status.is_complete());
        assert_eq!(status.page, 1);
    }

    #[tokio::test]
    async fn test_timeout_on_silence() {
        let mut link = link(MockTransport::new(|_| MockReply::Silent));
        link.connect().await.unwrap();
        let err = link.request(&commands::print_status()).await.unwrap_err();
        assert!(matches!(err, NiimbotError::Timeout(_)));
        assert_eq!(link.clock().now(), Duration::from_millis(2000));
        assert!(link.pending.is_empty());
    }

    #[tokio::test]
    async fn test_unsolicited_packets_dropped() {
        let mut link = link(MockTransport::new(|req| {
            let mut replies = vec![Packet::new(0x99, vec![1, 2])];
            if let MockReply::Packets(p) = mock::printer_reply(req) {
                replies.extend(p);
            }
            MockReply::Packets(replies)
        }));
        link.connect().await.unwrap();
        assert!(link.acknowledge(&commands::set_density(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_before_reply_is_skipped() {
        let mut link = link(MockTransport::printer());
        link.connect().await.unwrap();
        link.buf.extend_from_slice(&[0x00, 0xAA, 0x13]);
        let reply = link.request(&commands::start_page()).await.unwrap();
        assert_eq!(reply.command, 0x04);
    }

    #[tokio::test]
    async fn test_error_reply_goes_to_request_in_flight() {
        let mut link = link(MockTransport::new(|_| {
            MockReply::one(Packet::new(commands::REPLY_ERROR, vec![0x05]))
        }));
        link.connect().await.unwrap();
        let err = link.request(&commands::start_print()).await.unwrap_err();
        assert!(matches!(
            err,
            NiimbotError::Protocol(ProtocolError::DeviceError { command: 0x01, .. })
        ));
    }

    #[tokio::test]
    async fn test_handshake_tolerates_unsupported() {
        let mut link = link(MockTransport::new(|_| {
            MockReply::one(Packet::new(commands::REPLY_UNSUPPORTED, vec![0x00]))
        }));
        link.connect().await.unwrap();
        link.handshake().await.unwrap();
    }

    #[tokio::test]
    async fn test_device_info_skips_rejected_keys() {
        let mut link = link(MockTransport::new(|req| match req.payload.first() {
            Some(&k) if k == InfoKey::Battery as u8 => {
                MockReply::one(Packet::new(commands::REPLY_UNSUPPORTED, vec![]))
            }
            _ => mock::printer_reply(req),
        }));
        link.connect().await.unwrap();
        let info = link
            .device_info(&[InfoKey::DeviceType, InfoKey::Battery, InfoKey::SoftwareVersion])
            .await
            .unwrap();
        let keys: Vec<InfoKey> = info.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![InfoKey::DeviceType, InfoKey::SoftwareVersion]);
        assert_eq!(info[1].1, InfoValue::Version(2.70));
    }

    #[tokio::test]
    async fn test_rows_cannot_be_requested() {
        let mut link = link(MockTransport::printer());
        link.connect().await.unwrap();
        assert!(matches!(
            link.request(&commands::empty_row(0)).await,
            Err(NiimbotError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_request_before_connect() {
        let mut link = link(MockTransport::printer());
        assert!(matches!(
            link.print_status().await,
            Err(NiimbotError::Transport(_))
        ));
    }
}
