//! `tokio_util` codec over [`packet`](super::packet) framing.
//!
//! Used directly on serial byte streams through `FramedRead`, and by the
//! session link to decode the BLE notification queue.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::packet::{self, Packet};
use crate::error::NiimbotError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = NiimbotError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, NiimbotError> {
        match packet::decode(&src[..])? {
            Some((pkt, used)) => {
                src.advance(used);
                Ok(Some(pkt))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, NiimbotError> {
        match self.decode(src)? {
            Some(pkt) => Ok(Some(pkt)),
            None if src.is_empty() => Ok(None),
            None => Err(NiimbotError::Transport(format!(
                "stream closed with {} byte(s) of an incomplete frame",
                src.len()
            ))),
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = NiimbotError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), NiimbotError> {
        let frame = packet::encode(item.command, &item.payload)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
