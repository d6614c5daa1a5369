//! # NIIMBOT Packet Framing
//!
//! Every command and reply on the wire is wrapped in the same frame:
//!
//! ```text
//! ┌──────┬──────┬─────────┬────────┬───────────┬──────────┬──────┬──────┐
//! │ 0x55 │ 0x55 │ command │ length │ payload…  │ checksum │ 0xAA │ 0xAA │
//! └──────┴──────┴─────────┴────────┴───────────┴──────────┴──────┴──────┘
//!   header        1 byte    1 byte   length B    1 byte     trailer
//! ```
//!
//! The checksum is the XOR of the command byte, the length byte and every
//! payload byte.
//!
//! ## Length Field
//!
//! The length field is always one byte, so a payload is at most 255 bytes.
//! [`encode`] refuses larger payloads instead of switching to a wider field:
//! the printers read the frame literally, and a two-byte length would be
//! parsed as the first payload byte. The widest payload this crate produces
//! is a 576-dot bitmap row (72 + 6 bytes).
//!
//! ## Streaming Decode
//!
//! BLE notifications and serial reads hand over arbitrary fragments, so
//! [`decode`] distinguishes three outcomes:
//!
//! | Result | Meaning |
//! |--------|---------|
//! | `Ok(Some((packet, n)))` | A full frame; drop `n` bytes from the buffer |
//! | `Ok(None)` | Frame incomplete; wait for more bytes |
//! | `Err(_)` | The stream is emitting garbage |
//!
//! ```
//! use niimbot::protocol::packet::{self, Packet};
//!
//! let wire = packet::encode(0x21, &[3])?;
//! assert_eq!(wire, vec![0x55, 0x55, 0x21, 0x01, 0x03, 0x23, 0xAA, 0xAA]);
//!
//! // Half a frame is not an error, just not enough yet
//! assert_eq!(packet::decode(&wire[..4])?, None);
//!
//! let (pkt, used) = packet::decode(&wire)?.unwrap();
//! assert_eq!(pkt, Packet::new(0x21, vec![3]));
//! assert_eq!(used, wire.len());
//! # Ok::<(), niimbot::error::ProtocolError>(())
//! ```

use crate::error::ProtocolError;

/// Frame start marker
pub const HEADER: [u8; 2] = [0x55, 0x55];

/// Frame end marker
pub const TRAILER: [u8; 2] = [0xAA, 0xAA];

/// Largest payload the one-byte length field can describe
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Header (2) + command (1) + length (1) + checksum (1) + trailer (2)
pub const FRAME_OVERHEAD: usize = 7;

/// A single command or reply, without framing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(command: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self.command, &self.payload)
    }

    /// Total size on the wire.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }
}

/// XOR of command, length and payload bytes.
#[inline]
pub fn checksum(command: u8, length: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(command ^ length, |acc, b| acc ^ b)
}

/// Build a complete wire frame.
///
/// ## Errors
///
/// [`ProtocolError::PayloadTooLarge`] if `payload` exceeds 255 bytes.
pub fn encode(command: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }
    let length = payload.len() as u8;

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&HEADER);
    frame.push(command);
    frame.push(length);
    frame.extend_from_slice(payload);
    frame.push(checksum(command, length, payload));
    frame.extend_from_slice(&TRAILER);
    Ok(frame)
}

/// Try to decode one frame from the start of `buf`.
///
/// The header must sit at `buf[0]`. A buffer that starts with anything else
/// is rejected with [`ProtocolError::InvalidHeader`], whose `skipped` field
/// says how far away the next `0x55 0x55` candidate is (or the whole buffer
/// length if there is none).
///
/// A frame is only returned once every byte up to and including the trailer
/// has arrived and the trailer and checksum both verify.
pub fn decode(buf: &[u8]) -> Result<Option<(Packet, usize)>, ProtocolError> {
    // Partial header: only fine if what we have so far is a header prefix
    if buf.len() < HEADER.len() {
        return match buf.first() {
            None | Some(&0x55) => Ok(None),
            Some(_) => Err(ProtocolError::InvalidHeader { skipped: buf.len() }),
        };
    }

    if buf[..2] != HEADER {
        let skipped = buf
            .windows(2)
            .position(|w| w == HEADER)
            .unwrap_or(buf.len());
        return Err(ProtocolError::InvalidHeader {
            skipped: skipped.max(1),
        });
    }

    // command + length
    if buf.len() < 4 {
        return Ok(None);
    }
    let command = buf[2];
    let length = buf[3];
    let total = length as usize + FRAME_OVERHEAD;
    if buf.len() < total {
        return Ok(None);
    }

    let payload = &buf[4..4 + length as usize];
    let actual = buf[4 + length as usize];
    let trailer = [buf[total - 2], buf[total - 1]];

    if trailer != TRAILER {
        return Err(ProtocolError::InvalidTrailer(trailer));
    }

    let expected = checksum(command, length, payload);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }

    Ok(Some((Packet::new(command, payload), total)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        // set-label-type 1, as captured from a B21
        let wire = encode(0x23, &[0x01]).unwrap();
        assert_eq!(wire, vec![0x55, 0x55, 0x23, 0x01, 0x01, 0x23, 0xAA, 0xAA]);
    }

    #[test]
    fn test_encode_empty_payload() {
        let wire = encode(0xA3, &[]).unwrap();
        assert_eq!(wire, vec![0x55, 0x55, 0xA3, 0x00, 0xA3, 0xAA, 0xAA]);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; 256];
        assert_eq!(
            encode(0x85, &payload),
            Err(ProtocolError::PayloadTooLarge(256))
        );
        assert!(encode(0x85, &payload[..255]).is_ok());
    }

    #[test]
    fn test_decode_needs_more() {
        let wire = encode(0x40, &[0x08]).unwrap();
        for cut in 0..wire.len() {
            assert_eq!(decode(&wire[..cut]), Ok(None), "cut at {}", cut);
        }
    }

    #[test]
    fn test_decode_leaves_following_bytes() {
        let mut buf = encode(0x02, &[0x01]).unwrap();
        let first = buf.len();
        buf.extend(encode(0x04, &[0x01]).unwrap());

        let (pkt, used) = decode(&buf).unwrap().unwrap();
        assert_eq!(pkt.command, 0x02);
        assert_eq!(used, first);

        let (pkt, _) = decode(&buf[used..]).unwrap().unwrap();
        assert_eq!(pkt.command, 0x04);
    }

    #[test]
    fn test_decode_rejects_garbage_prefix() {
        let mut buf = vec![0x00, 0x13];
        buf.extend(encode(0x02, &[0x01]).unwrap());
        assert_eq!(
            decode(&buf),
            Err(ProtocolError::InvalidHeader { skipped: 2 })
        );
    }

    #[test]
    fn test_decode_rejects_single_garbage_byte() {
        assert_eq!(
            decode(&[0x42]),
            Err(ProtocolError::InvalidHeader { skipped: 1 })
        );
    }

    #[test]
    fn test_decode_rejects_bad_trailer() {
        let mut wire = encode(0x02, &[0x01]).unwrap();
        let last = wire.len() - 1;
        wire[last] = 0x00;
        assert_eq!(decode(&wire), Err(ProtocolError::InvalidTrailer([0xAA, 0x00])));
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut wire = encode(0x02, &[0x01]).unwrap();
        wire[5] ^= 0xFF;
        assert!(matches!(
            decode(&wire),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip(command: u8, payload in prop::collection::vec(any::<u8>(), 0..=255)) {
            let wire = encode(command, &payload).unwrap();
            let decoded = decode(&wire).unwrap();
            prop_assert_eq!(decoded, Some((Packet::new(command, payload), wire.len())));
        }

        #[test]
        fn prop_single_bit_flip_rejected(
            command: u8,
            payload in prop::collection::vec(any::<u8>(), 1..=64),
            pick: prop::sample::Index,
            bit in 0u8..8,
        ) {
            let mut wire = encode(command, &payload).unwrap();
            // payload bytes and the checksum byte
            let target = 4 + pick.index(payload.len() + 1);
            wire[target] ^= 1 << bit;
            prop_assert!(decode(&wire).is_err());
        }

        #[test]
        fn prop_split_anywhere(
            command: u8,
            payload in prop::collection::vec(any::<u8>(), 0..=100),
            split: prop::sample::Index,
        ) {
            let wire = encode(command, &payload).unwrap();
            let at = split.index(wire.len());

            // The head alone is never enough and never an error
            prop_assert_eq!(decode(&wire[..at]), Ok(None));

            let mut buf = wire[..at].to_vec();
            buf.extend_from_slice(&wire[at..]);
            prop_assert_eq!(decode(&buf), decode(&wire));
        }
    }
}
