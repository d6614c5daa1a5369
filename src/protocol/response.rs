//! # Reply Parsing
//!
//! Typed views over the printer's replies. Every parser takes the decoded
//! [`Packet`] and fails with [`ProtocolError::MalformedReply`] when the
//! payload is shorter than the layout requires.

use serde::Serialize;

use super::commands::{self, InfoKey};
use super::packet::Packet;
use crate::error::ProtocolError;

/// Map the two universal failure replies to errors.
///
/// `request` is the command that was sent, for the error message.
pub fn check(request: u8, reply: &Packet) -> Result<(), ProtocolError> {
    match reply.command {
        commands::REPLY_ERROR => Err(ProtocolError::DeviceError {
            command: request,
            payload: reply.payload.clone(),
        }),
        commands::REPLY_UNSUPPORTED => Err(ProtocolError::Unsupported(request)),
        _ => Ok(()),
    }
}

fn malformed(reply: &Packet, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedReply {
        command: reply.command,
        reason: reason.into(),
    }
}

/// Acknowledgement replies carry a single status byte; non-zero = accepted.
pub fn parse_ack(reply: &Packet) -> Result<bool, ProtocolError> {
    reply
        .payload
        .first()
        .map(|&b| b != 0)
        .ok_or_else(|| malformed(reply, "empty acknowledgement"))
}

// ============================================================================
// PRINT STATUS
// ============================================================================

/// Reply to [`commands::print_status`].
///
/// ```text
/// ┌────────┬────────┬───────┐
/// │ page   │ print% │ feed% │
/// │ u16 BE │ u8     │ u8    │
/// └────────┴────────┴───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrintStatus {
    pub page: u16,
    pub print_progress: u8,
    pub feed_progress: u8,
}

impl PrintStatus {
    pub fn parse(reply: &Packet) -> Result<Self, ProtocolError> {
        let p = &reply.payload;
        if p.len() < 4 {
            return Err(malformed(reply, format!("status needs 4 bytes, got {}", p.len())));
        }
        Ok(Self {
            page: u16::from_be_bytes([p[0], p[1]]),
            print_progress: p[2],
            feed_progress: p[3],
        })
    }

    /// Both the print head and the feed have finished the page.
    pub fn is_complete(&self) -> bool {
        self.print_progress >= 100 && self.feed_progress >= 100
    }
}

// ============================================================================
// DEVICE INFO
// ============================================================================

/// A decoded device property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    Number(u64),
    /// Firmware / hardware version, sent as `version * 100`
    Version(f32),
    /// Serial number, hex encoded
    Text(String),
}

impl std::fmt::Display for InfoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Version(v) => write!(f, "{:.2}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Parse the reply to `GET_INFO key`.
pub fn parse_info(key: InfoKey, reply: &Packet) -> Result<InfoValue, ProtocolError> {
    let p = &reply.payload;
    if p.is_empty() {
        return Err(malformed(reply, "empty info reply"));
    }

    match key {
        InfoKey::DeviceSerial => Ok(InfoValue::Text(
            p.iter().map(|b| format!("{:02x}", b)).collect(),
        )),
        InfoKey::SoftwareVersion | InfoKey::HardwareVersion => {
            Ok(InfoValue::Version(be_uint(p) as f32 / 100.0))
        }
        _ => Ok(InfoValue::Number(be_uint(p))),
    }
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

// ============================================================================
// RFID
// ============================================================================

/// Contents of a label roll's RFID tag.
///
/// ```text
/// ┌──────────┬─────┬─────────┬─────┬────────┬───────────┬──────────┬──────┐
/// │ uuid[8]  │ len │ barcode │ len │ serial │ total u16 │ used u16 │ type │
/// └──────────┴─────┴─────────┴─────┴────────┴───────────┴──────────┴──────┘
/// ```
///
/// A reply whose first byte is 0 means no tag was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RfidTag {
    pub uuid: String,
    pub barcode: String,
    pub serial: String,
    pub total_len: u16,
    pub used_len: u16,
    pub label_type: u8,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl RfidTag {
    /// Parse the reply to [`commands::get_rfid`]; `Ok(None)` when no tag.
    pub fn parse(reply: &Packet) -> Result<Option<Self>, ProtocolError> {
        let p = &reply.payload;
        match p.first() {
            None | Some(0) => return Ok(None),
            Some(_) => {}
        }

        let mut cursor = Cursor { buf: p, pos: 0 };
        let short = || malformed(reply, "truncated RFID reply");

        let uuid = cursor.take(8).ok_or_else(short)?;
        let barcode = cursor.take_prefixed().ok_or_else(short)?;
        let serial = cursor.take_prefixed().ok_or_else(short)?;
        let total = cursor.take(2).ok_or_else(short)?;
        let used = cursor.take(2).ok_or_else(short)?;
        let label_type = cursor.take(1).ok_or_else(short)?[0];

        Ok(Some(Self {
            uuid: uuid.iter().map(|b| format!("{:02x}", b)).collect(),
            barcode: String::from_utf8_lossy(barcode).into_owned(),
            serial: String::from_utf8_lossy(serial).into_owned(),
            total_len: u16::from_be_bytes([total[0], total[1]]),
            used_len: u16::from_be_bytes([used[0], used[1]]),
            label_type,
            raw: p.clone(),
        }))
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let out = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(out)
    }

    fn take_prefixed(&mut self) -> Option<&'a [u8]> {
        let len = self.take(1)?[0] as usize;
        self.take(len)
    }
}

// ============================================================================
// HEARTBEAT
// ============================================================================

/// Reply to [`commands::heartbeat`]. Field positions depend on the reply
/// length, which varies by model family; values are the raw state bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub closing_state: Option<u8>,
    pub power_level: Option<u8>,
    pub paper_state: Option<u8>,
    pub rfid_read_state: Option<u8>,
}

impl Heartbeat {
    pub fn parse(reply: &Packet) -> Result<Self, ProtocolError> {
        let p = &reply.payload;
        let at = |i: usize| Some(p[i]);
        let hb = match p.len() {
            20 => Self {
                paper_state: at(18),
                rfid_read_state: at(19),
                ..Default::default()
            },
            19 => Self {
                closing_state: at(15),
                power_level: at(16),
                paper_state: at(17),
                rfid_read_state: at(18),
            },
            13 => Self {
                closing_state: at(9),
                power_level: at(10),
                paper_state: at(11),
                rfid_read_state: at(12),
            },
            10 => Self {
                closing_state: at(8),
                power_level: at(9),
                ..Default::default()
            },
            9 => Self {
                closing_state: at(8),
                ..Default::default()
            },
            n => return Err(malformed(reply, format!("unexpected heartbeat length {}", n))),
        };
        Ok(hb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_check_maps_error_replies() {
        let err = check(0x21, &Packet::new(0xDB, vec![0x06])).unwrap_err();
        assert!(matches!(err, ProtocolError::DeviceError { command: 0x21, .. }));

        let err = check(0xC1, &Packet::new(0x00, vec![])).unwrap_err();
        assert_eq!(err, ProtocolError::Unsupported(0xC1));

        assert!(check(0x01, &Packet::new(0x02, vec![1])).is_ok());
    }

    #[test]
    fn test_parse_ack() {
        assert_eq!(parse_ack(&Packet::new(0x02, vec![1])), Ok(true));
        assert_eq!(parse_ack(&Packet::new(0x02, vec![0])), Ok(false));
        assert!(parse_ack(&Packet::new(0x02, vec![])).is_err());
    }

    #[test]
    fn test_print_status() {
        let status = PrintStatus::parse(&Packet::new(0xB3, vec![0, 1, 100, 60])).unwrap();
        assert_eq!(status.page, 1);
        assert!(!status.is_complete());

        let status = PrintStatus::parse(&Packet::new(0xB3, vec![0, 1, 100, 100, 0, 0])).unwrap();
        assert!(status.is_complete());

        assert!(PrintStatus::parse(&Packet::new(0xB3, vec![0, 1])).is_err());
    }

    #[test]
    fn test_parse_info_values() {
        let v = parse_info(InfoKey::SoftwareVersion, &Packet::new(0x49, vec![0x01, 0x0E])).unwrap();
        assert_eq!(v, InfoValue::Version(2.7));

        let v = parse_info(InfoKey::DeviceType, &Packet::new(0x48, vec![0x02, 0x00])).unwrap();
        assert_eq!(v, InfoValue::Number(512));

        let v = parse_info(InfoKey::DeviceSerial, &Packet::new(0x4B, vec![0xAB, 0x01])).unwrap();
        assert_eq!(v.to_string(), "ab01");
    }

    #[test]
    fn test_rfid_no_tag() {
        assert_eq!(RfidTag::parse(&Packet::new(0x1B, vec![0x00])), Ok(None));
    }

    #[test]
    fn test_rfid_tag() {
        let mut payload = vec![0x88, 1, 2, 3, 4, 5, 6, 7];
        payload.push(4);
        payload.extend(b"1234");
        payload.push(2);
        payload.extend(b"SN");
        payload.extend([0x00, 0xB4, 0x00, 0x10, 0x01]);

        let tag = RfidTag::parse(&Packet::new(0x1B, payload)).unwrap().unwrap();
        assert_eq!(tag.uuid, "8801020304050607");
        assert_eq!(tag.barcode, "1234");
        assert_eq!(tag.serial, "SN");
        assert_eq!(tag.total_len, 180);
        assert_eq!(tag.used_len, 16);
        assert_eq!(tag.label_type, 1);
    }

    #[test]
    fn test_rfid_truncated() {
        let payload = vec![0x88, 1, 2, 3, 4, 5, 6, 7, 9, b'1'];
        assert!(RfidTag::parse(&Packet::new(0x1B, payload)).is_err());
    }

    #[test]
    fn test_heartbeat_13_bytes() {
        let mut payload = vec![0u8; 13];
        payload[10] = 4;
        payload[12] = 1;
        let hb = Heartbeat::parse(&Packet::new(0xDD, payload)).unwrap();
        assert_eq!(hb.closing_state, Some(0));
        assert_eq!(hb.power_level, Some(4));
        assert_eq!(hb.paper_state, Some(0));
        assert_eq!(hb.rfid_read_state, Some(1));
    }

    #[test]
    fn test_heartbeat_unknown_length() {
        assert!(Heartbeat::parse(&Packet::new(0xDD, vec![0; 4])).is_err());
    }
}
