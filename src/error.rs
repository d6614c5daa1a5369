//! # Error Types
//!
//! This module defines error types used throughout the niimbot library.
//!
//! | Type | Raised by |
//! |------|-----------|
//! | [`ProtocolError`] | Packet framing, reply parsing, device error replies |
//! | [`NiimbotError`] | Everything else: transport, session, image, config |
//!
//! Label detection failures are not errors in this sense; see
//! [`crate::printer::detect::DetectError`], which is returned as data.

use thiserror::Error;

/// Frame and reply level failures.
///
/// Any of these on a live connection means the byte stream can no longer be
/// trusted, so the session aborts instead of resynchronising.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The buffer does not start with `0x55 0x55`.
    #[error("Invalid header: {skipped} byte(s) before next header candidate")]
    InvalidHeader { skipped: usize },

    /// The two bytes after the checksum are not `0xAA 0xAA`.
    #[error("Invalid trailer: got {0:02X?}")]
    InvalidTrailer([u8; 2]),

    /// XOR checksum over command, length and payload did not match.
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Payload does not fit the one-byte length field.
    #[error("Payload too large: {0} bytes (max 255)")]
    PayloadTooLarge(usize),

    /// The printer answered with its generic error reply (0xDB).
    #[error("Device reported error for command {command:#04x}: {payload:02X?}")]
    DeviceError { command: u8, payload: Vec<u8> },

    /// The printer answered with reply code 0x00 (command not implemented).
    #[error("Command {0:#04x} is not supported by this device")]
    Unsupported(u8),

    /// A reply arrived with the right code but could not be parsed.
    #[error("Malformed reply {command:#04x}: {reason}")]
    MalformedReply { command: u8, reason: String },
}

/// Main error type for niimbot operations
#[derive(Debug, Error)]
pub enum NiimbotError {
    /// Framing or reply errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport-level errors (connect, write, disconnect)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A reply or the print status did not arrive in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The RFID query returned no tag
    #[error("No RFID tag found on the loaded label roll")]
    NoTag,

    /// The RFID dimensions did not match any known label profile
    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    /// Page size declared to the device disagrees with the encoded rows.
    ///
    /// This is an encoder bug, never a device condition.
    #[error(
        "Dimension mismatch: declared {declared_rows}x{declared_cols}, \
         encoded {encoded_rows} rows of {row_bytes} bytes"
    )]
    DimensionMismatch {
        declared_rows: u16,
        declared_cols: u16,
        encoded_rows: usize,
        row_bytes: usize,
    },

    /// The caller aborted the session
    #[error("Print job cancelled")]
    Cancelled,

    /// Image loading or encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Invalid configuration or parameter
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NiimbotError {
    /// Whether this error still lets a failed session close the job with
    /// end-print. The session only asks while polling for completion, where
    /// a timeout means the printer went quiet mid-job; after a transport
    /// fault or a cancel nothing more is sent.
    pub fn wants_end_print(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Short machine-readable kind, used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::NoTag => "no_tag",
            Self::UnknownLabel(_) => "unknown_label",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Cancelled => "cancelled",
            Self::Image(_) => "image",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_converts() {
        let err: NiimbotError = ProtocolError::Unsupported(0x1A).into();
        assert_eq!(err.kind(), "protocol");
        assert!(err.to_string().contains("0x1a"));
    }

    #[test]
    fn test_only_timeout_wants_end_print() {
        assert!(NiimbotError::Timeout("status".into()).wants_end_print());
        assert!(!NiimbotError::Transport("gone".into()).wants_end_print());
        assert!(!NiimbotError::Cancelled.wants_end_print());
        assert!(!NiimbotError::NoTag.wants_end_print());
    }
}
