//! # NIIMBOT Commands
//!
//! This module implements builders for the NIIMBOT command set used by the
//! B- and D-series label printers (B1, B18, B21, D11, D110, …).
//!
//! ## Protocol Overview
//!
//! Every command is a [`Packet`]: a one-byte command code and a short
//! payload. Most commands are answered by the printer with a reply whose
//! code is derived from the request:
//!
//! | Request | Reply | Offset |
//! |---------|-------|--------|
//! | most commands | request + 1 | 1 |
//! | set-density (0x21), set-label-type (0x23), print-status (0xA3) | request + 0x10 | 16 |
//! | get-info (0x40) | 0x40 + info key | key |
//! | bitmap-row (0x85), empty-row (0x84) | none | fire and forget |
//!
//! Two reply codes are special for every request:
//!
//! - `0xDB`: the printer rejected the command
//! - `0x00`: the printer does not implement the command
//!
//! ## Byte Order
//!
//! Multi-byte integers are **big-endian**:
//! - `u16` value 0x0130 is sent as bytes `[0x01, 0x30]`
//!
//! ## Print Job Sequence
//!
//! ```text
//! set_density → set_label_type → start_print → start_page
//!     → set_page_size → set_quantity → rows… → end_page
//!     → print_status (poll) → end_print
//! ```
//!
//! The firmware is stateful: out-of-order commands are rejected or hang the
//! printer until it is power cycled.

use super::packet::Packet;

// ============================================================================
// COMMAND CODES
// ============================================================================

/// Start a print job
pub const START_PRINT: u8 = 0x01;

/// Start a page within a print job
pub const START_PAGE: u8 = 0x03;

/// Declare the page size (rows, columns) before streaming rows
pub const SET_PAGE_SIZE: u8 = 0x13;

/// Number of copies of the page
pub const SET_QUANTITY: u8 = 0x15;

/// Read the RFID tag of the loaded label roll
pub const GET_RFID: u8 = 0x1A;

/// Print darkness
pub const SET_DENSITY: u8 = 0x21;

/// Label media type (gap, black mark, continuous)
pub const SET_LABEL_TYPE: u8 = 0x23;

/// Query one device property, selected by an [`InfoKey`]
pub const GET_INFO: u8 = 0x40;

/// Run of blank rows
pub const EMPTY_ROW: u8 = 0x84;

/// One row of bitmap data
pub const BITMAP_ROW: u8 = 0x85;

/// Print progress of the current page
pub const PRINT_STATUS: u8 = 0xA3;

/// Open a session with the printer
pub const CONNECT: u8 = 0xC1;

/// Keep-alive, also reports lid/paper/RFID state
pub const HEARTBEAT: u8 = 0xDC;

/// Finish a page
pub const END_PAGE: u8 = 0xE3;

/// Finish a print job
pub const END_PRINT: u8 = 0xF3;

/// Reply code the printer uses to reject a command
pub const REPLY_ERROR: u8 = 0xDB;

/// Reply code for commands the printer does not implement
pub const REPLY_UNSUPPORTED: u8 = 0x00;

// ============================================================================
// INFO KEYS
// ============================================================================

/// # Device Property Selector (GET_INFO payload)
///
/// The reply to `GET_INFO key` arrives with code `0x40 + key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InfoKey {
    Density = 1,
    PrintSpeed = 2,
    LabelType = 3,
    LanguageType = 6,
    AutoShutdownTime = 7,
    DeviceType = 8,
    SoftwareVersion = 9,
    Battery = 10,
    DeviceSerial = 11,
    HardwareVersion = 12,
}

impl InfoKey {
    pub const ALL: [InfoKey; 10] = [
        Self::Density,
        Self::PrintSpeed,
        Self::LabelType,
        Self::LanguageType,
        Self::AutoShutdownTime,
        Self::DeviceType,
        Self::SoftwareVersion,
        Self::Battery,
        Self::DeviceSerial,
        Self::HardwareVersion,
    ];
}

// ============================================================================
// REPLY CORRELATION
// ============================================================================

/// Reply code the printer answers `request` with.
///
/// Returns `None` for fire-and-forget commands (bitmap and empty rows).
///
/// ## Example
///
/// ```
/// use niimbot::protocol::commands::{self, InfoKey};
///
/// assert_eq!(commands::reply_code(&commands::start_print()), Some(0x02));
/// assert_eq!(commands::reply_code(&commands::set_density(3)), Some(0x31));
/// assert_eq!(commands::reply_code(&commands::get_info(InfoKey::DeviceType)), Some(0x48));
/// ```
pub fn reply_code(request: &Packet) -> Option<u8> {
    match request.command {
        BITMAP_ROW | EMPTY_ROW => None,
        SET_DENSITY | SET_LABEL_TYPE | PRINT_STATUS => Some(request.command + 0x10),
        GET_INFO => {
            let key = request.payload.first().copied().unwrap_or(0);
            Some(GET_INFO.wrapping_add(key))
        }
        cmd => Some(cmd.wrapping_add(1)),
    }
}

/// Human-readable command name for logs.
pub fn name(command: u8) -> &'static str {
    match command {
        START_PRINT => "start_print",
        START_PAGE => "start_page",
        SET_PAGE_SIZE => "set_page_size",
        SET_QUANTITY => "set_quantity",
        GET_RFID => "get_rfid",
        SET_DENSITY => "set_density",
        SET_LABEL_TYPE => "set_label_type",
        GET_INFO => "get_info",
        EMPTY_ROW => "empty_row",
        BITMAP_ROW => "bitmap_row",
        PRINT_STATUS => "print_status",
        CONNECT => "connect",
        HEARTBEAT => "heartbeat",
        END_PAGE => "end_page",
        END_PRINT => "end_print",
        _ => "unknown",
    }
}

// ============================================================================
// SESSION COMMANDS
// ============================================================================

/// # Connect (0xC1 01)
///
/// First command after the link comes up. Older D-series firmware does not
/// implement it and answers `0x00`; that is not fatal.
pub fn connect() -> Packet {
    Packet::new(CONNECT, vec![0x01])
}

/// # Heartbeat (0xDC 01)
pub fn heartbeat() -> Packet {
    Packet::new(HEARTBEAT, vec![0x01])
}

/// # Get Device Info (0x40 key)
pub fn get_info(key: InfoKey) -> Packet {
    Packet::new(GET_INFO, vec![key as u8])
}

/// # Get RFID (0x1A 01)
pub fn get_rfid() -> Packet {
    Packet::new(GET_RFID, vec![0x01])
}

// ============================================================================
// JOB CONFIGURATION
// ============================================================================

/// # Set Print Density (0x21 n)
///
/// ## Parameters
///
/// - `density`: darkness level. Callers clamp to the model's range first
///   (see [`DeviceProfile::clamp_density`](crate::printer::DeviceProfile::clamp_density)).
pub fn set_density(density: u8) -> Packet {
    Packet::new(SET_DENSITY, vec![density])
}

/// # Set Label Type (0x23 n)
///
/// | n | Media |
/// |---|-------|
/// | 1 | Gap (die-cut labels) |
/// | 2 | Black mark |
/// | 3 | Continuous |
pub fn set_label_type(label_type: u8) -> Packet {
    Packet::new(SET_LABEL_TYPE, vec![label_type])
}

/// # Start Print (0x01 01)
pub fn start_print() -> Packet {
    Packet::new(START_PRINT, vec![0x01])
}

/// # Start Page (0x03 01)
pub fn start_page() -> Packet {
    Packet::new(START_PAGE, vec![0x01])
}

/// # Set Page Size (0x13 rH rL cH cL)
///
/// Declares how many rows will follow and how many dots each row spans.
/// Both values must match the row stream exactly; a short declaration
/// truncates the print and a long one leaves the printer waiting.
///
/// ```
/// use niimbot::protocol::commands;
///
/// let pkt = commands::set_page_size(240, 96);
/// assert_eq!(pkt.payload, vec![0x00, 0xF0, 0x00, 0x60]);
/// ```
pub fn set_page_size(rows: u16, cols: u16) -> Packet {
    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&rows.to_be_bytes());
    payload.extend_from_slice(&cols.to_be_bytes());
    Packet::new(SET_PAGE_SIZE, payload)
}

/// # Set Quantity (0x15 nH nL)
pub fn set_quantity(copies: u16) -> Packet {
    Packet::new(SET_QUANTITY, copies.to_be_bytes().to_vec())
}

/// # End Page (0xE3 01)
pub fn end_page() -> Packet {
    Packet::new(END_PAGE, vec![0x01])
}

/// # Print Status (0xA3 01)
pub fn print_status() -> Packet {
    Packet::new(PRINT_STATUS, vec![0x01])
}

/// # End Print (0xF3 01)
pub fn end_print() -> Packet {
    Packet::new(END_PRINT, vec![0x01])
}

// ============================================================================
// ROW DATA
// ============================================================================

/// # Bitmap Row (0x85 iH iL c0 c1 c2 repeat data…)
///
/// ## Parameters
///
/// - `index`: row number, 0-based
/// - `counts`: black dots in each third of the printhead (saturating)
/// - `bits`: packed row, MSB = leftmost dot
///
/// ## Layout
///
/// ```text
/// ┌────────┬──────────────┬────────┬─────────────────────┐
/// │ index  │ counts[3]    │ repeat │ bits (cols/8 bytes) │
/// │ u16 BE │ u8 × 3       │ u8 = 1 │                     │
/// └────────┴──────────────┴────────┴─────────────────────┘
/// ```
pub fn bitmap_row(index: u16, counts: [u8; 3], bits: &[u8]) -> Packet {
    let mut payload = Vec::with_capacity(6 + bits.len());
    payload.extend_from_slice(&index.to_be_bytes());
    payload.extend_from_slice(&counts);
    payload.push(1);
    payload.extend_from_slice(bits);
    Packet::new(BITMAP_ROW, payload)
}

/// # Empty Row (0x84 iH iL repeat)
///
/// A blank row without any bitmap bytes.
pub fn empty_row(index: u16) -> Packet {
    let mut payload = Vec::with_capacity(3);
    payload.extend_from_slice(&index.to_be_bytes());
    payload.push(1);
    Packet::new(EMPTY_ROW, payload)
}

// ============================================================================
// TESTS
// ============================================================================
