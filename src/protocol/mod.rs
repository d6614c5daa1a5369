//! # NIIMBOT Protocol Implementation
//!
//! This module provides the wire-level pieces of the NIIMBOT label printer
//! protocol.
//!
//! ## Module Structure
//!
//! - [`packet`]: Frame encode/decode with XOR checksum
//! - [`codec`]: `tokio_util` codec for byte streams
//! - [`commands`]: Command builders and reply-code correlation
//! - [`response`]: Typed reply parsers (status, info, RFID, heartbeat)
//!
//! ## Usage Example
//!
//! ```
//! use niimbot::protocol::{commands, packet};
//!
//! // Build the configuration part of a job
//! let mut data = Vec::new();
//! data.extend(commands::set_density(3).to_bytes()?);
//! data.extend(commands::set_label_type(1).to_bytes()?);
//! data.extend(commands::start_print().to_bytes()?);
//!
//! // Decode them back one frame at a time
//! let (first, used) = packet::decode(&data)?.unwrap();
//! assert_eq!(first.command, commands::SET_DENSITY);
//! assert_eq!(used, 8);
//! # Ok::<(), niimbot::error::ProtocolError>(())
//! ```

pub mod codec;
pub mod commands;
pub mod packet;
pub mod response;

pub use codec::PacketCodec;
pub use packet::Packet;
