//! cecd Core - HDMI-CEC protocol types and decoding
//!
//! This crate provides the foundational types for the cecd system:
//! - Protocol tables (opcodes, vendors, user control codes, status enums)
//! - Logical and physical address codecs
//! - Classification of `cec-client` output lines
//! - Packet parsing and typed event decoding

pub mod address;
pub mod event;
pub mod line;
pub mod packet;
pub mod protocol;

pub use address::{AddressError, AddressRole, LogicalAddress, PhysicalAddress};
pub use event::{decode_event, DecodeError, DecodedEvent, EventData, EventKind};
pub use line::{classify, parse_own_address, LineCategory};
pub use packet::{decode_packet, Direction, Packet, PacketCategory};
pub use protocol::{ArgLength, DeviceType, Opcode};
