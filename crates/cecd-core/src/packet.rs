//! Bus packet parsing from adapter traffic lines

use serde::{Deserialize, Serialize};

use crate::address::LogicalAddress;
use crate::protocol::Opcode;

/// Which log stream the packet was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketCategory {
    Traffic,
    Debug,
}

/// Flow direction relative to the adapter (`>>` received, `<<` sent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One CEC frame as seen on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub category: PacketCategory,
    /// Adapter sequence counter, when printed
    pub sequence: Option<u64>,
    pub direction: Direction,
    pub source: LogicalAddress,
    pub target: LogicalAddress,
    /// Absent for a bare polling frame
    pub opcode: Option<u8>,
    pub args: Vec<u8>,
}

impl Packet {
    pub fn is_poll(&self) -> bool {
        self.opcode.is_none()
    }

    pub fn known_opcode(&self) -> Option<Opcode> {
        self.opcode.and_then(Opcode::from_u8)
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }
}

/// Parse `[TRAFFIC:|DEBUG:] [[seq]] <<|>> hh:hh:...` into a packet
///
/// Returns `None` for anything that does not have that exact shape.
pub fn decode_packet(line: &str) -> Option<Packet> {
    let mut rest = line.trim();
    let mut category = PacketCategory::Traffic;

    if let Some(r) = rest.strip_prefix("TRAFFIC:") {
        rest = r.trim_start();
    } else if let Some(r) = rest.strip_prefix("DEBUG:") {
        category = PacketCategory::Debug;
        rest = r.trim_start();
    }

    let mut sequence = None;
    if let Some(r) = rest.strip_prefix('[') {
        let end = r.find(']')?;
        let seq = r[..end].trim();
        if !seq.is_empty() {
            sequence = Some(seq.parse().ok()?);
        }
        rest = r[end + 1..].trim_start();
    }

    let direction = if let Some(r) = rest.strip_prefix(">>") {
        rest = r;
        Direction::Inbound
    } else if let Some(r) = rest.strip_prefix("<<") {
        rest = r;
        Direction::Outbound
    } else {
        return None;
    };

    let bytes = parse_hex_bytes(rest.trim())?;
    let (header, body) = bytes.split_first()?;

    Some(Packet {
        category,
        sequence,
        direction,
        source: LogicalAddress::from_nibble(header >> 4),
        target: LogicalAddress::from_nibble(*header),
        opcode: body.first().copied(),
        args: body.get(1..).map(<[u8]>::to_vec).unwrap_or_default(),
    })
}

/// Colon separated two-digit hex bytes
fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    if text.is_empty() {
        return None;
    }
    text.split(':')
        .map(|token| {
            if token.len() != 2 {
                return None;
            }
            u8::from_str_radix(token, 16).ok()
        })
        .collect()
}
