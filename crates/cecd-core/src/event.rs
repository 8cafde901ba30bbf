//! Typed decoding of bus packets into events

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::address::PhysicalAddress;
use crate::packet::Packet;
use crate::protocol::{self, ArgLength, Opcode};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{opcode} expects {expected} argument bytes, got {actual}")]
    BadArguments {
        opcode: Opcode,
        expected: ArgLength,
        actual: usize,
    },
    #[error("Unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
}

/// Closed set of event kinds; one per opcode plus the polling frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Poll,
    Opcode(Opcode),
}

impl EventKind {
    pub fn opcode(self) -> Option<Opcode> {
        match self {
            EventKind::Opcode(op) => Some(op),
            EventKind::Poll => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Poll => f.write_str("POLLING_MESSAGE"),
            EventKind::Opcode(op) => write!(f, "{}", op),
        }
    }
}

impl From<Opcode> for EventKind {
    fn from(op: Opcode) -> Self {
        EventKind::Opcode(op)
    }
}

/// Decoded payload of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventData {
    /// No arguments
    Empty,
    /// Single enumerated byte (power status, version, menu, deck, key code)
    Code { value: u8, name: Option<String> },
    Physical { address: PhysicalAddress },
    /// REPORT_PHYSICAL_ADDRESS: address plus primary device type
    PhysicalReport {
        address: PhysicalAddress,
        device_type: u8,
    },
    Routing {
        from: PhysicalAddress,
        to: PhysicalAddress,
    },
    Vendor { id: u32, name: Option<String> },
    Audio { volume: u8, muted: bool },
    /// ASCII payload (OSD name, menu language)
    Text { bytes: Vec<u8>, text: String },
    /// Arguments of an opcode without a typed decoder
    Raw { args: Vec<u8> },
}

impl EventData {
    /// Numeric raw value, where the payload has one
    pub fn raw(&self) -> Option<u32> {
        match self {
            EventData::Code { value, .. } => Some(*value as u32),
            EventData::Physical { address } | EventData::PhysicalReport { address, .. } => {
                Some(address.0 as u32)
            }
            EventData::Vendor { id, .. } => Some(*id),
            EventData::Audio { volume, muted } => {
                let mute = if *muted { protocol::audio::MUTE_MASK } else { 0 };
                Some((*volume | mute) as u32)
            }
            _ => None,
        }
    }

    /// Human readable rendering of the payload
    pub fn display(&self) -> Option<String> {
        match self {
            EventData::Empty | EventData::Raw { .. } => None,
            EventData::Code { value, name } => {
                Some(name.clone().unwrap_or_else(|| format!("0x{:02x}", value)))
            }
            EventData::Physical { address } | EventData::PhysicalReport { address, .. } => {
                Some(address.to_string())
            }
            EventData::Routing { from, to } => Some(format!("{} -> {}", from, to)),
            EventData::Vendor { id, name } => {
                Some(name.clone().unwrap_or_else(|| format!("Unknown ({})", id)))
            }
            EventData::Audio { volume, muted } => Some(if *muted {
                "muted".to_string()
            } else {
                volume.to_string()
            }),
            EventData::Text { text, .. } => Some(text.clone()),
        }
    }

    pub fn physical_address(&self) -> Option<PhysicalAddress> {
        match self {
            EventData::Physical { address } | EventData::PhysicalReport { address, .. } => {
                Some(*address)
            }
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            EventData::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// A packet interpreted according to its opcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub packet: Packet,
    pub kind: EventKind,
    pub data: EventData,
}

impl DecodedEvent {
    pub fn opcode(&self) -> Option<Opcode> {
        self.kind.opcode()
    }
}

/// Decode a packet into a typed event
///
/// Packets without an opcode become [`EventKind::Poll`]. Opcodes with a known
/// argument shape are validated against [`Opcode::expected_args`].
pub fn decode_event(packet: &Packet) -> Result<DecodedEvent, DecodeError> {
    let Some(value) = packet.opcode else {
        return Ok(DecodedEvent {
            packet: packet.clone(),
            kind: EventKind::Poll,
            data: EventData::Empty,
        });
    };

    let opcode = Opcode::from_u8(value).ok_or(DecodeError::UnknownOpcode(value))?;
    let args = packet.args.as_slice();

    if let Some(expected) = opcode.expected_args() {
        if !expected.accepts(args.len()) {
            return Err(DecodeError::BadArguments {
                opcode,
                expected,
                actual: args.len(),
            });
        }
    }

    let code = |name: Option<&'static str>| EventData::Code {
        value: args[0],
        name: name.map(str::to_string),
    };

    let data = match opcode {
        Opcode::ActiveSource
        | Opcode::RoutingInformation
        | Opcode::SetStreamPath => match PhysicalAddress::from_args(args) {
            Some(address) => EventData::Physical { address },
            None => EventData::Raw { args: args.to_vec() },
        },
        // INACTIVE_SOURCE is sent both bare and with the physical address
        Opcode::InactiveSource => match PhysicalAddress::from_args(args) {
            Some(address) => EventData::Physical { address },
            None => EventData::Empty,
        },
        Opcode::ReportPhysicalAddress => EventData::PhysicalReport {
            address: PhysicalAddress(u16::from_be_bytes([args[0], args[1]])),
            device_type: args[2],
        },
        Opcode::RoutingChange => EventData::Routing {
            from: PhysicalAddress(u16::from_be_bytes([args[0], args[1]])),
            to: PhysicalAddress(u16::from_be_bytes([args[2], args[3]])),
        },
        Opcode::DeviceVendorId => {
            let id = u32::from_be_bytes([0, args[0], args[1], args[2]]);
            EventData::Vendor {
                id,
                name: protocol::vendor_name(id).map(str::to_string),
            }
        }
        Opcode::ReportPowerStatus => code(protocol::power::name(args[0])),
        Opcode::CecVersion => code(protocol::cec_version_name(args[0])),
        Opcode::DeckStatus => code(protocol::deck::status_name(args[0])),
        Opcode::MenuRequest => code(protocol::menu::request_name(args[0])),
        Opcode::MenuStatus => code(protocol::menu::state_name(args[0])),
        Opcode::UserControlPressed => code(protocol::user_control::name(args[0])),
        Opcode::SetSystemAudioMode | Opcode::SystemAudioModeStatus => {
            code(protocol::system_audio_name(args[0]))
        }
        Opcode::ReportAudioStatus => EventData::Audio {
            volume: args[0] & protocol::audio::VOLUME_MASK,
            muted: args[0] & protocol::audio::MUTE_MASK != 0,
        },
        Opcode::SetOsdName | Opcode::SetMenuLanguage => EventData::Text {
            bytes: args.to_vec(),
            text: args.iter().map(|b| *b as char).collect(),
        },
        _ if args.is_empty() => EventData::Empty,
        _ => EventData::Raw { args: args.to_vec() },
    };

    Ok(DecodedEvent {
        packet: packet.clone(),
        kind: EventKind::Opcode(opcode),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::decode_packet;

    fn decode(line: &str) -> Result<DecodedEvent, DecodeError> {
        decode_event(&decode_packet(line).unwrap())
    }

    #[test]
    fn test_active_source() {
        let event = decode(">> 11:82:22:00").unwrap();
        assert_eq!(event.kind, EventKind::Opcode(Opcode::ActiveSource));
        assert_eq!(event.data.raw(), Some(0x2200));
        assert_eq!(event.data.display().as_deref(), Some("2.2.0.0"));
    }

    #[test]
    fn test_active_source_bad_length() {
        let err = decode(">> 11:82:22").unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadArguments {
                opcode: Opcode::ActiveSource,
                expected: ArgLength::Exact(2),
                actual: 1,
            }
        );
    }

    #[test]
    fn test_power_status() {
        let event = decode("TRAFFIC: [  2249]\t>> 01:90:00").unwrap();
        assert_eq!(event.data.raw(), Some(0));
        assert_eq!(event.data.display().as_deref(), Some("ON"));
    }

    #[test]
    fn test_vendor_and_unknown_vendor() {
        let event = decode(">> 0f:87:00:00:f0").unwrap();
        assert_eq!(event.data.display().as_deref(), Some("SAMSUNG"));

        let event = decode(">> 4f:87:12:34:56").unwrap();
        assert_eq!(event.data.raw(), Some(0x123456));
        assert_eq!(event.data.display().as_deref(), Some("Unknown (1193046)"));
    }

    #[test]
    fn test_report_physical_address() {
        let event = decode(">> 4f:84:21:00:04").unwrap();
        assert_eq!(event.data.physical_address(), Some(PhysicalAddress(0x2100)));
        assert_eq!(event.data.display().as_deref(), Some("2.1.0.0"));
    }

    #[test]
    fn test_routing_change() {
        let event = decode(">> 0f:80:10:00:20:00").unwrap();
        assert_eq!(
            event.data,
            EventData::Routing {
                from: PhysicalAddress(0x1000),
                to: PhysicalAddress(0x2000),
            }
        );
    }

    #[test]
    fn test_osd_name() {
        let event = decode(">> 40:47:53:68:69:65:6c:64").unwrap();
        assert_eq!(event.data.text(), Some("Shield"));
        assert!(decode(">> 40:47").is_err());
    }

    #[test]
    fn test_audio_status_mute_bit() {
        let event = decode(">> 51:7a:a8").unwrap();
        assert_eq!(event.data, EventData::Audio { volume: 0x28, muted: true });
        assert_eq!(event.data.display().as_deref(), Some("muted"));
    }

    #[test]
    fn test_zero_arg_opcodes() {
        assert_eq!(decode(">> 0f:36").unwrap().data, EventData::Empty);
        assert!(decode(">> 0f:36:01").is_err());
    }

    #[test]
    fn test_poll_and_unknown() {
        let event = decode(">> 44").unwrap();
        assert_eq!(event.kind, EventKind::Poll);
        assert_eq!(decode(">> 44:fd").unwrap_err(), DecodeError::UnknownOpcode(0xfd));
    }

    #[test]
    fn test_untyped_opcode_passes_args() {
        let event = decode(">> 40:89:01:02").unwrap();
        assert_eq!(event.data, EventData::Raw { args: vec![1, 2] });
    }
}
