//! Device attributes and how bus events map onto them

use cecd_core::protocol::{self, power};
use cecd_core::{DecodedEvent, EventKind, Opcode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("Unknown attribute: {0}")]
    Unknown(String),
    #[error("Attribute {0} is read-only")]
    ReadOnly(Attribute),
    #[error("Invalid value for {attribute}: {reason}")]
    InvalidValue { attribute: Attribute, reason: String },
}

/// Per-device attribute keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    Name,
    LogicalAddress,
    PhysicalAddress,
    Active,
    LastSeen,
    PowerState,
    ActiveSource,
    Recording,
    CecVersion,
    Language,
    Deck,
    Tuner,
    Vendor,
    MenuStatus,
    Volume,
    SystemAudio,
    Arc,
}

impl Attribute {
    pub const ALL: &'static [Attribute] = &[
        Attribute::Name,
        Attribute::LogicalAddress,
        Attribute::PhysicalAddress,
        Attribute::Active,
        Attribute::LastSeen,
        Attribute::PowerState,
        Attribute::ActiveSource,
        Attribute::Recording,
        Attribute::CecVersion,
        Attribute::Language,
        Attribute::Deck,
        Attribute::Tuner,
        Attribute::Vendor,
        Attribute::MenuStatus,
        Attribute::Volume,
        Attribute::SystemAudio,
        Attribute::Arc,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Attribute::Name => "name",
            Attribute::LogicalAddress => "logicalAddress",
            Attribute::PhysicalAddress => "physicalAddress",
            Attribute::Active => "active",
            Attribute::LastSeen => "lastSeen",
            Attribute::PowerState => "powerState",
            Attribute::ActiveSource => "activeSource",
            Attribute::Recording => "recording",
            Attribute::CecVersion => "cecVersion",
            Attribute::Language => "language",
            Attribute::Deck => "deck",
            Attribute::Tuner => "tuner",
            Attribute::Vendor => "vendor",
            Attribute::MenuStatus => "menuStatus",
            Attribute::Volume => "volume",
            Attribute::SystemAudio => "systemAudio",
            Attribute::Arc => "arc",
        }
    }

    pub fn from_key(key: &str) -> Result<Self, AttributeError> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.key().eq_ignore_ascii_case(key))
            .ok_or_else(|| AttributeError::Unknown(key.to_string()))
    }

    /// Attributes that translate into bus commands when written
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            Attribute::PowerState
                | Attribute::ActiveSource
                | Attribute::Recording
                | Attribute::MenuStatus
                | Attribute::Deck
                | Attribute::Volume
                | Attribute::SystemAudio
                | Attribute::Arc
        )
    }

    /// Attribute a decoded event updates, if any
    pub fn for_event(kind: EventKind) -> Option<Self> {
        let opcode = match kind {
            EventKind::Poll => return Some(Attribute::Active),
            EventKind::Opcode(opcode) => opcode,
        };
        let attribute = match opcode {
            Opcode::ActiveSource | Opcode::InactiveSource => Attribute::ActiveSource,
            Opcode::RecordStatus => Attribute::Recording,
            Opcode::CecVersion => Attribute::CecVersion,
            Opcode::ReportPhysicalAddress => Attribute::PhysicalAddress,
            Opcode::SetMenuLanguage => Attribute::Language,
            Opcode::DeckStatus => Attribute::Deck,
            Opcode::TunerDeviceStatus => Attribute::Tuner,
            Opcode::DeviceVendorId => Attribute::Vendor,
            Opcode::SetOsdName => Attribute::Name,
            Opcode::MenuStatus => Attribute::MenuStatus,
            Opcode::ReportPowerStatus => Attribute::PowerState,
            Opcode::ReportAudioStatus => Attribute::Volume,
            Opcode::SystemAudioModeStatus => Attribute::SystemAudio,
            Opcode::ReportArcStarted | Opcode::ReportArcEnded => Attribute::Arc,
            _ => return None,
        };
        Some(attribute)
    }

    /// Value this attribute takes from a decoded event
    pub fn value_from(self, event: &DecodedEvent) -> Option<AttributeValue> {
        let first = event.packet.args.first().copied();
        let value = match self {
            Attribute::Active => AttributeValue::Bool(true),
            Attribute::ActiveSource => {
                AttributeValue::Bool(event.opcode() == Some(Opcode::ActiveSource))
            }
            // Record status 0x01..=0x04: recording in progress
            Attribute::Recording => AttributeValue::Bool(matches!(first?, 0x01..=0x04)),
            Attribute::PowerState => AttributeValue::Bool(matches!(
                first?,
                power::ON | power::IN_TRANSITION_STANDBY_TO_ON
            )),
            Attribute::MenuStatus => AttributeValue::Bool(first? == protocol::menu::ACTIVATE),
            Attribute::SystemAudio => AttributeValue::Bool(first? != 0),
            Attribute::Arc => {
                AttributeValue::Bool(event.opcode() == Some(Opcode::ReportArcStarted))
            }
            Attribute::Deck => AttributeValue::Number(first? as u32),
            Attribute::Volume => {
                let status = first?;
                if status & protocol::audio::MUTE_MASK != 0 {
                    AttributeValue::Number(0)
                } else {
                    AttributeValue::Number(status as u32)
                }
            }
            Attribute::Tuner => AttributeValue::Text(
                event
                    .packet
                    .args
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(":"),
            ),
            Attribute::CecVersion
            | Attribute::PhysicalAddress
            | Attribute::Language
            | Attribute::Vendor
            | Attribute::Name => AttributeValue::Text(event.data.display()?),
            Attribute::LogicalAddress | Attribute::LastSeen => return None,
        };
        Some(value)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Stored attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(u32),
    Text(String),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Number(n) => Some(*n != 0),
            AttributeValue::Text(t) => match t.as_str() {
                "true" | "on" | "1" => Some(true),
                "false" | "off" | "0" => Some(false),
                _ => None,
            },
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Bool(b) => Some(*b as u32),
            AttributeValue::Text(t) => t.parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(t) => f.write_str(t),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

/// Normalize an OSD name into a device identity
///
/// Drops `. ' " ! ? ,` and replaces spaces with underscores.
pub fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '.' | '\'' | '"' | '!' | '?' | ','))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cecd_core::{decode_event, decode_packet};

    fn event(line: &str) -> DecodedEvent {
        decode_event(&decode_packet(line).unwrap()).unwrap()
    }

    fn value(line: &str) -> Option<AttributeValue> {
        let event = event(line);
        Attribute::for_event(event.kind)?.value_from(&event)
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("Fire TV Stick"), "Fire_TV_Stick");
        assert_eq!(clean_name("Mr. \"Bob's\" Box!?,"), "Mr_Bobs_Box");
        assert_eq!(clean_name("Unknown B"), "Unknown_B");
    }

    #[test]
    fn test_event_mapping() {
        assert_eq!(Attribute::for_event(EventKind::Poll), Some(Attribute::Active));
        assert_eq!(
            Attribute::for_event(Opcode::InactiveSource.into()),
            Some(Attribute::ActiveSource)
        );
        assert_eq!(
            Attribute::for_event(Opcode::ReportArcEnded.into()),
            Some(Attribute::Arc)
        );
        assert_eq!(Attribute::for_event(Opcode::GiveOsdName.into()), None);
    }

    #[test]
    fn test_power_state_values() {
        assert_eq!(value(">> 01:90:00"), Some(AttributeValue::Bool(true)));
        assert_eq!(value(">> 01:90:02"), Some(AttributeValue::Bool(true)));
        assert_eq!(value(">> 01:90:01"), Some(AttributeValue::Bool(false)));
        assert_eq!(value(">> 01:90:03"), Some(AttributeValue::Bool(false)));
    }

    #[test]
    fn test_volume_honours_mute_bit() {
        assert_eq!(value(">> 51:7a:25"), Some(AttributeValue::Number(0x25)));
        assert_eq!(value(">> 51:7a:a5"), Some(AttributeValue::Number(0)));
    }

    #[test]
    fn test_menu_status_zero_is_active() {
        assert_eq!(value(">> 40:8e:00"), Some(AttributeValue::Bool(true)));
        assert_eq!(value(">> 40:8e:01"), Some(AttributeValue::Bool(false)));
    }

    #[test]
    fn test_text_attributes() {
        assert_eq!(
            value(">> 4f:84:21:00:04"),
            Some(AttributeValue::Text("2.1.0.0".into()))
        );
        assert_eq!(
            value(">> 4f:87:12:34:56"),
            Some(AttributeValue::Text("Unknown (1193046)".into()))
        );
        assert_eq!(
            value(">> 40:47:4b:6f:64:69"),
            Some(AttributeValue::Text("Kodi".into()))
        );
    }

    #[test]
    fn test_arc_and_active_source() {
        assert_eq!(value(">> 50:c1"), Some(AttributeValue::Bool(true)));
        assert_eq!(value(">> 50:c2"), Some(AttributeValue::Bool(false)));
        assert_eq!(value(">> 4f:82:21:00"), Some(AttributeValue::Bool(true)));
        assert_eq!(value(">> 40:9d:21:00"), Some(AttributeValue::Bool(false)));
    }

    #[test]
    fn test_keys_round_trip() {
        for attribute in Attribute::ALL {
            assert_eq!(Attribute::from_key(attribute.key()).unwrap(), *attribute);
            let json = serde_json::to_string(attribute).unwrap();
            assert_eq!(json, format!("\"{}\"", attribute.key()));
        }
        assert!(Attribute::from_key("brightness").is_err());
    }

    #[test]
    fn test_untagged_values() {
        let value: AttributeValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, AttributeValue::Bool(true));
        let value: AttributeValue = serde_json::from_str("42").unwrap();
        assert_eq!(value.as_number(), Some(42));
        let value: AttributeValue = serde_json::from_str("\"on\"").unwrap();
        assert_eq!(value.as_bool(), Some(true));
    }
}
