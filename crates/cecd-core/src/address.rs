//! Logical and physical address codecs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid logical address: {0}")]
    InvalidLogical(String),
    #[error("Invalid physical address: {0}")]
    InvalidPhysical(String),
}

/// Role of a logical address on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRole {
    Tv,
    Recorder,
    Tuner,
    Playback,
    Audio,
    Reserved,
    FreeUse,
    Broadcast,
}

/// Logical address in `[0, 15]`; 15 is broadcast / unregistered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LogicalAddress(u8);

/// (token, display name, role) per logical address
const LOGICAL_TABLE: [(&str, &str, AddressRole); 16] = [
    ("TV", "TV", AddressRole::Tv),
    ("RECORDINGDEVICE1", "Recorder 1", AddressRole::Recorder),
    ("RECORDINGDEVICE2", "Recorder 2", AddressRole::Recorder),
    ("TUNER1", "Tuner 1", AddressRole::Tuner),
    ("PLAYBACKDEVICE1", "Playback 1", AddressRole::Playback),
    ("AUDIOSYSTEM", "Audio", AddressRole::Audio),
    ("TUNER2", "Tuner 2", AddressRole::Tuner),
    ("TUNER3", "Tuner 3", AddressRole::Tuner),
    ("PLAYBACKDEVICE2", "Playback 2", AddressRole::Playback),
    ("RECORDINGDEVICE3", "Recorder 3", AddressRole::Recorder),
    ("TUNER4", "Tuner 4", AddressRole::Tuner),
    ("PLAYBACKDEVICE3", "Playback 3", AddressRole::Playback),
    ("RESERVED1", "Reserved 1", AddressRole::Reserved),
    ("RESERVED2", "Reserved 2", AddressRole::Reserved),
    ("FREEUSE", "Free use", AddressRole::FreeUse),
    ("BROADCAST", "Broadcast", AddressRole::Broadcast),
];

impl LogicalAddress {
    pub const TV: Self = Self(0);
    pub const RECORDER_1: Self = Self(1);
    pub const TUNER_1: Self = Self(3);
    pub const PLAYBACK_1: Self = Self(4);
    pub const AUDIO_SYSTEM: Self = Self(5);
    pub const BROADCAST: Self = Self(15);

    pub fn new(value: u8) -> Option<Self> {
        (value <= 15).then_some(Self(value))
    }

    /// Build from the low nibble of a byte
    pub fn from_nibble(value: u8) -> Self {
        Self(value & 0x0F)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn role(self) -> AddressRole {
        LOGICAL_TABLE[self.0 as usize].2
    }

    /// Human readable name (e.g. "Playback 1")
    pub fn name(self) -> &'static str {
        LOGICAL_TABLE[self.0 as usize].1
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == 15
    }

    /// Upper-case hex digit, as used in synthesized device names
    pub fn hex(self) -> String {
        format!("{:X}", self.0)
    }

    /// Parse an address token: hex (`0xF`), table name (`broadcast`,
    /// `PLAYBACKDEVICE1`, `unregistered`) or decimal (`4`)
    pub fn parse(token: &str) -> Result<Self, AddressError> {
        let token = token.trim();
        let invalid = || AddressError::InvalidLogical(token.to_string());

        let value = if let Some(hex) = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            u8::from_str_radix(hex, 16).map_err(|_| invalid())?
        } else if let Some(index) = LOGICAL_TABLE
            .iter()
            .position(|(name, _, _)| name.eq_ignore_ascii_case(token))
        {
            index as u8
        } else if token.eq_ignore_ascii_case("UNREGISTERED") {
            15
        } else {
            token.parse::<u8>().map_err(|_| invalid())?
        };

        Self::new(value).ok_or_else(invalid)
    }
}

impl TryFrom<u8> for LogicalAddress {
    type Error = AddressError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| AddressError::InvalidLogical(value.to_string()))
    }
}

impl From<LogicalAddress> for u8 {
    fn from(address: LogicalAddress) -> Self {
        address.0
    }
}

impl FromStr for LogicalAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 16-bit HDMI routing address, four nibbles written `a.b.c.d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PhysicalAddress(pub u16);

impl PhysicalAddress {
    pub const ROOT: Self = Self(0x0000);

    /// Decode from the first two argument bytes (big-endian)
    pub fn from_args(args: &[u8]) -> Option<Self> {
        match args {
            [hi, lo, ..] => Some(Self(u16::from_be_bytes([*hi, *lo]))),
            _ => None,
        }
    }

    pub fn to_args(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub fn is_root(self) -> bool {
        self.0 == 0
    }

    pub fn nibbles(self) -> [u8; 4] {
        [
            (self.0 >> 12) as u8 & 0x0F,
            (self.0 >> 8) as u8 & 0x0F,
            (self.0 >> 4) as u8 & 0x0F,
            self.0 as u8 & 0x0F,
        ]
    }

    /// Dotted form without the dots (`2.1.0.0` -> `2100`)
    pub fn compact(self) -> String {
        format!("{:04x}", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.nibbles();
        write!(f, "{:x}.{:x}.{:x}.{:x}", a, b, c, d)
    }
}

impl FromStr for PhysicalAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidPhysical(s.to_string());
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 4 {
            return Err(invalid());
        }

        let mut value: u16 = 0;
        for part in parts {
            if part.len() != 1 {
                return Err(invalid());
            }
            let nibble = u16::from_str_radix(part, 16).map_err(|_| invalid())?;
            value = (value << 4) | nibble;
        }
        Ok(Self(value))
    }
}

impl Serialize for PhysicalAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PhysicalAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
