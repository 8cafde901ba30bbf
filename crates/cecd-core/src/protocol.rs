//! Static HDMI-CEC protocol tables
//!
//! Opcode values, expected argument lengths, request/response pairs and the
//! name tables used when rendering decoded values.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::address::LogicalAddress;

macro_rules! opcodes {
    ($($variant:ident => $name:literal = $value:literal),* $(,)?) => {
        /// CEC opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            /// Every known opcode, in table order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant),*];

            /// Wire value of the opcode
            pub fn value(self) -> u8 {
                match self {
                    $(Opcode::$variant => $value,)*
                }
            }

            /// Canonical upper-case name (e.g. `ACTIVE_SOURCE`)
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)*
                }
            }

            /// Look up an opcode by wire value
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Opcode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    FeatureAbort => "FEATURE_ABORT" = 0x00,
    ImageViewOn => "IMAGE_VIEW_ON" = 0x04,
    TunerStepIncrement => "TUNER_STEP_INCREMENT" = 0x05,
    TunerStepDecrement => "TUNER_STEP_DECREMENT" = 0x06,
    TunerDeviceStatus => "TUNER_DEVICE_STATUS" = 0x07,
    GiveTunerDeviceStatus => "GIVE_TUNER_DEVICE_STATUS" = 0x08,
    RecordOn => "RECORD_ON" = 0x09,
    RecordStatus => "RECORD_STATUS" = 0x0A,
    RecordOff => "RECORD_OFF" = 0x0B,
    TextViewOn => "TEXT_VIEW_ON" = 0x0D,
    RecordTvScreen => "RECORD_TV_SCREEN" = 0x0F,
    GiveDeckStatus => "GIVE_DECK_STATUS" = 0x1A,
    DeckStatus => "DECK_STATUS" = 0x1B,
    SetMenuLanguage => "SET_MENU_LANGUAGE" = 0x32,
    ClearAnalogueTimer => "CLEAR_ANALOGUE_TIMER" = 0x33,
    SetAnalogueTimer => "SET_ANALOGUE_TIMER" = 0x34,
    TimerStatus => "TIMER_STATUS" = 0x35,
    Standby => "STANDBY" = 0x36,
    Play => "PLAY" = 0x41,
    DeckControl => "DECK_CONTROL" = 0x42,
    TimerClearedStatus => "TIMER_CLEARED_STATUS" = 0x43,
    UserControlPressed => "USER_CONTROL_PRESSED" = 0x44,
    UserControlRelease => "USER_CONTROL_RELEASE" = 0x45,
    GiveOsdName => "GIVE_OSD_NAME" = 0x46,
    SetOsdName => "SET_OSD_NAME" = 0x47,
    SetOsdString => "SET_OSD_STRING" = 0x64,
    SetTimerProgramTitle => "SET_TIMER_PROGRAM_TITLE" = 0x67,
    SystemAudioModeRequest => "SYSTEM_AUDIO_MODE_REQUEST" = 0x70,
    GiveAudioStatus => "GIVE_AUDIO_STATUS" = 0x71,
    SetSystemAudioMode => "SET_SYSTEM_AUDIO_MODE" = 0x72,
    ReportAudioStatus => "REPORT_AUDIO_STATUS" = 0x7A,
    GiveSystemAudioModeStatus => "GIVE_SYSTEM_AUDIO_MODE_STATUS" = 0x7D,
    SystemAudioModeStatus => "SYSTEM_AUDIO_MODE_STATUS" = 0x7E,
    RoutingChange => "ROUTING_CHANGE" = 0x80,
    RoutingInformation => "ROUTING_INFORMATION" = 0x81,
    ActiveSource => "ACTIVE_SOURCE" = 0x82,
    GivePhysicalAddress => "GIVE_PHYSICAL_ADDRESS" = 0x83,
    ReportPhysicalAddress => "REPORT_PHYSICAL_ADDRESS" = 0x84,
    RequestActiveSource => "REQUEST_ACTIVE_SOURCE" = 0x85,
    SetStreamPath => "SET_STREAM_PATH" = 0x86,
    DeviceVendorId => "DEVICE_VENDOR_ID" = 0x87,
    VendorCommand => "VENDOR_COMMAND" = 0x89,
    VendorRemoteButtonDown => "VENDOR_REMOTE_BUTTON_DOWN" = 0x8A,
    VendorRemoteButtonUp => "VENDOR_REMOTE_BUTTON_UP" = 0x8B,
    GiveDeviceVendorId => "GIVE_DEVICE_VENDOR_ID" = 0x8C,
    MenuRequest => "MENU_REQUEST" = 0x8D,
    MenuStatus => "MENU_STATUS" = 0x8E,
    GiveDevicePowerStatus => "GIVE_DEVICE_POWER_STATUS" = 0x8F,
    ReportPowerStatus => "REPORT_POWER_STATUS" = 0x90,
    GetMenuLanguage => "GET_MENU_LANGUAGE" = 0x91,
    SelectAnalogueService => "SELECT_ANALOGUE_SERVICE" = 0x92,
    SelectDigitalService => "SELECT_DIGITAL_SERVICE" = 0x93,
    SetDigitalTimer => "SET_DIGITAL_TIMER" = 0x97,
    ClearDigitalTimer => "CLEAR_DIGITAL_TIMER" = 0x99,
    SetAudioRate => "SET_AUDIO_RATE" = 0x9A,
    InactiveSource => "INACTIVE_SOURCE" = 0x9D,
    CecVersion => "CEC_VERSION" = 0x9E,
    GetCecVersion => "GET_CEC_VERSION" = 0x9F,
    VendorCommandWithId => "VENDOR_COMMAND_WITH_ID" = 0xA0,
    ClearExternalTimer => "CLEAR_EXTERNAL_TIMER" = 0xA1,
    SetExternalTimer => "SET_EXTERNAL_TIMER" = 0xA2,
    StartArc => "START_ARC" = 0xC0,
    ReportArcStarted => "REPORT_ARC_STARTED" = 0xC1,
    ReportArcEnded => "REPORT_ARC_ENDED" = 0xC2,
    RequestArcStart => "REQUEST_ARC_START" = 0xC3,
    RequestArcEnd => "REQUEST_ARC_END" = 0xC4,
    EndArc => "END_ARC" = 0xC5,
    Cdc => "CDC" = 0xF8,
    Abort => "ABORT" = 0xFF,
}

impl Opcode {
    /// Look up an opcode by name, case-insensitively (`set_osd_name`, `SET_OSD_NAME`)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// Expected argument length, for opcodes whose argument shape is validated
    pub fn expected_args(self) -> Option<ArgLength> {
        use ArgLength::*;
        let expected = match self {
            Opcode::Standby
            | Opcode::ImageViewOn
            | Opcode::TextViewOn
            | Opcode::UserControlRelease
            | Opcode::GiveOsdName
            | Opcode::GivePhysicalAddress
            | Opcode::GiveDevicePowerStatus
            | Opcode::GiveDeviceVendorId => Exact(0),
            Opcode::CecVersion
            | Opcode::DeckStatus
            | Opcode::ReportPowerStatus
            | Opcode::MenuRequest
            | Opcode::MenuStatus
            | Opcode::UserControlPressed
            | Opcode::ReportAudioStatus
            | Opcode::SetSystemAudioMode
            | Opcode::SystemAudioModeStatus => Exact(1),
            Opcode::ActiveSource | Opcode::RoutingInformation | Opcode::SetStreamPath => Exact(2),
            Opcode::DeviceVendorId | Opcode::ReportPhysicalAddress | Opcode::SetMenuLanguage => {
                Exact(3)
            }
            Opcode::RoutingChange => Exact(4),
            Opcode::SetOsdName => AtLeast(1),
            _ => return None,
        };
        Some(expected)
    }

    /// Opcode a well-behaved device answers this request with
    pub fn response(self) -> Option<Opcode> {
        let response = match self {
            Opcode::RequestActiveSource => Opcode::ActiveSource,
            Opcode::GetCecVersion => Opcode::CecVersion,
            Opcode::GivePhysicalAddress => Opcode::ReportPhysicalAddress,
            Opcode::GetMenuLanguage => Opcode::SetMenuLanguage,
            Opcode::GiveDeckStatus => Opcode::DeckStatus,
            Opcode::GiveTunerDeviceStatus => Opcode::TunerDeviceStatus,
            Opcode::GiveDeviceVendorId => Opcode::DeviceVendorId,
            Opcode::GiveOsdName => Opcode::SetOsdName,
            Opcode::MenuRequest => Opcode::MenuStatus,
            Opcode::GiveDevicePowerStatus => Opcode::ReportPowerStatus,
            Opcode::GiveAudioStatus => Opcode::ReportAudioStatus,
            Opcode::GiveSystemAudioModeStatus => Opcode::SystemAudioModeStatus,
            Opcode::SystemAudioModeRequest => Opcode::SetSystemAudioMode,
            Opcode::RequestArcStart => Opcode::StartArc,
            Opcode::StartArc => Opcode::ReportArcStarted,
            Opcode::RequestArcEnd => Opcode::EndArc,
            Opcode::EndArc => Opcode::ReportArcEnded,
            _ => return None,
        };
        Some(response)
    }
}

impl Serialize for Opcode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Opcode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Opcode::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown opcode {}", name)))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Argument length constraint for an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLength {
    Exact(usize),
    AtLeast(usize),
}

impl ArgLength {
    pub fn accepts(self, len: usize) -> bool {
        match self {
            ArgLength::Exact(n) => len == n,
            ArgLength::AtLeast(n) => len >= n,
        }
    }
}

impl fmt::Display for ArgLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgLength::Exact(n) => write!(f, "{}", n),
            ArgLength::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Device type the adapter registers as on the bus (`cec-client -t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Recorder,
    Playback,
    Tuner,
    Audio,
}

impl DeviceType {
    /// Flag passed to `cec-client -t`
    pub fn flag(self) -> &'static str {
        match self {
            DeviceType::Recorder => "r",
            DeviceType::Playback => "p",
            DeviceType::Tuner => "t",
            DeviceType::Audio => "a",
        }
    }

    /// Logical address assumed until the adapter announces its own
    pub fn default_address(self) -> LogicalAddress {
        match self {
            DeviceType::Recorder => LogicalAddress::RECORDER_1,
            DeviceType::Playback => LogicalAddress::PLAYBACK_1,
            DeviceType::Tuner => LogicalAddress::TUNER_1,
            DeviceType::Audio => LogicalAddress::AUDIO_SYSTEM,
        }
    }

    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "r" | "recorder" => Some(DeviceType::Recorder),
            "p" | "playback" => Some(DeviceType::Playback),
            "t" | "tuner" => Some(DeviceType::Tuner),
            "a" | "audio" => Some(DeviceType::Audio),
            _ => None,
        }
    }
}

/// Power status values (REPORT_POWER_STATUS)
pub mod power {
    pub const ON: u8 = 0x00;
    pub const STANDBY: u8 = 0x01;
    pub const IN_TRANSITION_STANDBY_TO_ON: u8 = 0x02;
    pub const IN_TRANSITION_ON_TO_STANDBY: u8 = 0x03;

    pub fn name(status: u8) -> Option<&'static str> {
        match status {
            ON => Some("ON"),
            STANDBY => Some("STANDBY"),
            IN_TRANSITION_STANDBY_TO_ON => Some("IN_TRANSITION_STANDBY_TO_ON"),
            IN_TRANSITION_ON_TO_STANDBY => Some("IN_TRANSITION_ON_TO_STANDBY"),
            _ => None,
        }
    }
}

/// CEC version values (CEC_VERSION)
pub fn cec_version_name(version: u8) -> Option<&'static str> {
    match version {
        0x00 => Some("unknown"),
        0x01 => Some("1.2"),
        0x02 => Some("1.2a"),
        0x03 => Some("1.3"),
        0x04 => Some("1.3a"),
        0x05 => Some("1.4"),
        0x06 => Some("2.0"),
        _ => None,
    }
}

/// Menu request types (MENU_REQUEST)
pub mod menu {
    pub const ACTIVATE: u8 = 0;
    pub const DEACTIVATE: u8 = 1;
    pub const QUERY: u8 = 2;

    pub fn request_name(request: u8) -> Option<&'static str> {
        match request {
            ACTIVATE => Some("ACTIVATE"),
            DEACTIVATE => Some("DEACTIVATE"),
            QUERY => Some("QUERY"),
            _ => None,
        }
    }

    /// Menu states (MENU_STATUS)
    pub fn state_name(state: u8) -> Option<&'static str> {
        match state {
            0 => Some("ACTIVATED"),
            1 => Some("DEACTIVATED"),
            _ => None,
        }
    }
}

/// Deck info (DECK_STATUS), deck control modes and play modes
pub mod deck {
    pub const PLAY: u8 = 0x11;
    pub const RECORD: u8 = 0x12;
    pub const PLAY_REVERSE: u8 = 0x13;
    pub const STILL: u8 = 0x14;
    pub const SLOW: u8 = 0x15;
    pub const SLOW_REVERSE: u8 = 0x16;
    pub const FAST_FORWARD: u8 = 0x17;
    pub const FAST_REVERSE: u8 = 0x18;
    pub const NO_MEDIA: u8 = 0x19;
    pub const STOP: u8 = 0x1A;
    pub const SKIP_FORWARD: u8 = 0x1B;
    pub const SKIP_REVERSE: u8 = 0x1C;
    pub const INDEX_SEARCH_FORWARD: u8 = 0x1D;
    pub const INDEX_SEARCH_REVERSE: u8 = 0x1E;
    pub const OTHER_STATUS: u8 = 0x1F;
    pub const OTHER_STATUS_LG: u8 = 0x20;

    pub const CONTROL_SKIP_FORWARD_WIND: u8 = 1;
    pub const CONTROL_SKIP_REVERSE_REWIND: u8 = 2;
    pub const CONTROL_STOP: u8 = 3;
    pub const CONTROL_EJECT: u8 = 4;

    /// Play modes (PLAY)
    pub mod play {
        pub const FORWARD: u8 = 0x24;
        pub const REVERSE: u8 = 0x20;
        pub const STILL: u8 = 0x25;
        pub const FAST_FORWARD_MEDIUM: u8 = 0x06;
        pub const FAST_REVERSE_MEDIUM: u8 = 0x0A;
        pub const SLOW_FORWARD_MEDIUM: u8 = 0x16;
        pub const SLOW_REVERSE_MEDIUM: u8 = 0x1A;
    }

    pub fn status_name(status: u8) -> Option<&'static str> {
        match status {
            PLAY => Some("PLAY"),
            RECORD => Some("RECORD"),
            PLAY_REVERSE => Some("PLAY_REVERSE"),
            STILL => Some("STILL"),
            SLOW => Some("SLOW"),
            SLOW_REVERSE => Some("SLOW_REVERSE"),
            FAST_FORWARD => Some("FAST_FORWARD"),
            FAST_REVERSE => Some("FAST_REVERSE"),
            NO_MEDIA => Some("NO_MEDIA"),
            STOP => Some("STOP"),
            SKIP_FORWARD => Some("SKIP_FORWARD"),
            SKIP_REVERSE => Some("SKIP_REVERSE"),
            INDEX_SEARCH_FORWARD => Some("INDEX_SEARCH_FORWARD"),
            INDEX_SEARCH_REVERSE => Some("INDEX_SEARCH_REVERSE"),
            OTHER_STATUS => Some("OTHER_STATUS"),
            OTHER_STATUS_LG => Some("OTHER_STATUS_LG"),
            _ => None,
        }
    }

    pub fn status_from_name(name: &str) -> Option<u8> {
        (PLAY..=OTHER_STATUS_LG).find(|s| status_name(*s).is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }
}

/// System audio status (SYSTEM_AUDIO_MODE_STATUS, SET_SYSTEM_AUDIO_MODE)
pub fn system_audio_name(status: u8) -> Option<&'static str> {
    match status {
        0 => Some("OFF"),
        1 => Some("ON"),
        _ => None,
    }
}

/// Audio status byte layout (REPORT_AUDIO_STATUS)
pub mod audio {
    pub const MUTE_MASK: u8 = 0x80;
    pub const VOLUME_MASK: u8 = 0x7F;
}

/// User control codes (USER_CONTROL_PRESSED)
pub mod user_control {
    pub const VOLUME_UP: u8 = 0x41;
    pub const VOLUME_DOWN: u8 = 0x42;
    pub const MUTE: u8 = 0x43;

    pub fn name(code: u8) -> Option<&'static str> {
        let name = match code {
            0x00 => "SELECT",
            0x01 => "UP",
            0x02 => "DOWN",
            0x03 => "LEFT",
            0x04 => "RIGHT",
            0x05 => "RIGHT_UP",
            0x06 => "RIGHT_DOWN",
            0x07 => "LEFT_UP",
            0x08 => "LEFT_DOWN",
            0x09 => "ROOT_MENU",
            0x0A => "SETUP_MENU",
            0x0B => "CONTENTS_MENU",
            0x0C => "FAVORITE_MENU",
            0x0D => "EXIT",
            0x10 => "TOP_MENU",
            0x11 => "DVD_MENU",
            0x1D => "NUMBER_ENTRY_MODE",
            0x1E => "NUMBER11",
            0x1F => "NUMBER12",
            0x20 => "NUMBER0",
            0x21 => "NUMBER1",
            0x22 => "NUMBER2",
            0x23 => "NUMBER3",
            0x24 => "NUMBER4",
            0x25 => "NUMBER5",
            0x26 => "NUMBER6",
            0x27 => "NUMBER7",
            0x28 => "NUMBER8",
            0x29 => "NUMBER9",
            0x2A => "DOT",
            0x2B => "ENTER",
            0x2C => "CLEAR",
            0x2F => "NEXT_FAVORITE",
            0x30 => "CHANNEL_UP",
            0x31 => "CHANNEL_DOWN",
            0x32 => "PREVIOUS_CHANNEL",
            0x33 => "SOUND_SELECT",
            0x34 => "INPUT_SELECT",
            0x35 => "DISPLAY_INFORMATION",
            0x36 => "HELP",
            0x37 => "PAGE_UP",
            0x38 => "PAGE_DOWN",
            0x40 => "POWER",
            VOLUME_UP => "VOLUME_UP",
            VOLUME_DOWN => "VOLUME_DOWN",
            MUTE => "MUTE",
            0x44 => "PLAY",
            0x45 => "STOP",
            0x46 => "PAUSE",
            0x47 => "RECORD",
            0x48 => "REWIND",
            0x49 => "FAST_FORWARD",
            0x4A => "EJECT",
            0x4B => "FORWARD",
            0x4C => "BACKWARD",
            0x4D => "STOP_RECORD",
            0x4E => "PAUSE_RECORD",
            0x50 => "ANGLE",
            0x51 => "SUB_PICTURE",
            0x52 => "VIDEO_ON_DEMAND",
            0x53 => "ELECTRONIC_PROGRAM_GUIDE",
            0x54 => "TIMER_PROGRAMMING",
            0x55 => "INITIAL_CONFIGURATION",
            0x56 => "SELECT_BROADCAST_TYPE",
            0x57 => "SELECT_SOUND_PRESENTATION",
            0x60 => "PLAY_FUNCTION",
            0x61 => "PAUSE_PLAY_FUNCTION",
            0x62 => "RECORD_FUNCTION",
            0x63 => "PAUSE_RECORD_FUNCTION",
            0x64 => "STOP_FUNCTION",
            0x65 => "MUTE_FUNCTION",
            0x66 => "RESTORE_VOLUME_FUNCTION",
            0x67 => "TUNE_FUNCTION",
            0x68 => "SELECT_MEDIA_FUNCTION",
            0x69 => "SELECT_AV_INPUT_FUNCTION",
            0x6A => "SELECT_AUDIO_INPUT_FUNCTION",
            0x6B => "POWER_TOGGLE_FUNCTION",
            0x6C => "POWER_OFF_FUNCTION",
            0x6D => "POWER_ON_FUNCTION",
            0x71 => "F1_BLUE",
            0x72 => "F2_RED",
            0x73 => "F3_GREEN",
            0x74 => "F4_YELLOW",
            0x75 => "F5",
            0x76 => "DATA",
            0x91 => "AN_RETURN",
            0x96 => "AN_CHANNELS_LIST",
            _ => return None,
        };
        Some(name)
    }
}

/// Vendor name for a 24-bit IEEE OUI (DEVICE_VENDOR_ID)
pub fn vendor_name(id: u32) -> Option<&'static str> {
    let name = match id {
        0x000039 => "TOSHIBA",
        0x0000F0 => "SAMSUNG",
        0x0005CD => "DENON",
        0x000678 => "MARANTZ",
        0x000982 => "LOEWE",
        0x0009B0 => "ONKYO",
        0x000CB8 => "MEDION",
        0x000CE7 => "TOSHIBA2",
        0x001582 => "PULSE_EIGHT",
        0x001950 => "HARMAN_KARDON2",
        0x001A11 => "GOOGLE",
        0x0020C7 => "AKAI",
        0x002467 => "AOC",
        0x008045 => "PANASONIC",
        0x00903E => "PHILIPS",
        0x009053 => "DAEWOO",
        0x00A0DE => "YAMAHA",
        0x00D0D5 => "GRUNDIG",
        0x00E036 => "PIONEER",
        0x00E091 => "LG",
        0x08001F => "SHARP",
        0x080046 => "SONY",
        0x18C086 => "BROADCOM",
        0x534850 => "SHARP2",
        0x6B746D => "VIZIO",
        0x8065E9 => "BENQ",
        0x9C645E => "HARMAN_KARDON",
        0x000000 => "UNKNOWN",
        _ => return None,
    };
    Some(name)
}
