//! Classification of `cec-client` output lines

use serde::{Deserialize, Serialize};

use crate::address::LogicalAddress;

/// Marker `cec-client` prints when the adapter refused a frame
pub const COMMAND_REJECTED: &str = "COMMAND_REJECTED";

const READY_LINE: &str = "waiting for input";
const OWN_ADDRESS_MARKER: &str = "logical address(es) = ";
const OWN_ADDRESS_ROLES: [&str; 4] = ["Recorder", "Playback", "Tuner", "Audio"];

/// Category of an adapter output line, derived from its prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCategory {
    Traffic,
    Debug,
    Notice,
    Warning,
    Error,
    Ready,
    Unclassified,
}

/// Classify a line by its fixed prefix
pub fn classify(line: &str) -> LineCategory {
    if line.starts_with("TRAFFIC:") {
        LineCategory::Traffic
    } else if line.starts_with("DEBUG:") {
        LineCategory::Debug
    } else if line.starts_with("NOTICE:") {
        LineCategory::Notice
    } else if line.starts_with("WARNING:") {
        LineCategory::Warning
    } else if line.starts_with("ERROR:") {
        LineCategory::Error
    } else if line.starts_with(READY_LINE) {
        LineCategory::Ready
    } else {
        LineCategory::Unclassified
    }
}

/// Whether a warning line reports a rejected command (session desync)
pub fn is_command_rejected(line: &str) -> bool {
    line.contains(COMMAND_REJECTED)
}

/// Extract the adapter's own logical address from a registration notice
///
/// Format: `... logical address(es) = Recorder 1 (1) , physical address: ...`
pub fn parse_own_address(line: &str) -> Option<LogicalAddress> {
    let start = line.find(OWN_ADDRESS_MARKER)? + OWN_ADDRESS_MARKER.len();
    let rest = &line[start..];

    if !OWN_ADDRESS_ROLES.iter().any(|role| rest.starts_with(role)) {
        return None;
    }

    let open = rest.find('(')?;
    let close = open + rest[open..].find(')')?;
    let value: u8 = rest[open + 1..close].trim().parse().ok()?;
    LogicalAddress::new(value)
}
