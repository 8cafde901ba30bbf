//! Monitor error types

use cecd_core::{AddressError, LogicalAddress, Opcode};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Adapter program not found: {0}")]
    AdapterNotFound(String),
    #[error("Failed to launch adapter {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CEC adapter is not ready")]
    NotReady,
    #[error("No {expected} from {target} within {waited:?}")]
    Timeout {
        target: LogicalAddress,
        expected: Opcode,
        waited: Duration,
    },
    #[error("Adapter did not become ready within {0:?}")]
    ReadyTimeout(Duration),
    #[error("Failed to write to adapter: {0}")]
    Write(#[from] std::io::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("Adapter session closed")]
    Closed,
}

impl MonitorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, MonitorError::Timeout { .. })
    }
}
