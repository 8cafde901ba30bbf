//! cecd Monitor - supervision of the `cec-client` adapter process
//!
//! This crate owns the adapter channel:
//! - Spawning and restarting `cec-client`
//! - Dispatching its output as typed events on a broadcast bus
//! - Writing commands and correlating responses

pub mod command;
pub mod error;
pub mod monitor;
pub mod supervisor;

pub use command::{format_tx, CommandArg, Correlator, Message, PendingReply};
pub use error::MonitorError;
pub use monitor::{ActiveSource, Monitor, MonitorConfig, MonitorEvent, SessionEnd};
pub use supervisor::{spawn_adapter, AdapterParams, AdapterProcess};
