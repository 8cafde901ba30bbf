//! Outgoing messages and request/response correlation

use cecd_core::{DecodedEvent, LogicalAddress, Opcode, PhysicalAddress};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::error::MonitorError;
use crate::monitor::Monitor;

/// One argument of an outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArg {
    /// Two bytes, big endian
    Physical(PhysicalAddress),
    /// Shortest big endian encoding, at least one byte
    Number(u32),
    Bytes(Vec<u8>),
    /// ASCII characters
    Text(String),
}

impl CommandArg {
    /// Interpret a textual argument
    ///
    /// `a.b.c.d` is a physical address, `0x..` a hex number, anything else is
    /// sent as text.
    pub fn parse(token: &str) -> Self {
        if let Ok(address) = token.parse::<PhysicalAddress>() {
            return CommandArg::Physical(address);
        }
        if let Some(hex) = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            if let Ok(value) = u32::from_str_radix(hex, 16) {
                return CommandArg::Number(value);
            }
        }
        CommandArg::Text(token.to_string())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            CommandArg::Physical(address) => address.to_args().to_vec(),
            CommandArg::Number(value) => {
                let bytes = value.to_be_bytes();
                let skip = bytes.iter().take(3).take_while(|b| **b == 0).count();
                bytes[skip..].to_vec()
            }
            CommandArg::Bytes(bytes) => bytes.clone(),
            CommandArg::Text(text) => text.bytes().collect(),
        }
    }
}

impl From<u8> for CommandArg {
    fn from(value: u8) -> Self {
        CommandArg::Bytes(vec![value])
    }
}

impl From<PhysicalAddress> for CommandArg {
    fn from(address: PhysicalAddress) -> Self {
        CommandArg::Physical(address)
    }
}

impl From<Vec<u8>> for CommandArg {
    fn from(bytes: Vec<u8>) -> Self {
        CommandArg::Bytes(bytes)
    }
}

/// A frame to transmit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Defaults to the adapter's own address
    pub source: Option<LogicalAddress>,
    pub target: LogicalAddress,
    pub opcode: u8,
    pub args: Vec<CommandArg>,
}

impl Message {
    pub fn new(target: LogicalAddress, opcode: Opcode) -> Self {
        Self::raw(target, opcode.value())
    }

    pub fn raw(target: LogicalAddress, opcode: u8) -> Self {
        Self {
            source: None,
            target,
            opcode,
            args: Vec::new(),
        }
    }

    pub fn from_source(mut self, source: LogicalAddress) -> Self {
        self.source = Some(source);
        self
    }

    pub fn arg(mut self, arg: impl Into<CommandArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build a message from textual fields
    ///
    /// Addresses accept names, `0x` hex or decimal; a missing target means
    /// broadcast. The opcode accepts a name, `0x` hex or decimal.
    pub fn parse(
        source: Option<&str>,
        target: Option<&str>,
        opcode: &str,
        args: &[&str],
    ) -> Result<Self, MonitorError> {
        let source = source.map(LogicalAddress::parse).transpose()?;
        let target = target
            .map(LogicalAddress::parse)
            .transpose()?
            .unwrap_or(LogicalAddress::BROADCAST);

        Ok(Self {
            source,
            target,
            opcode: parse_opcode(opcode)?,
            args: args.iter().map(|a| CommandArg::parse(a)).collect(),
        })
    }

    /// Frame bytes: header, opcode, arguments
    pub fn encode(&self, own: LogicalAddress) -> Vec<u8> {
        let source = self.source.unwrap_or(own);
        let mut frame = vec![(source.value() << 4) | self.target.value(), self.opcode];
        for arg in &self.args {
            frame.extend(arg.to_bytes());
        }
        frame
    }
}

fn parse_opcode(token: &str) -> Result<u8, MonitorError> {
    let token = token.trim();
    let invalid = || MonitorError::InvalidArgument(format!("unknown opcode {}", token));

    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return u8::from_str_radix(hex, 16).map_err(|_| invalid());
    }
    if let Some(opcode) = Opcode::from_name(token) {
        return Ok(opcode.value());
    }
    token.parse::<u8>().map_err(|_| invalid())
}

/// `tx` line for a frame, e.g. `tx 4f:82:20:00`
pub fn format_tx(frame: &[u8]) -> String {
    let bytes: Vec<String> = frame.iter().map(|b| format!("{:02x}", b)).collect();
    format!("tx {}", bytes.join(":"))
}

struct PendingCommand {
    id: u64,
    target: LogicalAddress,
    expected: Opcode,
    reply: oneshot::Sender<DecodedEvent>,
}

/// Outstanding commands waiting for a reply, oldest first
#[derive(Default)]
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<Vec<PendingCommand>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `expected` from `target`
    pub fn register(
        self: &Arc<Self>,
        target: LogicalAddress,
        expected: Opcode,
        timeout: Duration,
    ) -> PendingReply {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock().push(PendingCommand {
            id,
            target,
            expected,
            reply: tx,
        });
        PendingReply {
            id,
            target,
            expected,
            timeout,
            deadline: Instant::now() + timeout,
            rx,
            correlator: Arc::clone(self),
        }
    }

    /// Hand an inbound event to the oldest matching registration
    pub fn resolve(&self, event: &DecodedEvent) -> bool {
        if !event.packet.is_inbound() {
            return false;
        }
        let Some(opcode) = event.opcode() else {
            return false;
        };

        let mut pending = self.lock();
        let Some(index) = pending
            .iter()
            .position(|p| p.target == event.packet.source && p.expected == opcode)
        else {
            return false;
        };

        let entry = pending.remove(index);
        debug!(id = entry.id, target = %entry.target, expected = %opcode, "Command answered");
        let _ = entry.reply.send(event.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration; waiters see the session as closed
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn cancel(&self, id: u64) {
        self.lock().retain(|p| p.id != id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingCommand>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one registration; dropping it cancels the registration
pub struct PendingReply {
    id: u64,
    target: LogicalAddress,
    expected: Opcode,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<DecodedEvent>,
    correlator: Arc<Correlator>,
}

impl PendingReply {
    pub async fn wait(mut self) -> Result<DecodedEvent, MonitorError> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(MonitorError::Closed),
            Err(_) => {
                debug!(id = self.id, target = %self.target, expected = %self.expected, "Command timed out");
                Err(MonitorError::Timeout {
                    target: self.target,
                    expected: self.expected,
                    waited: self.timeout,
                })
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.correlator.cancel(self.id);
    }
}

impl Monitor {
    /// Transmit a frame; fails immediately when the adapter is not ready
    pub async fn send_message(&self, message: &Message) -> Result<(), MonitorError> {
        let own = self.own_address().await;
        self.write_raw(&format_tx(&message.encode(own))).await
    }

    /// Transmit several frames back to back
    pub async fn send_sequence(&self, messages: &[Message]) -> Result<(), MonitorError> {
        let own = self.own_address().await;
        let lines: Vec<String> = messages
            .iter()
            .map(|m| format_tx(&m.encode(own)))
            .collect();
        self.write_lines(&lines).await
    }

    /// Transmit a frame and wait for `expected` from its target
    pub async fn send_command(
        &self,
        message: &Message,
        expected: Opcode,
    ) -> Result<DecodedEvent, MonitorError> {
        if !self.is_ready() {
            return Err(MonitorError::NotReady);
        }
        let reply =
            self.correlator
                .register(message.target, expected, self.config().command_timeout);
        self.send_message(message).await?;
        reply.wait().await
    }
}
