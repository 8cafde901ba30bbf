//! Adapter session: line dispatch, event bus and adapter input
//!
//! Every line read from the adapter is classified, decoded where it carries a
//! frame, and published on a broadcast channel. Handlers run on the session
//! task one line at a time.

use cecd_core::{
    classify, decode_event, decode_packet, line, parse_own_address, DecodeError, DecodedEvent,
    LineCategory, LogicalAddress, Opcode, Packet, PhysicalAddress,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::command::Correlator;
use crate::error::MonitorError;
use crate::supervisor::AdapterParams;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Monitor settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub adapter: AdapterParams,
    /// Restart after an unexpected adapter exit
    pub auto_restart: bool,
    pub restart_delay: Duration,
    /// How long `send_command` waits for the expected reply
    pub command_timeout: Duration,
    pub user_control_hold_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterParams::default(),
            auto_restart: true,
            restart_delay: Duration::from_secs(15),
            command_timeout: Duration::from_secs(3),
            user_control_hold_interval: Duration::from_secs(1),
        }
    }
}

/// Events published on the monitor bus
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Adapter printed its readiness line
    Ready,
    /// Adapter is gone and will not be restarted
    Stopped { reason: Option<String> },
    /// Adapter exited and a restart is scheduled
    Restarting { delay: Duration },
    /// Every raw output line
    Line {
        category: LineCategory,
        line: String,
    },
    /// Frame parsed from a traffic or debug line
    Packet(Packet),
    Decoded(DecodedEvent),
    DecodeError { packet: Packet, error: DecodeError },
    /// Repeated while a remote control key is held
    UserControlHold(DecodedEvent),
}

/// Last device that announced itself with ACTIVE_SOURCE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveSource {
    pub logical: LogicalAddress,
    pub physical: PhysicalAddress,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Adapter closed its output
    Eof,
    ReadError(String),
    /// Adapter rejected a command; the session is out of sync
    Desync,
    /// Stop was requested
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineOutcome {
    Continue,
    Desync,
}

type AdapterInput = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared handle to the adapter session
pub struct Monitor {
    config: MonitorConfig,
    events: broadcast::Sender<MonitorEvent>,
    ready: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    own_address: RwLock<LogicalAddress>,
    active_source: RwLock<Option<ActiveSource>>,
    input: Mutex<Option<AdapterInput>>,
    hold: Mutex<Option<JoinHandle<()>>>,
    pub(crate) correlator: Arc<Correlator>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let own_address = config.adapter.device_type.default_address();
        Arc::new(Self {
            config,
            events,
            ready: watch::Sender::new(false),
            shutdown: watch::Sender::new(false),
            own_address: RwLock::new(own_address),
            active_source: RwLock::new(None),
            input: Mutex::new(None),
            hold: Mutex::new(None),
            correlator: Arc::new(Correlator::new()),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Logical address the adapter registered as
    pub async fn own_address(&self) -> LogicalAddress {
        *self.own_address.read().await
    }

    pub async fn active_source(&self) -> Option<ActiveSource> {
        *self.active_source.read().await
    }

    /// Commands still waiting for their reply
    pub fn pending_commands(&self) -> usize {
        self.correlator.len()
    }

    /// Wait until the adapter reports readiness
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), MonitorError> {
        let mut ready = self.ready.subscribe();
        let outcome = tokio::time::timeout(timeout, ready.wait_for(|ready| *ready))
            .await
            .map(|waited| waited.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(MonitorError::Closed),
            Err(_) => Err(MonitorError::ReadyTimeout(timeout)),
        }
    }

    pub(crate) fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub(crate) fn clear_shutdown(&self) {
        self.shutdown.send_replace(false);
    }

    /// Resolves once a stop has been requested
    pub(crate) async fn shutdown_requested(&self) {
        let mut shutdown = self.shutdown.subscribe();
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run one adapter session until its output ends, it desyncs or stop is requested
    pub async fn run_session<R, W>(&self, reader: R, writer: W) -> SessionEnd
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        *self.input.lock().await = Some(Box::new(writer));
        let mut lines = BufReader::new(reader).lines();

        let end = loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if self.process_line(&line).await == LineOutcome::Desync {
                            break SessionEnd::Desync;
                        }
                    }
                    Ok(None) => break SessionEnd::Eof,
                    Err(e) => break SessionEnd::ReadError(e.to_string()),
                },
                _ = self.shutdown_requested() => break SessionEnd::Shutdown,
            }
        };

        debug!(?end, "Adapter session ended");
        self.end_session().await;
        end
    }

    async fn end_session(&self) {
        self.ready.send_replace(false);
        self.input.lock().await.take();
        self.stop_hold().await;
        self.correlator.clear();
    }

    async fn process_line(&self, line: &str) -> LineOutcome {
        let category = classify(line);
        let mut outcome = LineOutcome::Continue;

        match category {
            LineCategory::Traffic => {
                trace!("{}", line);
                self.process_traffic(line).await;
            }
            LineCategory::Debug => {
                trace!("{}", line);
                if let Some(packet) = decode_packet(line) {
                    self.publish(MonitorEvent::Packet(packet));
                }
            }
            LineCategory::Notice => {
                debug!("{}", line);
                if let Some(address) = parse_own_address(line) {
                    info!(logical = %address, "Adapter registered on the bus");
                    *self.own_address.write().await = address;
                }
            }
            LineCategory::Ready => {
                info!("Adapter ready");
                self.ready.send_replace(true);
                self.publish(MonitorEvent::Ready);
            }
            LineCategory::Warning => {
                warn!("{}", line);
                if line::is_command_rejected(line) {
                    self.ready.send_replace(false);
                    outcome = LineOutcome::Desync;
                }
            }
            LineCategory::Error => error!("{}", line),
            LineCategory::Unclassified => trace!("{}", line),
        }

        self.publish(MonitorEvent::Line {
            category,
            line: line.to_string(),
        });
        outcome
    }

    async fn process_traffic(&self, line: &str) {
        let Some(packet) = decode_packet(line) else {
            debug!(line, "Traffic line without a frame");
            return;
        };
        self.publish(MonitorEvent::Packet(packet.clone()));

        match decode_event(&packet) {
            Ok(event) => {
                self.apply_event(&event).await;
                self.correlator.resolve(&event);
                self.publish(MonitorEvent::Decoded(event));
            }
            Err(error) => {
                debug!(%error, "Dropping undecodable packet");
                if packet.known_opcode() == Some(Opcode::UserControlRelease) {
                    self.stop_hold().await;
                }
                self.publish(MonitorEvent::DecodeError { packet, error });
            }
        }
    }

    /// Session bookkeeping driven by decoded events
    async fn apply_event(&self, event: &DecodedEvent) {
        match event.opcode() {
            Some(Opcode::ActiveSource) => {
                if let Some(physical) = event.data.physical_address() {
                    debug!(logical = %event.packet.source, physical = %physical, "Active source changed");
                    *self.active_source.write().await = Some(ActiveSource {
                        logical: event.packet.source,
                        physical,
                    });
                }
            }
            Some(Opcode::UserControlPressed) => self.start_hold(event.clone()).await,
            Some(Opcode::UserControlRelease) => self.stop_hold().await,
            _ => {}
        }
    }

    async fn start_hold(&self, event: DecodedEvent) {
        let events = self.events.clone();
        let period = self.config.user_control_hold_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let _ = events.send(MonitorEvent::UserControlHold(event.clone()));
            }
        });

        if let Some(previous) = self.hold.lock().await.replace(task) {
            previous.abort();
        }
    }

    async fn stop_hold(&self) {
        if let Some(task) = self.hold.lock().await.take() {
            task.abort();
        }
    }

    /// Write one line to the adapter input
    pub async fn write_raw(&self, line: &str) -> Result<(), MonitorError> {
        self.write_lines(&[line]).await
    }

    /// Write several lines without interleaving other writers
    pub async fn write_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<(), MonitorError> {
        if !self.is_ready() {
            return Err(MonitorError::NotReady);
        }
        let mut input = self.input.lock().await;
        let writer = input.as_mut().ok_or(MonitorError::NotReady)?;

        for line in lines {
            let line = line.as_ref();
            debug!(command = %line, "Writing to adapter");
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }
}
