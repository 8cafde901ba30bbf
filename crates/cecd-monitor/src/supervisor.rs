//! Launching and restarting the `cec-client` process

use cecd_core::DeviceType;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::MonitorError;
use crate::monitor::{Monitor, MonitorEvent, SessionEnd};

/// Command line parameters for the adapter process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterParams {
    /// Adapter executable, resolved through `PATH`
    pub program: String,
    /// Device type the adapter registers as (`-t`)
    pub device_type: DeviceType,
    /// Advertised OSD name (`-o`)
    pub osd_name: String,
    /// HDMI input port the adapter is plugged into (`-p`)
    pub hdmi_port: u8,
    /// Bus port identifier, autodetected when absent
    pub com_port: Option<String>,
    /// `cec-client` log mask (`-d`)
    pub log_mask: u8,
}

impl Default for AdapterParams {
    fn default() -> Self {
        Self {
            program: "cec-client".to_string(),
            device_type: DeviceType::default(),
            osd_name: "cecd".to_string(),
            hdmi_port: 1,
            com_port: None,
            log_mask: 31,
        }
    }
}

impl AdapterParams {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-t".to_string(),
            self.device_type.flag().to_string(),
            "-o".to_string(),
            self.osd_name.clone(),
            "-d".to_string(),
            self.log_mask.to_string(),
            "-p".to_string(),
            self.hdmi_port.to_string(),
        ];
        if let Some(port) = &self.com_port {
            args.push(port.clone());
        }
        args
    }
}

/// A running adapter with its captured pipes
pub struct AdapterProcess {
    pub child: Child,
    pub stdout: ChildStdout,
    pub stdin: ChildStdin,
}

/// Spawn the adapter with piped stdin/stdout
pub fn spawn_adapter(params: &AdapterParams) -> Result<AdapterProcess, MonitorError> {
    let mut child = Command::new(&params.program)
        .args(params.args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => MonitorError::AdapterNotFound(params.program.clone()),
            _ => MonitorError::Spawn {
                program: params.program.clone(),
                source: e,
            },
        })?;

    let missing = |pipe: &str| MonitorError::Spawn {
        program: params.program.clone(),
        source: std::io::Error::other(format!("{} not captured", pipe)),
    };
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;

    Ok(AdapterProcess {
        child,
        stdout,
        stdin,
    })
}

impl Monitor {
    /// Launch the adapter and supervise it in the background
    ///
    /// Fails right away when the executable cannot be launched. Readiness is
    /// signalled later through [`MonitorEvent::Ready`] or [`Monitor::wait_for_ready`].
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, MonitorError> {
        let params = &self.config().adapter;
        let process = spawn_adapter(params)?;
        self.clear_shutdown();
        info!(program = %params.program, args = ?params.args(), "Adapter started");

        let monitor = Arc::clone(self);
        Ok(tokio::spawn(async move { monitor.supervise(process).await }))
    }

    /// Request the adapter to stop; the supervisor publishes `Stopped`
    pub fn stop(&self) {
        info!("Stopping adapter");
        self.request_shutdown();
    }

    async fn supervise(self: Arc<Self>, mut process: AdapterProcess) {
        loop {
            let AdapterProcess {
                mut child,
                stdout,
                stdin,
            } = process;

            let end = self.run_session(stdout, stdin).await;

            let _ = child.start_kill();
            let status = match child.wait().await {
                Ok(status) => status.to_string(),
                Err(e) => e.to_string(),
            };

            match &end {
                SessionEnd::Shutdown => {
                    info!("Adapter stopped");
                    self.publish(MonitorEvent::Stopped { reason: None });
                    return;
                }
                SessionEnd::Desync => {
                    warn!("Adapter rejected a command, restarting session");
                }
                SessionEnd::Eof | SessionEnd::ReadError(_) if !self.config().auto_restart => {
                    let reason = match &end {
                        SessionEnd::ReadError(e) => format!("read error: {}", e),
                        _ => format!("adapter exited: {}", status),
                    };
                    warn!(%reason, "Adapter terminated");
                    self.publish(MonitorEvent::Stopped {
                        reason: Some(reason),
                    });
                    return;
                }
                _ => {
                    warn!(%status, "Adapter exited unexpectedly, restarting");
                }
            }

            let delay = self.config().restart_delay;
            self.publish(MonitorEvent::Restarting { delay });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_requested() => {
                    info!("Adapter stopped during restart delay");
                    self.publish(MonitorEvent::Stopped { reason: None });
                    return;
                }
            }

            process = match spawn_adapter(&self.config().adapter) {
                Ok(process) => {
                    info!("Adapter restarted");
                    process
                }
                Err(e) => {
                    error!("Failed to restart adapter: {}", e);
                    self.publish(MonitorEvent::Stopped {
                        reason: Some(e.to_string()),
                    });
                    return;
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorConfig;
    use std::time::Duration;

    #[test]
    fn test_default_args() {
        let params = AdapterParams::default();
        assert_eq!(
            params.args(),
            vec!["-t", "r", "-o", "cecd", "-d", "31", "-p", "1"]
        );
    }

    #[test]
    fn test_args_with_com_port() {
        let params = AdapterParams {
            device_type: DeviceType::Playback,
            osd_name: "Living Room".to_string(),
            hdmi_port: 3,
            com_port: Some("/dev/ttyACM0".to_string()),
            ..Default::default()
        };
        let args = params.args();
        assert_eq!(args[1], "p");
        assert_eq!(args[3], "Living Room");
        assert_eq!(args[7], "3");
        assert_eq!(args.last().map(String::as_str), Some("/dev/ttyACM0"));
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let params = AdapterParams {
            program: "cecd-test-no-such-adapter".to_string(),
            ..Default::default()
        };
        match spawn_adapter(&params) {
            Err(MonitorError::AdapterNotFound(program)) => {
                assert_eq!(program, "cecd-test-no-such-adapter")
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_without_restart_publishes_stopped() {
        let monitor = Monitor::new(MonitorConfig {
            adapter: AdapterParams {
                program: "true".to_string(),
                ..Default::default()
            },
            auto_restart: false,
            ..Default::default()
        });
        let mut events = monitor.subscribe();

        let handle = monitor.start().unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let mut stopped = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let MonitorEvent::Stopped { reason } = event {
                stopped.push(reason);
            }
        }
        assert_eq!(stopped.len(), 1);
        assert!(stopped[0].as_deref().unwrap().starts_with("adapter exited"));
        assert!(!monitor.is_ready());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_during_restart_delay() {
        let monitor = Monitor::new(MonitorConfig {
            adapter: AdapterParams {
                program: "true".to_string(),
                ..Default::default()
            },
            auto_restart: true,
            restart_delay: Duration::from_secs(3600),
            ..Default::default()
        });
        let mut events = monitor.subscribe();
        let handle = monitor.start().unwrap();

        loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap()
            {
                MonitorEvent::Restarting { .. } => break,
                MonitorEvent::Stopped { .. } => panic!("stopped must be suppressed"),
                _ => {}
            }
        }

        monitor.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        let mut reasons = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let MonitorEvent::Stopped { reason } = event {
                reasons.push(reason);
            }
        }
        assert_eq!(reasons, vec![None]);
    }
}
