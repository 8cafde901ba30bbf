//! Periodic TV power polling

use cecd_core::protocol::power;
use cecd_core::{LogicalAddress, Opcode};
use cecd_monitor::{Message, Monitor, MonitorError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Ask the TV for its power status every `period` while the adapter is ready
pub async fn run(monitor: Arc<Monitor>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = period.as_secs(), "Power polling started");

    loop {
        ticker.tick().await;
        if !monitor.is_ready() {
            continue;
        }
        poll_once(&monitor).await;
    }
}

async fn poll_once(monitor: &Monitor) {
    let query = Message::new(LogicalAddress::TV, Opcode::GiveDevicePowerStatus);
    match monitor.send_command(&query, Opcode::ReportPowerStatus).await {
        Ok(event) => {
            let status = event.packet.args.first().copied();
            info!(
                power = status.and_then(power::name).unwrap_or("unknown"),
                "TV power status"
            );
        }
        Err(e @ MonitorError::Timeout { .. }) => warn!("TV did not report its power status: {}", e),
        Err(e) => debug!("Power poll skipped: {}", e),
    }
}
