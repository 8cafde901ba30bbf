//! WebSocket handler for registry updates and bus traffic

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use cecd_core::Packet;
use cecd_discovery::{DeviceRecord, DiscoveryEvent};
use cecd_monitor::MonitorEvent;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// WebSocket message types
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum WsMessage {
    Device(DeviceRecord),
    Registry(DiscoveryEvent),
    AdapterReady,
    AdapterStopped { reason: Option<String> },
    AdapterRestarting { delay_secs: u64 },
    Packet(Packet),
    DecodeError { packet: Packet, error: String },
    Pong,
}

/// Bus events worth forwarding to clients
fn monitor_message(event: MonitorEvent) -> Option<WsMessage> {
    let msg = match event {
        MonitorEvent::Ready => WsMessage::AdapterReady,
        MonitorEvent::Stopped { reason } => WsMessage::AdapterStopped { reason },
        MonitorEvent::Restarting { delay } => WsMessage::AdapterRestarting {
            delay_secs: delay.as_secs(),
        },
        MonitorEvent::Packet(packet) => WsMessage::Packet(packet),
        MonitorEvent::DecodeError { packet, error } => WsMessage::DecodeError {
            packet,
            error: error.to_string(),
        },
        MonitorEvent::Line { .. } | MonitorEvent::Decoded(_) | MonitorEvent::UserControlHold(_) => {
            return None
        }
    };
    Some(msg)
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut registry_events = state.discovery.subscribe();
    let mut bus_events = state.monitor.subscribe();

    info!("WebSocket client connected");

    // Send current device list on connect
    for device in state.discovery.devices().await {
        if let Ok(json) = serde_json::to_string(&WsMessage::Device(device)) {
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    }

    loop {
        let msg = tokio::select! {
            event = registry_events.recv() => match event {
                Ok(event) => WsMessage::Registry(event),
                Err(RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Registry event channel lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },

            event = bus_events.recv() => match event {
                Ok(event) => match monitor_message(event) {
                    Some(msg) => msg,
                    None => continue,
                },
                Err(RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Bus event channel lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },

            msg = receiver.next() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                    continue;
                }
                Some(Ok(Message::Text(text))) if text.as_str() == "ping" => WsMessage::Pong,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => continue,
            },
        };

        match serde_json::to_string(&msg) {
            Ok(json) => {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize WebSocket message"),
        }
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cecd_core::{decode_event, decode_packet};
    use std::time::Duration;

    #[test]
    fn test_packet_message() {
        let packet = decode_packet("TRAFFIC: [  17]\t>> 0f:36").unwrap();
        let msg = monitor_message(MonitorEvent::Packet(packet)).unwrap();
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "packet");
        assert_eq!(json["data"]["source"], 0);
        assert_eq!(json["data"]["target"], 15);
        assert_eq!(json["data"]["direction"], "inbound");
    }

    #[test]
    fn test_adapter_messages() {
        let json = serde_json::to_value(
            monitor_message(MonitorEvent::Restarting {
                delay: Duration::from_secs(15),
            })
            .unwrap(),
        )
        .unwrap();
        assert_eq!(json["type"], "adapter_restarting");
        assert_eq!(json["data"]["delay_secs"], 15);

        let json = serde_json::to_value(monitor_message(MonitorEvent::Ready).unwrap()).unwrap();
        assert_eq!(json["type"], "adapter_ready");
    }

    #[test]
    fn test_decoded_events_are_not_forwarded() {
        let event = decode_event(&decode_packet(">> 01:90:00").unwrap()).unwrap();
        assert!(monitor_message(MonitorEvent::Decoded(event.clone())).is_none());
        assert!(monitor_message(MonitorEvent::UserControlHold(event)).is_none());
    }

    #[test]
    fn test_registry_message() {
        let msg = WsMessage::Registry(DiscoveryEvent::DeviceRegistered {
            name: "Kodi".to_string(),
        });
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "registry");
        assert_eq!(json["data"]["type"], "device_registered");
        assert_eq!(json["data"]["name"], "Kodi");
    }
}
