//! Attribute writes and global actions turned into bus traffic

use cecd_core::protocol::{deck, menu, user_control};
use cecd_core::{LogicalAddress, Opcode, PhysicalAddress};
use cecd_discovery::{Attribute, AttributeError, AttributeValue, DeviceRecord};
use cecd_monitor::{Message, MonitorError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::state::AppState;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Device {0} is not active on the bus")]
    NotOnBus(String),
    #[error("No physical address known for {0}")]
    NoPhysicalAddress(String),
    #[error("No active source known")]
    NoActiveSource,
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    Attribute(#[from] AttributeError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// Bus-wide operations not tied to one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    VolumeUp,
    VolumeDown,
    Mute,
    /// Step the audio system towards a level
    Volume(u32),
    StandbyAll,
    /// Announce a physical address as the active source
    ActiveSource(PhysicalAddress),
}

impl Action {
    pub fn parse(name: &str, value: Option<&AttributeValue>) -> Result<Self, CommandError> {
        let required = || {
            value.ok_or_else(|| CommandError::InvalidValue(format!("{} needs a value", name)))
        };
        let action = match name {
            "volumeUp" => Action::VolumeUp,
            "volumeDown" => Action::VolumeDown,
            "mute" => Action::Mute,
            "volume" => Action::Volume(required()?.as_number().ok_or_else(|| {
                CommandError::InvalidValue("volume must be a number".to_string())
            })?),
            "standbyAll" => Action::StandbyAll,
            "activeSource" => Action::ActiveSource(parse_port_address(&required()?.to_string())?),
            other => return Err(CommandError::UnknownAction(other.to_string())),
        };
        Ok(action)
    }
}

/// `2.1.0.0`, or a bare HDMI port `2` meaning `2.0.0.0`
pub fn parse_port_address(value: &str) -> Result<PhysicalAddress, CommandError> {
    let value = value.trim();
    let full = if value.len() == 1 {
        format!("{}.0.0.0", value)
    } else {
        value.to_string()
    };
    full.parse()
        .map_err(|_| CommandError::InvalidValue(format!("not a physical address: {}", value)))
}

fn as_bool(attribute: Attribute, value: &AttributeValue) -> Result<bool, AttributeError> {
    value.as_bool().ok_or_else(|| AttributeError::InvalidValue {
        attribute,
        reason: format!("expected a boolean, got {}", value),
    })
}

fn as_number(attribute: Attribute, value: &AttributeValue) -> Result<u32, AttributeError> {
    value.as_number().ok_or_else(|| AttributeError::InvalidValue {
        attribute,
        reason: format!("expected a number, got {}", value),
    })
}

fn on_bus(device: &DeviceRecord) -> Result<LogicalAddress, CommandError> {
    match device.logical_address {
        Some(logical) if device.active => Ok(logical),
        _ => Err(CommandError::NotOnBus(device.name.clone())),
    }
}

fn physical(device: &DeviceRecord) -> Result<PhysicalAddress, CommandError> {
    device
        .physical_address
        .ok_or_else(|| CommandError::NoPhysicalAddress(device.name.clone()))
}

/// Frame that moves a deck into the requested status
fn deck_message(target: LogicalAddress, status: u8) -> Option<Message> {
    let control = |code: u8| Message::new(target, Opcode::DeckControl).arg(code);
    let play = |mode: u8| Message::new(target, Opcode::Play).arg(mode);

    let message = match status {
        deck::STOP => control(deck::CONTROL_STOP),
        deck::SKIP_FORWARD | deck::INDEX_SEARCH_FORWARD => control(deck::CONTROL_SKIP_FORWARD_WIND),
        deck::SKIP_REVERSE | deck::INDEX_SEARCH_REVERSE => {
            control(deck::CONTROL_SKIP_REVERSE_REWIND)
        }
        deck::NO_MEDIA => control(deck::CONTROL_EJECT),
        deck::PLAY => play(deck::play::FORWARD),
        deck::PLAY_REVERSE => play(deck::play::REVERSE),
        deck::STILL => play(deck::play::STILL),
        deck::SLOW => play(deck::play::SLOW_FORWARD_MEDIUM),
        deck::SLOW_REVERSE => play(deck::play::SLOW_REVERSE_MEDIUM),
        deck::FAST_FORWARD => play(deck::play::FAST_FORWARD_MEDIUM),
        deck::FAST_REVERSE => play(deck::play::FAST_REVERSE_MEDIUM),
        deck::RECORD => Message::new(target, Opcode::RecordOn),
        _ => return None,
    };
    Some(message)
}

/// Translate a write of `attribute` on device `name` into bus commands
pub async fn write_attribute(
    state: &AppState,
    name: &str,
    attribute: Attribute,
    value: &AttributeValue,
) -> Result<(), CommandError> {
    if !attribute.is_writable() {
        return Err(AttributeError::ReadOnly(attribute).into());
    }
    let device = state
        .discovery
        .device(name)
        .await
        .ok_or_else(|| CommandError::DeviceNotFound(name.to_string()))?;
    let monitor = &state.monitor;

    info!(device = %name, attribute = %attribute, value = %value, "Attribute write");

    match attribute {
        Attribute::PowerState => {
            let logical = on_bus(&device)?;
            let verb = if as_bool(attribute, value)? { "on" } else { "standby" };
            monitor.write_raw(&format!("{} {}", verb, logical.hex())).await?;
        }
        Attribute::ActiveSource => {
            let logical = on_bus(&device)?;
            let address = physical(&device)?;
            let message = if as_bool(attribute, value)? {
                Message::new(LogicalAddress::BROADCAST, Opcode::ActiveSource)
            } else {
                Message::new(LogicalAddress::TV, Opcode::InactiveSource)
            };
            monitor
                .send_message(&message.from_source(logical).arg(address))
                .await?;
        }
        Attribute::MenuStatus => {
            let logical = on_bus(&device)?;
            let request = if as_bool(attribute, value)? {
                menu::ACTIVATE
            } else {
                menu::DEACTIVATE
            };
            let mut sequence = Vec::new();
            if logical == LogicalAddress::TV {
                sequence.push(Message::new(logical, Opcode::MenuRequest).arg(request));
            } else {
                // Menu requests are only honoured when they come from the TV
                sequence.push(
                    Message::new(logical, Opcode::MenuRequest)
                        .from_source(LogicalAddress::TV)
                        .arg(request),
                );
            }
            sequence.push(Message::new(logical, Opcode::MenuRequest).arg(menu::QUERY));
            monitor.send_sequence(&sequence).await?;
        }
        Attribute::Recording => {
            let logical = on_bus(&device)?;
            let opcode = if as_bool(attribute, value)? {
                Opcode::RecordTvScreen
            } else {
                Opcode::RecordOff
            };
            monitor.send_message(&Message::new(logical, opcode)).await?;
        }
        Attribute::Deck => {
            let logical = on_bus(&device)?;
            let status = u8::try_from(as_number(attribute, value)?).ok();
            let message = status
                .and_then(|s| deck_message(logical, s))
                .ok_or_else(|| AttributeError::InvalidValue {
                    attribute,
                    reason: format!("{} is not a deck command", value),
                })?;
            monitor.send_message(&message).await?;
        }
        Attribute::SystemAudio => set_system_audio(state, as_bool(attribute, value)?).await?,
        Attribute::Arc => {
            let opcode = if as_bool(attribute, value)? {
                Opcode::RequestArcStart
            } else {
                Opcode::RequestArcEnd
            };
            monitor
                .send_message(&Message::new(LogicalAddress::BROADCAST, opcode))
                .await?;
        }
        Attribute::Volume => set_volume(state, as_number(attribute, value)?).await?,
        _ => return Err(AttributeError::ReadOnly(attribute).into()),
    }
    Ok(())
}

/// Ask the audio system to follow the active source, or to stop doing so
async fn set_system_audio(state: &AppState, on: bool) -> Result<(), CommandError> {
    let source = state
        .monitor
        .active_source()
        .await
        .ok_or(CommandError::NoActiveSource)?;

    let mut message = Message::new(LogicalAddress::AUDIO_SYSTEM, Opcode::SystemAudioModeRequest)
        .from_source(source.logical);
    if on {
        message = message.arg(source.physical);
    }
    state
        .monitor
        .send_command(&message, Opcode::SetSystemAudioMode)
        .await?;
    Ok(())
}

/// Press and release a remote key on the audio system
///
/// The release is sent even when the audio status never arrives, so the key
/// does not stay held.
async fn press_button(state: &AppState, code: u8) -> Result<(), CommandError> {
    let monitor = &state.monitor;
    let pressed = monitor
        .send_command(
            &Message::new(LogicalAddress::AUDIO_SYSTEM, Opcode::UserControlPressed).arg(code),
            Opcode::ReportAudioStatus,
        )
        .await;
    if let Err(MonitorError::NotReady) = pressed {
        return Err(MonitorError::NotReady.into());
    }

    monitor
        .send_message(&Message::new(
            LogicalAddress::AUDIO_SYSTEM,
            Opcode::UserControlRelease,
        ))
        .await?;

    match pressed {
        Ok(event) => {
            debug!(
                button = user_control::name(code).unwrap_or("unknown"),
                status = ?event.packet.args,
                "Audio status after key press"
            );
            Ok(())
        }
        Err(e) => {
            warn!(button = user_control::name(code).unwrap_or("unknown"), "Key press unanswered: {}", e);
            Err(e.into())
        }
    }
}

/// One step towards `level`: mute for zero, up or down otherwise
async fn set_volume(state: &AppState, level: u32) -> Result<(), CommandError> {
    if level == 0 {
        return press_button(state, user_control::MUTE).await;
    }
    let current = state
        .discovery
        .device_at(LogicalAddress::AUDIO_SYSTEM)
        .await
        .filter(|d| d.active)
        .and_then(|d| d.attributes.get(&Attribute::Volume).and_then(|v| v.as_number()))
        .unwrap_or(0);

    if level == current {
        debug!(level, "Volume already at level");
        return Ok(());
    }
    let code = if level > current {
        user_control::VOLUME_UP
    } else {
        user_control::VOLUME_DOWN
    };
    press_button(state, code).await
}

pub async fn run_action(state: &AppState, action: &Action) -> Result<(), CommandError> {
    info!(action = ?action, "Running action");
    match action {
        Action::VolumeUp => press_button(state, user_control::VOLUME_UP).await,
        Action::VolumeDown => press_button(state, user_control::VOLUME_DOWN).await,
        Action::Mute => press_button(state, user_control::MUTE).await,
        Action::Volume(level) => set_volume(state, *level).await,
        Action::StandbyAll => {
            state
                .monitor
                .send_message(&Message::new(LogicalAddress::BROADCAST, Opcode::Standby))
                .await?;
            Ok(())
        }
        Action::ActiveSource(address) => {
            let sender = state
                .discovery
                .find_by_physical(*address)
                .await
                .and_then(|d| d.logical_address);
            let mut message =
                Message::new(LogicalAddress::BROADCAST, Opcode::ActiveSource).arg(*address);
            if let Some(sender) = sender {
                message = message.from_source(sender);
            }
            state.monitor.send_message(&message).await?;
            Ok(())
        }
    }
}

/// Pass a line to the adapter unchanged
pub async fn send_raw(state: &AppState, line: &str) -> Result<(), CommandError> {
    let line = line.trim();
    if line.is_empty() || line.contains('\n') {
        return Err(CommandError::InvalidValue("raw command must be one line".to_string()));
    }
    info!(command = %line, "Raw adapter command");
    state.monitor.write_raw(line).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{announce, ready_state, test_config};
    use crate::state::AppState;
    use std::sync::Arc;
    use std::time::Duration;

    const KODI_NAME: &str = "TRAFFIC: [  20]\t>> 4f:47:4b:6f:64:69";
    const KODI_ADDRESS: &str = "TRAFFIC: [  21]\t>> 4f:84:21:00:04";
    const AVR_NAME: &str = "TRAFFIC: [  22]\t>> 5f:47:41:56:52";

    async fn wait_for_physical_address(state: &AppState, name: &str) {
        for _ in 0..100 {
            if let Some(device) = state.discovery.device(name).await {
                if device.physical_address.is_some() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never reported a physical address", name);
    }

    async fn wait_for_volume(state: &AppState, level: u32) {
        for _ in 0..100 {
            if let Some(device) = state.discovery.device("AVR").await {
                if device.attributes.get(&Attribute::Volume) == Some(&AttributeValue::Number(level)) {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("AVR never reported volume {}", level);
    }

    /// Key presses seen before `expected`, skipping anything else
    async fn keys_until(adapter: &mut crate::state::tests::FakeAdapter, expected: &str) -> Vec<String> {
        let mut keys = Vec::new();
        for _ in 0..32 {
            let line = adapter.next_command().await;
            if line == expected {
                return keys;
            }
            if line.starts_with("tx 15:44") {
                keys.push(line);
            }
        }
        panic!("adapter never received {:?}", expected);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("volumeUp", None).unwrap(), Action::VolumeUp);
        assert_eq!(
            Action::parse("activeSource", Some(&"2".into())).unwrap(),
            Action::ActiveSource(PhysicalAddress(0x2000))
        );
        assert_eq!(
            Action::parse("activeSource", Some(&"2.1.0.0".into())).unwrap(),
            Action::ActiveSource(PhysicalAddress(0x2100))
        );
        assert_eq!(
            Action::parse("volume", Some(&AttributeValue::Number(30))).unwrap(),
            Action::Volume(30)
        );
        assert!(matches!(
            Action::parse("activeSource", None),
            Err(CommandError::InvalidValue(_))
        ));
        assert!(matches!(
            Action::parse("selfDestruct", None),
            Err(CommandError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_deck_messages() {
        let own = LogicalAddress::RECORDER_1;
        let encode = |status| deck_message(LogicalAddress::PLAYBACK_1, status).map(|m| m.encode(own));

        assert_eq!(encode(deck::PLAY), Some(vec![0x14, 0x41, 0x24]));
        assert_eq!(encode(deck::STOP), Some(vec![0x14, 0x42, 0x03]));
        assert_eq!(encode(deck::NO_MEDIA), Some(vec![0x14, 0x42, 0x04]));
        assert_eq!(encode(deck::RECORD), Some(vec![0x14, 0x09]));
        assert_eq!(encode(0x7f), None);
    }

    #[tokio::test]
    async fn test_read_only_and_unknown_device() {
        let state = AppState::new(test_config());

        assert!(matches!(
            write_attribute(&state, "Kodi", Attribute::CecVersion, &"1.4".into()).await,
            Err(CommandError::Attribute(AttributeError::ReadOnly(Attribute::CecVersion)))
        ));
        assert!(matches!(
            write_attribute(&state, "Kodi", Attribute::PowerState, &true.into()).await,
            Err(CommandError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_power_state_write() {
        let (state, mut adapter) = ready_state(test_config()).await;
        announce(&state, &mut adapter, KODI_NAME, "Kodi").await;

        write_attribute(&state, "Kodi", Attribute::PowerState, &false.into())
            .await
            .unwrap();
        adapter.expect("standby 4").await;

        write_attribute(&state, "Kodi", Attribute::PowerState, &"on".into())
            .await
            .unwrap();
        adapter.expect("on 4").await;
    }

    #[tokio::test]
    async fn test_active_source_write_needs_physical_address() {
        let (state, mut adapter) = ready_state(test_config()).await;
        announce(&state, &mut adapter, KODI_NAME, "Kodi").await;

        assert!(matches!(
            write_attribute(&state, "Kodi", Attribute::ActiveSource, &true.into()).await,
            Err(CommandError::NoPhysicalAddress(_))
        ));

        adapter.say(KODI_ADDRESS).await;
        wait_for_physical_address(&state, "Kodi").await;

        write_attribute(&state, "Kodi", Attribute::ActiveSource, &true.into())
            .await
            .unwrap();
        adapter.expect("tx 4f:82:21:00").await;
    }

    #[tokio::test]
    async fn test_menu_status_write_is_one_sequence() {
        let (state, mut adapter) = ready_state(test_config()).await;
        announce(&state, &mut adapter, KODI_NAME, "Kodi").await;

        write_attribute(&state, "Kodi", Attribute::MenuStatus, &true.into())
            .await
            .unwrap();
        adapter.expect("tx 04:8d:00").await;
        assert_eq!(adapter.next_command().await, "tx 14:8d:02");
    }

    #[tokio::test]
    async fn test_volume_up_waits_for_audio_status_then_releases() {
        let (state, mut adapter) = ready_state(test_config()).await;

        let runner = Arc::clone(&state);
        let task = tokio::spawn(async move { run_action(&runner, &Action::VolumeUp).await });

        adapter.expect("tx 15:44:41").await;
        adapter.say("TRAFFIC: [  30]\t>> 51:7a:21").await;
        adapter.expect("tx 15:45").await;
        task.await.unwrap().unwrap();
        assert_eq!(state.monitor.pending_commands(), 0);
    }

    #[tokio::test]
    async fn test_volume_steps_towards_known_level() {
        let mut config = test_config();
        config.known_devices.push(crate::config::KnownDeviceConfig {
            name: "AVR".to_string(),
            physical_address: None,
            vendor: None,
        });
        let (state, mut adapter) = ready_state(config).await;
        announce(&state, &mut adapter, AVR_NAME, "AVR").await;
        adapter.say("TRAFFIC: [  40]\t>> 51:7a:32").await;
        wait_for_volume(&state, 50).await;

        // Already there: nothing is pressed
        run_action(&state, &Action::Volume(50)).await.unwrap();
        assert_eq!(state.monitor.pending_commands(), 0);

        let runner = Arc::clone(&state);
        let task = tokio::spawn(async move { run_action(&runner, &Action::Volume(30)).await });
        assert!(keys_until(&mut adapter, "tx 15:44:42").await.is_empty());
        adapter.say("TRAFFIC: [  41]\t>> 51:7a:31").await;
        adapter.expect("tx 15:45").await;
        task.await.unwrap().unwrap();
        wait_for_volume(&state, 49).await;

        let runner = Arc::clone(&state);
        let task = tokio::spawn(async move { run_action(&runner, &Action::Volume(60)).await });
        assert!(keys_until(&mut adapter, "tx 15:44:41").await.is_empty());
        adapter.say("TRAFFIC: [  42]\t>> 51:7a:32").await;
        adapter.expect("tx 15:45").await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_arc_write_is_requested_from_own_address() {
        let (state, mut adapter) = ready_state(test_config()).await;
        announce(&state, &mut adapter, "TRAFFIC: [  23]\t>> 0f:36", "TV").await;

        write_attribute(&state, "TV", Attribute::Arc, &true.into())
            .await
            .unwrap();
        adapter.expect("tx 1f:c3").await;

        write_attribute(&state, "TV", Attribute::Arc, &false.into())
            .await
            .unwrap();
        adapter.expect("tx 1f:c4").await;
    }

    #[tokio::test]
    async fn test_system_audio_without_active_source() {
        let (state, _adapter) = ready_state(test_config()).await;

        assert!(matches!(
            write_attribute(&state, "Kodi", Attribute::SystemAudio, &true.into()).await,
            Err(CommandError::DeviceNotFound(_))
        ));
        assert!(matches!(
            set_system_audio(&state, true).await,
            Err(CommandError::NoActiveSource)
        ));
    }

    #[tokio::test]
    async fn test_active_source_action_uses_matching_sender() {
        let (state, mut adapter) = ready_state(test_config()).await;
        announce(&state, &mut adapter, KODI_NAME, "Kodi").await;
        adapter.say(KODI_ADDRESS).await;
        wait_for_physical_address(&state, "Kodi").await;

        // Port 2 matches Kodi at 2.1.0.0 by its first digit
        run_action(&state, &Action::ActiveSource(PhysicalAddress(0x2000)))
            .await
            .unwrap();
        adapter.expect("tx 4f:82:20:00").await;
    }

    #[tokio::test]
    async fn test_raw_and_standby_all() {
        let (state, mut adapter) = ready_state(test_config()).await;

        send_raw(&state, "  scan \n").await.unwrap();
        adapter.expect("scan").await;

        run_action(&state, &Action::StandbyAll).await.unwrap();
        adapter.expect("tx 1f:36").await;

        assert!(send_raw(&state, "   ").await.is_err());
    }

    #[tokio::test]
    async fn test_not_ready_is_reported() {
        let state = AppState::new(test_config());

        assert!(matches!(
            run_action(&state, &Action::Mute).await,
            Err(CommandError::Monitor(MonitorError::NotReady))
        ));
    }
}
