//! MIDI bridge: device access, active-device selection, and Control Change
//! extraction.
//!
//! Access opens every input port. Each port's callback runs the same filter:
//! messages from anything but the active device are dropped, as is every
//! status byte outside 0xB0..=0xBF. What survives is published as a
//! [`ControlChange`] on the bridge's [`EventBus`].

use std::sync::{Arc, Mutex, MutexGuard};

use midir::{MidiInput, MidiInputConnection};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::events::EventBus;

const CLIENT_NAME: &str = "promptdj";

/// A normalized Control Change message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlChange {
    /// Low nibble of the status byte.
    pub channel: u8,
    #[serde(rename = "cc")]
    pub control: u8,
    pub value: u8,
}

impl ControlChange {
    /// Parse a raw message; `None` unless it is a complete Control Change.
    pub fn parse(message: &[u8]) -> Option<Self> {
        match message {
            [status, control, value, ..] if status & 0xF0 == 0xB0 => Some(Self {
                channel: status & 0x0F,
                control: *control,
                value: *value,
            }),
            _ => None,
        }
    }
}

/// Input device id and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MidiDevice {
    pub id: String,
    pub name: String,
}

#[derive(Default)]
struct BridgeState {
    devices: Vec<MidiDevice>,
    active: Option<String>,
    connections: Vec<MidiInputConnection<()>>,
}

struct Shared {
    state: Mutex<BridgeState>,
    events: EventBus<ControlChange>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn handle_message(&self, device_id: &str, message: &[u8]) -> Option<ControlChange> {
        {
            let state = self.lock();
            if state.active.as_deref() != Some(device_id) {
                return None;
            }
        }
        let cc = ControlChange::parse(message)?;
        self.events.publish(cc);
        Some(cc)
    }
}

/// Cloneable handle to the MIDI bridge.
#[derive(Clone)]
pub struct MidiBridge {
    shared: Arc<Shared>,
}

impl MidiBridge {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BridgeState::default()),
                events: EventBus::new(),
            }),
        }
    }

    /// Open every input port and start listening.
    ///
    /// Returns the device ids. The first device becomes active if none was
    /// selected before. Calling again re-opens the ports, picking up devices
    /// plugged in since.
    pub fn acquire_access(&self) -> Result<Vec<String>, CoreError> {
        let scanner = MidiInput::new(CLIENT_NAME)
            .map_err(|e| CoreError::MidiUnsupported(e.to_string()))?;
        let ports = scanner.ports();

        let mut devices = Vec::with_capacity(ports.len());
        let mut connections = Vec::with_capacity(ports.len());
        for port in &ports {
            let id = port.id();
            let name = scanner.port_name(port).unwrap_or_else(|_| id.clone());

            let input = MidiInput::new(CLIENT_NAME)
                .map_err(|e| CoreError::MidiUnsupported(e.to_string()))?;
            let Some(port) = input.find_port_by_id(id.clone()) else {
                warn!(device = %name, "MIDI port vanished during access");
                continue;
            };
            let shared = self.shared.clone();
            let device_id = id.clone();
            let connection = input
                .connect(
                    &port,
                    CLIENT_NAME,
                    move |_stamp, message, _| {
                        shared.handle_message(&device_id, message);
                    },
                    (),
                )
                .map_err(|e| CoreError::MidiAccessDenied(format!("{}: {}", name, e)))?;
            debug!(device = %name, "MIDI input connected");
            connections.push(connection);
            devices.push(MidiDevice { id, name });
        }

        let ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
        let stale = {
            let mut state = self.shared.lock();
            state.devices = devices;
            if state.active.is_none() {
                state.active = ids.first().cloned();
            }
            info!(devices = ids.len(), active = ?state.active, "MIDI access acquired");
            std::mem::replace(&mut state.connections, connections)
        };
        // Closing a port may wait on its callback, which takes the lock.
        drop(stale);
        Ok(ids)
    }

    /// Devices known from the last access, without re-requesting it.
    pub fn list_devices(&self) -> Vec<MidiDevice> {
        self.shared.lock().devices.clone()
    }

    pub fn set_active_device(&self, id: &str) {
        info!(device = %id, "MIDI device selected");
        self.shared.lock().active = Some(id.to_string());
    }

    pub fn active_device(&self) -> Option<String> {
        self.shared.lock().active.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ControlChange> {
        self.shared.events.subscribe()
    }

    /// Filter one raw message from `device_id`, publishing it if it is a
    /// Control Change from the active device.
    pub fn handle_message(&self, device_id: &str, message: &[u8]) -> Option<ControlChange> {
        self.shared.handle_message(device_id, message)
    }
}

impl Default for MidiBridge {
    fn default() -> Self {
        Self::new()
    }
}
