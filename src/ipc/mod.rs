//! IPC protocol types for communication with the presentation layer.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (engine -> UI).
//! Commands use `{"command": "<name>", ...}` format (UI -> engine).

pub mod bridge;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audio::state::PlaybackState;
use crate::events::CoordinatorEvent;
use crate::midi::{ControlChange, MidiDevice};
use crate::prompts::io::PromptEntry;
use crate::prompts::{FilteredTexts, PromptSet};

// ---------------------------------------------------------------------------
// Events: engine -> UI (stdout)
// ---------------------------------------------------------------------------

/// A prompt as shown to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptView {
    #[serde(flatten)]
    pub entry: PromptEntry,
    /// The backend rejected this prompt's text for the current session.
    pub filtered: bool,
}

impl PromptView {
    pub fn list(prompts: &PromptSet, filtered: &FilteredTexts) -> Vec<Self> {
        prompts
            .iter()
            .map(|p| PromptView {
                entry: PromptEntry::from(p),
                filtered: filtered.contains(&p.text),
            })
            .collect()
    }
}

/// All events emitted via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum EngineEvent {
    Starting {},
    Ready {},
    Pong {},
    Stopping {},
    PlaybackState {
        state: PlaybackState,
    },
    FilteredPrompt {
        text: String,
        reason: String,
    },
    Error {
        message: String,
    },
    Prompts {
        prompts: Vec<PromptView>,
    },
    MidiDevices {
        devices: Vec<MidiDevice>,
        active: Option<String>,
    },
    ControlChange {
        channel: u8,
        cc: u8,
        value: u8,
    },
    RecordingStarted {
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    RecordingSaved {
        path: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        bytes: usize,
    },
    RecordingEmpty {},
    OutputDevices {
        devices: Vec<String>,
    },
}

impl From<CoordinatorEvent> for EngineEvent {
    fn from(event: CoordinatorEvent) -> Self {
        match event {
            CoordinatorEvent::PlaybackState { state } => Self::PlaybackState { state },
            CoordinatorEvent::FilteredPrompt { text, reason } => {
                Self::FilteredPrompt { text, reason }
            }
            CoordinatorEvent::Error { message } => Self::Error { message },
        }
    }
}

impl From<ControlChange> for EngineEvent {
    fn from(cc: ControlChange) -> Self {
        Self::ControlChange {
            channel: cc.channel,
            cc: cc.control,
            value: cc.value,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands: UI -> engine (stdin)
// ---------------------------------------------------------------------------

/// All commands received via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum EngineCommand {
    Ping {},
    Shutdown {},
    Play {},
    Pause {},
    Stop {},
    Toggle {},
    SetPrompts {
        prompts: Vec<PromptEntry>,
    },
    SetWeight {
        #[serde(rename = "promptId")]
        prompt_id: String,
        weight: f32,
    },
    SetText {
        #[serde(rename = "promptId")]
        prompt_id: String,
        text: String,
    },
    GetPrompts {},
    ImportPrompts {
        path: PathBuf,
    },
    ExportPrompts {
        path: PathBuf,
    },
    RequestMidiAccess {},
    ListMidiDevices {},
    SetMidiDevice {
        id: String,
    },
    LearnCc {
        #[serde(rename = "promptId")]
        prompt_id: String,
    },
    StartRecording {},
    StopRecording {},
    ListOutputDevices {},
}
