//! Playback and connection state enums.
//!
//! The coordinator owns the single authoritative value of each; everything
//! else observes them through published events.

use serde::{Deserialize, Serialize};

/// Playback states broadcast to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PlaybackState {
    /// Nothing is playing and no session is held.
    #[default]
    Stopped = 0,
    /// Waiting for the look-ahead cushion to fill (initial buffering or
    /// recovery from an underrun).
    Loading = 1,
    /// Audio is flowing.
    Playing = 2,
    /// Session kept, output muted, inbound audio ignored.
    Paused = 3,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Loading => write!(f, "loading"),
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// What a play/pause toggle does from a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Play,
    Pause,
    Stop,
}

impl PlaybackState {
    /// `playing -> pause`, `paused|stopped -> play`, `loading -> stop`.
    ///
    /// Toggling while still loading cancels to stopped rather than retrying.
    pub fn toggle_action(self) -> ToggleAction {
        match self {
            Self::Playing => ToggleAction::Pause,
            Self::Paused | Self::Stopped => ToggleAction::Play,
            Self::Loading => ToggleAction::Stop,
        }
    }

    /// Inbound audio is dropped in these states.
    pub fn ignores_audio(self) -> bool {
        matches!(self, Self::Paused | Self::Stopped)
    }
}

/// Lifecycle of the backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last connection ended with an error; cleared by the next attempt
    /// or by a setup-complete signal.
    Erroring,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Erroring => write!(f, "erroring"),
        }
    }
}
