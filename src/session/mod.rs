//! Streaming session contract with the music-generation backend.
//!
//! The backend is an opaque bidirectional stream. A connection is opened with
//! a model name and a signal channel; the returned handle accepts prompt
//! updates and playback directives, while everything the server pushes comes
//! back through the channel as [`SessionSignal`]s.

pub mod protocol;
pub mod websocket;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::CoreError;

pub use protocol::{AudioChunk, FilteredPrompt, ServerContent, ServerMessage, WirePrompt};
pub use websocket::LiveMusicBackend;

/// One inbound event for a connection. `Error` and `Closed` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    Message(ServerMessage),
    Error(String),
    Closed(String),
}

/// Sender half handed to the backend at connect time.
pub type SignalSender = mpsc::UnboundedSender<SessionSignal>;

/// One open streaming connection.
///
/// Each call resolves once the backend has accepted the frame; any failure is
/// reported as [`CoreError::Connection`].
pub trait MusicSession: Send + Sync {
    fn set_weighted_prompts(&self, prompts: Vec<WirePrompt>) -> BoxFuture<'_, Result<(), CoreError>>;

    fn play(&self) -> BoxFuture<'_, Result<(), CoreError>>;

    fn pause(&self) -> BoxFuture<'_, Result<(), CoreError>>;

    fn stop(&self) -> BoxFuture<'_, Result<(), CoreError>>;

    /// Tear the transport down. No further signals are delivered.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Factory for sessions.
pub trait MusicBackend: Send + Sync {
    fn connect(
        &self,
        model: &str,
        signals: SignalSender,
    ) -> BoxFuture<'_, Result<Arc<dyn MusicSession>, CoreError>>;
}
