//! Publish/subscribe plumbing and the events the core raises upstream.
//!
//! Components own an [`EventBus`] and publish to it; any presentation layer
//! subscribes and reflects the events back into its view.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::audio::state::PlaybackState;

/// Default channel depth for event buses.
const DEFAULT_CAPACITY: usize = 256;

/// A small broadcast-backed pub/sub utility.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// simply dropped.
#[derive(Debug, Clone)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver `event` to every current subscriber.
    pub fn publish(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Events raised by the coordinator and the recording sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorEvent {
    /// The authoritative playback state changed.
    PlaybackState { state: PlaybackState },
    /// The backend rejected a prompt's text for the current session.
    FilteredPrompt { text: String, reason: String },
    /// A user-visible failure notice.
    Error { message: String },
}

impl CoordinatorEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
