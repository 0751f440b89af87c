//! PromptDJ streaming core.
//!
//! Steers a real-time generative music stream from a set of weighted text
//! prompts. The [`coordinator`] owns the backend session and the playback
//! state machine; the [`audio`] graph schedules decoded chunks gap-free on a
//! sample clock; [`midi`] and [`recording`] sit at the edges.

pub mod audio;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod ipc;
pub mod logger;
pub mod midi;
pub mod prompts;
pub mod recording;
pub mod session;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{Coordinator, CoordinatorSettings};
pub use error::{CoreError, Result};
