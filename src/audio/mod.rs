//! Output audio graph: decoded buffers, the software mixer, device output,
//! the recording tap, and the look-ahead scheduler.

pub mod buffer;
pub mod mixer;
pub mod output;
pub mod ring_buffer;
pub mod scheduler;
pub mod state;

pub use buffer::{AudioBuffer, CHANNELS, SAMPLE_RATE};
pub use output::{AudioOutput, MixerOutput};
pub use ring_buffer::{tap_ring_buffer, TapConsumer, TapProducer};
pub use scheduler::PlaybackScheduler;
pub use state::{ConnectionState, PlaybackState};
