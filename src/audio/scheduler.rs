//! Look-ahead playback scheduler.
//!
//! Turns an arrival-ordered stream of decoded chunks into a gap-free
//! timeline on the output clock. The first chunk after (re)priming lands
//! `look_ahead` seconds in the future; every following chunk starts exactly
//! where the previous one ends. If the clock overtakes the timeline the
//! producer has starved: the chunk is dropped and the scheduler un-primes so
//! the next chunk rebuilds the cushion.

use std::time::Duration;

use tracing::{debug, warn};

use super::buffer::AudioBuffer;
use super::output::AudioOutput;
use super::state::PlaybackState;

/// Default buffering cushion between real time and scheduled playback.
pub const DEFAULT_LOOK_AHEAD: Duration = Duration::from_secs(2);

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    /// Playback is paused or stopped; the chunk was ignored.
    Skipped,
    /// The clock was unprimed: this chunk primed it and starts at
    /// `start_at`. Audio becomes audible after `ready_in`.
    Primed { start_at: f64, ready_in: Duration },
    /// Queued directly after the previous chunk.
    Scheduled { start_at: f64 },
    /// The timeline fell behind the clock; the chunk was dropped.
    Underrun { behind_by: f64 },
}

#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    /// Audio-clock time of the next buffer's start; 0 means unprimed.
    next_start_time: f64,
    look_ahead: Duration,
}

impl PlaybackScheduler {
    pub fn new(look_ahead: Duration) -> Self {
        Self {
            next_start_time: 0.0,
            look_ahead,
        }
    }

    pub fn look_ahead(&self) -> Duration {
        self.look_ahead
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn is_primed(&self) -> bool {
        self.next_start_time != 0.0
    }

    /// Back to "not yet primed".
    pub fn reset(&mut self) {
        self.next_start_time = 0.0;
    }

    /// Place one decoded chunk on the timeline.
    pub fn schedule(
        &mut self,
        state: PlaybackState,
        buffer: AudioBuffer,
        output: &dyn AudioOutput,
    ) -> ScheduleOutcome {
        if state.ignores_audio() {
            return ScheduleOutcome::Skipped;
        }

        let now = output.current_time();
        let mut primed = false;
        if self.next_start_time == 0.0 {
            self.next_start_time = now + self.look_ahead.as_secs_f64();
            primed = true;
        }

        if self.next_start_time < now {
            let behind_by = now - self.next_start_time;
            warn!(behind_by = format!("{:.3}", behind_by), "Playback underrun");
            self.next_start_time = 0.0;
            return ScheduleOutcome::Underrun { behind_by };
        }

        let start_at = self.next_start_time;
        let duration = buffer.duration();
        output.schedule(buffer, start_at);
        self.next_start_time += duration;
        debug!(
            start_at = format!("{:.3}", start_at),
            duration = format!("{:.3}", duration),
            "Chunk scheduled"
        );

        if primed {
            ScheduleOutcome::Primed {
                start_at,
                ready_in: self.look_ahead,
            }
        } else {
            ScheduleOutcome::Scheduled { start_at }
        }
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_LOOK_AHEAD)
    }
}
