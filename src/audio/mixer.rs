//! Software output graph.
//!
//! A frame counter is the audio clock. Scheduled buffers ("voices") hang off
//! gain buses; only buses connected to the destination are heard. Replacing
//! the gain node retires the current bus: it keeps rendering whatever fade it
//! was given and is pruned once silent, while later buffers go to a fresh bus.

use std::time::Duration;

use super::buffer::AudioBuffer;
use super::ring_buffer::TapProducer;

/// Linear gain automation, advanced one frame at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GainRamp {
    value: f32,
    target: f32,
    step: f32,
    remaining: u64,
}

impl GainRamp {
    fn constant(value: f32) -> Self {
        Self {
            value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    fn linear(from: f32, to: f32, frames: u64) -> Self {
        if frames == 0 {
            return Self::constant(to);
        }
        Self {
            value: from,
            target: to,
            step: (to - from) / frames as f32,
            remaining: frames,
        }
    }

    /// Gain for the current frame; moves the ramp forward by one frame.
    fn advance(&mut self) -> f32 {
        let current = self.value;
        if self.remaining > 0 {
            self.remaining -= 1;
            self.value = if self.remaining == 0 {
                self.target
            } else {
                self.value + self.step
            };
        }
        current
    }

    fn is_silent(&self) -> bool {
        self.remaining == 0 && self.value == 0.0
    }
}

struct Voice {
    buffer: AudioBuffer,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.buffer.frames() as u64
    }
}

struct Bus {
    id: u64,
    gain: GainRamp,
    connected: bool,
    voices: Vec<Voice>,
}

/// The mixing graph shared between the coordinator and the render thread.
pub struct Mixer {
    sample_rate: u32,
    channels: u16,
    frames_rendered: u64,
    running: bool,
    buses: Vec<Bus>,
    current_bus: u64,
    next_bus_id: u64,
    tap: Option<TapProducer>,
}

impl Mixer {
    /// A suspended mixer with one disconnected bus at unity gain.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            frames_rendered: 0,
            running: false,
            buses: vec![Bus {
                id: 0,
                gain: GainRamp::constant(1.0),
                connected: false,
                voices: Vec::new(),
            }],
            current_bus: 0,
            next_bus_id: 1,
            tap: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Audio clock in seconds. Only advances while running.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn resume(&mut self) {
        self.running = true;
    }

    pub fn suspend(&mut self) {
        self.running = false;
    }

    /// Attach the recording tap. Every rendered frame is copied into it.
    pub fn set_tap(&mut self, tap: TapProducer) {
        self.tap = Some(tap);
    }

    /// Start `buffer` on the current bus at audio-clock time `start_at`.
    pub fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) {
        let start_frame = (start_at.max(0.0) * self.sample_rate as f64).round() as u64;
        let bus = self.current_bus_mut();
        bus.voices.push(Voice {
            buffer,
            start_frame,
        });
    }

    /// Connect the current bus to the destination (and thereby the tap).
    pub fn connect(&mut self) {
        self.current_bus_mut().connected = true;
    }

    /// Ramp the current bus linearly from `from` to `to` over `over`.
    pub fn ramp_gain(&mut self, from: f32, to: f32, over: Duration) {
        let frames = (over.as_secs_f64() * self.sample_rate as f64).round() as u64;
        self.current_bus_mut().gain = GainRamp::linear(from, to, frames);
    }

    /// Retire the current bus and swap in a fresh, disconnected one.
    pub fn replace_gain_node(&mut self) {
        let id = self.next_bus_id;
        self.next_bus_id += 1;
        self.buses.push(Bus {
            id,
            gain: GainRamp::constant(1.0),
            connected: false,
            voices: Vec::new(),
        });
        self.current_bus = id;
    }

    /// Number of voices still pending or playing across all buses.
    pub fn active_voices(&self) -> usize {
        self.buses.iter().map(|b| b.voices.len()).sum()
    }

    /// Number of live buses, the current one included.
    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    /// Render interleaved frames into `out`, advancing the clock.
    ///
    /// While suspended the output is silence and the clock stands still.
    pub fn render(&mut self, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);
        if !self.running {
            return;
        }

        let ch = self.channels as usize;
        let frames = out.len() / ch;

        for (offset, frame) in out.chunks_exact_mut(ch).enumerate() {
            let t = self.frames_rendered + offset as u64;
            for bus in self.buses.iter_mut() {
                let gain = bus.gain.advance();
                if !bus.connected || gain == 0.0 {
                    continue;
                }
                for voice in &bus.voices {
                    if t < voice.start_frame {
                        continue;
                    }
                    let Some(src) = voice.buffer.frame((t - voice.start_frame) as usize) else {
                        continue;
                    };
                    for (c, sample) in frame.iter_mut().enumerate() {
                        *sample += src[c % src.len()] * gain;
                    }
                }
            }
        }

        self.frames_rendered += frames as u64;
        self.prune();

        if let Some(tap) = self.tap.as_mut() {
            tap.push_slice(&out[..frames * ch]);
        }
    }

    fn prune(&mut self) {
        let now = self.frames_rendered;
        let current = self.current_bus;
        for bus in self.buses.iter_mut() {
            bus.voices.retain(|v| v.end_frame() > now);
        }
        self.buses
            .retain(|b| b.id == current || !(b.voices.is_empty() || b.gain.is_silent()));
    }

    fn current_bus_mut(&mut self) -> &mut Bus {
        let current = self.current_bus;
        let index = self
            .buses
            .iter()
            .position(|b| b.id == current)
            .unwrap_or(self.buses.len() - 1);
        &mut self.buses[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring_buffer::tap_ring_buffer;

    // 10 Hz mono keeps frame arithmetic readable.
    fn mixer() -> Mixer {
        let mut m = Mixer::new(10, 1);
        m.resume();
        m.connect();
        m
    }

    fn ones(frames: usize) -> AudioBuffer {
        AudioBuffer::new(vec![1.0; frames], 10, 1)
    }

    #[test]
    fn test_clock_stands_still_while_suspended() {
        let mut m = Mixer::new(10, 1);
        let mut out = [1.0f32; 5];
        m.render(&mut out);
        assert_eq!(m.current_time(), 0.0);
        assert_eq!(out, [0.0; 5]);

        m.resume();
        m.render(&mut out);
        assert!((m.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_voice_starts_on_exact_frame() {
        let mut m = mixer();
        m.schedule(ones(2), 0.3);
        let mut out = [0.0f32; 6];
        m.render(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_back_to_back_buffers_are_contiguous() {
        let mut m = mixer();
        m.schedule(AudioBuffer::new(vec![0.25; 3], 10, 1), 0.1);
        m.schedule(AudioBuffer::new(vec![0.5; 2], 10, 1), 0.4);
        let mut out = [0.0f32; 7];
        m.render(&mut out);
        assert_eq!(out, [0.0, 0.25, 0.25, 0.25, 0.5, 0.5, 0.0]);
        assert_eq!(m.active_voices(), 0);
    }

    #[test]
    fn test_disconnected_bus_is_silent() {
        let mut m = Mixer::new(10, 1);
        m.resume();
        m.schedule(ones(3), 0.0);
        let mut out = [0.0f32; 3];
        m.render(&mut out);
        assert_eq!(out, [0.0; 3]);
    }

    #[test]
    fn test_gain_ramp() {
        let mut m = mixer();
        m.schedule(ones(6), 0.0);
        m.ramp_gain(0.0, 1.0, Duration::from_millis(400));
        let mut out = [0.0f32; 6];
        m.render(&mut out);
        assert_eq!(out, [0.0, 0.25, 0.5, 0.75, 1.0, 1.0]);
    }

    #[test]
    fn test_replaced_bus_fades_out_and_is_pruned() {
        let mut m = mixer();
        m.schedule(ones(10), 0.0);
        m.ramp_gain(1.0, 0.0, Duration::from_millis(200));
        m.replace_gain_node();
        assert_eq!(m.bus_count(), 2);

        // Lands on the fresh bus, which is not connected yet.
        m.schedule(ones(10), 0.0);

        let mut out = [0.0f32; 4];
        m.render(&mut out);
        assert_eq!(out, [1.0, 0.5, 0.0, 0.0]);
        assert_eq!(m.bus_count(), 1);

        m.connect();
        m.render(&mut out);
        assert_eq!(out, [1.0; 4]);
    }

    #[test]
    fn test_stereo_output_duplicates_mono_source() {
        let mut m = Mixer::new(10, 2);
        m.resume();
        m.connect();
        m.schedule(AudioBuffer::new(vec![0.5], 10, 1), 0.0);
        let mut out = [0.0f32; 4];
        m.render(&mut out);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_tap_receives_rendered_output() {
        let (prod, mut cons) = tap_ring_buffer(Some(64));
        let mut m = mixer();
        m.set_tap(prod);
        m.schedule(ones(2), 0.0);
        let mut out = [0.0f32; 4];
        m.render(&mut out);
        assert_eq!(cons.drain_all(), vec![1.0, 1.0, 0.0, 0.0]);
    }
}
