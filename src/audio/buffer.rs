//! Decoded audio buffers.
//!
//! The backend streams base64-encoded 16-bit little-endian PCM, always at
//! 48 kHz stereo. Decoding turns one chunk into an interleaved f32 buffer the
//! mixer can schedule.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Sample rate of every buffer the backend produces.
pub const SAMPLE_RATE: u32 = 48_000;

/// Channel count of every buffer the backend produces.
pub const CHANNELS: u16 = 2;

/// An interleaved block of f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// A buffer of silence lasting `frames` frames.
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples of frame `index`, one per channel.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let ch = self.channels as usize;
        self.samples.get(index * ch..index * ch + ch)
    }
}

/// Decode a base64 PCM chunk into a 48 kHz stereo buffer.
pub fn decode_chunk(data: &str) -> Result<AudioBuffer, base64::DecodeError> {
    let bytes = BASE64.decode(data.trim())?;
    Ok(pcm16_to_buffer(&bytes, SAMPLE_RATE, CHANNELS))
}

/// Convert little-endian i16 PCM bytes to an f32 buffer.
pub fn pcm16_to_buffer(bytes: &[u8], sample_rate: u32, channels: u16) -> AudioBuffer {
    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
    AudioBuffer::new(samples, sample_rate, channels)
}
