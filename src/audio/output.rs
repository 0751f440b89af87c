//! Audio output: the seam the coordinator drives, and its device backing.
//!
//! `MixerOutput` shares a [`Mixer`] with a render thread. On a real device
//! the thread owns a rodio `OutputStream` + `Sink` playing a `Source` that
//! pulls from the mixer; headless, the thread renders in real time into the
//! void so the clock and recording tap keep working without hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{error, info, warn};

use super::buffer::AudioBuffer;
use super::mixer::Mixer;
use super::ring_buffer::TapProducer;

/// Frames rendered per pull from the render thread.
const RENDER_BLOCK_FRAMES: usize = 1024;

/// Polling interval of the render/keep-alive threads.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The output graph as seen by the coordinator and scheduler.
pub trait AudioOutput: Send + Sync {
    /// Monotonic audio clock in seconds.
    fn current_time(&self) -> f64;

    /// Connect `buffer` to the current gain node and start it at `start_at`.
    fn schedule(&self, buffer: AudioBuffer, start_at: f64);

    /// Let the clock run (no-op if already running).
    fn resume(&self);

    /// Connect the current gain node to the destination and recording tap.
    fn connect(&self);

    /// Ramp the current gain node linearly from `from` to `to`.
    fn ramp_gain(&self, from: f32, to: f32, over: Duration);

    /// Swap in a fresh gain node; the old one keeps its pending fade.
    fn replace_gain_node(&self);
}

/// List available output device names.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.output_devices() {
        for dev in devices {
            match dev.name() {
                Ok(name) if !names.contains(&name) => names.push(name),
                _ => {}
            }
        }
    }
    names
}

/// [`AudioOutput`] backed by a shared [`Mixer`].
pub struct MixerOutput {
    mixer: Arc<Mutex<Mixer>>,
    shutdown: Arc<AtomicBool>,
    render_thread: Option<std::thread::JoinHandle<()>>,
}

impl MixerOutput {
    /// A mixer with no render thread. The clock only moves when [`render`]
    /// is called.
    ///
    /// [`render`]: MixerOutput::render
    pub fn detached(sample_rate: u32, channels: u16) -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer::new(sample_rate, channels))),
            shutdown: Arc::new(AtomicBool::new(false)),
            render_thread: None,
        }
    }

    /// Play through the named output device, or the system default.
    pub fn open_device(
        sample_rate: u32,
        channels: u16,
        device_name: Option<&str>,
        volume: f32,
        tap: Option<TapProducer>,
    ) -> anyhow::Result<Self> {
        let mut output = Self::detached(sample_rate, channels);
        if let Some(tap) = tap {
            output.lock().set_tap(tap);
        }

        let mixer = Arc::clone(&output.mixer);
        let shutdown = Arc::clone(&output.shutdown);
        let device_name = device_name.map(str::to_string);
        let device_label = device_name.clone().unwrap_or_else(|| "default".into());
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        let handle = std::thread::Builder::new()
            .name("promptdj-output".into())
            .spawn(move || {
                let opened = open_output_stream(device_name.as_deref()).and_then(|(s, h)| {
                    Sink::try_new(&h)
                        .map(|sink| (s, sink))
                        .map_err(|e| format!("Failed to create audio sink: {}", e))
                });
                let (_stream, sink) = match opened {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                sink.set_volume(volume.clamp(0.0, 2.0));
                sink.append(MixerSource::new(mixer));
                let _ = ready_tx.send(Ok(()));

                while !shutdown.load(Ordering::SeqCst) {
                    std::thread::sleep(POLL_INTERVAL);
                }
                sink.stop();
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(device = %device_label, sample_rate, channels, "Audio output opened");
                output.render_thread = Some(handle);
                Ok(output)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                anyhow::bail!(e)
            }
            Err(_) => {
                let _ = handle.join();
                anyhow::bail!("Audio output thread exited during startup")
            }
        }
    }

    /// Render in real time without a device.
    pub fn headless(sample_rate: u32, channels: u16, tap: Option<TapProducer>) -> Self {
        let mut output = Self::detached(sample_rate, channels);
        if let Some(tap) = tap {
            output.lock().set_tap(tap);
        }

        let mixer = Arc::clone(&output.mixer);
        let shutdown = Arc::clone(&output.shutdown);
        let spawned = std::thread::Builder::new()
            .name("promptdj-headless".into())
            .spawn(move || {
                let ch = channels.max(1) as usize;
                let mut block = Vec::new();
                let mut last = Instant::now();
                let mut owed = 0.0f64;
                while !shutdown.load(Ordering::SeqCst) {
                    std::thread::sleep(POLL_INTERVAL);
                    let now = Instant::now();
                    owed += now.duration_since(last).as_secs_f64() * sample_rate as f64;
                    last = now;
                    let frames = owed.floor() as usize;
                    if frames == 0 {
                        continue;
                    }
                    owed -= frames as f64;
                    block.resize(frames * ch, 0.0);
                    match mixer.lock() {
                        Ok(mut m) => m.render(&mut block),
                        Err(e) => {
                            error!("Mixer lock poisoned: {}", e);
                            break;
                        }
                    }
                }
            });

        match spawned {
            Ok(handle) => output.render_thread = Some(handle),
            Err(e) => error!("Failed to spawn headless render thread: {}", e),
        }
        info!("Headless audio output started");
        output
    }

    /// Pull `out.len()` interleaved samples from the mixer (detached use).
    pub fn render(&self, out: &mut [f32]) {
        self.lock().render(out);
    }

    /// Direct access to the mixer, e.g. to inspect voices.
    pub fn mixer(&self) -> &Arc<Mutex<Mixer>> {
        &self.mixer
    }

    fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AudioOutput for MixerOutput {
    fn current_time(&self) -> f64 {
        self.lock().current_time()
    }

    fn schedule(&self, buffer: AudioBuffer, start_at: f64) {
        self.lock().schedule(buffer, start_at);
    }

    fn resume(&self) {
        self.lock().resume();
    }

    fn connect(&self) {
        self.lock().connect();
    }

    fn ramp_gain(&self, from: f32, to: f32, over: Duration) {
        self.lock().ramp_gain(from, to, over);
    }

    fn replace_gain_node(&self) {
        self.lock().replace_gain_node();
    }
}

impl Drop for MixerOutput {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.render_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Open the audio output stream for a named or default device.
fn open_output_stream(
    output_device_name: Option<&str>,
) -> Result<(OutputStream, OutputStreamHandle), String> {
    if let Some(name) = output_device_name {
        let host = cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| format!("Failed to enumerate output devices: {}", e))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false));

        match device {
            Some(dev) => {
                info!(device = %name, "Using configured output device");
                OutputStream::try_from_device(&dev)
                    .map_err(|e| format!("Failed to open output device '{}': {}", name, e))
            }
            None => {
                warn!(
                    device = %name,
                    "Configured output device not found, falling back to default"
                );
                OutputStream::try_default()
                    .map_err(|e| format!("No audio output device available: {}", e))
            }
        }
    } else {
        OutputStream::try_default().map_err(|e| format!("No audio output device available: {}", e))
    }
}

/// Endless rodio source rendering blocks from the shared mixer.
struct MixerSource {
    mixer: Arc<Mutex<Mixer>>,
    block: Vec<f32>,
    pos: usize,
    sample_rate: u32,
    channels: u16,
}

impl MixerSource {
    fn new(mixer: Arc<Mutex<Mixer>>) -> Self {
        let (sample_rate, channels) = match mixer.lock() {
            Ok(m) => (m.sample_rate(), m.channels()),
            Err(poisoned) => {
                let m = poisoned.into_inner();
                (m.sample_rate(), m.channels())
            }
        };
        Self {
            mixer,
            block: Vec::new(),
            pos: 0,
            sample_rate,
            channels,
        }
    }
}

impl Iterator for MixerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.block.len() {
            self.block
                .resize(RENDER_BLOCK_FRAMES * self.channels as usize, 0.0);
            match self.mixer.lock() {
                Ok(mut m) => m.render(&mut self.block),
                Err(_) => self.block.iter_mut().for_each(|s| *s = 0.0),
            }
            self.pos = 0;
        }
        let sample = self.block[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for MixerSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_output_clock_follows_render() {
        let output = MixerOutput::detached(100, 2);
        output.resume();
        let mut block = vec![0.0f32; 50 * 2];
        output.render(&mut block);
        assert!((output.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_scheduled_buffer_reaches_output() {
        let output = MixerOutput::detached(100, 1);
        output.resume();
        output.connect();
        output.schedule(AudioBuffer::new(vec![0.75; 2], 100, 1), 0.01);
        let mut block = vec![0.0f32; 4];
        output.render(&mut block);
        assert_eq!(block, vec![0.0, 0.75, 0.75, 0.0]);
    }

    #[test]
    fn test_mixer_source_reports_format() {
        let output = MixerOutput::detached(48_000, 2);
        let mut source = MixerSource::new(Arc::clone(output.mixer()));
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 48_000);
        assert_eq!(source.total_duration(), None);
        // Suspended mixer renders silence.
        assert_eq!(source.next(), Some(0.0));
    }

    #[test]
    fn test_list_output_devices_unique() {
        // On CI without audio hardware this may be empty.
        let names = list_output_devices();
        let unique: std::collections::HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
