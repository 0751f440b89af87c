//! Recording sink: taps the mixed output into a recorder.
//!
//! While a recording is active a pump task drains the output tap into the
//! recorder every [`PUMP_INTERVAL`]. Whatever chunks the recorder hands back
//! are buffered in arrival order (empty ones are dropped) and joined into a
//! single blob on stop.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::ring_buffer::TapConsumer;
use crate::error::CoreError;
use crate::events::{CoordinatorEvent, EventBus};

/// MIME type used when the recorder did not declare one.
pub const GENERIC_MIME: &str = "audio/wav";
pub const WAV_FLOAT_MIME: &str = "audio/wav;codecs=float";

const PUMP_INTERVAL: Duration = Duration::from_millis(200);

/// One piece of encoded output.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedChunk {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBlob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl RecordedBlob {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension for this blob's MIME type.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }
}

/// An open encoder. Samples are interleaved f32.
pub trait Recorder: Send {
    fn mime_type(&self) -> &str;

    /// Feed samples; may hand back a chunk whenever the encoder likes.
    fn write(&mut self, samples: &[f32]) -> Result<Option<RecordedChunk>, CoreError>;

    /// Flush and close, returning the final chunk if any.
    fn finish(self: Box<Self>) -> Result<Option<RecordedChunk>, CoreError>;
}

/// Opens recorders by MIME type.
pub trait RecorderFactory: Send + Sync {
    /// The platform default encoding.
    fn default_mime(&self) -> &str;

    /// Fails with [`CoreError::RecordingUnsupported`] for unknown types.
    fn open(&self, mime: &str, sample_rate: u32, channels: u16)
        -> Result<Box<dyn Recorder>, CoreError>;
}

/// WAV encoder via `hound`. Samples are encoded as they arrive into a spool
/// file in the temp dir; `finish` finalizes the header and emits the whole
/// file as one chunk.
pub struct WavRecorder {
    mime: String,
    spec: hound::WavSpec,
    spool: Option<Spool>,
}

struct Spool {
    path: PathBuf,
    writer: hound::WavWriter<BufWriter<File>>,
}

impl WavRecorder {
    fn spool(&mut self) -> Result<&mut Spool, CoreError> {
        if self.spool.is_none() {
            let path = std::env::temp_dir()
                .join(format!("promptdj-recording-{}.wav.part", uuid::Uuid::new_v4()));
            let writer = hound::WavWriter::create(&path, self.spec).map_err(wav_error)?;
            debug!(path = %path.display(), "Recording spool opened");
            self.spool = Some(Spool { path, writer });
        }
        self.spool
            .as_mut()
            .ok_or_else(|| CoreError::Io("recording spool unavailable".into()))
    }
}

impl Recorder for WavRecorder {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    fn write(&mut self, samples: &[f32]) -> Result<Option<RecordedChunk>, CoreError> {
        if samples.is_empty() {
            return Ok(None);
        }
        let format = self.spec.sample_format;
        let writer = &mut self.spool()?.writer;
        match format {
            hound::SampleFormat::Float => {
                for &s in samples {
                    writer.write_sample(s).map_err(wav_error)?;
                }
            }
            hound::SampleFormat::Int => {
                for &s in samples {
                    let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    writer.write_sample(v).map_err(wav_error)?;
                }
            }
        }
        Ok(None)
    }

    fn finish(mut self: Box<Self>) -> Result<Option<RecordedChunk>, CoreError> {
        let Some(Spool { path, writer }) = self.spool.take() else {
            return Ok(None);
        };
        let result = writer
            .finalize()
            .map_err(wav_error)
            .and_then(|()| std::fs::read(&path).map_err(CoreError::from));
        if let Err(e) = std::fs::remove_file(&path) {
            debug!(path = %path.display(), "Failed to remove recording spool: {}", e);
        }
        Ok(Some(RecordedChunk {
            mime_type: std::mem::take(&mut self.mime),
            data: result?,
        }))
    }
}

impl Drop for WavRecorder {
    fn drop(&mut self) {
        if let Some(Spool { path, writer }) = self.spool.take() {
            drop(writer);
            let _ = std::fs::remove_file(path);
        }
    }
}

fn wav_error(e: hound::Error) -> CoreError {
    CoreError::Io(format!("WAV encoding failed: {}", e))
}

/// Float WAV (preferred) and 16-bit PCM WAV (default).
#[derive(Debug, Default, Clone, Copy)]
pub struct WavRecorderFactory;

impl RecorderFactory for WavRecorderFactory {
    fn default_mime(&self) -> &str {
        GENERIC_MIME
    }

    fn open(
        &self,
        mime: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn Recorder>, CoreError> {
        let (bits_per_sample, sample_format) = match mime {
            WAV_FLOAT_MIME => (32, hound::SampleFormat::Float),
            GENERIC_MIME => (16, hound::SampleFormat::Int),
            other => return Err(CoreError::RecordingUnsupported(other.to_string())),
        };
        Ok(Box::new(WavRecorder {
            mime: mime.to_string(),
            spec: hound::WavSpec {
                channels,
                sample_rate,
                bits_per_sample,
                sample_format,
            },
            spool: None,
        }))
    }
}

#[derive(Default)]
struct SinkState {
    recorder: Option<Box<dyn Recorder>>,
    chunks: Vec<RecordedChunk>,
    pump: Option<JoinHandle<()>>,
}

fn push_chunk(chunks: &mut Vec<RecordedChunk>, chunk: Option<RecordedChunk>) {
    match chunk {
        Some(chunk) if !chunk.data.is_empty() => chunks.push(chunk),
        Some(_) => debug!("Discarding empty recording chunk"),
        None => {}
    }
}

impl SinkState {
    /// Move everything in the tap into the recorder.
    fn drain(&mut self, tap: &Mutex<TapConsumer>) {
        let samples = lock(tap).drain_all();
        if samples.is_empty() {
            return;
        }
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        match recorder.write(&samples) {
            Ok(chunk) => push_chunk(&mut self.chunks, chunk),
            Err(e) => warn!("Recorder write failed: {}", e),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Records the mixed output tap. Cheap to share behind an `Arc`.
pub struct RecordingSink {
    factory: Arc<dyn RecorderFactory>,
    preferred_mime: String,
    sample_rate: u32,
    channels: u16,
    tap: Arc<Mutex<TapConsumer>>,
    events: EventBus<CoordinatorEvent>,
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new(
        factory: Arc<dyn RecorderFactory>,
        preferred_mime: &str,
        sample_rate: u32,
        channels: u16,
        tap: TapConsumer,
        events: EventBus<CoordinatorEvent>,
    ) -> Self {
        Self {
            factory,
            preferred_mime: preferred_mime.to_string(),
            sample_rate,
            channels,
            tap: Arc::new(Mutex::new(tap)),
            events,
            state: Arc::new(Mutex::new(SinkState::default())),
        }
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).recorder.is_some()
    }

    fn open_recorder(&self) -> Result<Box<dyn Recorder>, CoreError> {
        match self
            .factory
            .open(&self.preferred_mime, self.sample_rate, self.channels)
        {
            Err(CoreError::RecordingUnsupported(mime)) => {
                info!(mime = %mime, "Preferred recording type unsupported, using default");
                self.factory
                    .open(self.factory.default_mime(), self.sample_rate, self.channels)
            }
            other => other,
        }
    }

    /// Start recording. Returns the recorder's MIME type.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<String, CoreError> {
        let mut state = lock(&self.state);
        if state.recorder.is_some() {
            let err = CoreError::AlreadyRecording;
            self.events.publish(CoordinatorEvent::error(err.user_message()));
            return Err(err);
        }

        let recorder = match self.open_recorder() {
            Ok(recorder) => recorder,
            Err(e) => {
                warn!("Recording unavailable: {}", e);
                self.events.publish(CoordinatorEvent::error(e.user_message()));
                return Err(e);
            }
        };
        let mime = recorder.mime_type().to_string();

        lock(&self.tap).clear();
        state.chunks.clear();
        state.recorder = Some(recorder);

        let sink_state = Arc::clone(&self.state);
        let tap = Arc::clone(&self.tap);
        state.pump = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PUMP_INTERVAL);
            loop {
                ticker.tick().await;
                lock(&sink_state).drain(&tap);
            }
        }));

        info!(mime = %mime, "Recording started");
        Ok(mime)
    }

    /// Stop and assemble the blob. `None` if nothing was recording.
    ///
    /// The recorder is finalized on the blocking pool.
    pub async fn stop(&self) -> Option<RecordedBlob> {
        let (recorder, mut chunks) = {
            let mut state = lock(&self.state);
            if let Some(pump) = state.pump.take() {
                pump.abort();
            }
            state.drain(&self.tap);
            let recorder = state.recorder.take()?;
            (recorder, std::mem::take(&mut state.chunks))
        };

        let fallback_mime = recorder.mime_type().to_string();
        match tokio::task::spawn_blocking(move || recorder.finish()).await {
            Ok(Ok(chunk)) => push_chunk(&mut chunks, chunk),
            Ok(Err(e)) => warn!("Recorder finish failed: {}", e),
            Err(e) => warn!("Recorder finish task failed: {}", e),
        }

        let mime_type = chunks
            .first()
            .map(|c| c.mime_type.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if fallback_mime.is_empty() {
                    GENERIC_MIME.to_string()
                } else {
                    fallback_mime
                }
            });
        let data: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
        info!(mime = %mime_type, bytes = data.len(), "Recording stopped");
        Some(RecordedBlob { mime_type, data })
    }
}

/// File extension for a recording MIME type; `wav` when unknown.
pub fn extension_for(mime: &str) -> &'static str {
    let subtype = mime
        .split(';')
        .next()
        .and_then(|essence| essence.split('/').nth(1))
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match subtype.as_str() {
        "webm" => "webm",
        "ogg" => "ogg",
        "mp4" => "m4a",
        "mpeg" => "mp3",
        "flac" => "flac",
        _ => "wav",
    }
}

/// Write `blob` into `dir` as `promptdj-recording-<timestamp>.<ext>`.
pub fn save_recording(blob: &RecordedBlob, dir: &Path) -> Result<PathBuf, CoreError> {
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
    let path = dir.join(format!("promptdj-recording-{}.{}", stamp, blob.extension()));
    std::fs::write(&path, &blob.data)?;
    info!(path = %path.display(), bytes = blob.len(), "Recording saved");
    Ok(path)
}
