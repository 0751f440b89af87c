//! Fakes for the coordinator and recording seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::audio::buffer::AudioBuffer;
use crate::audio::output::AudioOutput;
use crate::error::CoreError;
use crate::recording::{RecordedChunk, Recorder, RecorderFactory};
use crate::session::{MusicBackend, MusicSession, SignalSender, WirePrompt};

#[derive(Debug, Default)]
struct OutputLog {
    now: f64,
    starts: Vec<f64>,
    ramps: Vec<(f32, f32, Duration)>,
    resumes: usize,
    connects: usize,
    replacements: usize,
}

/// [`AudioOutput`] whose clock only moves when told to.
#[derive(Debug, Default)]
pub struct FakeOutput {
    log: Mutex<OutputLog>,
}

impl FakeOutput {
    pub fn at(now: f64) -> Self {
        let output = Self::default();
        output.set_time(now);
        output
    }

    pub fn set_time(&self, now: f64) {
        self.log.lock().unwrap().now = now;
    }

    pub fn scheduled_starts(&self) -> Vec<f64> {
        self.log.lock().unwrap().starts.clone()
    }

    pub fn ramps(&self) -> Vec<(f32, f32, Duration)> {
        self.log.lock().unwrap().ramps.clone()
    }

    pub fn resumes(&self) -> usize {
        self.log.lock().unwrap().resumes
    }

    pub fn connects(&self) -> usize {
        self.log.lock().unwrap().connects
    }

    pub fn replacements(&self) -> usize {
        self.log.lock().unwrap().replacements
    }
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn schedule(&self, _buffer: AudioBuffer, start_at: f64) {
        self.log.lock().unwrap().starts.push(start_at);
    }

    fn resume(&self) {
        self.log.lock().unwrap().resumes += 1;
    }

    fn connect(&self) {
        self.log.lock().unwrap().connects += 1;
    }

    fn ramp_gain(&self, from: f32, to: f32, over: Duration) {
        self.log.lock().unwrap().ramps.push((from, to, over));
    }

    fn replace_gain_node(&self) {
        self.log.lock().unwrap().replacements += 1;
    }
}

/// Something a [`FakeSession`] was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Prompts(Vec<WirePrompt>),
    Play,
    Pause,
    Stop,
    Close,
}

/// Records calls; shared by all sessions of one [`FakeBackend`] so tests can
/// see the whole conversation in order.
#[derive(Debug, Default)]
pub struct FakeSession {
    id: usize,
    calls: Arc<Mutex<Vec<(usize, SessionCall)>>>,
}

impl FakeSession {
    fn record(&self, call: SessionCall) {
        self.calls.lock().unwrap().push((self.id, call));
    }
}

impl MusicSession for FakeSession {
    fn set_weighted_prompts(&self, prompts: Vec<WirePrompt>) -> BoxFuture<'_, Result<(), CoreError>> {
        self.record(SessionCall::Prompts(prompts));
        Box::pin(async { Ok(()) })
    }

    fn play(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        self.record(SessionCall::Play);
        Box::pin(async { Ok(()) })
    }

    fn pause(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        self.record(SessionCall::Pause);
        Box::pin(async { Ok(()) })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        self.record(SessionCall::Stop);
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.record(SessionCall::Close);
        Box::pin(async {})
    }
}

/// Scripted [`MusicBackend`].
///
/// Each connect takes `connect_delay` (virtual time under `start_paused`),
/// keeps the signal sender so tests can push server messages, and succeeds
/// unless `fail_next` is set.
#[derive(Debug, Default)]
pub struct FakeBackend {
    connects: AtomicUsize,
    connect_delay: Duration,
    fail_next: Mutex<Option<String>>,
    calls: Arc<Mutex<Vec<(usize, SessionCall)>>>,
    signals: Mutex<Vec<SignalSender>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(connect_delay: Duration) -> Self {
        Self {
            connect_delay,
            ..Self::default()
        }
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Calls in order, tagged with the 1-based connection they went to.
    pub fn calls(&self) -> Vec<(usize, SessionCall)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, connection: usize) -> Vec<SessionCall> {
        self.calls()
            .into_iter()
            .filter(|(id, _)| *id == connection)
            .map(|(_, call)| call)
            .collect()
    }

    /// Signal sender of the 1-based connection.
    pub fn signals(&self, connection: usize) -> SignalSender {
        self.signals.lock().unwrap()[connection - 1].clone()
    }
}

impl MusicBackend for FakeBackend {
    fn connect(
        &self,
        _model: &str,
        signals: SignalSender,
    ) -> BoxFuture<'_, Result<Arc<dyn MusicSession>, CoreError>> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.signals.lock().unwrap().push(signals);
        let failure = self.fail_next.lock().unwrap().take();
        Box::pin(async move {
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            if let Some(message) = failure {
                return Err(CoreError::Connection(message));
            }
            let session: Arc<dyn MusicSession> = Arc::new(FakeSession {
                id,
                calls: self.calls.clone(),
            });
            Ok(session)
        })
    }
}

/// [`Recorder`] that hands back a scripted chunk per write.
pub struct FakeRecorder {
    mime: String,
    writes: VecDeque<Option<RecordedChunk>>,
    last: Option<RecordedChunk>,
}

impl Recorder for FakeRecorder {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    fn write(&mut self, _samples: &[f32]) -> Result<Option<RecordedChunk>, CoreError> {
        Ok(self.writes.pop_front().flatten())
    }

    fn finish(self: Box<Self>) -> Result<Option<RecordedChunk>, CoreError> {
        Ok(self.last)
    }
}

/// [`RecorderFactory`] that only opens the listed MIME types.
#[derive(Default)]
pub struct FakeRecorderFactory {
    default_mime: String,
    supported: Vec<String>,
    writes: Vec<Option<RecordedChunk>>,
    last: Option<RecordedChunk>,
}

impl FakeRecorderFactory {
    pub fn new(default_mime: &str) -> Self {
        Self {
            default_mime: default_mime.to_string(),
            ..Self::default()
        }
    }

    pub fn supporting(mut self, mime: &str) -> Self {
        self.supported.push(mime.to_string());
        self
    }

    pub fn with_writes(mut self, writes: Vec<Option<RecordedChunk>>) -> Self {
        self.writes = writes;
        self
    }

    pub fn finishing_with(mut self, last: RecordedChunk) -> Self {
        self.last = Some(last);
        self
    }
}

pub fn chunk(mime: &str, data: &[u8]) -> RecordedChunk {
    RecordedChunk {
        mime_type: mime.to_string(),
        data: data.to_vec(),
    }
}

impl RecorderFactory for FakeRecorderFactory {
    fn default_mime(&self) -> &str {
        &self.default_mime
    }

    fn open(
        &self,
        mime: &str,
        _sample_rate: u32,
        _channels: u16,
    ) -> Result<Box<dyn Recorder>, CoreError> {
        if !self.supported.iter().any(|m| m == mime) {
            return Err(CoreError::RecordingUnsupported(mime.to_string()));
        }
        Ok(Box::new(FakeRecorder {
            mime: mime.to_string(),
            writes: self.writes.iter().cloned().collect(),
            last: self.last.clone(),
        }))
    }
}
