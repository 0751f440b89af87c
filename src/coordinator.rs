//! Streaming playback coordinator.
//!
//! Owns the backend session, the playback-state machine and the look-ahead
//! scheduler, and drives the output graph. Every state change is published
//! as a [`CoordinatorEvent`].
//!
//! Lifecycle:
//! - `play` connects lazily (one attempt in flight, shared by all callers),
//!   re-sends the prompts, resumes output and fades in.
//! - `pause` keeps the session, fades out and swaps the gain node.
//! - `stop` fades out and discards the session; the next `play` reconnects.
//! - A terminal error/close from the backend force-stops playback. There is
//!   no automatic reconnect.
//!
//! Each connection gets a generation number. `stop` bumps it, so anything an
//! abandoned connection produces afterwards is ignored.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::audio::buffer::decode_chunk;
use crate::audio::output::AudioOutput;
use crate::audio::scheduler::{PlaybackScheduler, ScheduleOutcome, DEFAULT_LOOK_AHEAD};
use crate::audio::state::{ConnectionState, PlaybackState, ToggleAction};
use crate::error::CoreError;
use crate::events::{CoordinatorEvent, EventBus};
use crate::prompts::{FilteredTexts, PromptSet};
use crate::session::{MusicBackend, MusicSession, ServerMessage, SessionSignal};
use crate::throttle::RateLimiter;

pub const DEFAULT_MODEL: &str = "lyria-realtime-exp";

type SessionResult = Result<Arc<dyn MusicSession>, CoreError>;
type PendingConnect = Shared<BoxFuture<'static, SessionResult>>;

/// Tunables for one coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub model: String,
    pub look_ahead: Duration,
    /// Minimum spacing between prompt transmissions.
    pub prompt_interval: Duration,
    /// Length of the fade-in/fade-out ramps.
    pub fade: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            look_ahead: DEFAULT_LOOK_AHEAD,
            prompt_interval: Duration::from_millis(200),
            fade: Duration::from_millis(100),
        }
    }
}

struct Inner {
    playback: PlaybackState,
    connection: ConnectionState,
    session: Option<Arc<dyn MusicSession>>,
    pending: Option<PendingConnect>,
    generation: u64,
    prompts: PromptSet,
    filtered: FilteredTexts,
    scheduler: PlaybackScheduler,
    /// Bumped whenever the clock is primed or reset; a priming timer only
    /// fires for the epoch it was armed in.
    prime_epoch: u64,
}

impl Inner {
    fn reset_clock(&mut self) {
        self.scheduler.reset();
        self.prime_epoch += 1;
    }
}

struct CoordinatorShared {
    backend: Arc<dyn MusicBackend>,
    output: Arc<dyn AudioOutput>,
    events: EventBus<CoordinatorEvent>,
    limiter: RateLimiter<Result<(), CoreError>>,
    settings: CoordinatorSettings,
    inner: Mutex<Inner>,
}

/// Cloneable handle; all clones drive the same session.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<CoordinatorShared>,
}

impl Coordinator {
    pub fn new(
        backend: Arc<dyn MusicBackend>,
        output: Arc<dyn AudioOutput>,
        settings: CoordinatorSettings,
    ) -> Self {
        let inner = Inner {
            playback: PlaybackState::Stopped,
            connection: ConnectionState::Disconnected,
            session: None,
            pending: None,
            generation: 0,
            prompts: PromptSet::new(),
            filtered: FilteredTexts::default(),
            scheduler: PlaybackScheduler::new(settings.look_ahead),
            prime_epoch: 0,
        };
        Self {
            shared: Arc::new(CoordinatorShared {
                backend,
                output,
                events: EventBus::new(),
                limiter: RateLimiter::new(settings.prompt_interval),
                settings,
                inner: Mutex::new(inner),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.shared.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.shared.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.shared.events.subscribe()
    }

    /// The bus this coordinator publishes on, for components that report
    /// through the same channel.
    pub fn events(&self) -> EventBus<CoordinatorEvent> {
        self.shared.events.clone()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.lock().playback
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lock().connection
    }

    pub fn filtered_texts(&self) -> FilteredTexts {
        self.lock().filtered.clone()
    }

    pub fn prompts(&self) -> PromptSet {
        self.lock().prompts.clone()
    }

    fn set_playback(&self, inner: &mut Inner, state: PlaybackState) {
        if inner.playback != state {
            info!(from = %inner.playback, to = %state, "Playback state changed");
        }
        inner.playback = state;
        self.shared
            .events
            .publish(CoordinatorEvent::PlaybackState { state });
    }

    fn notify(&self, error: &CoreError) {
        self.shared
            .events
            .publish(CoordinatorEvent::error(error.user_message()));
    }

    // ── Session lifecycle ───────────────────────────────────────────

    /// The live session, connecting if needed. Concurrent callers share one
    /// attempt.
    pub async fn get_or_create_session(&self) -> SessionResult {
        let pending = {
            let mut inner = self.lock();
            if let Some(session) = &inner.session {
                return Ok(session.clone());
            }
            match &inner.pending {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.start_connect(inner.generation);
                    inner.connection = ConnectionState::Connecting;
                    inner.pending = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn start_connect(&self, generation: u64) -> PendingConnect {
        let backend = self.shared.backend.clone();
        let model = self.shared.settings.model.clone();
        let weak = Arc::downgrade(&self.shared);
        async move {
            let (tx, rx) = mpsc::unbounded_channel();
            info!(generation, model = %model, "Connecting session");
            let result = backend.connect(&model, tx).await;
            match weak.upgrade() {
                Some(shared) => Coordinator { shared }.install(generation, result, rx).await,
                None => {
                    if let Ok(session) = result {
                        session.close().await;
                    }
                    Err(CoreError::Cancelled)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Adopt a finished connection attempt, unless it was abandoned.
    async fn install(
        &self,
        generation: u64,
        result: SessionResult,
        signals: mpsc::UnboundedReceiver<SessionSignal>,
    ) -> SessionResult {
        let current = {
            let mut inner = self.lock();
            let current = inner.generation == generation;
            if current {
                inner.pending = None;
                match &result {
                    Ok(session) => {
                        inner.session = Some(session.clone());
                        inner.filtered = FilteredTexts::default();
                    }
                    Err(_) => inner.connection = ConnectionState::Erroring,
                }
            }
            current
        };

        if !current {
            if let Ok(session) = result {
                info!(generation, "Closing abandoned session");
                session.close().await;
            }
            return Err(CoreError::Cancelled);
        }

        match &result {
            Ok(_) => {
                info!(generation, "Session connected");
                tokio::spawn(pump_signals(
                    Arc::downgrade(&self.shared),
                    generation,
                    signals,
                ));
            }
            Err(e) => warn!(generation, "Session connect failed: {}", e),
        }
        result
    }

    /// Handle one inbound signal. Returns `false` once the connection it
    /// belongs to is no longer current.
    async fn handle_signal(&self, generation: u64, signal: SessionSignal) -> bool {
        if self.lock().generation != generation {
            debug!(generation, "Ignoring signal from abandoned session");
            return false;
        }
        match signal {
            SessionSignal::Message(message) => {
                self.handle_message(generation, message);
                true
            }
            SessionSignal::Error(reason) => {
                warn!(generation, reason = %reason, "Session error");
                self.terminate(ConnectionState::Erroring).await;
                false
            }
            SessionSignal::Closed(reason) => {
                info!(generation, reason = %reason, "Session closed");
                self.terminate(ConnectionState::Disconnected).await;
                false
            }
        }
    }

    fn handle_message(&self, generation: u64, message: ServerMessage) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }

        if message.is_setup_complete() {
            info!(generation, "Session setup complete");
            inner.connection = ConnectionState::Connected;
        }

        if let Some(filtered) = &message.filtered_prompt {
            info!(text = %filtered.text, reason = %filtered.filtered_reason, "Prompt filtered");
            inner.filtered.insert(&filtered.text);
            self.shared.events.publish(CoordinatorEvent::FilteredPrompt {
                text: filtered.text.clone(),
                reason: filtered.filtered_reason.clone(),
            });
        }

        if let Some(chunk) = message.first_audio_chunk() {
            if inner.playback.ignores_audio() {
                return;
            }
            let buffer = match decode_chunk(&chunk.data) {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!("Dropping undecodable audio chunk: {}", e);
                    return;
                }
            };
            let state = inner.playback;
            match inner.scheduler.schedule(state, buffer, self.shared.output.as_ref()) {
                ScheduleOutcome::Primed { ready_in, .. } => {
                    inner.prime_epoch += 1;
                    self.arm_playing_timer(inner.prime_epoch, ready_in);
                }
                ScheduleOutcome::Underrun { .. } => {
                    inner.prime_epoch += 1;
                    self.set_playback(&mut inner, PlaybackState::Loading);
                }
                ScheduleOutcome::Scheduled { .. } | ScheduleOutcome::Skipped => {}
            }
        }
    }

    /// Switch to `playing` once the look-ahead cushion has elapsed.
    fn arm_playing_timer(&self, epoch: u64, ready_in: Duration) {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(ready_in).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let coordinator = Coordinator { shared };
            let mut inner = coordinator.lock();
            if inner.prime_epoch == epoch && inner.playback == PlaybackState::Loading {
                coordinator.set_playback(&mut inner, PlaybackState::Playing);
            }
        });
    }

    /// The current connection ended: force-stop and tell the user.
    async fn terminate(&self, connection: ConnectionState) {
        self.stop().await;
        self.lock().connection = connection;
        self.notify(&CoreError::Connection(connection.to_string()));
    }

    // ── Prompts ─────────────────────────────────────────────────────

    /// Store `prompts` without sending; the next `play` forwards them.
    pub fn load_prompts(&self, prompts: PromptSet) {
        self.lock().prompts = prompts;
    }

    /// Store `prompts` and forward the active subset, at most once per
    /// prompt interval. A throttled call returns the last sent result.
    pub async fn set_weighted_prompts(&self, prompts: PromptSet) -> Result<(), CoreError> {
        self.lock().prompts = prompts;
        self.shared
            .limiter
            .call(|| self.send_prompts())
            .await
            .unwrap_or(Ok(()))
    }

    async fn send_prompts(&self) -> Result<(), CoreError> {
        let (active, session) = {
            let inner = self.lock();
            (inner.prompts.active(&inner.filtered), inner.session.clone())
        };

        if active.is_empty() {
            warn!("No active prompt");
            let err = CoreError::NoActivePrompt;
            self.notify(&err);
            self.pause().await;
            return Err(err);
        }

        let Some(session) = session else {
            return Ok(());
        };
        debug!(count = active.len(), "Forwarding prompts");
        if let Err(e) = session.set_weighted_prompts(active).await {
            warn!("Prompt update failed: {}", e);
            self.notify(&e);
            self.pause().await;
            return Err(e);
        }
        Ok(())
    }

    // ── Transport ───────────────────────────────────────────────────

    pub async fn play(&self) {
        {
            let mut inner = self.lock();
            if inner.playback == PlaybackState::Playing {
                debug!("Already playing");
                return;
            }
            self.set_playback(&mut inner, PlaybackState::Loading);
        }

        let session = match self.get_or_create_session().await {
            Ok(session) => session,
            Err(CoreError::Cancelled) => {
                debug!("Play abandoned while connecting");
                return;
            }
            Err(_) => {
                self.terminate(ConnectionState::Erroring).await;
                return;
            }
        };

        if self.send_prompts().await.is_err() || self.playback_state() != PlaybackState::Loading {
            return;
        }

        let output = &self.shared.output;
        output.resume();
        if let Err(e) = session.play().await {
            warn!("Play directive failed: {}", e);
            self.terminate(ConnectionState::Erroring).await;
            return;
        }
        output.connect();
        output.ramp_gain(0.0, 1.0, self.shared.settings.fade);
    }

    pub async fn pause(&self) {
        let session = {
            let mut inner = self.lock();
            inner.reset_clock();
            self.set_playback(&mut inner, PlaybackState::Paused);
            inner.session.clone()
        };

        let output = &self.shared.output;
        output.ramp_gain(1.0, 0.0, self.shared.settings.fade);
        output.replace_gain_node();

        if let Some(session) = session {
            if let Err(e) = session.pause().await {
                debug!("Pause directive failed: {}", e);
            }
        }
    }

    pub async fn stop(&self) {
        let session = {
            let mut inner = self.lock();
            inner.reset_clock();
            inner.generation += 1;
            inner.pending = None;
            inner.connection = ConnectionState::Disconnected;
            self.set_playback(&mut inner, PlaybackState::Stopped);
            inner.session.take()
        };

        self.shared
            .output
            .ramp_gain(1.0, 0.0, self.shared.settings.fade);

        if let Some(session) = session {
            if let Err(e) = session.stop().await {
                debug!("Stop directive failed: {}", e);
            }
            session.close().await;
        }
    }

    /// Playing pauses, paused/stopped plays, loading cancels to stop.
    pub async fn toggle_play_pause(&self) {
        match self.playback_state().toggle_action() {
            ToggleAction::Play => self.play().await,
            ToggleAction::Pause => self.pause().await,
            ToggleAction::Stop => self.stop().await,
        }
    }
}

async fn pump_signals(
    shared: Weak<CoordinatorShared>,
    generation: u64,
    mut signals: mpsc::UnboundedReceiver<SessionSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !(Coordinator { shared }).handle_signal(generation, signal).await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::WeightedPrompt;
    use crate::session::AudioChunk;
    use crate::testing::{FakeBackend, FakeOutput, SessionCall};
    use base64::Engine;

    struct Harness {
        backend: Arc<FakeBackend>,
        output: Arc<FakeOutput>,
        coordinator: Coordinator,
        events: broadcast::Receiver<CoordinatorEvent>,
    }

    fn harness(backend: FakeBackend) -> Harness {
        let backend = Arc::new(backend);
        let output = Arc::new(FakeOutput::at(0.0));
        let coordinator = Coordinator::new(
            backend.clone(),
            output.clone(),
            CoordinatorSettings::default(),
        );
        let events = coordinator.subscribe();
        Harness {
            backend,
            output,
            coordinator,
            events,
        }
    }

    impl Harness {
        fn drain_events(&mut self) -> Vec<CoordinatorEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }

        fn errors(&mut self) -> Vec<String> {
            self.drain_events()
                .into_iter()
                .filter_map(|e| match e {
                    CoordinatorEvent::Error { message } => Some(message),
                    _ => None,
                })
                .collect()
        }

        async fn push(&self, connection: usize, message: ServerMessage) {
            self.backend
                .signals(connection)
                .send(SessionSignal::Message(message))
                .unwrap();
            settle().await;
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn three_prompts() -> PromptSet {
        PromptSet::from_prompts(vec![
            WeightedPrompt::new("p1", "Funk").with_weight(1.0),
            WeightedPrompt::new("p2", "Shoegaze").with_weight(0.6),
            WeightedPrompt::new("p3", "Dubstep").with_weight(0.4),
        ])
        .unwrap()
    }

    /// Silent stereo PCM16 chunk of `frames` frames.
    fn audio(frames: usize) -> ServerMessage {
        let data = base64::engine::general_purpose::STANDARD.encode(vec![0u8; frames * 4]);
        ServerMessage::audio(vec![AudioChunk {
            data,
            mime_type: None,
        }])
    }

    fn texts(call: &SessionCall) -> Vec<String> {
        match call {
            SessionCall::Prompts(prompts) => prompts.iter().map(|p| p.text.clone()).collect(),
            other => panic!("expected prompts, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_connects_and_fades_in() {
        let mut h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;

        assert_eq!(h.coordinator.playback_state(), PlaybackState::Loading);
        assert_eq!(h.backend.connect_count(), 1);
        let calls = h.backend.calls_for(1);
        assert_eq!(texts(&calls[0]), vec!["Funk", "Shoegaze", "Dubstep"]);
        assert_eq!(calls[1], SessionCall::Play);
        assert_eq!(h.output.resumes(), 1);
        assert_eq!(h.output.connects(), 1);
        assert_eq!(h.output.ramps(), vec![(0.0, 1.0, Duration::from_millis(100))]);
        assert!(h.errors().is_empty());

        h.push(1, ServerMessage::setup_complete()).await;
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_plays_share_one_connection() {
        let h = harness(FakeBackend::with_delay(Duration::from_millis(100)));
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        tokio::join!(h.coordinator.play(), h.coordinator.play());
        assert_eq!(h.backend.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_loading_forces_new_connection() {
        let h = harness(FakeBackend::with_delay(Duration::from_millis(100)));
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();

        let first = tokio::spawn({
            let coordinator = h.coordinator.clone();
            async move { coordinator.play().await }
        });
        settle().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Loading);
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Connecting);

        h.coordinator.toggle_play_pause().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Stopped);

        first.await.unwrap();
        // The late connection is closed, never used.
        assert_eq!(h.backend.calls_for(1), vec![SessionCall::Close]);
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Stopped);

        h.coordinator.play().await;
        assert_eq!(h.backend.connect_count(), 2);
        let calls = h.backend.calls_for(2);
        assert!(matches!(calls[0], SessionCall::Prompts(_)));
        assert_eq!(calls[1], SessionCall::Play);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_prompt_excluded_from_updates() {
        let mut h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;
        h.drain_events();

        h.push(1, ServerMessage::filtered("Shoegaze", "unsafe")).await;
        let notices: Vec<_> = h
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, CoordinatorEvent::FilteredPrompt { .. }))
            .collect();
        assert_eq!(
            notices,
            vec![CoordinatorEvent::FilteredPrompt {
                text: "Shoegaze".into(),
                reason: "unsafe".into(),
            }]
        );
        assert!(h.coordinator.filtered_texts().contains("Shoegaze"));
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Loading);

        tokio::time::advance(Duration::from_millis(250)).await;
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        let calls = h.backend.calls_for(1);
        assert_eq!(texts(calls.last().unwrap()), vec!["Funk", "Dubstep"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_active_prompt_forces_pause() {
        let mut h = harness(FakeBackend::new());
        let silent = PromptSet::default_bank(0);

        let result = h.coordinator.set_weighted_prompts(silent.clone()).await;
        assert_eq!(result, Err(CoreError::NoActivePrompt));
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Paused);
        assert_eq!(
            h.errors(),
            vec!["There needs to be one active prompt to play.".to_string()]
        );

        // Same while connected: play never reaches the backend's play.
        h.coordinator.play().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Paused);
        assert!(!h.backend.calls_for(1).contains(&SessionCall::Play));
        assert_eq!(h.errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_prompt_updates_are_throttled() {
        let h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;
        let before = h.backend.calls_for(1).len();

        tokio::time::advance(Duration::from_millis(250)).await;
        for _ in 0..5 {
            h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
            tokio::time::advance(Duration::from_millis(20)).await;
        }
        assert_eq!(h.backend.calls_for(1).len(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priming_then_playing() {
        let h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;

        h.push(1, audio(24_000)).await;
        assert_eq!(h.output.scheduled_starts(), vec![2.0]);
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Loading);

        tokio::time::advance(Duration::from_millis(1_900)).await;
        settle().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Loading);

        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_while_playing_is_ignored() {
        let h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;
        h.push(1, audio(48_000)).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Playing);
        let calls_before = h.backend.calls_for(1).len();

        h.coordinator.play().await;
        for _ in 0..3 {
            h.push(1, audio(24_000)).await;
        }
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Playing);
        assert_eq!(h.output.ramps(), vec![(0.0, 1.0, Duration::from_millis(100))]);
        assert_eq!(h.output.resumes(), 1);
        assert_eq!(h.backend.calls_for(1).len(), calls_before);
        assert_eq!(h.backend.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_scheduled_back_to_back() {
        let h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;

        for frames in [24_000, 12_000, 48_000] {
            h.push(1, audio(frames)).await;
        }
        assert_eq!(h.output.scheduled_starts(), vec![2.0, 2.5, 2.75]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_underrun_returns_to_loading() {
        let h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;
        h.push(1, audio(48_000)).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Playing);

        // Timeline ends at 3.0; the clock is past it.
        h.output.set_time(4.0);
        h.push(1, audio(48_000)).await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Loading);
        assert_eq!(h.output.scheduled_starts().len(), 1);

        h.push(1, audio(48_000)).await;
        assert_eq!(h.output.scheduled_starts(), vec![2.0, 6.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_ignored_while_paused() {
        let h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;
        h.coordinator.toggle_play_pause().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Stopped);

        h.coordinator.play().await;
        h.push(2, audio(48_000)).await;
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Playing);

        h.coordinator.toggle_play_pause().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Paused);
        assert_eq!(h.output.replacements(), 1);
        assert!(h.backend.calls_for(2).contains(&SessionCall::Pause));

        h.push(2, audio(48_000)).await;
        assert_eq!(h.output.scheduled_starts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_error_force_stops() {
        let mut h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;
        h.drain_events();

        h.backend
            .signals(1)
            .send(SessionSignal::Error("reset by peer".into()))
            .unwrap();
        settle().await;

        assert_eq!(h.coordinator.playback_state(), PlaybackState::Stopped);
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Erroring);
        assert_eq!(
            h.errors(),
            vec!["Connection error, please restart audio.".to_string()]
        );
        let calls = h.backend.calls_for(1);
        assert!(calls.ends_with(&[SessionCall::Stop, SessionCall::Close]));

        // Later pushes from the dead connection are ignored.
        let _ = h
            .backend
            .signals(1)
            .send(SessionSignal::Message(ServerMessage::filtered("Funk", "x")));
        settle().await;
        assert!(h.drain_events().is_empty());
        assert!(h.coordinator.filtered_texts().is_empty());

        // No automatic reconnect.
        assert_eq!(h.backend.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_signal_disconnects() {
        let mut h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;
        h.drain_events();

        h.backend
            .signals(1)
            .send(SessionSignal::Closed("going away".into()))
            .unwrap();
        settle().await;
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Stopped);
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Disconnected);
        assert_eq!(h.errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_reports_and_stops() {
        let mut h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.backend.fail_next("refused");
        h.coordinator.play().await;

        assert_eq!(h.coordinator.playback_state(), PlaybackState::Stopped);
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Erroring);
        assert_eq!(
            h.errors(),
            vec!["Connection error, please restart audio.".to_string()]
        );

        h.coordinator.play().await;
        assert_eq!(h.backend.connect_count(), 2);
        assert_eq!(h.coordinator.playback_state(), PlaybackState::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_clears_filtered_texts() {
        let h = harness(FakeBackend::new());
        h.coordinator.set_weighted_prompts(three_prompts()).await.unwrap();
        h.coordinator.play().await;
        h.push(1, ServerMessage::filtered("Shoegaze", "unsafe")).await;
        assert_eq!(h.coordinator.filtered_texts().len(), 1);

        h.coordinator.stop().await;
        h.coordinator.play().await;
        assert!(h.coordinator.filtered_texts().is_empty());
        let calls = h.backend.calls_for(2);
        assert_eq!(texts(&calls[0]).len(), 3);
    }
}
