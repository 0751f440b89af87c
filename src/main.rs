//! PromptDJ engine.
//!
//! Runs the streaming coordinator headless and talks to a presentation layer
//! over JSON-line IPC on stdin/stdout.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use promptdj_core::audio::output::list_output_devices;
use promptdj_core::audio::{tap_ring_buffer, MixerOutput, TapConsumer, CHANNELS, SAMPLE_RATE};
use promptdj_core::config::{paths, read_app_config, AppConfig, API_KEY_ENV};
use promptdj_core::events::CoordinatorEvent;
use promptdj_core::ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use promptdj_core::ipc::{EngineCommand, EngineEvent, PromptView};
use promptdj_core::midi::{ControlChange, MidiBridge};
use promptdj_core::prompts::{io as prompt_io, ControllerBinding, PromptSet};
use promptdj_core::recording::{save_recording, RecordingSink, WavRecorderFactory};
use promptdj_core::session::LiveMusicBackend;
use promptdj_core::{logger, Coordinator};

#[tokio::main]
async fn main() {
    logger::init(&paths::get_log_dir());

    // Emit starting event immediately so the UI knows we're alive.
    emit_event(&EngineEvent::Starting {});

    let config = read_app_config();
    info!(
        model = %config.model,
        output_device = ?config.output_device,
        midi_device = ?config.midi_device,
        "Configuration loaded"
    );
    if config.api_key.is_none() {
        warn!("No API key configured; set {} or apiKey in config.json", API_KEY_ENV);
        emit_error(&format!("No API key configured. Set {} to connect.", API_KEY_ENV));
    }

    let mut cmd_rx = spawn_stdin_reader();

    let (output, tap) = open_output(&config);
    let backend = LiveMusicBackend::new(&config.endpoint, config.api_key.as_deref().unwrap_or(""));
    let coordinator = Coordinator::new(
        Arc::new(backend),
        Arc::new(output),
        config.coordinator_settings(),
    );
    let recorder = RecordingSink::new(
        Arc::new(WavRecorderFactory),
        &config.preferred_recording_mime,
        SAMPLE_RATE,
        CHANNELS,
        tap,
        coordinator.events(),
    );

    let midi = MidiBridge::new();
    if let Some(device) = &config.midi_device {
        midi.set_active_device(device);
    }

    let prompts = startup_prompts(&config);
    coordinator.load_prompts(prompts.clone());

    let mut engine = Engine {
        config,
        coordinator,
        recorder,
        midi,
        prompts,
        learn_target: None,
    };
    let mut coordinator_rx = engine.coordinator.subscribe();
    let mut midi_rx = engine.midi.subscribe();

    emit_event(&EngineEvent::Ready {});
    engine.emit_prompts();
    info!("PromptDJ engine ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => {
                        if !engine.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        // stdin closed, parent process gone
                        info!("stdin closed, shutting down");
                        engine.coordinator.stop().await;
                        break;
                    }
                }
            }
            event = coordinator_rx.recv() => {
                match event {
                    Ok(event) => engine.handle_coordinator_event(event),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Coordinator events lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
            cc = midi_rx.recv() => {
                match cc {
                    Ok(cc) => engine.handle_control_change(cc).await,
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "MIDI events lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("PromptDJ engine shutting down");
}

/// Open the configured device, falling back to headless rendering.
fn open_output(config: &AppConfig) -> (MixerOutput, TapConsumer) {
    let (tap_tx, tap_rx) = tap_ring_buffer(None);
    match MixerOutput::open_device(
        SAMPLE_RATE,
        CHANNELS,
        config.output_device.as_deref(),
        config.volume,
        Some(tap_tx),
    ) {
        Ok(output) => (output, tap_rx),
        Err(e) => {
            warn!("No audio device available ({}), rendering headless", e);
            let (tap_tx, tap_rx) = tap_ring_buffer(None);
            (MixerOutput::headless(SAMPLE_RATE, CHANNELS, Some(tap_tx)), tap_rx)
        }
    }
}

/// The configured prompt file, or the stock bank.
fn startup_prompts(config: &AppConfig) -> PromptSet {
    if let Some(path) = &config.prompts_file {
        match prompt_io::load_from_file(path) {
            Ok(set) => return set,
            Err(e) => {
                warn!(path = %path.display(), "Failed to load prompts: {}", e);
                emit_error(&e.user_message());
            }
        }
    }
    PromptSet::default_bank(config.startup_active_prompts)
}

struct Engine {
    config: AppConfig,
    coordinator: Coordinator,
    recorder: RecordingSink,
    midi: MidiBridge,
    /// Authoritative prompt set; the coordinator gets a copy on every edit.
    prompts: PromptSet,
    /// Prompt waiting for its controller in MIDI learn mode.
    learn_target: Option<String>,
}

impl Engine {
    /// Handle a single command. Returns `false` if the main loop should exit.
    async fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::Ping {} => emit_event(&EngineEvent::Pong {}),
            EngineCommand::Shutdown {} => {
                info!("Shutdown requested");
                emit_event(&EngineEvent::Stopping {});
                self.coordinator.stop().await;
                return false;
            }
            // Loading can wait on the network; keep the loop free for `stop`.
            EngineCommand::Play {} => {
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move { coordinator.play().await });
            }
            EngineCommand::Toggle {} => {
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move { coordinator.toggle_play_pause().await });
            }
            EngineCommand::Pause {} => self.coordinator.pause().await,
            EngineCommand::Stop {} => self.coordinator.stop().await,
            EngineCommand::SetPrompts { prompts } => match prompt_io::from_entries(prompts) {
                Ok(set) => {
                    self.prompts = set;
                    self.prompts_changed().await;
                }
                Err(e) => emit_error(&e.user_message()),
            },
            EngineCommand::SetWeight { prompt_id, weight } => {
                match self.prompts.set_weight(&prompt_id, weight) {
                    Ok(()) => self.prompts_changed().await,
                    Err(e) => emit_error(&e.user_message()),
                }
            }
            EngineCommand::SetText { prompt_id, text } => {
                match self.prompts.set_text(&prompt_id, &text) {
                    Ok(()) => self.prompts_changed().await,
                    Err(e) => emit_error(&e.user_message()),
                }
            }
            EngineCommand::GetPrompts {} => self.emit_prompts(),
            EngineCommand::ImportPrompts { path } => match prompt_io::load_from_file(&path) {
                Ok(set) => {
                    self.prompts = set;
                    self.prompts_changed().await;
                }
                Err(e) => {
                    warn!(path = %path.display(), "Prompt import failed: {}", e);
                    emit_error(&e.user_message());
                }
            },
            EngineCommand::ExportPrompts { path } => {
                if let Err(e) = prompt_io::save_to_file(&self.prompts, &path) {
                    warn!(path = %path.display(), "Prompt export failed: {}", e);
                    emit_error(&e.user_message());
                }
            }
            EngineCommand::RequestMidiAccess {} => match self.midi.acquire_access() {
                Ok(_) => self.emit_midi_devices(),
                Err(e) => {
                    warn!("MIDI access failed: {}", e);
                    emit_error(&e.user_message());
                }
            },
            EngineCommand::ListMidiDevices {} => self.emit_midi_devices(),
            EngineCommand::SetMidiDevice { id } => {
                self.midi.set_active_device(&id);
                self.emit_midi_devices();
            }
            EngineCommand::LearnCc { prompt_id } => {
                if self.prompts.get(&prompt_id).is_some() {
                    info!(prompt = %prompt_id, "MIDI learn armed");
                    self.learn_target = Some(prompt_id);
                } else {
                    emit_error(&format!("Unknown prompt: {}", prompt_id));
                }
            }
            EngineCommand::StartRecording {} => {
                if let Ok(mime_type) = self.recorder.start() {
                    emit_event(&EngineEvent::RecordingStarted { mime_type });
                }
            }
            EngineCommand::StopRecording {} => {
                if let Err(e) = self.stop_recording().await {
                    error!("Failed to save recording: {:#}", e);
                    emit_error(&format!("Failed to save recording: {}", e));
                }
            }
            EngineCommand::ListOutputDevices {} => emit_event(&EngineEvent::OutputDevices {
                devices: list_output_devices(),
            }),
        }
        true
    }

    fn handle_coordinator_event(&self, event: CoordinatorEvent) {
        let refresh = matches!(event, CoordinatorEvent::FilteredPrompt { .. });
        emit_event(&EngineEvent::from(event));
        if refresh {
            self.emit_prompts();
        }
    }

    async fn handle_control_change(&mut self, cc: ControlChange) {
        emit_event(&EngineEvent::from(cc));
        if let Some(prompt_id) = self.learn_target.take() {
            let binding = ControllerBinding {
                channel: Some(cc.channel),
                control: cc.control,
            };
            match self.prompts.set_binding(&prompt_id, Some(binding)) {
                Ok(()) => {
                    info!(prompt = %prompt_id, channel = cc.channel, cc = cc.control, "MIDI learn bound");
                    self.emit_prompts();
                }
                Err(e) => emit_error(&e.user_message()),
            }
            return;
        }
        if !self.prompts.apply_control_change(&cc).is_empty() {
            self.prompts_changed().await;
        }
    }

    /// Forward the edited set to the coordinator and show it.
    async fn prompts_changed(&mut self) {
        // Failures are already reported as coordinator events.
        let _ = self
            .coordinator
            .set_weighted_prompts(self.prompts.clone())
            .await;
        self.emit_prompts();
    }

    fn emit_prompts(&self) {
        emit_event(&EngineEvent::Prompts {
            prompts: PromptView::list(&self.prompts, &self.coordinator.filtered_texts()),
        });
    }

    fn emit_midi_devices(&self) {
        emit_event(&EngineEvent::MidiDevices {
            devices: self.midi.list_devices(),
            active: self.midi.active_device(),
        });
    }

    async fn stop_recording(&self) -> anyhow::Result<()> {
        let blob = match self.recorder.stop().await {
            Some(blob) if !blob.is_empty() => blob,
            _ => {
                emit_event(&EngineEvent::RecordingEmpty {});
                return Ok(());
            }
        };
        let dir = self.config.recording_dir();
        let path = save_recording(&blob, &dir)
            .with_context(|| format!("writing into {}", dir.display()))?;
        emit_event(&EngineEvent::RecordingSaved {
            path: path.display().to_string(),
            mime_type: blob.mime_type.clone(),
            bytes: blob.len(),
        });
        Ok(())
    }
}
