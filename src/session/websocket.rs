//! Live music session over a WebSocket.
//!
//! Protocol:
//! 1. Connect to `<endpoint>?key=<api key>`
//! 2. Send the setup frame naming the model
//! 3. Send prompt updates and playback controls as JSON text frames
//! 4. Receive JSON pushes (text or binary frames) on a reader task that
//!    forwards them as [`SessionSignal`]s

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::protocol::{ClientMessage, PlaybackControl, ServerMessage, WirePrompt};
use super::{MusicBackend, MusicSession, SessionSignal, SignalSender};
use crate::error::CoreError;

/// Generative-language live music endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateMusic";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Connects sessions to the hosted live music service.
pub struct LiveMusicBackend {
    endpoint: String,
    api_key: String,
}

impl LiveMusicBackend {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, sep, self.api_key)
    }
}

impl MusicBackend for LiveMusicBackend {
    fn connect(
        &self,
        model: &str,
        signals: SignalSender,
    ) -> BoxFuture<'_, Result<Arc<dyn MusicSession>, CoreError>> {
        let url = self.url();
        let model = model.to_string();
        Box::pin(async move {
            info!(endpoint = %self.endpoint, model = %model, "Connecting to live music service");
            let (ws, _) = connect_async(url.as_str())
                .await
                .map_err(|e| CoreError::Connection(format!("WebSocket connect failed: {}", e)))?;
            let (mut ws_tx, ws_rx) = ws.split();

            send_frame(&mut ws_tx, &ClientMessage::setup(&model)).await?;

            let reader = tokio::spawn(read_loop(ws_rx, signals));
            let session: Arc<dyn MusicSession> = Arc::new(LiveMusicSession {
                sink: Mutex::new(ws_tx),
                reader: std::sync::Mutex::new(Some(reader)),
            });
            Ok(session)
        })
    }
}

/// One open WebSocket session.
pub struct LiveMusicSession {
    sink: Mutex<WsSink>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LiveMusicSession {
    async fn send(&self, msg: ClientMessage) -> Result<(), CoreError> {
        let mut sink = self.sink.lock().await;
        send_frame(&mut sink, &msg).await
    }

    async fn control(&self, control: PlaybackControl) -> Result<(), CoreError> {
        debug!(?control, "Sending playback control");
        self.send(ClientMessage::control(control)).await
    }
}

impl MusicSession for LiveMusicSession {
    fn set_weighted_prompts(&self, prompts: Vec<WirePrompt>) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(async move {
            debug!(count = prompts.len(), "Sending weighted prompts");
            self.send(ClientMessage::weighted_prompts(prompts)).await
        })
    }

    fn play(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(self.control(PlaybackControl::Play))
    }

    fn pause(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(self.control(PlaybackControl::Pause))
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(self.control(PlaybackControl::Stop))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Ok(mut reader) = self.reader.lock() {
                if let Some(handle) = reader.take() {
                    handle.abort();
                }
            }
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.close().await {
                debug!("WebSocket close failed: {}", e);
            }
        })
    }
}

impl Drop for LiveMusicSession {
    fn drop(&mut self) {
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

async fn send_frame(sink: &mut WsSink, msg: &ClientMessage) -> Result<(), CoreError> {
    let json = serde_json::to_string(msg)
        .map_err(|e| CoreError::Connection(format!("Failed to encode frame: {}", e)))?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| CoreError::Connection(format!("WebSocket send failed: {}", e)))
}

/// Forward server pushes until the stream ends. Exactly one terminal signal
/// is sent, unless the receiver is already gone.
async fn read_loop(mut ws_rx: SplitStream<WsStream>, signals: SignalSender) {
    while let Some(frame) = ws_rx.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(close)) => {
                let reason = close
                    .map(|c| format!("{} {}", c.code, c.reason))
                    .unwrap_or_else(|| "closed by server".to_string());
                info!(reason = %reason, "Live music socket closed");
                let _ = signals.send(SessionSignal::Closed(reason));
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Live music socket error: {}", e);
                let _ = signals.send(SessionSignal::Error(e.to_string()));
                return;
            }
        };

        match ServerMessage::parse(&payload) {
            Ok(msg) => {
                if signals.send(SessionSignal::Message(msg)).is_err() {
                    return;
                }
            }
            Err(e) => warn!(bytes = payload.len(), "Unparseable server frame: {}", e),
        }
    }
    let _ = signals.send(SessionSignal::Closed("stream ended".to_string()));
}
