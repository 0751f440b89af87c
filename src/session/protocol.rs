//! JSON wire messages for the live music WebSocket.
//!
//! Client frames use `{"setup": ...}`, `{"clientContent": ...}` and
//! `{"playbackControl": ...}`. Server frames may carry any combination of
//! `setupComplete`, `filteredPrompt` and `serverContent`; unknown fields are
//! ignored.

use serde::{Deserialize, Serialize};

/// A prompt as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePrompt {
    pub text: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackControl {
    Play,
    Pause,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setup {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientContent {
    #[serde(rename = "weightedPrompts")]
    pub weighted_prompts: Vec<WirePrompt>,
}

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Setup {
        setup: Setup,
    },
    ClientContent {
        #[serde(rename = "clientContent")]
        client_content: ClientContent,
    },
    PlaybackControl {
        #[serde(rename = "playbackControl")]
        playback_control: PlaybackControl,
    },
}

impl ClientMessage {
    /// Setup frame; bare model names get the `models/` prefix.
    pub fn setup(model: &str) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        Self::Setup {
            setup: Setup { model },
        }
    }

    pub fn weighted_prompts(prompts: Vec<WirePrompt>) -> Self {
        Self::ClientContent {
            client_content: ClientContent {
                weighted_prompts: prompts,
            },
        }
    }

    pub fn control(control: PlaybackControl) -> Self {
        Self::PlaybackControl {
            playback_control: control,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredPrompt {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub filtered_reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    /// Base64-encoded 16-bit PCM.
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub audio_chunks: Vec<AudioChunk>,
}

/// One server push.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub filtered_prompt: Option<FilteredPrompt>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

impl ServerMessage {
    pub fn parse(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// The chunk the scheduler consumes. Only the first chunk of a
    /// multi-chunk payload is used.
    // TODO: confirm whether the backend ever batches several chunks into one
    // message; if it does, forward all of them in order.
    pub fn first_audio_chunk(&self) -> Option<&AudioChunk> {
        self.server_content
            .as_ref()
            .and_then(|content| content.audio_chunks.first())
    }

    pub fn audio_chunk_count(&self) -> usize {
        self.server_content
            .as_ref()
            .map_or(0, |content| content.audio_chunks.len())
    }

    pub fn setup_complete() -> Self {
        Self {
            setup_complete: Some(serde_json::json!({})),
            ..Self::default()
        }
    }

    pub fn filtered(text: &str, reason: &str) -> Self {
        Self {
            filtered_prompt: Some(FilteredPrompt {
                text: text.to_string(),
                filtered_reason: reason.to_string(),
            }),
            ..Self::default()
        }
    }

    pub fn audio(chunks: Vec<AudioChunk>) -> Self {
        Self {
            server_content: Some(ServerContent {
                audio_chunks: chunks,
            }),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_frame() {
        let json = serde_json::to_value(ClientMessage::setup("lyria-realtime-exp")).unwrap();
        assert_eq!(json, json!({"setup": {"model": "models/lyria-realtime-exp"}}));

        let json = serde_json::to_value(ClientMessage::setup("models/x")).unwrap();
        assert_eq!(json["setup"]["model"], "models/x");
    }

    #[test]
    fn test_prompt_and_control_frames() {
        let json = serde_json::to_value(ClientMessage::weighted_prompts(vec![WirePrompt {
            text: "Funk".into(),
            weight: 1.0,
        }]))
        .unwrap();
        assert_eq!(
            json,
            json!({"clientContent": {"weightedPrompts": [{"text": "Funk", "weight": 1.0}]}})
        );

        let json = serde_json::to_value(ClientMessage::control(PlaybackControl::Pause)).unwrap();
        assert_eq!(json, json!({"playbackControl": "PAUSE"}));
    }

    #[test]
    fn test_parse_setup_complete() {
        let msg = ServerMessage::parse(br#"{"setupComplete": {}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(msg.filtered_prompt.is_none());
        assert_eq!(msg.audio_chunk_count(), 0);
    }

    #[test]
    fn test_parse_filtered_prompt() {
        let msg = ServerMessage::parse(
            br#"{"filteredPrompt": {"text": "Thrash", "filteredReason": "policy"}}"#,
        )
        .unwrap();
        assert!(!msg.is_setup_complete());
        assert_eq!(msg, ServerMessage::filtered("Thrash", "policy"));
    }

    #[test]
    fn test_parse_audio_keeps_first_chunk() {
        let msg = ServerMessage::parse(
            br#"{"serverContent": {"audioChunks": [
                {"data": "AAAA", "mimeType": "audio/l16;rate=48000;channels=2"},
                {"data": "BBBB"}
            ]}, "usageMetadata": {"tokens": 3}}"#,
        )
        .unwrap();
        assert_eq!(msg.audio_chunk_count(), 2);
        let first = msg.first_audio_chunk().unwrap();
        assert_eq!(first.data, "AAAA");
        assert_eq!(
            first.mime_type.as_deref(),
            Some("audio/l16;rate=48000;channels=2")
        );
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(ServerMessage::parse(b"\x00\x01garbage").is_err());
    }
}
