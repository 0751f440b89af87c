//! Error taxonomy for the streaming core.
//!
//! Every failure is caught at the boundary of the component that owns it and
//! turned into a user-visible notice. Nothing here is fatal to the process.

/// Result alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the streaming core.
///
/// `Clone` so a single in-flight connection result can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Establishing or maintaining the backend connection failed.
    #[error("connection: {0}")]
    Connection(String),

    /// The backend filtered a prompt's text for this session.
    #[error("prompt rejected: {text} ({reason})")]
    PromptRejected { text: String, reason: String },

    /// No prompt has a nonzero weight and unfiltered text.
    #[error("no active prompt")]
    NoActivePrompt,

    /// No recorder could be opened for the output tap.
    #[error("recording unsupported: {0}")]
    RecordingUnsupported(String),

    /// A recording is already in progress.
    #[error("already recording")]
    AlreadyRecording,

    /// An imported prompt file was malformed.
    #[error("invalid import format: {0}")]
    InvalidImportFormat(String),

    /// A prompt edit violated the prompt set's invariants.
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    /// The platform exposes no MIDI capability.
    #[error("MIDI unsupported: {0}")]
    MidiUnsupported(String),

    /// The platform or user refused MIDI access.
    #[error("MIDI access denied: {0}")]
    MidiAccessDenied(String),

    /// The operation was abandoned by a lifecycle transition (e.g. `stop`).
    #[error("cancelled")]
    Cancelled,

    /// File I/O failure.
    #[error("io: {0}")]
    Io(String),
}

impl CoreError {
    /// Text shown to the user when this error is surfaced as a notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection(_) => "Connection error, please restart audio.".to_string(),
            Self::PromptRejected { text, reason } => {
                format!("Prompt \"{}\" was filtered: {}", text, reason)
            }
            Self::NoActivePrompt => "There needs to be one active prompt to play.".to_string(),
            Self::RecordingUnsupported(detail) => {
                format!("Recording is not available: {}", detail)
            }
            Self::AlreadyRecording => "Recording is already in progress.".to_string(),
            Self::InvalidImportFormat(detail) => format!("Invalid prompt file: {}", detail),
            Self::InvalidPrompt(detail) => format!("Invalid prompt: {}", detail),
            Self::MidiUnsupported(_) => "MIDI is not supported on this platform.".to_string(),
            Self::MidiAccessDenied(_) => "MIDI access was denied.".to_string(),
            Self::Cancelled => "Operation cancelled.".to_string(),
            Self::Io(detail) => format!("File error: {}", detail),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(error: std::io::Error) -> Self {
        CoreError::Io(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            CoreError::NoActivePrompt.user_message(),
            "There needs to be one active prompt to play."
        );
        assert_eq!(
            CoreError::Connection("socket reset".into()).user_message(),
            "Connection error, please restart audio."
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::Io(ref m) if m.contains("missing")));
    }
}
