//! Base error types and the callback capability for USP connections.
//!
//! Every synchronous failure of a [`Connection`](super::Connection) operation is
//! reported as a [`UspError`]. Failures that happen on the background work loop
//! never surface as errors; they are converted into
//! [`UspCallbacks::on_error`] invocations instead.

use thiserror::Error;

use super::messages::{
    SpeechEndDetectedMsg, SpeechFragmentMsg, SpeechHypothesisMsg, SpeechPhraseMsg,
    SpeechStartDetectedMsg, TranslationHypothesisMsg, TranslationPhraseMsg,
    TranslationSynthesisMsg, TurnEndMsg, TurnStartMsg, UserMsg,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while configuring or driving a USP connection.
#[derive(Debug, Error)]
pub enum UspError {
    /// Malformed caller input (empty path, missing endpoint URL, missing credential).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not valid in the current connection state.
    #[error("Logic error: {0}")]
    LogicError(String),

    /// Resource or setup failure (header creation, transport write/flush, ...).
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Malformed inbound message framing.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Inbound payload could not be decoded.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<serde_json::Error> for UspError {
    fn from(err: serde_json::Error) -> Self {
        UspError::DecodeError(err.to_string())
    }
}

/// Result type for USP operations.
pub type UspResult<T> = Result<T, UspError>;

// =============================================================================
// Callbacks
// =============================================================================

/// Handler invoked by a connection for every decoded service event.
///
/// All methods default to no-ops so handlers only implement what they consume.
/// Callbacks run on the connection's work loop, outside the session lock, so a
/// handler may call back into the connection (e.g. queue more audio).
/// A handler that panics is reported through [`UspCallbacks::on_error`] and the
/// loop keeps delivering.
pub trait UspCallbacks: Send + Sync {
    fn on_speech_start_detected(&self, _msg: SpeechStartDetectedMsg) {}

    fn on_speech_end_detected(&self, _msg: SpeechEndDetectedMsg) {}

    fn on_speech_hypothesis(&self, _msg: SpeechHypothesisMsg) {}

    fn on_speech_fragment(&self, _msg: SpeechFragmentMsg) {}

    fn on_speech_phrase(&self, _msg: SpeechPhraseMsg) {}

    fn on_translation_hypothesis(&self, _msg: TranslationHypothesisMsg) {}

    fn on_translation_phrase(&self, _msg: TranslationPhraseMsg) {}

    fn on_translation_synthesis(&self, _msg: TranslationSynthesisMsg) {}

    fn on_turn_start(&self, _msg: TurnStartMsg) {}

    fn on_turn_end(&self, _msg: TurnEndMsg) {}

    /// Any message whose path is not part of the speech protocol.
    fn on_user_message(&self, _msg: UserMsg) {}

    /// Transport failures and errors raised while pumping I/O.
    fn on_error(&self, _message: &str) {}
}
