//! USP service message types.
//!
//! This module defines the typed events decoded from inbound service messages
//! and the decoder that maps a `(path, body)` pair onto them.
//!
//! # Protocol Overview
//!
//! Server messages are keyed by their `Path` header:
//! - `speech.startDetected` / `speech.endDetected` - speech activity
//! - `turn.start` / `turn.end` - turn boundaries
//! - `speech.hypothesis` / `speech.fragment` - intermediate results
//! - `speech.phrase` - final recognition result
//! - `translation.hypothesis` / `translation.phrase` - translation results
//! - `translation.synthesis` - synthesized audio (binary)
//!
//! Any other path is surfaced as a [`UserMsg`] with its raw body.

use std::collections::HashMap;

use bytes::Bytes;
use phf::phf_map;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use super::base::{UspCallbacks, UspError, UspResult};

// =============================================================================
// Wire Constants
// =============================================================================

/// Message paths, compared case-sensitively.
pub mod path {
    pub const SPEECH_HYPOTHESIS: &str = "speech.hypothesis";
    pub const SPEECH_PHRASE: &str = "speech.phrase";
    pub const SPEECH_FRAGMENT: &str = "speech.fragment";
    pub const SPEECH_START_DETECTED: &str = "speech.startDetected";
    pub const SPEECH_END_DETECTED: &str = "speech.endDetected";
    pub const TURN_START: &str = "turn.start";
    pub const TURN_END: &str = "turn.end";
    pub const TRANSLATION_HYPOTHESIS: &str = "translation.hypothesis";
    pub const TRANSLATION_PHRASE: &str = "translation.phrase";
    pub const TRANSLATION_SYNTHESIS: &str = "translation.synthesis";
    pub const TELEMETRY: &str = "telemetry";

    /// Outbound audio substream.
    pub const AUDIO: &str = "/audio";
}

/// Audio timeline position, in service ticks.
pub type OffsetType = u64;

/// Audio timeline length, in service ticks.
pub type DurationType = u64;

// =============================================================================
// Status Tables
// =============================================================================

/// Outcome of a recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionStatus {
    Success,
    NoMatch,
    InitialSilenceTimeout,
    BabbleTimeout,
    Error,
    EndOfDictation,
    Unknown,
}

static RECOGNITION_STATUS: phf::Map<&'static str, RecognitionStatus> = phf_map! {
    "Success" => RecognitionStatus::Success,
    "NoMatch" => RecognitionStatus::NoMatch,
    "InitialSilenceTimeout" => RecognitionStatus::InitialSilenceTimeout,
    "BabbleTimeout" => RecognitionStatus::BabbleTimeout,
    "Error" => RecognitionStatus::Error,
    "EndOfDictation" => RecognitionStatus::EndOfDictation,
};

impl RecognitionStatus {
    /// Decode a `RecognitionStatus` field. Unrecognized strings yield `Unknown`.
    pub fn from_wire(status: &str) -> Self {
        match RECOGNITION_STATUS.get(status) {
            Some(status) => *status,
            None => {
                info!("Unknown RecognitionStatus: {}", status);
                Self::Unknown
            }
        }
    }
}

/// Outcome of a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TranslationStatus {
    Success,
    Error,
    #[default]
    Unknown,
}

static TRANSLATION_STATUS: phf::Map<&'static str, TranslationStatus> = phf_map! {
    "Success" => TranslationStatus::Success,
    "Error" => TranslationStatus::Error,
};

impl TranslationStatus {
    /// Decode a `TranslationStatus` field. Unrecognized strings yield `Unknown`.
    pub fn from_wire(status: &str) -> Self {
        match TRANSLATION_STATUS.get(status) {
            Some(status) => *status,
            None => {
                info!("Unknown TranslationStatus: {}", status);
                Self::Unknown
            }
        }
    }
}

// =============================================================================
// Decoded Messages
// =============================================================================

/// `speech.startDetected` / `speech.endDetected`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechDetectedMsg {
    /// The decoded JSON document.
    pub json: String,
    pub offset: OffsetType,
}

pub type SpeechStartDetectedMsg = SpeechDetectedMsg;
pub type SpeechEndDetectedMsg = SpeechDetectedMsg;

/// `turn.start`.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnStartMsg {
    pub json: String,
    /// Service tag from `Context.Tag`.
    pub context_tag: String,
}

/// `turn.end`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnEndMsg {}

/// `speech.hypothesis` / `speech.fragment`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechHypothesisMsg {
    pub json: String,
    pub offset: OffsetType,
    pub duration: DurationType,
    pub text: String,
}

pub type SpeechFragmentMsg = SpeechHypothesisMsg;

/// `speech.phrase`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechPhraseMsg {
    pub json: String,
    pub offset: OffsetType,
    pub duration: DurationType,
    pub recognition_status: RecognitionStatus,
    /// Only populated when the status is `Success`.
    pub display_text: String,
}

/// Translations keyed by language tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationResult {
    /// `Unknown` when the message carries no translation status.
    pub translation_status: TranslationStatus,
    pub translations: HashMap<String, String>,
}

/// `translation.hypothesis`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationHypothesisMsg {
    pub json: String,
    pub offset: OffsetType,
    pub duration: DurationType,
    pub text: String,
    pub translation: TranslationResult,
}

/// `translation.phrase`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationPhraseMsg {
    pub json: String,
    pub offset: OffsetType,
    pub duration: DurationType,
    pub text: String,
    pub translation: TranslationResult,
    pub recognition_status: RecognitionStatus,
}

/// `translation.synthesis`, raw audio.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationSynthesisMsg {
    pub audio: Bytes,
}

/// A message on a path the protocol does not define.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMsg {
    pub path: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Every event a connection can surface to its callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SpeechStartDetected(SpeechStartDetectedMsg),
    SpeechEndDetected(SpeechEndDetectedMsg),
    TurnStart(TurnStartMsg),
    TurnEnd(TurnEndMsg),
    SpeechHypothesis(SpeechHypothesisMsg),
    SpeechFragment(SpeechFragmentMsg),
    SpeechPhrase(SpeechPhraseMsg),
    TranslationHypothesis(TranslationHypothesisMsg),
    TranslationPhrase(TranslationPhraseMsg),
    TranslationSynthesis(TranslationSynthesisMsg),
    UserMessage(UserMsg),
}

impl InboundMessage {
    /// Invoke the callback matching this message.
    pub fn dispatch(self, callbacks: &dyn UspCallbacks) {
        match self {
            Self::SpeechStartDetected(msg) => callbacks.on_speech_start_detected(msg),
            Self::SpeechEndDetected(msg) => callbacks.on_speech_end_detected(msg),
            Self::TurnStart(msg) => callbacks.on_turn_start(msg),
            Self::TurnEnd(msg) => callbacks.on_turn_end(msg),
            Self::SpeechHypothesis(msg) => callbacks.on_speech_hypothesis(msg),
            Self::SpeechFragment(msg) => callbacks.on_speech_fragment(msg),
            Self::SpeechPhrase(msg) => callbacks.on_speech_phrase(msg),
            Self::TranslationHypothesis(msg) => callbacks.on_translation_hypothesis(msg),
            Self::TranslationPhrase(msg) => callbacks.on_translation_phrase(msg),
            Self::TranslationSynthesis(msg) => callbacks.on_translation_synthesis(msg),
            Self::UserMessage(msg) => callbacks.on_user_message(msg),
        }
    }
}

// =============================================================================
// Wire Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectedPayload {
    #[serde(default)]
    offset: Option<OffsetType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TurnStartPayload {
    context: TurnContext,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TurnContext {
    tag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpeechPayload {
    offset: OffsetType,
    duration: DurationType,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PhrasePayload {
    offset: OffsetType,
    duration: DurationType,
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusPayload {
    recognition_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranslationPayload {
    translation: TranslationBlock,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranslationBlock {
    #[serde(default)]
    translation_status: Option<String>,
    translations: Vec<TranslationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranslationEntry {
    language: String,
    text: String,
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one inbound message.
///
/// Returns `Ok(None)` when the message is valid but must not reach the caller
/// (unknown status, end of dictation). Malformed payloads are errors.
pub fn decode_message(
    msg_path: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> UspResult<Option<InboundMessage>> {
    let message = match msg_path {
        path::TRANSLATION_SYNTHESIS => {
            InboundMessage::TranslationSynthesis(TranslationSynthesisMsg { audio: body })
        }
        path::SPEECH_START_DETECTED | path::SPEECH_END_DETECTED => {
            let json = parse_body(&body)?;
            // The end detected message sometimes omits the offset.
            let offset = if json.is_null() {
                0
            } else {
                DetectedPayload::deserialize(&json)?.offset.unwrap_or(0)
            };
            let msg = SpeechDetectedMsg {
                json: json.to_string(),
                offset,
            };
            if msg_path == path::SPEECH_START_DETECTED {
                InboundMessage::SpeechStartDetected(msg)
            } else {
                InboundMessage::SpeechEndDetected(msg)
            }
        }
        path::TURN_START => {
            let json = parse_body(&body)?;
            let payload = TurnStartPayload::deserialize(&json)?;
            InboundMessage::TurnStart(TurnStartMsg {
                json: json.to_string(),
                context_tag: payload.context.tag,
            })
        }
        path::TURN_END => InboundMessage::TurnEnd(TurnEndMsg {}),
        path::SPEECH_HYPOTHESIS | path::SPEECH_FRAGMENT => {
            let json = parse_body(&body)?;
            let payload = SpeechPayload::deserialize(&json)?;
            let text = payload
                .text
                .ok_or_else(|| missing_field(msg_path, "Text"))?;
            let msg = SpeechHypothesisMsg {
                json: json.to_string(),
                offset: payload.offset,
                duration: payload.duration,
                text,
            };
            if msg_path == path::SPEECH_HYPOTHESIS {
                InboundMessage::SpeechHypothesis(msg)
            } else {
                InboundMessage::SpeechFragment(msg)
            }
        }
        path::SPEECH_PHRASE => {
            let json = parse_body(&body)?;
            let payload = PhrasePayload::deserialize(&json)?;
            let status = RecognitionStatus::from_wire(&payload.recognition_status);

            // DisplayText is only present when recognition succeeded.
            let display_text = if status == RecognitionStatus::Success {
                payload
                    .display_text
                    .ok_or_else(|| missing_field(msg_path, "DisplayText"))?
            } else {
                String::new()
            };

            if status == RecognitionStatus::Unknown {
                error!("Invalid recognition status in speech.phrase message.");
                return Ok(None);
            }

            InboundMessage::SpeechPhrase(SpeechPhraseMsg {
                json: json.to_string(),
                offset: payload.offset,
                duration: payload.duration,
                recognition_status: status,
                display_text,
            })
        }
        path::TRANSLATION_HYPOTHESIS => {
            let json = parse_body(&body)?;
            let speech = SpeechPayload::deserialize(&json)?;
            let translation = decode_translation_result(&json, false)?;
            InboundMessage::TranslationHypothesis(TranslationHypothesisMsg {
                json: json.to_string(),
                offset: speech.offset,
                duration: speech.duration,
                text: speech.text.unwrap_or_default(),
                translation,
            })
        }
        path::TRANSLATION_PHRASE => {
            let json = parse_body(&body)?;
            let status = RecognitionStatus::from_wire(
                &StatusPayload::deserialize(&json)?.recognition_status,
            );
            if status == RecognitionStatus::Unknown {
                error!("Invalid recognition status in translation response message.");
                return Ok(None);
            }
            if status == RecognitionStatus::EndOfDictation {
                // End of dictation is not surfaced to the caller.
                return Ok(None);
            }

            let speech = SpeechPayload::deserialize(&json)?;

            let translation = if status == RecognitionStatus::Success {
                let translation = decode_translation_result(&json, true)?;
                if translation.translation_status == TranslationStatus::Unknown {
                    error!("Invalid translation status in translation response message.");
                    return Ok(None);
                }
                translation
            } else {
                TranslationResult::default()
            };

            InboundMessage::TranslationPhrase(TranslationPhraseMsg {
                json: json.to_string(),
                offset: speech.offset,
                duration: speech.duration,
                text: speech.text.unwrap_or_default(),
                translation,
                recognition_status: status,
            })
        }
        _ => InboundMessage::UserMessage(UserMsg {
            path: msg_path.to_string(),
            content_type: content_type.unwrap_or_default().to_string(),
            body,
        }),
    };

    Ok(Some(message))
}

fn parse_body(body: &Bytes) -> UspResult<Value> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

fn missing_field(path: &str, field: &str) -> UspError {
    UspError::DecodeError(format!("{path} message is missing the '{field}' field"))
}

/// Decode the `Translation` block of a translation message.
///
/// Entries with both an empty language and an empty text are skipped.
fn decode_translation_result(json: &Value, expect_status: bool) -> UspResult<TranslationResult> {
    let block = TranslationPayload::deserialize(json)?.translation;

    let mut result = TranslationResult::default();
    for entry in block.translations {
        if entry.language.is_empty() && entry.text.is_empty() {
            error!("Empty language and text field in translations text.");
            continue;
        }
        result.translations.insert(entry.language, entry.text);
    }

    if expect_status {
        let status = block
            .translation_status
            .ok_or_else(|| missing_field(path::TRANSLATION_PHRASE, "TranslationStatus"))?;
        result.translation_status = TranslationStatus::from_wire(&status);

        if result.translation_status == TranslationStatus::Success
            && result.translations.is_empty()
        {
            error!("No Translations text block in the message, but TranslationStatus is success.");
        }
    }

    Ok(result)
}
