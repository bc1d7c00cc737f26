//! USP (Universal Speech Protocol) client.
//!
//! A [`Connection`] streams audio to a speech recognition or translation
//! service over a full-duplex transport and surfaces the decoded service
//! events through a caller supplied [`UspCallbacks`] implementation.
//!
//! # Modules
//!
//! - `base`: error type and callback trait
//! - `config`: endpoint, authentication and session configuration
//! - `endpoint`: connection URL and handshake header construction
//! - `messages`: inbound message types and decoder
//! - `connection`: session state machine and work loop
//! - `transport`: transport abstraction
//! - `websocket`: default WebSocket transport
//! - `telemetry`, `dns_cache`, `platform`: connection support

pub mod base;
pub mod config;
pub mod connection;
pub mod dns_cache;
pub mod endpoint;
pub mod messages;
pub mod platform;
pub mod telemetry;
pub mod transport;
pub mod websocket;


pub use base::{UspCallbacks, UspError, UspResult};
pub use config::{
    AuthConfig, AuthenticationKind, EndpointKind, OutputFormat, RecognitionMode, SessionConfig,
    TranslationConfig,
};
pub use connection::{Connection, ConnectionState, UNHANDLED_ERROR, WORK_INTERVAL};
pub use dns_cache::DnsCache;
pub use endpoint::{ConnectionHeaders, build_auth_headers, build_connection_url};
pub use messages::{
    DurationType, InboundMessage, OffsetType, RecognitionStatus, SpeechDetectedMsg,
    SpeechEndDetectedMsg, SpeechFragmentMsg, SpeechHypothesisMsg, SpeechPhraseMsg,
    SpeechStartDetectedMsg, TranslationHypothesisMsg, TranslationPhraseMsg, TranslationResult,
    TranslationStatus, TranslationSynthesisMsg, TurnEndMsg, TurnStartMsg, UserMsg, decode_message,
    path,
};
pub use telemetry::Telemetry;
pub use transport::{
    PATH_HEADER, Transport, TransportError, TransportEvent, TransportFactory, TransportResponse,
};
pub use websocket::{WebSocketTransport, WebSocketTransportFactory};
