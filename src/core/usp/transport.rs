//! Transport abstraction used by a USP connection.
//!
//! A transport owns the duplex socket. The connection only queues frames on it
//! and asks it to perform one unit of pending I/O per work loop iteration;
//! everything that unit produced is handed back as [`TransportEvent`]s.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;

use super::base::UspResult;
use super::dns_cache::DnsCache;
use super::endpoint::ConnectionHeaders;

/// Header naming the message type of every frame.
pub const PATH_HEADER: &str = "Path";

/// Asynchronous transport failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    None,
    Unauthorized,
    Forbidden,
    ConnectionFailure,
    DnsFailure,
    RemoteClosed,
    Other(i32),
}

impl TransportError {
    /// Human readable text surfaced through `on_error`.
    pub fn message(&self) -> String {
        match self {
            Self::None => "Unknown transport error.".to_string(),
            Self::Unauthorized => {
                "WebSocket Upgrade failed with an authentication error (401).".to_string()
            }
            Self::Forbidden => {
                "WebSocket Upgrade failed with an authentication error (403).".to_string()
            }
            Self::ConnectionFailure => {
                "Connection failed (no connection to the remote host).".to_string()
            }
            Self::DnsFailure => "Connection failed (the remote host did not respond).".to_string(),
            Self::RemoteClosed => "Connection was closed by the remote host.".to_string(),
            Self::Other(code) => format!("Communication Error. Error code: {code}"),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

/// One inbound message as delivered by the transport.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    /// Response headers; `None` when the transport could not produce any.
    pub headers: Option<HeaderMap>,
    pub body: Bytes,
    /// Non-zero when the transport flagged the response as failed.
    pub error_code: u32,
}

impl TransportResponse {
    /// Successful response with a `Path` header and an optional content type.
    pub fn new(path: &str, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = path.parse() {
            headers.insert(http::HeaderName::from_static("path"), value);
        }
        if let Some(value) = content_type.and_then(|ct| ct.parse().ok()) {
            headers.insert(http::header::CONTENT_TYPE, value);
        }
        Self {
            headers: Some(headers),
            body: body.into(),
            error_code: 0,
        }
    }
}

/// Output of one unit of transport I/O.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Data(TransportResponse),
    Error(TransportError),
}

/// Duplex transport bound to one connection URL.
pub trait Transport: Send {
    fn set_dns_cache(&mut self, cache: Arc<DnsCache>);

    /// Queue a named-path text message.
    fn write_message(&mut self, path: &str, data: &[u8]) -> UspResult<()>;

    /// Open a binary substream (e.g. `/audio`).
    fn prepare_stream(&mut self, path: &str) -> UspResult<()>;

    /// Append to the open substream.
    fn write_stream(&mut self, data: &[u8]) -> UspResult<()>;

    /// Close the open substream.
    fn flush_stream(&mut self) -> UspResult<()>;

    /// Send a telemetry payload under the current request id.
    fn write_telemetry(&mut self, payload: &[u8]) -> UspResult<()>;

    /// Rotate the request id used for subsequent frames.
    fn create_request_id(&mut self);

    fn request_id(&self) -> &str;

    /// Perform pending I/O and return what it produced. Must not block.
    fn do_work(&mut self) -> UspResult<Vec<TransportEvent>>;
}

/// Creates transports for new connections.
pub trait TransportFactory: Send + Sync {
    fn create(&self, url: &str, headers: &ConnectionHeaders) -> UspResult<Box<dyn Transport>>;
}
