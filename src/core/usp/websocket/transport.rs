//! WebSocket implementation of [`Transport`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::{self, Error as WsError};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::frame::{self, FrameHeader};
use crate::core::usp::base::{UspError, UspResult};
use crate::core::usp::dns_cache::DnsCache;
use crate::core::usp::endpoint::ConnectionHeaders;
use crate::core::usp::messages::path;
use crate::core::usp::telemetry;
use crate::core::usp::transport::{
    Transport, TransportError, TransportEvent, TransportFactory, TransportResponse,
};

/// Handshake header identifying the connection to the service.
pub const CONNECTION_ID_HEADER: &str = "x-connectionid";

/// Upper bound for TCP connect plus WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// New 32 character upper-case hex id.
pub fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

// =============================================================================
// Transport
// =============================================================================

/// USP transport over a single WebSocket.
///
/// Writes only queue frames. The socket is opened by the first [`do_work`]
/// call, which spawns the task that owns it; later calls drain the events
/// that task produced.
///
/// [`do_work`]: Transport::do_work
pub struct WebSocketTransport {
    url: Url,
    headers: ConnectionHeaders,
    connection_id: String,
    request_id: String,
    /// Path of the open binary substream.
    stream_path: Option<String>,
    dns_cache: Option<Arc<DnsCache>>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    /// Taken when the socket task starts.
    outbound_rx: Option<mpsc::UnboundedReceiver<Message>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
}

impl WebSocketTransport {
    pub fn new(url: &str, headers: ConnectionHeaders) -> UspResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| UspError::RuntimeError(format!("Invalid connection URL '{url}': {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(UspError::RuntimeError(format!(
                "Unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            url,
            headers,
            connection_id: new_request_id(),
            request_id: new_request_id(),
            stream_path: None,
            dns_cache: None,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            events_tx,
            events_rx,
            cancel: CancellationToken::new(),
        })
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn frame_header<'a>(&'a self, path: &'a str, timestamp: &'a str) -> FrameHeader<'a> {
        FrameHeader {
            path,
            request_id: &self.request_id,
            timestamp,
        }
    }

    fn send(&self, message: Message) -> UspResult<()> {
        self.outbound_tx
            .send(message)
            .map_err(|_| UspError::RuntimeError("WebSocket connection is closed".to_string()))
    }

    fn send_text(&self, path: &str, body: &[u8]) -> UspResult<()> {
        let timestamp = telemetry::timestamp();
        let frame = frame::encode_text(self.frame_header(path, &timestamp), body)?;
        self.send(Message::Text(frame.into()))
    }

    fn send_audio(&self, data: &[u8]) -> UspResult<()> {
        let path = self
            .stream_path
            .as_deref()
            .ok_or_else(|| UspError::RuntimeError("No stream has been prepared".to_string()))?;
        let timestamp = telemetry::timestamp();
        let frame = frame::encode_audio(self.frame_header(path, &timestamp), data)?;
        self.send(Message::Binary(frame))
    }

    fn start(&mut self) -> UspResult<()> {
        let Some(outbound_rx) = self.outbound_rx.take() else {
            return Ok(());
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            UspError::RuntimeError(format!("WebSocket transport requires a tokio runtime: {e}"))
        })?;

        let request = self.handshake_request()?;
        let socket = SocketTask {
            url: self.url.clone(),
            dns_cache: self
                .dns_cache
                .clone()
                .unwrap_or_else(|| Arc::new(DnsCache::default())),
            outbound_rx,
            events_tx: self.events_tx.clone(),
            cancel: self.cancel.clone(),
        };
        runtime.spawn(socket.run(request));
        Ok(())
    }

    fn handshake_request(&self) -> UspResult<Request<()>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| UspError::RuntimeError(format!("Failed to create handshake request: {e}")))?;

        let request_headers = request.headers_mut();
        for (name, value) in &self.headers {
            request_headers.append(name.clone(), value.clone());
        }
        let connection_id = HeaderValue::from_str(&self.connection_id)
            .map_err(|e| UspError::RuntimeError(format!("Invalid connection id: {e}")))?;
        request_headers.insert(CONNECTION_ID_HEADER, connection_id);

        Ok(request)
    }
}

impl Transport for WebSocketTransport {
    fn set_dns_cache(&mut self, cache: Arc<DnsCache>) {
        self.dns_cache = Some(cache);
    }

    fn write_message(&mut self, path: &str, data: &[u8]) -> UspResult<()> {
        self.send_text(path, data)
    }

    fn prepare_stream(&mut self, path: &str) -> UspResult<()> {
        // Frames name the substream without the leading slash.
        self.stream_path = Some(path.trim_start_matches('/').to_string());
        Ok(())
    }

    fn write_stream(&mut self, data: &[u8]) -> UspResult<()> {
        self.send_audio(data)
    }

    fn flush_stream(&mut self) -> UspResult<()> {
        let result = self.send_audio(&[]);
        self.stream_path = None;
        result
    }

    fn write_telemetry(&mut self, payload: &[u8]) -> UspResult<()> {
        self.send_text(path::TELEMETRY, payload)
    }

    fn create_request_id(&mut self) {
        self.request_id = new_request_id();
        debug!("New request id {}", self.request_id);
    }

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn do_work(&mut self) -> UspResult<Vec<TransportEvent>> {
        self.start()?;

        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        Ok(events)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Creates [`WebSocketTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransportFactory;

impl TransportFactory for WebSocketTransportFactory {
    fn create(&self, url: &str, headers: &ConnectionHeaders) -> UspResult<Box<dyn Transport>> {
        Ok(Box::new(WebSocketTransport::new(url, headers.clone())?))
    }
}

// =============================================================================
// Socket Task
// =============================================================================

struct SocketTask {
    url: Url,
    dns_cache: Arc<DnsCache>,
    outbound_rx: mpsc::UnboundedReceiver<Message>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
}

impl SocketTask {
    async fn run(mut self, request: Request<()>) {
        let connected = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = timeout(CONNECT_TIMEOUT, self.connect(request)) => match result {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConnectionFailure),
            },
        };

        let ws_stream = match connected {
            Ok(ws_stream) => ws_stream,
            Err(reason) => {
                error!("Failed to connect to {}: {}", self.url, reason);
                self.emit(TransportEvent::Error(reason));
                return;
            }
        };

        info!("Connected to USP WebSocket {}", self.url);
        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("USP WebSocket transport dropped, closing socket");
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                }

                Some(message) = self.outbound_rx.recv() => {
                    if let Err(e) = ws_sink.send(message).await {
                        error!("Failed to send USP frame: {}", e);
                        self.emit(TransportEvent::Error(map_ws_error(&e)));
                        break;
                    }
                }

                incoming = ws_stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.forward(frame::decode_text(text.as_str())),
                    Some(Ok(Message::Binary(data))) => self.forward(frame::decode_binary(&data)),
                    Some(Ok(Message::Close(close_frame))) => {
                        info!("USP WebSocket closed by server: {:?}", close_frame);
                        self.emit(TransportEvent::Error(TransportError::RemoteClosed));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("USP WebSocket error: {}", e);
                        self.emit(TransportEvent::Error(map_ws_error(&e)));
                        break;
                    }
                    None => {
                        info!("USP WebSocket stream ended");
                        self.emit(TransportEvent::Error(TransportError::RemoteClosed));
                        break;
                    }
                },
            }
        }
    }

    async fn connect(&self, request: Request<()>) -> Result<WsStream, TransportError> {
        let host = self
            .url
            .host_str()
            .ok_or(TransportError::DnsFailure)?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let port = self
            .url
            .port_or_known_default()
            .ok_or(TransportError::ConnectionFailure)?;

        let addrs = self.dns_cache.resolve(host, port).await?;

        let mut tcp = None;
        for addr in addrs.iter() {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(e) => warn!("TCP connect to {} failed: {}", addr, e),
            }
        }
        let Some(tcp) = tcp else {
            self.dns_cache.invalidate(host, port).await;
            return Err(TransportError::ConnectionFailure);
        };
        let _ = tcp.set_nodelay(true);

        let (ws_stream, response) = client_async_tls(request, tcp)
            .await
            .map_err(|e| map_ws_error(&e))?;
        debug!("WebSocket handshake completed: {}", response.status());

        Ok(ws_stream)
    }

    fn forward(&self, response: UspResult<TransportResponse>) {
        match response {
            Ok(response) => self.emit(TransportEvent::Data(response)),
            Err(e) => warn!("Dropping malformed USP frame: {}", e),
        }
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver is gone once the transport has been dropped.
        let _ = self.events_tx.send(event);
    }
}

/// Map a tungstenite failure onto the transport error categories.
pub fn map_ws_error(err: &WsError) -> TransportError {
    match err {
        WsError::Http(response) => match response.status().as_u16() {
            401 => TransportError::Unauthorized,
            403 => TransportError::Forbidden,
            status => TransportError::Other(i32::from(status)),
        },
        WsError::Io(_) | WsError::Tls(_) => TransportError::ConnectionFailure,
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::RemoteClosed,
        WsError::Protocol(tungstenite::error::ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::RemoteClosed
        }
        _ => TransportError::Other(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use tokio_tungstenite::tungstenite::http::Response;

    #[test]
    fn test_request_id_format() {
        let id = new_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(id, new_request_id());
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(WebSocketTransport::new("https://example.com", Vec::new()).is_err());
        assert!(WebSocketTransport::new("not a url", Vec::new()).is_err());
        assert!(WebSocketTransport::new("wss://example.com/path?x=1", Vec::new()).is_ok());
    }

    #[test]
    fn test_create_request_id_rotates() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1", Vec::new()).unwrap();
        let first = transport.request_id().to_string();
        transport.create_request_id();
        assert_ne!(transport.request_id(), first);
    }

    #[test]
    fn test_write_stream_requires_prepared_stream() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1", Vec::new()).unwrap();
        assert!(transport.write_stream(&[1, 2]).is_err());

        transport.prepare_stream("/audio").unwrap();
        assert!(transport.write_stream(&[1, 2]).is_ok());
        assert!(transport.flush_stream().is_ok());
        assert!(transport.flush_stream().is_err());
    }

    #[test]
    fn test_queued_frames_use_current_request_id() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1", Vec::new()).unwrap();
        transport.prepare_stream("/audio").unwrap();
        transport.write_stream(&[7; 4]).unwrap();
        transport.write_message("speech.context", b"{}").unwrap();

        let request_id = transport.request_id().to_string();
        let outbound = transport.outbound_rx.as_mut().unwrap();

        let Message::Binary(audio) = outbound.try_recv().unwrap() else {
            panic!("expected a binary audio frame");
        };
        let header_len = u16::from_be_bytes([audio[0], audio[1]]) as usize;
        let headers = std::str::from_utf8(&audio[2..2 + header_len]).unwrap();
        assert!(headers.starts_with("Path: audio\r\n"));
        assert!(headers.contains(&format!("X-RequestId: {request_id}\r\n")));

        match outbound.try_recv().unwrap() {
            Message::Text(text) => {
                assert!(text.as_str().starts_with("Path: speech.context\r\n"));
                assert!(text.as_str().ends_with("\r\n\r\n{}"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_write_message_rejects_invalid_utf8() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1", Vec::new()).unwrap();

        let result = transport.write_message("speech.binary", &[0xff, 0xfe, 0x00, 0x80]);
        assert!(matches!(result, Err(UspError::InvalidArgument(_))));

        // Nothing reaches the socket.
        let outbound = transport.outbound_rx.as_mut().unwrap();
        assert!(outbound.try_recv().is_err());
    }

    #[test]
    fn test_handshake_request_carries_headers() {
        let headers = vec![(
            http::HeaderName::from_static("ocp-apim-subscription-key"),
            HeaderValue::from_static("secret"),
        )];
        let transport = WebSocketTransport::new("wss://example.com/speech", headers).unwrap();
        let request = transport.handshake_request().unwrap();

        assert_eq!(
            request.headers().get("ocp-apim-subscription-key").unwrap(),
            "secret"
        );
        assert_eq!(
            request.headers().get(CONNECTION_ID_HEADER).unwrap(),
            transport.connection_id()
        );
    }

    #[test]
    fn test_map_handshake_errors() {
        let unauthorized = Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .body(None)
            .unwrap();
        assert_eq!(
            map_ws_error(&WsError::Http(unauthorized.into())),
            TransportError::Unauthorized
        );

        let forbidden = Response::builder()
            .status(StatusCode::FORBIDDEN)
            .body(None)
            .unwrap();
        assert_eq!(
            map_ws_error(&WsError::Http(forbidden.into())),
            TransportError::Forbidden
        );

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            map_ws_error(&WsError::Io(io)),
            TransportError::ConnectionFailure
        );
        assert_eq!(
            map_ws_error(&WsError::ConnectionClosed),
            TransportError::RemoteClosed
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport =
            WebSocketTransport::new(&format!("ws://127.0.0.1:{port}"), Vec::new()).unwrap();
        assert!(transport.do_work().unwrap().is_empty());

        let mut events = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            events.extend(transport.do_work().unwrap());
            if !events.is_empty() {
                break;
            }
        }

        assert!(matches!(
            events.as_slice(),
            [TransportEvent::Error(TransportError::ConnectionFailure)]
        ));
    }
}
