//! USP connection: session state, outbound framing and the work loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   session lock   ┌──────────────────┐
//! │ queue_message()      │─────────────────▶│    Transport     │
//! │ queue_audio_segment()│                  │  (frames queued) │
//! │ queue_audio_end()    │──┐               └────────▲─────────┘
//! └──────────────────────┘  │ wake                   │ do_work()
//!                           ▼                        │
//!                  ┌──────────────────┐              │
//!                  │    Work Loop     │──────────────┘
//!                  │ (200ms heartbeat)│
//!                  └────────┬─────────┘
//!                           │ decoded events
//!                           ▼
//!                      UspCallbacks
//! ```
//!
//! Caller threads only queue frames. The single work loop per connection
//! performs the transport I/O, applies the inbound dispatch rules and invokes
//! the callbacks after releasing the session lock. The loop holds a weak
//! reference to the connection; dropping the [`Connection`] ends it.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, error, info, warn};

use super::base::{UspCallbacks, UspError, UspResult};
use super::config::SessionConfig;
use super::dns_cache::DnsCache;
use super::endpoint::{build_auth_headers, build_connection_url};
use super::messages::{InboundMessage, decode_message, path};
use super::platform;
use super::telemetry::Telemetry;
use super::transport::{
    PATH_HEADER, Transport, TransportError, TransportEvent, TransportFactory, TransportResponse,
};
use super::websocket::WebSocketTransportFactory;

// =============================================================================
// Constants
// =============================================================================

/// Longest the work loop sleeps without being woken.
pub const WORK_INTERVAL: Duration = Duration::from_millis(200);

/// Reported through `on_error` when a pump or a callback panics.
pub const UNHANDLED_ERROR: &str = "Unhandled exception in the USP layer.";

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a connection. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Disconnected,
}

/// State guarded by the session lock.
struct Session {
    state: ConnectionState,
    /// Bytes written to the open audio substream, 0 when none is open.
    audio_offset: u64,
    transport: Option<Box<dyn Transport>>,
    telemetry: Option<Telemetry>,
    dns_cache: Option<Arc<DnsCache>>,
}

impl Session {
    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Something the work loop hands to the callbacks once the lock is released.
enum Delivery {
    Message(InboundMessage),
    Error(String),
}

struct ConnectionInner {
    config: SessionConfig,
    callbacks: Arc<dyn UspCallbacks>,
    transport_factory: Arc<dyn TransportFactory>,
    created_at: Instant,
    session: Mutex<Session>,
    work: Arc<Notify>,
}

// =============================================================================
// Connection
// =============================================================================

/// One logical streaming session with the speech service.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use waav_usp::core::usp::{
///     AuthConfig, Connection, EndpointKind, SessionConfig, SpeechPhraseMsg, UspCallbacks,
/// };
///
/// struct Printer;
///
/// impl UspCallbacks for Printer {
///     fn on_speech_phrase(&self, msg: SpeechPhraseMsg) {
///         println!("{}", msg.display_text);
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = SessionConfig {
///         language: "en-US".to_string(),
///         ..SessionConfig::new(EndpointKind::BingSpeech, AuthConfig::subscription_key("key"))
///     };
///
///     let connection = Connection::new(config, Arc::new(Printer))?;
///     connection.connect().await?;
///
///     let audio = vec![0u8; 3200];
///     connection.queue_audio_segment(&audio)?;
///     connection.queue_audio_end()?;
///
///     connection.shutdown();
///     Ok(())
/// }
/// ```
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection that talks to the service over WebSocket.
    ///
    /// The configuration is validated immediately.
    pub fn new(config: SessionConfig, callbacks: Arc<dyn UspCallbacks>) -> UspResult<Self> {
        Self::with_transport(config, callbacks, Arc::new(WebSocketTransportFactory))
    }

    /// Create a connection using a caller supplied transport.
    pub fn with_transport(
        config: SessionConfig,
        callbacks: Arc<dyn UspCallbacks>,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> UspResult<Self> {
        platform::init()?;
        config.validate()?;

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                config,
                callbacks,
                transport_factory,
                created_at: Instant::now(),
                session: Mutex::new(Session {
                    state: ConnectionState::Unconnected,
                    audio_offset: 0,
                    transport: None,
                    telemetry: None,
                    dns_cache: None,
                }),
                work: Arc::new(Notify::new()),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.session.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().is_connected()
    }

    /// Bytes written to the open audio substream.
    pub fn audio_offset(&self) -> u64 {
        self.inner.session.lock().audio_offset
    }

    /// Resolver shared with the transport, present once connected.
    pub fn dns_cache(&self) -> Option<Arc<DnsCache>> {
        self.inner.session.lock().dns_cache.clone()
    }

    /// Milliseconds since the connection was created.
    pub fn timestamp(&self) -> u128 {
        self.inner.timestamp()
    }

    /// Open the session.
    ///
    /// Builds the URL and headers, creates telemetry, transport and DNS cache,
    /// starts the work loop and waits until its first iteration reports the
    /// connection as established. There is no timeout.
    ///
    /// Fails with [`UspError::LogicError`] on every call after the first one
    /// got past validation; such calls change nothing.
    pub async fn connect(&self) -> UspResult<()> {
        let ready = {
            let mut session = self.inner.session.lock();
            if session.transport.is_some() || session.state != ConnectionState::Unconnected {
                return Err(UspError::LogicError(
                    "USP connection already created.".to_string(),
                ));
            }

            let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                UspError::RuntimeError(format!("USP connection requires a tokio runtime: {e}"))
            })?;

            let config = &self.inner.config;
            let headers = build_auth_headers(config)?;
            let url = build_connection_url(config);
            info!("connectionUrl={}", url);

            let telemetry = Telemetry::new();
            let mut transport = self.inner.transport_factory.create(&url, &headers)?;
            let dns_cache = Arc::new(DnsCache::default());
            transport.set_dns_cache(Arc::clone(&dns_cache));

            session.telemetry = Some(telemetry);
            session.transport = Some(transport);
            session.dns_cache = Some(dns_cache);

            let (ready_tx, ready_rx) = oneshot::channel();
            runtime.spawn(work_loop(Arc::downgrade(&self.inner), ready_tx));
            ready_rx
        };

        ready.await.map_err(|_| {
            UspError::RuntimeError("Work loop exited before the connection was established".to_string())
        })
    }

    /// Stop the session. The work loop exits after its current iteration.
    pub fn shutdown(&self) {
        let mut session = self.inner.session.lock();
        if session.transport.is_some() && session.state != ConnectionState::Disconnected {
            debug!("TS:{}, Shutting down connection", self.inner.timestamp());
            session.state = ConnectionState::Disconnected;
        }
        self.inner.signal_work();
    }

    /// Queue a message on a named path.
    ///
    /// Dropped silently when not connected; the work loop is woken either way.
    pub fn queue_message(&self, msg_path: &str, data: &[u8]) -> UspResult<()> {
        let mut session = self.inner.session.lock();

        if msg_path.is_empty() {
            return Err(UspError::InvalidArgument(
                "The path is null or empty.".to_string(),
            ));
        }

        if session.is_connected() {
            if let Some(transport) = session.transport.as_mut() {
                if let Err(e) = transport.write_message(msg_path, data) {
                    warn!("Failed to write message on path {}: {}", msg_path, e);
                }
            }
        }

        self.inner.signal_work();
        Ok(())
    }

    /// Append audio to the current segment. An empty chunk ends the segment.
    pub fn queue_audio_segment(&self, data: &[u8]) -> UspResult<()> {
        if data.is_empty() {
            return self.queue_audio_end();
        }

        let mut guard = self.inner.session.lock();
        let session = &mut *guard;

        info!(
            "TS:{}, Write {} bytes audio data.",
            self.inner.timestamp(),
            data.len()
        );

        if !session.is_connected() {
            return Ok(());
        }

        let transport = session
            .transport
            .as_mut()
            .ok_or_else(|| UspError::RuntimeError("Transport is not available".to_string()))?;

        if session.audio_offset == 0 {
            if let Some(telemetry) = session.telemetry.as_mut() {
                telemetry.audio_start();
            }
            transport.prepare_stream(path::AUDIO).map_err(|e| {
                UspError::RuntimeError(format!("TransportStreamPrepare failed. error={e}"))
            })?;
        }

        transport.write_stream(data).map_err(|e| {
            UspError::RuntimeError(format!("TransportStreamWrite failed. error={e}"))
        })?;

        session.audio_offset += data.len() as u64;
        if let Some(telemetry) = session.telemetry.as_mut() {
            telemetry.audio_data(data.len());
        }

        self.inner.signal_work();
        Ok(())
    }

    /// End the current audio segment and flush the audio substream.
    ///
    /// The offset is reset even when the flush fails.
    pub fn queue_audio_end(&self) -> UspResult<()> {
        let mut guard = self.inner.session.lock();
        let session = &mut *guard;

        info!("TS:{}, Flush audio buffer.", self.inner.timestamp());

        if !session.is_connected() || session.audio_offset == 0 {
            return Ok(());
        }

        let result = match session.transport.as_mut() {
            Some(transport) => transport.flush_stream(),
            None => Err(UspError::RuntimeError("Transport is not available".to_string())),
        };

        session.audio_offset = 0;
        if let Some(telemetry) = session.telemetry.as_mut() {
            telemetry.audio_end();
        }

        result.map_err(|e| {
            UspError::RuntimeError(format!(
                "Returns failure, reason: TransportStreamFlush returned {e}"
            ))
        })?;

        self.inner.signal_work();
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Work Loop
// =============================================================================

/// Background task pumping transport I/O for one connection.
///
/// Exits once the connection is disconnected or has been dropped.
async fn work_loop(connection: Weak<ConnectionInner>, ready: oneshot::Sender<()>) {
    let work = match connection.upgrade() {
        Some(inner) => {
            inner.signal_connected();
            Arc::clone(&inner.work)
        }
        None => return,
    };
    let _ = ready.send(());

    loop {
        let Some(inner) = connection.upgrade() else {
            debug!("Connection dropped, work loop exiting");
            return;
        };

        let deliveries = match isolate(|| inner.pump()) {
            Some(deliveries) => deliveries,
            None => vec![Delivery::Error(UNHANDLED_ERROR.to_string())],
        };

        for delivery in deliveries {
            // Shutdown may land while earlier deliveries run.
            if !inner.is_connected() {
                break;
            }
            let callbacks = inner.callbacks.as_ref();
            let delivered = isolate(|| match delivery {
                Delivery::Message(message) => message.dispatch(callbacks),
                Delivery::Error(message) => callbacks.on_error(&message),
            });
            if delivered.is_none() {
                let _ = isolate(|| callbacks.on_error(UNHANDLED_ERROR));
            }
        }

        let connected = inner.is_connected();
        if !connected {
            debug!("TS:{}, Connection closed, work loop exiting", inner.timestamp());
            return;
        }
        drop(inner);

        // Either woken by a queued frame or the heartbeat elapses.
        let _ = tokio::time::timeout(WORK_INTERVAL, work.notified()).await;
    }
}

/// Run `f`, turning a panic into `None`.
///
/// Session state is guarded by a non-poisoning lock, so a panicking pump or
/// callback leaves the connection usable.
fn isolate<T>(f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(panic_info) => {
            let msg = panic_message(&panic_info);
            error!(message = %msg, "Panic in USP work loop");
            None
        }
    }
}

fn panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (non-string payload)".to_string()
    }
}

impl ConnectionInner {
    fn timestamp(&self) -> u128 {
        self.created_at.elapsed().as_millis()
    }

    fn is_connected(&self) -> bool {
        self.session.lock().is_connected()
    }

    fn signal_work(&self) {
        self.work.notify_one();
    }

    fn signal_connected(&self) {
        let mut session = self.session.lock();
        if session.state == ConnectionState::Unconnected {
            session.state = ConnectionState::Connected;
        }
    }

    /// Run one unit of transport I/O and decode what it produced.
    ///
    /// Returns the deliveries for the callbacks.
    fn pump(&self) -> Vec<Delivery> {
        let mut guard = self.session.lock();
        let session = &mut *guard;
        let mut deliveries = Vec::new();

        let events = match session.transport.as_mut().map(|t| t.do_work()) {
            Some(Ok(events)) => events,
            Some(Err(e)) => {
                error!("Transport work failed: {}", e);
                deliveries.push(Delivery::Error(e.to_string()));
                Vec::new()
            }
            None => Vec::new(),
        };

        for event in events {
            let delivery = match event {
                TransportEvent::Data(response) => self.on_transport_data(session, response),
                TransportEvent::Error(reason) => self.on_transport_error(session, reason),
            };
            deliveries.extend(delivery);
        }

        deliveries
    }

    fn on_transport_error(&self, session: &Session, reason: TransportError) -> Option<Delivery> {
        info!(
            "TS:{}, TransportError: reason={:?}.",
            self.timestamp(),
            reason
        );

        if !session.is_connected() {
            return None;
        }
        Some(Delivery::Error(reason.message()))
    }

    fn on_transport_data(
        &self,
        session: &mut Session,
        response: TransportResponse,
    ) -> Option<Delivery> {
        let (msg_path, content_type) = match validate_response(&response) {
            Ok(parts) => parts,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };

        info!(
            "TS:{} Response Message: path: {}, content type: {}, size: {}.",
            self.timestamp(),
            msg_path,
            content_type.as_deref().unwrap_or("<none>"),
            response.body.len()
        );

        if !session.is_connected() {
            return None;
        }

        if let Some(telemetry) = session.telemetry.as_mut() {
            telemetry.record_received(&msg_path);
        }

        match decode_message(&msg_path, content_type.as_deref(), response.body) {
            Ok(Some(message)) => {
                if matches!(message, InboundMessage::TurnEnd(_)) {
                    complete_turn(session);
                }
                Some(Delivery::Message(message))
            }
            Ok(None) => None,
            Err(e) => {
                error!("Failed to decode {} message: {}", msg_path, e);
                Some(Delivery::Error(e.to_string()))
            }
        }
    }
}

/// Flush telemetry for the finished turn, then rotate the request id.
fn complete_turn(session: &mut Session) {
    let (Some(telemetry), Some(transport)) =
        (session.telemetry.as_mut(), session.transport.as_mut())
    else {
        return;
    };

    if let Some(payload) = telemetry.flush() {
        if let Err(e) = transport.write_telemetry(&payload) {
            warn!("Failed to write telemetry: {}", e);
        }
    }
    transport.create_request_id();
}

/// Check the framing of an inbound response.
///
/// Returns the path and, for non-empty bodies, the content type.
pub(crate) fn validate_response(
    response: &TransportResponse,
) -> UspResult<(String, Option<String>)> {
    if response.error_code != 0 {
        return Err(UspError::RuntimeError(format!(
            "Response error {}.",
            response.error_code
        )));
    }

    let headers = response
        .headers
        .as_ref()
        .ok_or_else(|| UspError::RuntimeError("ResponseHeader is NULL.".to_string()))?;

    let msg_path = header_value(headers, PATH_HEADER).ok_or_else(|| {
        UspError::ProtocolViolation(format!("response missing '{PATH_HEADER}' header"))
    })?;

    let content_type = if response.body.is_empty() {
        None
    } else {
        Some(header_value(headers, CONTENT_TYPE.as_str()).ok_or_else(|| {
            UspError::ProtocolViolation(format!(
                "response '{msg_path}' contains body with no content-type"
            ))
        })?)
    };

    Ok((msg_path, content_type))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
