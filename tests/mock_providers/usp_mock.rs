//! WebSocket Mock Server for the USP speech service
//!
//! Accepts one session per TCP connection, answers audio with hypothesis
//! events and closes each turn when the client ends its audio stream.

use super::MockStats;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use waav_usp::core::usp::TransportResponse;
use waav_usp::core::usp::websocket::frame;

/// How the mock answers a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MockBehavior {
    /// Full recognition turn per audio stream
    #[default]
    Recognize,
    /// Refuse the WebSocket upgrade with this HTTP status
    Reject(u16),
    /// Close the socket after the first audio frame
    CloseAfterAudio,
    /// Like `Recognize`, plus a message on a path the protocol does not define
    UserMessage,
}

/// A frame received from the client
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub path: String,
    pub request_id: String,
    pub body: Vec<u8>,
}

/// USP Mock Server State
#[derive(Default)]
pub struct UspMockState {
    pub behavior: MockBehavior,
    pub stats: MockStats,
    pub frames: Mutex<Vec<ReceivedFrame>>,
    pub handshake_headers: Mutex<Vec<(String, String)>>,
}

impl UspMockState {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn frames(&self) -> Vec<ReceivedFrame> {
        self.frames.lock().clone()
    }

    pub fn handshake_header(&self, name: &str) -> Option<String> {
        self.handshake_headers
            .lock()
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}

fn header(response: &TransportResponse, name: &str) -> String {
    response
        .headers
        .as_ref()
        .and_then(|headers| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Text frame as the service sends it
fn service_frame(path: &str, request_id: &str, body: Option<Value>) -> Message {
    let mut frame = format!("Path: {path}\r\nX-RequestId: {request_id}\r\n");
    if body.is_some() {
        frame.push_str("Content-Type: application/json; charset=utf-8\r\n");
    }
    frame.push_str("\r\n");
    if let Some(body) = body {
        frame.push_str(&body.to_string());
    }
    Message::Text(frame.into())
}

/// Handle a single USP session
async fn handle_usp_connection(
    stream: TcpStream,
    state: Arc<UspMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handshake_state = state.clone();
    let callback = move |request: &Request, response: Response| {
        let mut headers = handshake_state.handshake_headers.lock();
        for (name, value) in request.headers() {
            headers.push((
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            ));
        }

        match handshake_state.behavior {
            MockBehavior::Reject(status) => {
                let rejection: ErrorResponse = Response::builder()
                    .status(status)
                    .body(Some("rejected by mock".to_string()))
                    .unwrap();
                Err(rejection)
            }
            _ => Ok(response),
        }
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();
    state.stats.record_connection();

    let mut audio_in_turn = 0u64;

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                let response = frame::decode_binary(&data)?;
                let request_id = header(&response, "X-RequestId");
                let end_of_stream = response.body.is_empty();

                state.stats.record_audio(end_of_stream);
                state.frames.lock().push(ReceivedFrame {
                    path: header(&response, "Path"),
                    request_id: request_id.clone(),
                    body: response.body.to_vec(),
                });

                if state.behavior == MockBehavior::CloseAfterAudio {
                    write.send(Message::Close(None)).await?;
                    break;
                }

                if !end_of_stream {
                    if audio_in_turn == 0 {
                        write
                            .send(service_frame(
                                "turn.start",
                                &request_id,
                                Some(json!({"Context": {"Tag": "mock-tag"}})),
                            ))
                            .await?;
                        write
                            .send(service_frame(
                                "speech.startDetected",
                                &request_id,
                                Some(json!({"Offset": 0})),
                            ))
                            .await?;
                    }
                    audio_in_turn += 1;

                    write
                        .send(service_frame(
                            "speech.hypothesis",
                            &request_id,
                            Some(json!({
                                "Text": format!("partial {audio_in_turn}"),
                                "Offset": 0,
                                "Duration": audio_in_turn * 1_000_000,
                            })),
                        ))
                        .await?;
                } else if audio_in_turn > 0 {
                    let duration = audio_in_turn * 1_000_000;
                    write
                        .send(service_frame(
                            "speech.endDetected",
                            &request_id,
                            Some(json!({"Offset": duration})),
                        ))
                        .await?;
                    write
                        .send(service_frame(
                            "speech.phrase",
                            &request_id,
                            Some(json!({
                                "RecognitionStatus": "Success",
                                "DisplayText": "Mock transcript.",
                                "Offset": 0,
                                "Duration": duration,
                            })),
                        ))
                        .await?;
                    if state.behavior == MockBehavior::UserMessage {
                        write
                            .send(service_frame(
                                "mock.custom",
                                &request_id,
                                Some(json!({"custom": true})),
                            ))
                            .await?;
                    }
                    write
                        .send(service_frame("turn.end", &request_id, None))
                        .await?;
                    audio_in_turn = 0;
                }
            }
            Ok(Message::Text(text)) => {
                let response = frame::decode_text(text.as_str())?;
                let path = header(&response, "Path");
                state.stats.record_text(path == "telemetry");
                state.frames.lock().push(ReceivedFrame {
                    request_id: header(&response, "X-RequestId"),
                    body: response.body.to_vec(),
                    path,
                });
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(data)) => {
                write.send(Message::Pong(data)).await?;
            }
            Err(e) => {
                eprintln!("USP mock WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Start the USP mock server on an ephemeral port
///
/// Returns the bound address; the server runs until the test runtime stops.
pub async fn spawn_usp_mock(
    state: Arc<UspMockState>,
) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_usp_connection(stream, state).await {
                    eprintln!("USP mock connection error: {}", e);
                }
            });
        }
    });

    Ok(addr)
}
