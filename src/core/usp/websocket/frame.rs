//! USP frame codec.
//!
//! Text frames carry a CRLF separated header block, an empty line and the
//! body. Binary frames start with the big-endian length of the header block,
//! followed by the headers and the payload.

use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::core::usp::base::{UspError, UspResult};
use crate::core::usp::transport::{PATH_HEADER, TransportResponse};

pub const REQUEST_ID_HEADER: &str = "X-RequestId";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const AUDIO_CONTENT_TYPE: &str = "audio/x-wav";

const CRLF: &str = "\r\n";
const HEADER_TERMINATOR: &str = "\r\n\r\n";

/// Fields common to every outbound frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader<'a> {
    pub path: &'a str,
    pub request_id: &'a str,
    pub timestamp: &'a str,
}

impl FrameHeader<'_> {
    fn write(&self, content_type: &str, out: &mut String) {
        for (name, value) in [
            (PATH_HEADER, self.path),
            (REQUEST_ID_HEADER, self.request_id),
            (TIMESTAMP_HEADER, self.timestamp),
            (CONTENT_TYPE_HEADER, content_type),
        ] {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str(CRLF);
        }
    }
}

/// Encode a JSON text message. The body must be valid UTF-8.
pub fn encode_text(header: FrameHeader<'_>, body: &[u8]) -> UspResult<String> {
    let body = std::str::from_utf8(body).map_err(|e| {
        UspError::InvalidArgument(format!(
            "Message body on path '{}' is not valid UTF-8: {e}",
            header.path
        ))
    })?;

    let mut frame = String::with_capacity(160 + body.len());
    header.write(JSON_CONTENT_TYPE, &mut frame);
    frame.push_str(CRLF);
    frame.push_str(body);
    Ok(frame)
}

/// Encode one audio chunk. An empty chunk marks the end of the stream.
pub fn encode_audio(header: FrameHeader<'_>, data: &[u8]) -> UspResult<Bytes> {
    let mut headers = String::with_capacity(160);
    header.write(AUDIO_CONTENT_TYPE, &mut headers);

    let header_len = u16::try_from(headers.len()).map_err(|_| {
        UspError::RuntimeError(format!("Audio frame header too long: {} bytes", headers.len()))
    })?;

    let mut frame = BytesMut::with_capacity(2 + headers.len() + data.len());
    frame.put_u16(header_len);
    frame.put_slice(headers.as_bytes());
    frame.put_slice(data);
    Ok(frame.freeze())
}

/// Decode an inbound text frame.
pub fn decode_text(frame: &str) -> UspResult<TransportResponse> {
    let (headers, body) = match frame.split_once(HEADER_TERMINATOR) {
        Some((headers, body)) => (headers, body),
        None => (frame.trim_end_matches(CRLF), ""),
    };

    Ok(TransportResponse {
        headers: Some(parse_headers(headers)?),
        body: Bytes::copy_from_slice(body.as_bytes()),
        error_code: 0,
    })
}

/// Decode an inbound binary frame.
pub fn decode_binary(frame: &Bytes) -> UspResult<TransportResponse> {
    if frame.len() < 2 {
        return Err(UspError::ProtocolViolation(
            "binary frame shorter than its header length prefix".to_string(),
        ));
    }

    let header_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let body_start = 2 + header_len;
    if frame.len() < body_start {
        return Err(UspError::ProtocolViolation(format!(
            "binary frame header length {header_len} exceeds frame size {}",
            frame.len()
        )));
    }

    let headers = std::str::from_utf8(&frame[2..body_start]).map_err(|_| {
        UspError::ProtocolViolation("binary frame headers are not valid UTF-8".to_string())
    })?;

    Ok(TransportResponse {
        headers: Some(parse_headers(headers)?),
        body: frame.slice(body_start..),
        error_code: 0,
    })
}

fn parse_headers(block: &str) -> UspResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for line in block.split(CRLF).filter(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or_else(|| {
            UspError::ProtocolViolation(format!("malformed header line '{line}'"))
        })?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| UspError::ProtocolViolation(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| UspError::ProtocolViolation(format!("invalid header value: {e}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}
