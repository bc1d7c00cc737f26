//! Per-turn telemetry recorder.
//!
//! Collects receive timestamps of inbound messages and audio stream timing for
//! the current turn. On `turn.end` the connection flushes the record and sends
//! it to the service on the `telemetry` path.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

/// Current UTC time in RFC 3339 form.
pub fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AudioMetric {
    name: &'static str,
    start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<String>,
    bytes: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TelemetryRecord<'a> {
    received_messages: &'a BTreeMap<String, Vec<String>>,
    metrics: &'a [AudioMetric],
}

/// Telemetry for one connection.
#[derive(Debug, Default)]
pub struct Telemetry {
    received: BTreeMap<String, Vec<String>>,
    audio: Vec<AudioMetric>,
    audio_bytes_total: u64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a new audio stream.
    pub fn audio_start(&mut self) {
        self.audio.push(AudioMetric {
            name: "Microphone",
            start: timestamp(),
            ..Default::default()
        });
    }

    /// Count bytes written to the open audio stream.
    pub fn audio_data(&mut self, bytes: usize) {
        self.audio_bytes_total += bytes as u64;
        if let Some(metric) = self.audio.last_mut() {
            if metric.end.is_none() {
                metric.bytes += bytes as u64;
            }
        }
    }

    /// Stop timing the open audio stream.
    pub fn audio_end(&mut self) {
        match self.audio.last_mut() {
            Some(metric) if metric.end.is_none() => metric.end = Some(timestamp()),
            _ => warn!("Audio end recorded without an open audio stream"),
        }
    }

    pub fn record_received(&mut self, path: &str) {
        self.received
            .entry(path.to_string())
            .or_default()
            .push(timestamp());
    }

    /// Total audio bytes written over the connection lifetime.
    pub fn audio_bytes_total(&self) -> u64 {
        self.audio_bytes_total
    }

    /// Serialize and clear the pending record.
    ///
    /// Returns `None` when nothing was recorded since the last flush. An audio
    /// stream still open is carried over into the next record.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.received.is_empty() && self.audio.is_empty() {
            return None;
        }

        let payload = serde_json::to_vec(&TelemetryRecord {
            received_messages: &self.received,
            metrics: &self.audio,
        });

        self.received.clear();
        let open = if self.audio.last().is_some_and(|m| m.end.is_none()) {
            self.audio.pop()
        } else {
            None
        };
        self.audio.clear();
        if let Some(metric) = open {
            self.audio.push(AudioMetric {
                bytes: 0,
                ..metric
            });
        }

        match payload {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Failed to serialize telemetry: {}", e);
                None
            }
        }
    }
}
