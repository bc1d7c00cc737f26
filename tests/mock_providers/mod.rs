//! Mock USP service for integration tests
//!
//! Simulates the speech service side of a USP session:
//! - Handshake with optional rejection (401/403)
//! - Turn events generated from the audio stream
//! - Telemetry capture
//! - Server initiated close

// Allow dead code in test infrastructure - not every test uses every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics collector for the mock server
#[derive(Debug, Default)]
pub struct MockStats {
    pub connections: AtomicU64,
    pub audio_frames: AtomicU64,
    pub end_of_stream_frames: AtomicU64,
    pub telemetry_frames: AtomicU64,
    pub text_frames: AtomicU64,
}

impl MockStats {
    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio(&self, end_of_stream: bool) {
        if end_of_stream {
            self.end_of_stream_frames.fetch_add(1, Ordering::Relaxed);
        } else {
            self.audio_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_text(&self, telemetry: bool) {
        self.text_frames.fetch_add(1, Ordering::Relaxed);
        if telemetry {
            self.telemetry_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Connections: {}, Audio: {}, EndOfStream: {}, Text: {}, Telemetry: {}",
            self.connections.load(Ordering::Relaxed),
            self.audio_frames.load(Ordering::Relaxed),
            self.end_of_stream_frames.load(Ordering::Relaxed),
            self.text_frames.load(Ordering::Relaxed),
            self.telemetry_frames.load(Ordering::Relaxed),
        )
    }
}

pub mod usp_mock;
