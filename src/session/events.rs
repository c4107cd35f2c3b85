//! Callbacks from a live session to the embedding application.

use crate::audio::buffer::PlaybackBuffer;
use crate::error::SessionError;
use tracing::{info, warn};

/// Receives session side effects. Every method has a no-op default.
///
/// Callbacks run on the session's driver task; keep them short.
pub trait SessionEvents: Send + Sync {
    /// A decoded inbound buffer was scheduled. Meant for visualization only.
    fn on_audio_data(&self, _buffer: &PlaybackBuffer) {}

    /// The relay pushed text (transcripts, notes).
    fn on_text(&self, _text: &str) {}

    /// Something failed. Transport errors are followed by teardown.
    fn on_error(&self, _error: &SessionError) {}

    /// The socket closed. Fires once per session.
    fn on_close(&self) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl SessionEvents for NoopEvents {}

/// Writes each callback to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEvents;

impl SessionEvents for LoggingEvents {
    fn on_audio_data(&self, buffer: &PlaybackBuffer) {
        info!(
            frames = buffer.frames(),
            duration_ms = (buffer.duration_seconds() * 1000.0).round() as u64,
            peak = buffer.peak(),
            "Received speech"
        );
    }

    fn on_text(&self, text: &str) {
        info!(text, "Relay text");
    }

    fn on_error(&self, error: &SessionError) {
        warn!(kind = error.kind(), "{} ({})", error, error.user_message());
    }

    fn on_close(&self) {
        info!("Live session closed");
    }
}
