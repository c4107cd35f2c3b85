//! # Error Handling
//!
//! Two error families live here:
//!
//! - **SessionError**: everything the live session controller can report to
//!   the embedding application, either as a `Result` from `connect()` or
//!   through the error callback.
//! - **AppError**: HTTP-facing failures of the relay server, rendered as JSON
//!   bodies through actix's `ResponseError`.
//!
//! ## Session Error Taxonomy:
//! - **Permission**: microphone denied or missing; fatal to `connect()`
//! - **Transport**: socket failures (DNS, refused, abrupt drop); never retried
//! - **Decode**: malformed inbound payload; skipped per message
//! - **Cancelled**: `disconnect()` won the race against a pending `connect()`

use crate::audio::codec::CodecError;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use tokio_tungstenite::tungstenite;

/// Failures surfaced by a live audio session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Microphone access denied or no capture device available
    Permission(String),

    /// Socket-level failure talking to the relay
    Transport(String),

    /// Inbound payload could not be turned into audio
    Decode(String),

    /// Relay sent something outside the envelope contract, or reported a fault
    Protocol(String),

    /// Capture or playback device failed after opening
    Device(String),

    /// Client configuration is unusable (bad base URL, zero window, ...)
    Config(String),

    /// `connect()` called while a session is already connecting or active
    AlreadyActive,

    /// `disconnect()` ran before a pending `connect()` finished
    Cancelled,
}

impl SessionError {
    /// Short machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Permission(_) => "permission",
            SessionError::Transport(_) => "transport",
            SessionError::Decode(_) => "decode",
            SessionError::Protocol(_) => "protocol",
            SessionError::Device(_) => "device",
            SessionError::Config(_) => "config",
            SessionError::AlreadyActive => "already_active",
            SessionError::Cancelled => "cancelled",
        }
    }

    /// Text suitable for showing to the person being interviewed.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::Permission(_) => "Allow microphone access to start the interview",
            SessionError::Transport(_) => "Connection failed",
            SessionError::AlreadyActive => "A session is already running",
            SessionError::Cancelled => "The session has ended",
            _ => "Something went wrong with the voice session",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Permission(msg) => write!(f, "Microphone permission error: {}", msg),
            SessionError::Transport(msg) => write!(f, "Transport error: {}", msg),
            SessionError::Decode(msg) => write!(f, "Decode error: {}", msg),
            SessionError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            SessionError::Device(msg) => write!(f, "Audio device error: {}", msg),
            SessionError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SessionError::AlreadyActive => write!(f, "Session is already connecting or active"),
            SessionError::Cancelled => write!(f, "Connection cancelled by disconnect"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<tungstenite::Error> for SessionError {
    fn from(err: tungstenite::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Protocol(format!("JSON error: {}", err))
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        SessionError::Decode(err.to_string())
    }
}

/// HTTP errors returned by the relay server.
#[derive(Debug)]
pub enum AppError {
    /// Client sent something the relay cannot accept (bad upgrade request)
    BadRequest(String),

    /// Relay is at its concurrent session limit
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// JSON error body:
/// ```json
/// { "error": { "type": "unavailable", "message": "...", "timestamp": "..." } }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::Unavailable(msg) => ("unavailable", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<actix_web::Error> for AppError {
    fn from(err: actix_web::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            SessionError::Permission("denied".into()).user_message(),
            "Allow microphone access to start the interview"
        );
        assert_eq!(SessionError::Transport("refused".into()).user_message(), "Connection failed");
    }

    #[test]
    fn test_codec_error_maps_to_decode() {
        let err: SessionError = CodecError::InvalidChannelCount.into();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_app_error_status() {
        let err = AppError::Unavailable("full".into());
        assert_eq!(err.status_code(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("full"));
    }
}
