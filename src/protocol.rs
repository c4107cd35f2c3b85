//! # Relay Envelope Protocol
//!
//! JSON envelopes exchanged over the `/live` WebSocket. Every message is an
//! object with a `type` tag.
//!
//! ## Client → Relay:
//! - `{"type":"init","role":…,"voiceName":…,"systemInstruction"?:…,"config"?:{…}}`
//!   sent once, right after the socket opens
//! - `{"type":"mic","data":{"data":"<base64>","mimeType":"audio/pcm;rate=16000"}}`
//!   sent at capture cadence while active
//!
//! ## Relay → Client:
//! - `{"type":"audio","data":"<base64 PCM, 24kHz mono>"}`
//! - `{"type":"text","data":"…"}`
//! - `{"type":"error","message":"…"}`

use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// Path appended to the API base URL to reach the relay.
pub const LIVE_PATH: &str = "/live";

/// One base64 PCM chunk plus its format label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaChunk {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Structured interview settings forwarded to the speech backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// e.g. "behavioral", "technical", "system-design"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus_areas: Vec<String>,
}

/// Who the remote voice is and how it should behave. Sent as the `init`
/// envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    pub role: String,
    pub voice_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<InterviewConfig>,
}

impl SessionProfile {
    pub fn new(role: impl Into<String>, voice_name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            voice_name: voice_name.into(),
            system_instruction: None,
            config: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_interview(mut self, config: InterviewConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Messages sent by the session controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Init(SessionProfile),
    Mic { data: MediaChunk },
}

/// Messages pushed by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Base64 16-bit PCM at 24kHz mono
    Audio { data: String },
    /// Transcript or other text produced by the backend
    Text { data: String },
    /// Relay-side fault description
    Error { message: String },
}

/// Derive the relay WebSocket URL from the HTTP(S) API base URL.
///
/// `http://` becomes `ws://`, `https://` becomes `wss://`, a trailing slash
/// is trimmed and `/live` is appended. URLs already using a WebSocket scheme
/// keep it.
pub fn live_endpoint(api_base_url: &str) -> Result<String, SessionError> {
    let base = api_base_url.trim().trim_end_matches('/');

    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| SessionError::Config(format!("API base URL has no scheme: '{}'", api_base_url)))?;

    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SessionError::Config(format!(
                "Unsupported API base URL scheme '{}'",
                other
            )))
        }
    };

    if rest.is_empty() {
        return Err(SessionError::Config("API base URL has no host".to_string()));
    }

    Ok(format!("{}://{}{}", ws_scheme, rest, LIVE_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_init_envelope_shape() {
        let profile = SessionProfile::new("interviewer", "Puck")
            .with_system_instruction("Be concise")
            .with_interview(InterviewConfig {
                job_title: Some("Backend Engineer".into()),
                duration_minutes: Some(30),
                focus_areas: vec!["systems".into()],
                ..Default::default()
            });

        let value = serde_json::to_value(ClientMessage::Init(profile)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "init",
                "role": "interviewer",
                "voiceName": "Puck",
                "systemInstruction": "Be concise",
                "config": {
                    "jobTitle": "Backend Engineer",
                    "durationMinutes": 30,
                    "focusAreas": ["systems"]
                }
            })
        );
    }

    #[test]
    fn test_init_omits_absent_fields() {
        let value = serde_json::to_value(ClientMessage::Init(SessionProfile::new("coach", "Kore"))).unwrap();
        assert_eq!(value, json!({"type": "init", "role": "coach", "voiceName": "Kore"}));
    }

    #[test]
    fn test_mic_envelope_shape() {
        let msg = ClientMessage::Mic {
            data: MediaChunk {
                data: "AAAA".into(),
                mime_type: "audio/pcm;rate=16000".into(),
            },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "mic", "data": {"data": "AAAA", "mimeType": "audio/pcm;rate=16000"}})
        );
    }

    #[test]
    fn test_server_messages_parse() {
        let audio: ServerMessage = serde_json::from_str(r#"{"type":"audio","data":"AAA="}"#).unwrap();
        assert_eq!(audio, ServerMessage::Audio { data: "AAA=".into() });

        let error: ServerMessage = serde_json::from_str(r#"{"type":"error","message":"quota"}"#).unwrap();
        assert_eq!(error, ServerMessage::Error { message: "quota".into() });

        assert!(serde_json::from_str::<ServerMessage>(r#"{"type":"video","data":""}"#).is_err());
    }

    #[test]
    fn test_live_endpoint() {
        assert_eq!(live_endpoint("http://localhost:3001").unwrap(), "ws://localhost:3001/live");
        assert_eq!(live_endpoint("https://api.example.com/").unwrap(), "wss://api.example.com/live");
        assert_eq!(live_endpoint("https://api.example.com/v1").unwrap(), "wss://api.example.com/v1/live");
        assert_eq!(live_endpoint("ws://127.0.0.1:9000").unwrap(), "ws://127.0.0.1:9000/live");
        assert!(live_endpoint("ftp://example.com").is_err());
        assert!(live_endpoint("localhost:3001").is_err());
        assert!(live_endpoint("http://").is_err());
    }
}
