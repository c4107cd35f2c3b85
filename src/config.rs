//! # Configuration Management
//!
//! Settings for both binaries (the relay server and the live client) load
//! from the same layered sources:
//! - Built-in defaults (the `Default` impl below)
//! - `config.toml` in the working directory, if present
//! - Environment variables with the `APP_` prefix, sections split by `__`
//!   (e.g. `APP_CLIENT__API_BASE_URL`, `APP_SERVER__PORT`)
//! - `HOST` / `PORT`, for deployment platforms that set them
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT`
//! 2. `APP_*` environment variables
//! 3. `config.toml`
//! 4. Defaults

use crate::protocol::{live_endpoint, InterviewConfig, SessionProfile};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub performance: PerformanceConfig,
}

/// Where the relay listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Live session client settings.
///
/// ## Fields:
/// - `api_base_url`: HTTP(S) base of the API; the socket endpoint is derived
///   from it by swapping the scheme and appending `/live`
/// - `role` / `voice_name` / `system_instruction`: sent in the `init` envelope
/// - `capture_window`: samples per microphone frame (4096 ≈ 256ms at 16kHz)
/// - `outbound_queue_depth`: mic frames allowed to wait for the socket; past
///   that the oldest waiting frame is discarded
/// - `monitor_gain`: gain of the local monitor path (0.0 keeps it silent)
/// - `input`: capture source, see `InputDevice`
/// - `recording_path`: where the client writes what it played
/// - `session_seconds`: how long the command-line client stays connected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub role: String,
    pub voice_name: String,
    pub system_instruction: Option<String>,
    pub interview: Option<InterviewConfig>,
    pub capture_window: usize,
    pub outbound_queue_depth: usize,
    pub monitor_gain: f32,
    pub input: String,
    pub recording_path: String,
    pub session_seconds: u64,
}

/// Relay tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3001,
            },
            client: ClientConfig {
                api_base_url: "http://127.0.0.1:3001".to_string(),
                role: "interviewer".to_string(),
                voice_name: "Puck".to_string(),
                system_instruction: None,
                interview: None,
                capture_window: 4096,
                outbound_queue_depth: 16,
                monitor_gain: 0.0,
                input: "silence".to_string(),
                recording_path: "live-session.wav".to_string(),
                session_seconds: 30,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.heartbeat_interval_secs == 0
            || self.performance.client_timeout_secs <= self.performance.heartbeat_interval_secs
        {
            return Err(anyhow::anyhow!(
                "Client timeout must be longer than a non-zero heartbeat interval"
            ));
        }

        if self.client.capture_window == 0 {
            return Err(anyhow::anyhow!("Capture window must be greater than 0"));
        }

        if self.client.outbound_queue_depth == 0 {
            return Err(anyhow::anyhow!("Outbound queue depth must be greater than 0"));
        }

        if !self.client.monitor_gain.is_finite() || self.client.monitor_gain < 0.0 {
            return Err(anyhow::anyhow!("Monitor gain must be a non-negative number"));
        }

        live_endpoint(&self.client.api_base_url)?;

        Ok(())
    }
}

impl ClientConfig {
    /// The `init` payload this configuration describes.
    pub fn profile(&self) -> SessionProfile {
        SessionProfile {
            role: self.role.clone(),
            voice_name: self.voice_name.clone(),
            system_instruction: self.system_instruction.clone(),
            config: self.interview.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.client.capture_window, 4096);
        assert_eq!(config.client.monitor_gain, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.client.api_base_url = "gopher://old.example".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.client.outbound_queue_depth = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.performance.client_timeout_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profile_from_client_config() {
        let mut config = AppConfig::default();
        config.client.system_instruction = Some("Ask one question at a time".into());
        let profile = config.client.profile();
        assert_eq!(profile.role, "interviewer");
        assert_eq!(profile.voice_name, "Puck");
        assert_eq!(profile.system_instruction.as_deref(), Some("Ask one question at a time"));
        assert!(profile.config.is_none());
    }
}
