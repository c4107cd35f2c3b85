//! # Live Client
//!
//! Command-line session against a relay: captures from the configured input
//! (silence, a WAV file, or a simulated refusal), streams it, and records
//! everything the relay plays back to `client.recording_path`.
//!
//! Runs for `client.session_seconds`, until Ctrl+C, or until the relay closes
//! the session, whichever comes first.

use anyhow::Result;
use live_audio_session::audio::{InputDevice, WavRecorder};
use live_audio_session::config::AppConfig;
use live_audio_session::logging;
use live_audio_session::session::{LiveSession, LoggingEvents, SessionOptions, SessionStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_tracing(logging::DEFAULT_FILTER)?;

    let config = AppConfig::load()?;
    config.validate()?;
    let client = &config.client;

    let input: InputDevice = client.input.parse().map_err(anyhow::Error::msg)?;
    let options = SessionOptions::from_config(client)?;
    let recorder = Arc::new(WavRecorder::new());

    let session = LiveSession::new(options, input.source(), recorder.clone(), Arc::new(LoggingEvents));
    info!(
        endpoint = %session.options().endpoint,
        role = %session.options().profile.role,
        input = ?input,
        "Starting live session"
    );

    if let Err(e) = session.connect().await {
        error!("{}", e.user_message());
        return Err(e.into());
    }

    let mut status = session.subscribe_status();
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(client.session_seconds)) => {
            info!(seconds = client.session_seconds, "Session time elapsed");
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = status.wait_for(|s| *s == SessionStatus::Idle) => info!("Relay ended the session"),
    }

    session.disconnect().await;

    let stats = session.stats();
    info!(
        frames_captured = stats.frames_captured,
        frames_sent = stats.frames_sent,
        frames_dropped = stats.frames_dropped,
        buffers_scheduled = stats.buffers_scheduled,
        decode_failures = stats.decode_failures,
        "Session finished"
    );

    let path = Path::new(&client.recording_path);
    let frames = recorder.save(path)?;
    info!(path = %path.display(), frames, "Saved playback recording");

    Ok(())
}
