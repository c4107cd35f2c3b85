//! # Live Audio Session
//!
//! Real-time, bidirectional voice sessions over a WebSocket relay.
//!
//! ## Modules:
//! - **audio**: PCM codec, capture windows, playback scheduling, devices
//! - **session**: the client-side session controller
//! - **protocol**: JSON envelopes exchanged with the relay
//! - **relay**: the actix-web relay server (`/live`)
//! - **config** / **error** / **logging**: shared plumbing
//! - **state** / **health** / **middleware**: relay server state and monitoring

pub mod audio;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod state;

pub use config::AppConfig;
pub use error::{AppError, AppResult, SessionError};
pub use protocol::{ClientMessage, MediaChunk, ServerMessage, SessionProfile};
pub use session::{LiveSession, SessionEvents, SessionOptions, SessionStatus};
