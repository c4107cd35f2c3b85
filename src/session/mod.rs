//! # Live Session
//!
//! The client half: a [`LiveSession`] streams microphone audio to the relay
//! and schedules the relay's speech for gapless playback.

pub mod controller;
pub mod events;
pub mod outbound;
pub mod state;

pub use controller::{LiveSession, SessionOptions, SessionStats};
pub use events::{LoggingEvents, NoopEvents, SessionEvents};
pub use state::SessionStatus;
