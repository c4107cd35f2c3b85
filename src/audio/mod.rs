//! # Audio Module
//!
//! Everything between raw samples and the wire:
//!
//! - **codec**: float PCM ↔ base64 16-bit frames, bytes → playback buffers
//! - **buffer**: playback buffers and fixed-size capture windows
//! - **scheduler**: the gapless playback cursor
//! - **device**: microphone and speaker seams plus file-backed implementations
//!
//! ## Audio Format Requirements:
//! - **Outbound**: 16kHz, 16-bit PCM, mono, little-endian
//! - **Inbound**: 24kHz, 16-bit PCM, mono, little-endian

pub mod buffer;
pub mod codec;
pub mod device;
pub mod scheduler;

pub use buffer::{CaptureWindow, PlaybackBuffer, DEFAULT_CAPTURE_WINDOW};
pub use codec::{CodecError, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
pub use device::{
    AudioOutput, CaptureStream, DeniedMicrophone, InputDevice, MemoryOutput, MicrophoneSource,
    SilenceMicrophone, WavMicrophone, WavRecorder,
};
pub use scheduler::{BufferId, PlaybackScheduler, ScheduledBuffer};
