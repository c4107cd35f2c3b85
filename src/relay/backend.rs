//! # Speech Backends
//!
//! The relay hands each decoded microphone frame to a [`SpeechBackend`] and
//! forwards whatever envelopes it produces back to the client.
//!
//! `LoopbackBackend` answers every frame with the same audio resampled to
//! the 24kHz playback rate, which makes the relay usable end to end without a
//! speech model behind it.

use crate::audio::codec::{encode_base64_pcm16, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::protocol::{ServerMessage, SessionProfile};
use std::sync::Arc;
use tracing::debug;

/// Produces replies for one relay connection.
pub trait SpeechBackend {
    fn name(&self) -> &str;

    /// The client introduced itself. Replies are sent immediately.
    fn on_init(&mut self, profile: &SessionProfile) -> Vec<ServerMessage>;

    /// One 16kHz mono capture window.
    fn on_audio(&mut self, samples: &[f32]) -> Vec<ServerMessage>;

    fn on_close(&mut self) {}
}

/// Builds a fresh backend for every accepted connection.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn SpeechBackend> + Send + Sync>;

pub fn loopback_factory() -> BackendFactory {
    Arc::new(|| Box::new(LoopbackBackend::new()) as Box<dyn SpeechBackend>)
}

/// Echoes microphone audio back at the playback rate.
#[derive(Debug, Default)]
pub struct LoopbackBackend {
    frames: u64,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl SpeechBackend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    fn on_init(&mut self, profile: &SessionProfile) -> Vec<ServerMessage> {
        debug!(role = %profile.role, voice = %profile.voice_name, "Loopback backend ready");
        Vec::new()
    }

    fn on_audio(&mut self, samples: &[f32]) -> Vec<ServerMessage> {
        if samples.is_empty() {
            return Vec::new();
        }
        self.frames += 1;

        let resampled = resample_linear(samples, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE);
        vec![ServerMessage::Audio {
            data: encode_base64_pcm16(&resampled),
        }]
    }

    fn on_close(&mut self) {
        debug!(frames = self.frames, "Loopback backend closed");
    }
}

/// Linear-interpolation sample rate conversion.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let out_len = ((samples.len() as u64 * to_rate as u64) / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = (position.floor() as usize).min(last);
            let frac = (position - index as f64) as f32;
            let a = samples[index];
            let b = samples[(index + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::decode_inbound_audio;

    #[test]
    fn test_resample_window_length() {
        let window = vec![0.25; 4096];
        let out = resample_linear(&window, 16_000, 24_000);
        assert_eq!(out.len(), 6144);
        assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_resample_interpolates() {
        let out = resample_linear(&[0.0, 1.0], 16_000, 24_000);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn test_resample_edge_cases() {
        assert!(resample_linear(&[], 16_000, 24_000).is_empty());
        assert_eq!(resample_linear(&[0.5, 0.1], 24_000, 24_000), vec![0.5, 0.1]);
    }

    #[test]
    fn test_loopback_replies_with_playback_audio() {
        let mut backend = LoopbackBackend::new();
        assert!(backend.on_init(&SessionProfile::new("interviewer", "Puck")).is_empty());

        let replies = backend.on_audio(&vec![0.5; 4096]);
        assert_eq!(replies.len(), 1);
        match &replies[0] {
            ServerMessage::Audio { data } => {
                let buffer = decode_inbound_audio(data).unwrap();
                assert_eq!(buffer.frames(), 6144);
                assert!((buffer.duration_seconds() - 0.256).abs() < 1e-9);
            }
            other => panic!("expected audio, got {:?}", other),
        }
        assert_eq!(backend.frames(), 1);
        assert!(backend.on_audio(&[]).is_empty());
    }
}
