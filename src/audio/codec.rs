//! # PCM Wire Codec
//!
//! Converts between floating-point sample windows and the base64-wrapped
//! 16-bit PCM frames carried inside the relay envelopes, and rebuilds
//! playable buffers from raw inbound bytes.
//!
//! ## Fixed Formats:
//! - **Outbound** (microphone → relay): 16kHz, mono, 16-bit little-endian
//! - **Inbound** (relay → speakers): 24kHz, mono, 16-bit little-endian
//!
//! The two directions never share a rate, so both are constants here rather
//! than configuration.

use crate::audio::buffer::PlaybackBuffer;
use crate::protocol::MediaChunk;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use tracing::debug;

/// Sample rate of every outbound microphone frame.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of every inbound synthesized audio frame.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// MIME label attached to outbound frames.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Bytes per 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Failures while turning wire payloads back into audio.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Payload was not valid standard-alphabet base64
    Base64(String),
    /// Channel count of zero cannot describe any frame layout
    InvalidChannelCount,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Base64(msg) => write!(f, "invalid base64 payload: {}", msg),
            CodecError::InvalidChannelCount => write!(f, "channel count must be at least 1"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Convert 32-bit float samples to 16-bit PCM.
///
/// Values outside [-1.0, 1.0] are clamped first, so a full-scale positive
/// sample saturates at `i16::MAX` instead of wrapping negative.
pub fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let scaled = sample.clamp(-1.0, 1.0) * 32768.0;
            scaled.clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// Convert 16-bit PCM samples to 32-bit floats in [-1.0, 1.0).
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

/// Pack float samples as little-endian 16-bit PCM bytes.
pub fn encode_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let pcm = float_to_pcm(samples);
    let mut bytes = vec![0u8; pcm.len() * BYTES_PER_SAMPLE];
    LittleEndian::write_i16_into(&pcm, &mut bytes);
    bytes
}

/// Encode one microphone window as an outbound wire chunk.
///
/// Deterministic and side-effect free; the MIME label is always
/// [`INPUT_MIME_TYPE`] no matter what rate the caller believes it captured at.
pub fn encode_pcm16(samples: &[f32]) -> MediaChunk {
    MediaChunk {
        data: BASE64.encode(encode_pcm16_bytes(samples)),
        mime_type: INPUT_MIME_TYPE.to_string(),
    }
}

/// Encode float samples as a bare base64 PCM string (no MIME wrapper).
pub fn encode_base64_pcm16(samples: &[f32]) -> String {
    BASE64.encode(encode_pcm16_bytes(samples))
}

/// Decode a base64 string into raw bytes.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, CodecError> {
    BASE64
        .decode(payload.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Rebuild a normalized multi-channel buffer from interleaved 16-bit PCM.
///
/// ## Partial Frames:
/// The frame count is `len / (channels * 2)`. Trailing bytes that do not
/// make up a whole frame are dropped rather than misread, so an odd-length
/// payload still yields every complete sample before the tear.
pub fn decode_audio_buffer(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<PlaybackBuffer, CodecError> {
    if channels == 0 {
        return Err(CodecError::InvalidChannelCount);
    }

    let channel_count = channels as usize;
    let frame_bytes = channel_count * BYTES_PER_SAMPLE;
    let frame_count = bytes.len() / frame_bytes;
    let used = frame_count * frame_bytes;

    if used < bytes.len() {
        debug!(
            total_bytes = bytes.len(),
            dropped_bytes = bytes.len() - used,
            channels,
            "Truncating partial PCM frame"
        );
    }

    let mut interleaved = vec![0i16; frame_count * channel_count];
    LittleEndian::read_i16_into(&bytes[..used], &mut interleaved);

    let mut planes = vec![Vec::with_capacity(frame_count); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample as f32 / 32768.0);
        }
    }

    Ok(PlaybackBuffer::new(sample_rate, planes))
}

/// Decode an inbound `audio` payload. Always 24kHz mono.
pub fn decode_inbound_audio(payload: &str) -> Result<PlaybackBuffer, CodecError> {
    let bytes = decode_base64(payload)?;
    decode_audio_buffer(&bytes, OUTPUT_SAMPLE_RATE, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTUM: f32 = 1.0 / 32768.0;

    #[test]
    fn test_round_trip_within_quantization() {
        let samples: Vec<f32> = (0..4096)
            .map(|i| ((i as f32) * 0.013).sin() * 0.9)
            .chain([1.0, -1.0, 0.0, 0.5, -0.5, 0.999_99])
            .collect();

        let chunk = encode_pcm16(&samples);
        let decoded = decode_audio_buffer(&decode_base64(&chunk.data).unwrap(), INPUT_SAMPLE_RATE, 1).unwrap();

        assert_eq!(decoded.frames(), samples.len());
        for (original, restored) in samples.iter().zip(decoded.channel(0)) {
            assert!(
                (original - restored).abs() <= QUANTUM + f32::EPSILON,
                "{} vs {}",
                original,
                restored
            );
        }
    }

    #[test]
    fn test_full_scale_does_not_wrap() {
        let pcm = float_to_pcm(&[1.0, -1.0, 1.5, -1.5]);
        assert_eq!(pcm, vec![i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_outbound_chunk_is_tagged_16k() {
        let chunk = encode_pcm16(&[0.0; 4096]);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(decode_base64(&chunk.data).unwrap().len(), 4096 * 2);
    }

    #[test]
    fn test_inbound_is_always_24k_mono() {
        let payload = encode_base64_pcm16(&[0.25; 2400]);
        let buffer = decode_inbound_audio(&payload).unwrap();
        assert_eq!(buffer.sample_rate(), 24_000);
        assert_eq!(buffer.number_of_channels(), 1);
        assert!((buffer.duration_seconds() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_interleaved_stereo_is_split() {
        let mut bytes = Vec::new();
        for (left, right) in [(1000i16, -1000i16), (2000, -2000), (3000, -3000)] {
            bytes.extend_from_slice(&left.to_le_bytes());
            bytes.extend_from_slice(&right.to_le_bytes());
        }

        let buffer = decode_audio_buffer(&bytes, 48_000, 2).unwrap();
        assert_eq!(buffer.frames(), 3);
        assert!((buffer.channel(0)[2] - 3000.0 / 32768.0).abs() < f32::EPSILON);
        assert!((buffer.channel(1)[0] + 1000.0 / 32768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_frame_is_truncated() {
        // 7 bytes of mono: three whole samples plus a dangling byte
        let bytes = [0x00, 0x40, 0x00, 0xC0, 0xFF, 0x7F, 0x12];
        let buffer = decode_audio_buffer(&bytes, OUTPUT_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(0)[0], 0.5);
        assert_eq!(buffer.channel(0)[1], -0.5);

        // 6 bytes of stereo: one whole frame, one half frame
        let buffer = decode_audio_buffer(&bytes[..6], OUTPUT_SAMPLE_RATE, 2).unwrap();
        assert_eq!(buffer.frames(), 1);
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert_eq!(
            decode_audio_buffer(&[0, 0], OUTPUT_SAMPLE_RATE, 0).unwrap_err(),
            CodecError::InvalidChannelCount
        );
    }

    #[test]
    fn test_malformed_base64_rejected() {
        assert!(matches!(decode_base64("not*base64!"), Err(CodecError::Base64(_))));
        assert!(decode_inbound_audio("%%%").is_err());
    }

    #[test]
    fn test_empty_payload_is_empty_buffer() {
        let buffer = decode_inbound_audio("").unwrap();
        assert_eq!(buffer.frames(), 0);
        assert_eq!(buffer.duration_seconds(), 0.0);
    }
}
