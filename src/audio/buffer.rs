//! # Audio Buffers
//!
//! Two buffer shapes flow through a live session:
//!
//! - **PlaybackBuffer**: a decoded, ready-to-play block of planar float
//!   samples at a known rate. Once scheduled, the output owns playback.
//! - **CaptureWindow**: an accumulator that turns arbitrarily sized sample
//!   runs into the fixed-size windows the microphone tap delivers.

/// Number of samples in one microphone processing window.
pub const DEFAULT_CAPTURE_WINDOW: usize = 4096;

/// Decoded audio ready for scheduling.
///
/// Samples are stored planar (one `Vec<f32>` per channel), normalized to
/// [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PlaybackBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// All planes are expected to have the same length; the shortest one
    /// defines the frame count.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self { sample_rate, channels }
    }

    /// Convenience constructor for single-channel audio.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Samples of one channel. Out-of-range indices yield an empty slice.
    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Playback length in seconds (frames / sample_rate).
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Peak absolute sample across all channels, for level meters.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|plane| plane.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

/// Re-chunks a sample stream into fixed-size capture windows.
///
/// ## Example:
/// Pushing 10,000 samples into a 4096-sample window yields two full windows
/// and keeps 1,808 samples pending until more audio arrives or the stream is
/// flushed.
#[derive(Debug)]
pub struct CaptureWindow {
    size: usize,
    pending: Vec<f32>,
}

impl CaptureWindow {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            pending: Vec::with_capacity(size.max(1)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Samples waiting for a full window.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append samples and return every window that became full.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut ready = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let room = self.size - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.size {
                ready.push(std::mem::replace(&mut self.pending, Vec::with_capacity(self.size)));
            }
        }

        ready
    }

    /// Emit whatever is pending as one last window, zero-padded to full size.
    pub fn flush_padded(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            return None;
        }
        let mut last = std::mem::take(&mut self.pending);
        last.resize(self.size, 0.0);
        Some(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_duration() {
        let buffer = PlaybackBuffer::mono(24_000, vec![0.0; 12_000]);
        assert_eq!(buffer.frames(), 12_000);
        assert!((buffer.duration_seconds() - 0.5).abs() < 1e-12);
        assert!(!buffer.is_empty());
        assert!(buffer.channel(3).is_empty());
    }

    #[test]
    fn test_peak_spans_channels() {
        let buffer = PlaybackBuffer::new(24_000, vec![vec![0.1, -0.2], vec![0.7, -0.3]]);
        assert!((buffer.peak() - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_capture_window_chunks() {
        let mut window = CaptureWindow::new(DEFAULT_CAPTURE_WINDOW);
        let ready = window.push(&vec![0.5; 10_000]);
        assert_eq!(ready.len(), 2);
        assert!(ready.iter().all(|w| w.len() == 4096));
        assert_eq!(window.pending(), 10_000 - 8192);

        let last = window.flush_padded().unwrap();
        assert_eq!(last.len(), 4096);
        assert_eq!(last[1807], 0.5);
        assert_eq!(last[1808], 0.0);
        assert!(window.flush_padded().is_none());
    }

    #[test]
    fn test_capture_window_across_pushes() {
        let mut window = CaptureWindow::new(4);
        assert!(window.push(&[1.0, 2.0, 3.0]).is_empty());
        let ready = window.push(&[4.0, 5.0]);
        assert_eq!(ready, vec![vec![1.0, 2.0, 3.0, 4.0]]);
        assert_eq!(window.pending(), 1);
    }
}
