//! # Playback Scheduling
//!
//! Inbound audio chunks arrive independently over the network. The scheduler
//! lines them up back to back on the output clock using a single running
//! cursor, so playback is gapless and in arrival order regardless of jitter.
//!
//! ## Cursor Rule:
//! `start = max(cursor, now)`, then `cursor = start + duration`.
//! While the output clock has not overtaken the cursor, buffer k starts at
//! the sum of the durations of buffers 0..k.

use crate::audio::buffer::PlaybackBuffer;
use crate::audio::device::AudioOutput;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Identifier handed to the output for each scheduled buffer.
pub type BufferId = u64;

/// Where a buffer landed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    pub id: BufferId,
    /// Start time on the output clock, in seconds
    pub start: f64,
    /// `start + duration`
    pub end: f64,
}

/// Tracks the playback cursor and every buffer still pending or playing.
///
/// The scheduler never owns sample data after handing it to the output; it
/// keeps only the id and time span so teardown can stop what's in flight.
///
/// ## Rust Concepts:
/// - **#[derive(Default)]**: Starts with cursor 0.0 and no buffers
/// - **BTreeMap**: Keeps buffers ordered by id, so stops happen in schedule order
/// - **&dyn AudioOutput**: Borrowed trait object; the scheduler never owns the device
#[derive(Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    next_id: BufferId,
    active: BTreeMap<BufferId, ScheduledBuffer>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time at which the next buffer will start (if the clock hasn't passed it).
    pub fn cursor(&self) -> f64 {
        self.next_start_time
    }

    /// Number of buffers still tracked as pending or playing.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Queue a buffer on the output immediately after the previous one.
    pub fn schedule(&mut self, buffer: Arc<PlaybackBuffer>, output: &dyn AudioOutput) -> ScheduledBuffer {
        let now = output.current_time();
        self.reap(now);

        let start = self.next_start_time.max(now);
        let end = start + buffer.duration_seconds();
        let id = self.next_id;
        self.next_id += 1;

        output.start(id, buffer, start);

        let scheduled = ScheduledBuffer { id, start, end };
        self.active.insert(id, scheduled);
        self.next_start_time = end;

        debug!(id, start, end, "Scheduled playback buffer");
        scheduled
    }

    /// Unregister buffers that have finished playing by `now`.
    pub fn reap(&mut self, now: f64) -> usize {
        let before = self.active.len();
        self.active.retain(|_, scheduled| scheduled.end > now);
        before - self.active.len()
    }

    /// Stop every buffer still pending or playing and forget them. Buffers
    /// that already finished are dropped without a `stop()`.
    pub fn stop_all(&mut self, output: &dyn AudioOutput) -> usize {
        self.reap(output.current_time());
        let stopped = self.active.len();
        for id in self.active.keys() {
            output.stop(*id);
        }
        self.active.clear();
        stopped
    }

    /// Rewind the cursor for a fresh session. Ids keep increasing.
    pub fn reset(&mut self) {
        self.next_start_time = 0.0;
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::MemoryOutput;

    fn seconds(duration: f64) -> Arc<PlaybackBuffer> {
        let frames = (duration * 24_000.0).round() as usize;
        Arc::new(PlaybackBuffer::mono(24_000, vec![0.0; frames]))
    }

    #[test]
    fn test_second_buffer_follows_first() {
        let output = MemoryOutput::new();
        let mut scheduler = PlaybackScheduler::new();

        let first = scheduler.schedule(seconds(1.0), &output);
        let second = scheduler.schedule(seconds(0.5), &output);

        assert_eq!(first.start, 0.0);
        assert!((second.start - 1.0).abs() < 1e-9);
        assert!((scheduler.cursor() - 1.5).abs() < 1e-9);

        let starts: Vec<f64> = output.starts().iter().map(|s| s.at).collect();
        assert_eq!(starts.len(), 2);
        assert!((starts[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_start_is_prefix_sum_of_durations() {
        let output = MemoryOutput::new();
        let mut scheduler = PlaybackScheduler::new();
        let durations = [0.2, 0.35, 1.0, 0.05, 0.4, 0.25];

        let mut expected = 0.0;
        let mut last_start = -1.0;
        for d in durations {
            let scheduled = scheduler.schedule(seconds(d), &output);
            assert!((scheduled.start - expected).abs() < 1e-9);
            assert!(scheduled.start >= last_start);
            last_start = scheduled.start;
            expected += d;
        }
    }

    #[test]
    fn test_late_clock_moves_start_forward() {
        let output = MemoryOutput::new();
        let mut scheduler = PlaybackScheduler::new();

        scheduler.schedule(seconds(0.5), &output);
        output.set_time(2.0);
        let late = scheduler.schedule(seconds(0.5), &output);

        assert!((late.start - 2.0).abs() < 1e-9);
        assert!((scheduler.cursor() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_reap_unregisters_finished() {
        let output = MemoryOutput::new();
        let mut scheduler = PlaybackScheduler::new();

        scheduler.schedule(seconds(1.0), &output);
        scheduler.schedule(seconds(1.0), &output);
        assert_eq!(scheduler.active_count(), 2);

        assert_eq!(scheduler.reap(1.0), 1);
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(scheduler.reap(5.0), 1);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_stop_all_stops_pending() {
        let output = MemoryOutput::new();
        let mut scheduler = PlaybackScheduler::new();

        let a = scheduler.schedule(seconds(1.0), &output);
        let b = scheduler.schedule(seconds(1.0), &output);

        assert_eq!(scheduler.stop_all(&output), 2);
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(output.stops(), vec![a.id, b.id]);

        scheduler.reset();
        assert_eq!(scheduler.cursor(), 0.0);
        let c = scheduler.schedule(seconds(0.1), &output);
        assert!(c.id > b.id);
    }

    #[test]
    fn test_stop_all_skips_finished_buffers() {
        let output = MemoryOutput::new();
        let mut scheduler = PlaybackScheduler::new();

        scheduler.schedule(seconds(1.0), &output);
        let playing = scheduler.schedule(seconds(1.0), &output);
        output.advance(1.5);

        assert_eq!(scheduler.stop_all(&output), 1);
        assert_eq!(output.stops(), vec![playing.id]);
    }
}
