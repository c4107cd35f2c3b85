//! # Audio Devices
//!
//! The session controller never talks to sound hardware directly. It asks a
//! [`MicrophoneSource`] for a stream of fixed-size capture windows and hands
//! decoded buffers to an [`AudioOutput`] that plays them against its own
//! clock.
//!
//! ## Implementations:
//! - **SilenceMicrophone**: zero-filled windows, for smoke tests and priming
//! - **WavMicrophone**: replays a 16kHz mono WAV file at capture cadence
//! - **DeniedMicrophone**: always refuses access
//! - **MemoryOutput**: manual clock, records every start/stop
//! - **WavRecorder**: wall clock, renders what was actually heard to a WAV file

use crate::audio::buffer::{CaptureWindow, PlaybackBuffer};
use crate::audio::codec::{float_to_pcm, pcm_to_float, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::audio::scheduler::BufferId;
use crate::error::SessionError;
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

const WAV_FORMAT_PCM: u16 = 0x0001;

/// Windows buffered between the capture pump and the session driver.
const CAPTURE_CHANNEL_DEPTH: usize = 8;

/// Real-time length of one capture window at the outbound rate.
pub fn window_period(window: usize) -> Duration {
    Duration::from_secs_f64(window as f64 / INPUT_SAMPLE_RATE as f64)
}

/// Which capture source to use, parsed from configuration strings.
///
/// ## Accepted Forms:
/// - `silence` / `none`
/// - `denied`
/// - `wav:<path>` or any path ending in `.wav`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputDevice {
    Silence,
    Denied,
    Wav(PathBuf),
}

impl FromStr for InputDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "silence" | "none" => return Ok(InputDevice::Silence),
            "denied" => return Ok(InputDevice::Denied),
            _ => {}
        }

        if let Some(path) = trimmed.strip_prefix("wav:") {
            return Ok(InputDevice::Wav(PathBuf::from(path)));
        }
        if trimmed.to_lowercase().ends_with(".wav") {
            return Ok(InputDevice::Wav(PathBuf::from(trimmed)));
        }

        Err(format!("Unknown input device: {}", s))
    }
}

impl Default for InputDevice {
    fn default() -> Self {
        InputDevice::Silence
    }
}

impl InputDevice {
    /// Build the capture source this preference describes.
    pub fn source(&self) -> Arc<dyn MicrophoneSource> {
        match self {
            InputDevice::Silence => Arc::new(SilenceMicrophone::new(None)),
            InputDevice::Denied => Arc::new(DeniedMicrophone),
            InputDevice::Wav(path) => Arc::new(WavMicrophone::new(path.clone())),
        }
    }
}

/// A live capture: fixed-size windows of f32 samples at 16kHz mono.
///
/// Stopping (or dropping) the stream releases the underlying device. Stop is
/// idempotent.
pub struct CaptureStream {
    windows: ReceiverStream<Vec<f32>>,
    pump: Option<JoinHandle<()>>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
    released: bool,
}

impl CaptureStream {
    pub fn new(windows: mpsc::Receiver<Vec<f32>>) -> Self {
        Self {
            windows: ReceiverStream::new(windows),
            pump: None,
            on_release: None,
            released: false,
        }
    }

    /// Attach the task producing windows; it is aborted on stop.
    pub fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    /// Run `release` exactly once when the stream stops.
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(release));
        self
    }

    /// Next capture window, or `None` once the source has run dry.
    pub async fn next_window(&mut self) -> Option<Vec<f32>> {
        if self.released {
            return None;
        }
        self.windows.next().await
    }

    pub fn is_live(&self) -> bool {
        !self.released
    }

    pub fn stop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.windows.close();
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Something that can grant microphone access.
pub trait MicrophoneSource: Send + Sync {
    /// Acquire the device and start producing `window`-sample chunks.
    ///
    /// Denied or missing devices fail with [`SessionError::Permission`].
    fn open(&self, window: usize) -> Result<CaptureStream, SessionError>;

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Emits zero-filled windows, optionally stopping after a fixed count.
#[derive(Debug)]
pub struct SilenceMicrophone {
    windows: Option<usize>,
    interval: Option<Duration>,
    open_streams: Arc<AtomicUsize>,
}

impl SilenceMicrophone {
    /// `windows`: how many windows to emit before running dry (`None` = forever).
    pub fn new(windows: Option<usize>) -> Self {
        Self {
            windows,
            interval: None,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the real-time pacing between windows.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Captures currently holding the device.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

impl MicrophoneSource for SilenceMicrophone {
    fn open(&self, window: usize) -> Result<CaptureStream, SessionError> {
        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_DEPTH);
        let limit = self.windows;
        let interval = self.interval.unwrap_or_else(|| window_period(window));

        let pump = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut sent = 0usize;
            loop {
                ticker.tick().await;
                if limit.map_or(false, |n| sent >= n) {
                    break;
                }
                if tx.send(vec![0.0; window]).await.is_err() {
                    break;
                }
                sent += 1;
            }
        });

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let counter = self.open_streams.clone();
        Ok(CaptureStream::new(rx)
            .with_pump(pump)
            .on_release(move || {
                counter.fetch_sub(1, Ordering::SeqCst);
            }))
    }

    fn name(&self) -> &str {
        "silence"
    }
}

/// A microphone the user refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeniedMicrophone;

impl MicrophoneSource for DeniedMicrophone {
    fn open(&self, _window: usize) -> Result<CaptureStream, SessionError> {
        Err(SessionError::Permission("microphone access was denied".to_string()))
    }

    fn name(&self) -> &str {
        "denied"
    }
}

/// Replays a 16kHz mono 16-bit WAV file as if it were a microphone.
#[derive(Debug, Clone)]
pub struct WavMicrophone {
    path: PathBuf,
    interval: Option<Duration>,
}

impl WavMicrophone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

impl MicrophoneSource for WavMicrophone {
    fn open(&self, window: usize) -> Result<CaptureStream, SessionError> {
        let samples = read_wav_mono16(&self.path)?;
        let mut chunker = CaptureWindow::new(window);
        let mut windows = chunker.push(&samples);
        windows.extend(chunker.flush_padded());

        info!(
            path = %self.path.display(),
            samples = samples.len(),
            windows = windows.len(),
            "Opened WAV capture source"
        );

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_DEPTH);
        let interval = self.interval.unwrap_or_else(|| window_period(window));
        let pump = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for chunk in windows {
                ticker.tick().await;
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            debug!("WAV capture source exhausted");
        });

        Ok(CaptureStream::new(rx).with_pump(pump))
    }

    fn name(&self) -> &str {
        "wav"
    }
}

/// Read a 16kHz mono 16-bit PCM WAV file as normalized floats.
#[allow(deprecated)]
pub fn read_wav_mono16(path: &Path) -> Result<Vec<f32>, SessionError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => SessionError::Permission(format!(
            "cannot open capture source {}: {}",
            path.display(),
            e
        )),
        _ => SessionError::Device(format!("cannot open {}: {}", path.display(), e)),
    })?;

    let (header, data) = wav::read(&mut file)
        .map_err(|e| SessionError::Device(format!("cannot parse WAV {}: {}", path.display(), e)))?;

    if header.channel_count != 1 || header.sampling_rate != INPUT_SAMPLE_RATE {
        return Err(SessionError::Device(format!(
            "expected {}Hz mono, got {}Hz with {} channels",
            INPUT_SAMPLE_RATE, header.sampling_rate, header.channel_count
        )));
    }

    match data {
        wav::BitDepth::Sixteen(samples) => Ok(pcm_to_float(&samples)),
        _ => Err(SessionError::Device(format!(
            "expected 16-bit PCM, got {} bits",
            header.bits_per_sample
        ))),
    }
}

/// Write normalized mono floats as a 16-bit PCM WAV file.
#[allow(deprecated)]
pub fn write_wav_mono16(path: &Path, sample_rate: u32, samples: &[f32]) -> io::Result<()> {
    let header = wav::Header::new(WAV_FORMAT_PCM, 1, sample_rate, 16);
    let mut file = File::create(path)?;
    wav::write(header, &wav::BitDepth::Sixteen(float_to_pcm(samples)), &mut file)
}

/// The playback side of the audio graph.
pub trait AudioOutput: Send + Sync {
    /// Output clock in seconds. Monotonic.
    fn current_time(&self) -> f64;

    /// Begin playing `buffer` at clock time `at`.
    fn start(&self, id: BufferId, buffer: Arc<PlaybackBuffer>, at: f64);

    /// Stop a buffer now, whether it is pending or already playing.
    fn stop(&self, id: BufferId);

    /// Route captured input through a gain stage into the output graph.
    ///
    /// Sessions use gain 0.0: the graph stays warm without the user hearing
    /// themselves.
    fn monitor(&self, _samples: &[f32], _gain: f32) {}
}

/// One `start` call seen by [`MemoryOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartedBuffer {
    pub id: BufferId,
    pub at: f64,
    pub duration: f64,
    pub peak: f32,
}

#[derive(Debug, Default)]
struct MonitorLevel {
    windows: usize,
    peak: f32,
}

/// Output with a hand-driven clock that records everything it is asked to do.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    clock: Mutex<f64>,
    started: Mutex<Vec<StartedBuffer>>,
    stopped: Mutex<Vec<BufferId>>,
    monitor: Mutex<MonitorLevel>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, seconds: f64) {
        *self.clock.lock() = seconds;
    }

    pub fn advance(&self, seconds: f64) {
        *self.clock.lock() += seconds;
    }

    pub fn starts(&self) -> Vec<StartedBuffer> {
        self.started.lock().clone()
    }

    pub fn stops(&self) -> Vec<BufferId> {
        self.stopped.lock().clone()
    }

    /// Windows routed through the monitor tap.
    pub fn monitored_windows(&self) -> usize {
        self.monitor.lock().windows
    }

    /// Loudest sample that reached the output through the monitor tap.
    pub fn monitor_peak(&self) -> f32 {
        self.monitor.lock().peak
    }
}

impl AudioOutput for MemoryOutput {
    fn current_time(&self) -> f64 {
        *self.clock.lock()
    }

    fn start(&self, id: BufferId, buffer: Arc<PlaybackBuffer>, at: f64) {
        self.started.lock().push(StartedBuffer {
            id,
            at,
            duration: buffer.duration_seconds(),
            peak: buffer.peak(),
        });
    }

    fn stop(&self, id: BufferId) {
        self.stopped.lock().push(id);
    }

    fn monitor(&self, samples: &[f32], gain: f32) {
        let mut level = self.monitor.lock();
        level.windows += 1;
        level.peak = samples
            .iter()
            .fold(level.peak, |peak, s| peak.max((s * gain).abs()));
    }
}

struct RecordedBuffer {
    id: BufferId,
    buffer: Arc<PlaybackBuffer>,
    start: f64,
    stopped_at: Option<f64>,
}

/// Wall-clock output that keeps what was scheduled and renders the audible
/// result (honoring early stops) to a 24kHz mono WAV file.
pub struct WavRecorder {
    origin: Instant,
    sample_rate: u32,
    entries: Mutex<Vec<RecordedBuffer>>,
}

impl WavRecorder {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sample_rate: OUTPUT_SAMPLE_RATE,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Mix every buffer onto one mono timeline, cut at its stop time.
    pub fn render(&self) -> Vec<f32> {
        let rate = self.sample_rate as f64;
        let mut timeline: Vec<f32> = Vec::new();

        for entry in self.entries.lock().iter() {
            if entry.buffer.sample_rate() != self.sample_rate {
                warn!(
                    id = entry.id,
                    rate = entry.buffer.sample_rate(),
                    "Skipping buffer with unexpected sample rate"
                );
                continue;
            }

            let natural_end = entry.start + entry.buffer.duration_seconds();
            let played_until = entry.stopped_at.map_or(natural_end, |stop| stop.min(natural_end));
            if played_until <= entry.start {
                continue;
            }

            let frames = (((played_until - entry.start) * rate).round() as usize).min(entry.buffer.frames());
            let offset = (entry.start * rate).round() as usize;
            if timeline.len() < offset + frames {
                timeline.resize(offset + frames, 0.0);
            }

            let channels = entry.buffer.number_of_channels().max(1) as f32;
            for index in 0..entry.buffer.number_of_channels() {
                let plane = entry.buffer.channel(index);
                for (slot, sample) in timeline[offset..offset + frames].iter_mut().zip(plane) {
                    *slot += sample / channels;
                }
            }
        }

        timeline
    }

    /// Render and write to `path`. Returns the number of frames written.
    pub fn save(&self, path: &Path) -> Result<usize, SessionError> {
        let timeline = self.render();
        write_wav_mono16(path, self.sample_rate, &timeline)
            .map_err(|e| SessionError::Device(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(timeline.len())
    }
}

impl Default for WavRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for WavRecorder {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start(&self, id: BufferId, buffer: Arc<PlaybackBuffer>, at: f64) {
        self.entries.lock().push(RecordedBuffer {
            id,
            buffer,
            start: at,
            stopped_at: None,
        });
    }

    fn stop(&self, id: BufferId) {
        let now = self.current_time();
        if let Some(entry) = self.entries.lock().iter_mut().find(|e| e.id == id) {
            entry.stopped_at.get_or_insert(now);
        }
    }
}
