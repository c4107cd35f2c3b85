//! # Live Session Controller
//!
//! Owns one voice conversation end to end: microphone capture, the relay
//! socket, inbound decoding and playback scheduling.
//!
//! ## Task Layout:
//! - **Driver**: one task per session that `select!`s over inbound socket
//!   messages, capture windows and the cancel signal. Every session state
//!   change happens here, in arrival order, so the playback cursor advances
//!   in message order.
//! - **Writer**: owns the socket sink and drains the outbound queue. Capture
//!   never awaits the socket; when the queue is full the oldest waiting frame
//!   is discarded and counted.
//!
//! ## Teardown:
//! `disconnect()` signals the driver and waits for it, so once it returns no
//! frame is sent and no callback fires for that session.

use crate::audio::codec::{decode_inbound_audio, encode_pcm16};
use crate::audio::device::{AudioOutput, CaptureStream, MicrophoneSource};
use crate::audio::scheduler::PlaybackScheduler;
use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::protocol::{live_endpoint, ClientMessage, ServerMessage, SessionProfile};
use crate::session::events::SessionEvents;
use crate::session::outbound::{OutboundQueue, PushOutcome};
use crate::session::state::SessionStatus;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// How long teardown waits for queued frames and the close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Everything a session needs to know before it connects.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Relay WebSocket URL (`ws://…/live`)
    pub endpoint: String,
    pub profile: SessionProfile,
    pub capture_window: usize,
    pub outbound_queue_depth: usize,
    pub monitor_gain: f32,
}

impl SessionOptions {
    pub fn new(endpoint: impl Into<String>, profile: SessionProfile) -> Self {
        Self {
            endpoint: endpoint.into(),
            profile,
            capture_window: crate::audio::DEFAULT_CAPTURE_WINDOW,
            outbound_queue_depth: 16,
            monitor_gain: 0.0,
        }
    }

    pub fn from_config(client: &ClientConfig) -> Result<Self, SessionError> {
        Ok(Self {
            endpoint: live_endpoint(&client.api_base_url)?,
            profile: client.profile(),
            capture_window: client.capture_window,
            outbound_queue_depth: client.outbound_queue_depth,
            monitor_gain: client.monitor_gain,
        })
    }
}

/// Counters for the current (or last) session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_captured: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub buffers_scheduled: u64,
    pub decode_failures: u64,
}

struct Inner {
    status: SessionStatus,
    generation: u64,
    cancel: Option<watch::Sender<bool>>,
    driver: Option<JoinHandle<()>>,
}

struct Shared {
    options: SessionOptions,
    microphone: Arc<dyn MicrophoneSource>,
    output: Arc<dyn AudioOutput>,
    events: Arc<dyn SessionEvents>,
    inner: Mutex<Inner>,
    status: watch::Sender<SessionStatus>,
    scheduler: Mutex<PlaybackScheduler>,
    stats: Mutex<SessionStats>,
    teardown: tokio::sync::Mutex<()>,
}

impl Shared {
    fn set_status(&self, inner: &mut Inner, next: SessionStatus) {
        if inner.status == next {
            return;
        }
        if !inner.status.can_transition_to(next) {
            warn!(from = %inner.status, to = %next, "Unexpected session transition");
        }
        debug!(from = %inner.status, to = %next, "Session status change");
        inner.status = next;
        self.status.send_replace(next);
    }

    /// Return to `Idle` if `generation` is still the current session.
    fn finish(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.status == SessionStatus::Idle {
            return;
        }
        if inner.status == SessionStatus::Active {
            self.set_status(&mut inner, SessionStatus::Closing);
        }
        inner.cancel = None;
        self.set_status(&mut inner, SessionStatus::Idle);
    }

    fn is_active(&self) -> bool {
        self.inner.lock().status == SessionStatus::Active
    }

    fn handle_capture(&self, samples: &[f32], outbound: &OutboundQueue<Message>) {
        if !self.is_active() {
            return;
        }

        self.output.monitor(samples, self.options.monitor_gain);

        let envelope = ClientMessage::Mic {
            data: encode_pcm16(samples),
        };
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize microphone frame");
                return;
            }
        };

        let mut stats = self.stats.lock();
        stats.frames_captured += 1;
        match outbound.push(Message::Text(json)) {
            PushOutcome::Queued => {}
            PushOutcome::DisplacedOldest => {
                stats.frames_dropped += 1;
                debug!(dropped = stats.frames_dropped, "Outbound queue full, discarded oldest microphone frame");
            }
            PushOutcome::Closed => stats.frames_dropped += 1,
        }
    }

    fn handle_relay_message(&self, text: &str) {
        let message = match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                self.stats.lock().decode_failures += 1;
                warn!(error = %e, "Skipping unrecognised relay message");
                return;
            }
        };

        match message {
            ServerMessage::Audio { data } => match decode_inbound_audio(&data) {
                Ok(buffer) if buffer.is_empty() => debug!("Ignoring empty audio payload"),
                Ok(buffer) => {
                    let buffer = Arc::new(buffer);
                    let scheduled = self.scheduler.lock().schedule(buffer.clone(), self.output.as_ref());
                    self.stats.lock().buffers_scheduled += 1;
                    debug!(id = scheduled.id, start = scheduled.start, "Queued relay audio");
                    self.events.on_audio_data(&buffer);
                }
                Err(e) => {
                    self.stats.lock().decode_failures += 1;
                    warn!(error = %e, "Skipping undecodable audio payload");
                }
            },
            ServerMessage::Text { data } => self.events.on_text(&data),
            ServerMessage::Error { message } => {
                warn!(message = %message, "Relay reported an error");
                self.events.on_error(&SessionError::Protocol(message));
            }
        }
    }
}

/// Resets the session to `Idle` if `connect()` exits early, including when
/// the connect future itself is dropped.
struct ConnectGuard<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl ConnectGuard<'_> {
    fn finish_now(&mut self) {
        if self.armed {
            self.armed = false;
            self.shared.finish(self.generation);
        }
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.finish_now();
    }
}

enum Ending {
    Local,
    Peer,
    Failed(SessionError),
}

impl Ending {
    fn as_str(&self) -> &'static str {
        match self {
            Ending::Local => "local",
            Ending::Peer => "peer",
            Ending::Failed(_) => "error",
        }
    }
}

/// Handle to one live voice session. Clones share the same session, so one
/// task may `disconnect()` while another is still awaiting `connect()`.
///
/// ## Rust Concepts:
/// - **#[derive(Clone)]**: Cloning copies only the `Arc`, not the session
/// - **Arc<Shared>**: State shared between the handle, the driver task and the writer task
/// - **Arc<dyn Trait>**: Microphone, output and callbacks are swappable trait objects
/// - **watch::Sender**: Broadcasts every status change to subscribers
#[derive(Clone)]
pub struct LiveSession {
    shared: Arc<Shared>,
}

impl LiveSession {
    pub fn new(
        options: SessionOptions,
        microphone: Arc<dyn MicrophoneSource>,
        output: Arc<dyn AudioOutput>,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                options,
                microphone,
                output,
                events,
                inner: Mutex::new(Inner {
                    status: SessionStatus::Idle,
                    generation: 0,
                    cancel: None,
                    driver: None,
                }),
                status,
                scheduler: Mutex::new(PlaybackScheduler::new()),
                stats: Mutex::new(SessionStats::default()),
                teardown: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.inner.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Watch status changes (e.g. to drive UI state).
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        *self.shared.stats.lock()
    }

    /// Playback buffers still pending or playing.
    pub fn scheduled_buffers(&self) -> usize {
        let mut scheduler = self.shared.scheduler.lock();
        scheduler.reap(self.shared.output.current_time());
        scheduler.active_count()
    }

    /// Acquire the microphone, open the relay socket, send `init` and start
    /// streaming.
    ///
    /// ## What this function does:
    /// 1. **Claims the session** by moving `Idle` to `Connecting`
    /// 2. **Opens the microphone** before any network traffic
    /// 3. **Connects the socket**, racing the handshake against `disconnect()`
    /// 4. **Sends `init`** with the session profile
    /// 5. **Spawns the driver and writer tasks** and reports `Active`
    ///
    /// ## Errors:
    /// - `AlreadyActive` unless the session is idle
    /// - `Permission` if the microphone is refused; no socket is opened
    /// - `Transport` if the socket cannot open (error and close callbacks fire)
    /// - `Cancelled` if `disconnect()` ran first
    pub async fn connect(&self) -> Result<(), SessionError> {
        let shared = self.shared.as_ref();

        // Wait out any teardown still in progress.
        drop(shared.teardown.lock().await);

        let (generation, cancelled) = {
            let mut inner = shared.inner.lock();
            if inner.status != SessionStatus::Idle {
                return Err(SessionError::AlreadyActive);
            }
            inner.generation += 1;
            let (cancel_tx, cancel_rx) = watch::channel(false);
            inner.cancel = Some(cancel_tx);
            inner.driver = None;
            shared.set_status(&mut inner, SessionStatus::Connecting);
            (inner.generation, cancel_rx)
        };
        let mut guard = ConnectGuard {
            shared,
            generation,
            armed: true,
        };

        shared.scheduler.lock().reset();
        *shared.stats.lock() = SessionStats::default();

        let capture = shared.microphone.open(shared.options.capture_window).map_err(|e| {
            warn!(kind = e.kind(), microphone = shared.microphone.name(), "Microphone unavailable: {}", e);
            e
        })?;

        info!(
            endpoint = %shared.options.endpoint,
            microphone = shared.microphone.name(),
            "Microphone acquired, opening relay socket"
        );

        let mut cancel_watch = cancelled.clone();
        let ws = tokio::select! {
            result = connect_async(shared.options.endpoint.as_str()) => match result {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    let err = SessionError::from(e);
                    error!(endpoint = %shared.options.endpoint, "Relay connection failed: {}", err);
                    drop(capture);
                    shared.events.on_error(&err);
                    shared.events.on_close();
                    guard.finish_now();
                    return Err(err);
                }
            },
            _ = cancel_watch.changed() => {
                info!("Connect cancelled before the relay socket opened");
                return Err(SessionError::Cancelled);
            }
        };

        let (mut sink, source) = ws.split();

        let init = ClientMessage::Init(shared.options.profile.clone());
        let sent = match serde_json::to_string(&init) {
            Ok(json) => sink.send(Message::Text(json)).await.map_err(SessionError::from),
            Err(e) => Err(SessionError::from(e)),
        };
        if let Err(err) = sent {
            error!("Failed to send init envelope: {}", err);
            drop(capture);
            let _ = sink.close().await;
            shared.events.on_error(&err);
            shared.events.on_close();
            guard.finish_now();
            return Err(err);
        }

        let mut pending = Some((sink, capture, cancelled));
        let promoted = {
            let mut inner = shared.inner.lock();
            let still_connecting = inner.generation == generation && inner.status == SessionStatus::Connecting;
            if still_connecting {
                if let Some((sink, capture, cancelled)) = pending.take() {
                    let outbound = Arc::new(OutboundQueue::new(shared.options.outbound_queue_depth));
                    let writer = tokio::spawn(run_writer(self.shared.clone(), sink, outbound.clone()));
                    let driver = tokio::spawn(run_driver(
                        self.shared.clone(),
                        generation,
                        source,
                        outbound,
                        writer,
                        capture,
                        cancelled,
                    ));
                    inner.driver = Some(driver);
                    shared.set_status(&mut inner, SessionStatus::Active);
                }
            }
            still_connecting
        };

        if !promoted {
            info!("Disconnect arrived while the init envelope was in flight");
            if let Some((mut sink, capture, _)) = pending.take() {
                drop(capture);
                let _ = sink.close().await;
            }
            shared.events.on_close();
            guard.finish_now();
            return Err(SessionError::Cancelled);
        }

        guard.armed = false;
        info!(
            role = %shared.options.profile.role,
            voice = %shared.options.profile.voice_name,
            "Live session active"
        );
        Ok(())
    }

    /// Tear the session down. Safe to call repeatedly, from any state.
    ///
    /// On return the microphone is released, the socket is closed, every
    /// scheduled buffer has been stopped and no further callbacks will fire.
    pub async fn disconnect(&self) {
        let shared = self.shared.as_ref();
        let _serial = shared.teardown.lock().await;

        let driver = {
            let mut inner = shared.inner.lock();
            if inner.status.is_engaged() {
                shared.set_status(&mut inner, SessionStatus::Closing);
            }
            if let Some(cancel) = inner.cancel.take() {
                let _ = cancel.send(true);
            }
            inner.driver.take()
        };

        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                if e.is_panic() {
                    error!("Session driver panicked during teardown");
                }
            }
        }

        // A pending connect() releases what it holds and reports Idle itself.
        let mut status = shared.status.subscribe();
        let _ = status.wait_for(|s| *s == SessionStatus::Idle).await;

        let stopped = shared.scheduler.lock().stop_all(shared.output.as_ref());
        if stopped > 0 {
            debug!(stopped, "Stopped pending playback");
        }
        debug!("Disconnect complete");
    }
}

async fn run_writer(shared: Arc<Shared>, mut sink: WsSink, outbound: Arc<OutboundQueue<Message>>) {
    while let Some(message) = outbound.pop().await {
        if let Err(e) = sink.send(message).await {
            warn!(error = %e, "Relay socket stopped accepting frames");
            outbound.close();
            break;
        }
        shared.stats.lock().frames_sent += 1;
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "Socket close handshake did not complete");
    }
}

async fn run_driver(
    shared: Arc<Shared>,
    generation: u64,
    mut source: WsSource,
    outbound: Arc<OutboundQueue<Message>>,
    mut writer: JoinHandle<()>,
    mut capture: CaptureStream,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut capturing = true;

    let ending = loop {
        tokio::select! {
            biased;

            _ = cancelled.changed() => break Ending::Local,

            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => shared.handle_relay_message(&text),
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = data.len(), "Ignoring binary frame from relay");
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Relay closed the socket");
                    break Ending::Peer;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Ending::Failed(SessionError::from(e)),
                None => break Ending::Peer,
            },

            window = capture.next_window(), if capturing => match window {
                Some(samples) => shared.handle_capture(&samples, &outbound),
                None => {
                    capturing = false;
                    debug!("Capture source ran dry");
                }
            },
        }
    };

    if let Ending::Failed(err) = &ending {
        error!(kind = err.kind(), "Live session transport failed: {}", err);
        shared.events.on_error(err);
    }

    capture.stop();
    outbound.close();
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        warn!("Relay writer did not finish in time, aborting");
        writer.abort();
    }

    let stopped = shared.scheduler.lock().stop_all(shared.output.as_ref());

    let stats = *shared.stats.lock();
    info!(
        reason = ending.as_str(),
        stopped_buffers = stopped,
        frames_sent = stats.frames_sent,
        frames_dropped = stats.frames_dropped,
        buffers_scheduled = stats.buffers_scheduled,
        "Live session closed"
    );

    // on_close precedes Idle: nothing from this session fires once a
    // status watcher has seen Idle.
    shared.events.on_close();
    shared.finish(generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::{DeniedMicrophone, MemoryOutput, SilenceMicrophone};
    use crate::session::events::NoopEvents;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEvents {
        errors: AtomicUsize,
        closes: AtomicUsize,
    }

    impl SessionEvents for CountingEvents {
        fn on_error(&self, _error: &SessionError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn options(endpoint: &str) -> SessionOptions {
        SessionOptions::new(endpoint, SessionProfile::new("interviewer", "Puck"))
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let mic = Arc::new(SilenceMicrophone::new(None));
        let session = LiveSession::new(
            options("ws://127.0.0.1:9/live"),
            mic.clone(),
            Arc::new(MemoryOutput::new()),
            Arc::new(NoopEvents),
        );

        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(mic.open_streams(), 0);
        assert_eq!(session.scheduled_buffers(), 0);
    }

    #[tokio::test]
    async fn test_denied_microphone_fails_before_socket() {
        let events = Arc::new(CountingEvents::default());
        let session = LiveSession::new(
            options("ws://127.0.0.1:9/live"),
            Arc::new(DeniedMicrophone),
            Arc::new(MemoryOutput::new()),
            events.clone(),
        );

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Permission(_)));
        assert_eq!(session.status(), SessionStatus::Idle);
        // No socket was attempted, so no transport callbacks
        assert_eq!(events.errors.load(Ordering::SeqCst), 0);
        assert_eq!(events.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refused_connection_releases_microphone() {
        // Bind then drop a listener to get a port nobody is serving
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mic = Arc::new(SilenceMicrophone::new(None));
        let events = Arc::new(CountingEvents::default());
        let session = LiveSession::new(
            options(&format!("ws://127.0.0.1:{}/live", port)),
            mic.clone(),
            Arc::new(MemoryOutput::new()),
            events.clone(),
        );

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(mic.open_streams(), 0);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(events.errors.load(Ordering::SeqCst), 1);
        assert_eq!(events.closes.load(Ordering::SeqCst), 1);

        // A failed connect leaves the session reusable
        assert!(matches!(session.connect().await, Err(SessionError::Transport(_))));
    }

    #[test]
    fn test_options_from_config() {
        let config = crate::config::AppConfig::default();
        let options = SessionOptions::from_config(&config.client).unwrap();
        assert_eq!(options.endpoint, "ws://127.0.0.1:3001/live");
        assert_eq!(options.capture_window, 4096);
        assert_eq!(options.profile.voice_name, "Puck");
    }
}
