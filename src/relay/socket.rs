//! # Relay WebSocket Handler
//!
//! Each connection to `/live` becomes one `LiveRelaySocket` actor with its
//! own speech backend.
//!
//! ## Protocol:
//! 1. **init**: must be the first message; carries role, voice and the
//!    optional interview configuration
//! 2. **mic**: base64 16-bit PCM at 16kHz mono, validated and handed to the
//!    backend
//! 3. **audio / text**: backend replies, pushed as they are produced
//! 4. **error**: sent for anything the relay cannot accept; the connection
//!    stays open
//!
//! ## Heartbeat:
//! The actor pings on a fixed interval and stops when the client has been
//! silent for longer than the configured timeout.

use crate::audio::codec::{decode_audio_buffer, decode_base64, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE};
use crate::error::{AppError, AppResult};
use crate::protocol::{ClientMessage, MediaChunk, ServerMessage, SessionProfile};
use crate::relay::backend::SpeechBackend;
use crate::state::AppState;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct LiveRelaySocket {
    id: Uuid,
    state: web::Data<AppState>,
    backend: Box<dyn SpeechBackend>,
    profile: Option<SessionProfile>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    last_heartbeat: Instant,
    frames: u64,
}

impl LiveRelaySocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        let config = state.get_config();
        let backend = state.new_backend();
        Self {
            id: Uuid::new_v4(),
            state,
            backend,
            profile: None,
            heartbeat_interval: Duration::from_secs(config.performance.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(config.performance.client_timeout_secs),
            last_heartbeat: Instant::now(),
            frames: 0,
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Init(profile)) => self.handle_init(profile, ctx),
            Ok(ClientMessage::Mic { data }) => self.handle_mic(data, ctx),
            Err(err) => self.send_error(ctx, &format!("Invalid message: {}", err)),
        }
    }

    fn handle_init(&mut self, profile: SessionProfile, ctx: &mut ws::WebsocketContext<Self>) {
        if self.profile.is_some() {
            self.send_error(ctx, "Session is already initialised");
            return;
        }

        info!(
            session_id = %self.id,
            role = %profile.role,
            voice = %profile.voice_name,
            backend = self.backend.name(),
            has_instruction = profile.system_instruction.is_some(),
            "Relay session initialised"
        );

        let replies = self.backend.on_init(&profile);
        self.profile = Some(profile);
        self.send_all(ctx, replies);
    }

    fn handle_mic(&mut self, chunk: MediaChunk, ctx: &mut ws::WebsocketContext<Self>) {
        if self.profile.is_none() {
            self.send_error(ctx, "init must be the first message");
            return;
        }

        let mime = chunk.mime_type.replace(' ', "");
        if !mime.eq_ignore_ascii_case(INPUT_MIME_TYPE) {
            self.send_error(ctx, &format!("Unsupported audio format '{}'", chunk.mime_type));
            return;
        }

        let buffer = match decode_base64(&chunk.data).and_then(|bytes| decode_audio_buffer(&bytes, INPUT_SAMPLE_RATE, 1)) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.send_error(ctx, &format!("Undecodable audio: {}", err));
                return;
            }
        };

        self.frames += 1;
        self.state.record_frame_received();

        let replies = self.backend.on_audio(buffer.channel(0));
        self.send_all(ctx, replies);
    }

    fn send_all(&self, ctx: &mut ws::WebsocketContext<Self>, replies: Vec<ServerMessage>) {
        let mut sent = 0;
        for reply in replies {
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    ctx.text(json);
                    sent += 1;
                }
                Err(err) => error!(session_id = %self.id, "Failed to serialize reply: {}", err),
            }
        }
        self.state.record_frames_sent(sent);
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        warn!(session_id = %self.id, "Relay error: {}", message);
        self.send_all(
            ctx,
            vec![ServerMessage::Error {
                message: message.to_string(),
            }],
        );
    }
}

impl Actor for LiveRelaySocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.id, "Relay connection started");

        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(session_id = %act.id, "Relay heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.backend.on_close();
        self.state.release_session();
        info!(session_id = %self.id, frames = self.frames, "Relay connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for LiveRelaySocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();

        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(data)) => {
                debug!(session_id = %self.id, bytes = data.len(), "Rejecting binary frame");
                self.send_error(ctx, "Binary frames are not supported; send mic envelopes");
            }
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.id, "Client closed relay socket: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session_id = %self.id, "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// `GET /live`: upgrade to a relay socket, or 503 when the relay is full.
pub async fn live_socket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    debug!(peer = ?req.connection_info().peer_addr(), "Relay connection request");

    if !state.try_acquire_session() {
        let max = state.get_config().performance.max_concurrent_sessions;
        warn!(max_sessions = max, "Relay is full, refusing connection");
        return Err(AppError::Unavailable(format!(
            "Relay is at its limit of {} concurrent sessions",
            max
        )));
    }

    // The actor releases its slot when it stops; a failed handshake never
    // starts the actor.
    ws::start(LiveRelaySocket::new(state.clone()), &req, stream).map_err(|err| {
        state.release_session();
        AppError::from(err)
    })
}
