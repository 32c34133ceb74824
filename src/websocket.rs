//! # Speaking Session WebSocket
//!
//! The speaking screen's controller seam. The browser connects to
//! `/ws/speaking`, sends one JSON `start` message, then streams binary
//! microphone sample blocks; the server answers with status changes,
//! transcript entries, scheduled examiner audio, and finally the graded
//! report.
//!
//! ## Protocol:
//! - **Client → Server** (text): `{"type": "start", "topic": ..., "level": ...,
//!   "duration_secs": ..., "sample_rate": ...}`, `{"type": "finish"}`,
//!   `{"type": "mic_denied"}`
//! - **Client → Server** (binary): mono little-endian f32 samples at the
//!   declared device rate
//! - **Server → Client** (text): `status`, `transcript`, `audio` (base64 WAV
//!   plus its slot on the output timeline), `report`, `error`
//!
//! The actor owns nothing but channel ends: the session itself runs on its
//! own task (`live::session::run_session`) and dies with the connection.

use crate::audio::codec;
use crate::error::AppError;
use crate::live::session::{
    run_session, SessionCommand, SessionEvent, SpeakingSessionConfig,
};
use crate::live::transport::LiveConfig;
use crate::practice::speaking;
use crate::practice::types::{SpeakingSessionRecord, TranscriptEntry};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// How often we ping the client, and how long silence means it's gone.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Messages the client sends as JSON text frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin the practice session
    Start {
        topic: String,
        /// Target band score (1-9); server default when absent
        level: Option<u8>,
        /// Practice duration; server default when absent
        duration_secs: Option<u64>,
        /// Sample rate of the microphone stream the client will send
        sample_rate: u32,
    },
    /// Finish now and grade the transcript (the timer does this server-side
    /// as well; whichever fires first wins)
    Finish,
    /// The browser could not acquire the microphone
    MicDenied,
}

/// Messages the server sends as JSON text frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        status: String,
    },
    Transcript {
        entry: TranscriptEntry,
    },
    /// One scheduled chunk of examiner speech, ready to play
    Audio {
        /// Arrival-order sequence number
        sequence: u64,
        /// Base64-encoded WAV the audio element can decode directly
        data: String,
        /// Start slot on the shared output timeline (seconds)
        start_time: f64,
        /// Chunk duration (seconds)
        duration: f64,
    },
    Report {
        record: SpeakingSessionRecord,
    },
    Error {
        message: String,
    },
}

/// WebSocket actor for one speaking-practice connection.
pub struct SpeakingWebSocket {
    app_state: web::Data<AppState>,

    /// Command channel into the running session; None until `start` arrives
    commands: Option<mpsc::UnboundedSender<SessionCommand>>,

    last_heartbeat: Instant,
}

impl SpeakingWebSocket {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        Self {
            app_state,
            commands: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn send_server_message(&self, ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            ctx.text(json);
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        warn!("Speaking socket error: {}", message);
        self.send_server_message(
            ctx,
            &ServerMessage::Error {
                message: message.to_string(),
            },
        );
    }

    /// Spin up the session task and wire its events back into this actor.
    fn handle_start(
        &mut self,
        ctx: &mut ws::WebsocketContext<Self>,
        topic: String,
        level: Option<u8>,
        duration_secs: Option<u64>,
        sample_rate: u32,
    ) {
        if self.commands.is_some() {
            self.send_error(ctx, "Session already started");
            return;
        }
        if topic.trim().is_empty() {
            self.send_error(ctx, "Topic cannot be empty");
            return;
        }
        if sample_rate == 0 {
            self.send_error(ctx, "Sample rate cannot be zero");
            return;
        }

        let config = self.app_state.get_config();

        let metrics = self.app_state.get_metrics_snapshot();
        if metrics.active_sessions as usize >= config.performance.max_concurrent_sessions {
            self.send_error(ctx, "Maximum concurrent sessions reached");
            return;
        }

        let level = level.unwrap_or(config.speaking.default_level);
        let duration_secs = duration_secs.unwrap_or(config.speaking.default_duration_secs);
        if level == 0 || level > 9 {
            self.send_error(ctx, "Target band must be between 1 and 9");
            return;
        }

        let session_config = SpeakingSessionConfig {
            level,
            duration_secs,
            topic: topic.clone(),
            device_sample_rate: sample_rate,
        };
        let live_config = LiveConfig {
            api_key: config.gemini.api_key.clone(),
            model: config.gemini.live_model.clone(),
            voice: config.gemini.voice.clone(),
            system_instruction: speaking::examiner_instruction(level, duration_secs, &topic),
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_session(
            session_config,
            live_config,
            config.audio.clone(),
            self.app_state.gemini.clone(),
            self.app_state.stores.speaking.clone(),
            command_rx,
            event_tx,
        ));

        self.commands = Some(command_tx);
        self.app_state.increment_active_sessions();
        ctx.add_stream(UnboundedReceiverStream::new(event_rx));

        info!(level, duration_secs, "Speaking session started");
    }

    /// Binary frames carry mono little-endian f32 samples.
    fn handle_samples(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let commands = match &self.commands {
            Some(commands) => commands,
            None => {
                self.send_error(ctx, "Session not started. Send a start message first.");
                return;
            }
        };

        if data.len() % 4 != 0 {
            self.send_error(ctx, "Audio payload length must be a multiple of 4 bytes");
            return;
        }

        let samples: Vec<f32> = data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let _ = commands.send(SessionCommand::Samples(samples));
    }
}

impl Actor for SpeakingWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Speaking WebSocket connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("Speaking WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    /// Unmount: tear the session down even if the client vanished mid-turn.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(SessionCommand::Close);
            self.app_state.decrement_active_sessions();
        }
        info!("Speaking WebSocket connection stopped");
    }
}

/// Frames from the browser.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SpeakingWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Start {
                    topic,
                    level,
                    duration_secs,
                    sample_rate,
                }) => {
                    self.handle_start(ctx, topic, level, duration_secs, sample_rate);
                }
                Ok(ClientMessage::Finish) => match &self.commands {
                    Some(commands) => {
                        let _ = commands.send(SessionCommand::Finish);
                    }
                    None => self.send_error(ctx, "No session to finish"),
                },
                Ok(ClientMessage::MicDenied) => {
                    let err = AppError::PermissionError("Microphone access denied".to_string());
                    self.send_error(ctx, &err.to_string());
                    ctx.stop();
                }
                Err(err) => {
                    self.send_error(ctx, &format!("Invalid JSON: {}", err));
                }
            },
            Ok(ws::Message::Binary(data)) => {
                self.handle_samples(&data, ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Speaking WebSocket closed: {:?}", reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(err) => {
                warn!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// Events from the running session, forwarded to the client.
impl StreamHandler<SessionEvent> for SpeakingWebSocket {
    fn handle(&mut self, event: SessionEvent, ctx: &mut Self::Context) {
        let config = self.app_state.get_config();
        let msg = match event {
            SessionEvent::Status(status) => ServerMessage::Status {
                status: status.as_str().to_string(),
            },
            SessionEvent::Transcript(entry) => ServerMessage::Transcript { entry },
            SessionEvent::Audio(chunk) => {
                let pcm = codec::float_to_pcm16(&chunk.samples);
                let wav = codec::pcm_to_wav(&pcm, config.audio.output_sample_rate, 1, 16);
                ServerMessage::Audio {
                    sequence: chunk.sequence,
                    data: codec::encode_base64(&wav),
                    start_time: chunk.start_time,
                    duration: chunk.duration,
                }
            }
            SessionEvent::Report(record) => ServerMessage::Report { record },
            SessionEvent::Error(message) => ServerMessage::Error { message },
        };
        self.send_server_message(ctx, &msg);
    }

    /// The session task ended; nothing more will flow in either direction.
    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!("Session event stream ended");
        ctx.stop();
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to the actor.
pub async fn speaking_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "New speaking WebSocket connection from: {:?}",
        req.connection_info().peer_addr()
    );

    ws::start(SpeakingWebSocket::new(app_state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_deserialization() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "start", "topic": "Describe a journey", "level": 7, "duration_secs": 300, "sample_rate": 48000}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Start {
                topic,
                level,
                duration_secs,
                sample_rate,
            } => {
                assert_eq!(topic, "Describe a journey");
                assert_eq!(level, Some(7));
                assert_eq!(duration_secs, Some(300));
                assert_eq!(sample_rate, 48_000);
            }
            _ => panic!("Wrong message type"),
        }

        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type": "finish"}"#).unwrap(),
            ClientMessage::Finish
        ));
    }

    #[test]
    fn test_server_message_serialization() {
        let json = serde_json::to_string(&ServerMessage::Status {
            status: "listening".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("\"status\":\"listening\""));

        let json = serde_json::to_string(&ServerMessage::Audio {
            sequence: 3,
            data: "UklGRg==".to_string(),
            start_time: 1.5,
            duration: 0.25,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"audio\""));
        assert!(json.contains("\"start_time\":1.5"));
    }
}
