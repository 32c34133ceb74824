//! # Streaming Transport
//!
//! Owns the single bidirectional WebSocket connection to the remote speech
//! service for one speaking session.
//!
//! ## Connection Lifecycle:
//! 1. **Connecting**: socket opened, setup message sent, waiting for the
//!    service to acknowledge
//! 2. **Open**: setup acknowledged; an outbound task drains the frame queue
//!    and an inbound task parses server frames into [`LiveEvent`]s
//! 3. **Closed**: closed by us or by the remote side
//! 4. **Errored**: any transport-level failure; the session terminates and
//!    there is no automatic reconnect
//!
//! Frame submission is fire-and-forget: [`LiveTransport::send_frame`] only
//! enqueues and never fails visibly, so the capture path can never block on
//! the network.

use crate::audio::capture::AudioFrame;
use crate::live::messages::{
    build_audio_message, build_audio_stream_end_message, build_setup_message,
    parse_server_message, LiveEvent,
};
use anyhow::{anyhow, bail, Context, Result};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// Endpoint of the bidirectional generation service.
const LIVE_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// How long to wait for the service to acknowledge our setup message.
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection state of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Everything needed to open a live examiner session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
}

enum Outbound {
    Frame(AudioFrame),
    StreamEnd,
    Close,
}

/// Handle to one open streaming session.
///
/// Owned exclusively by the speaking session loop and closed when the screen
/// unmounts or the practice finishes.
pub struct LiveTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    state: Arc<RwLock<ConnectionState>>,
}

impl LiveTransport {
    /// Open the connection, send the setup message, and wait for the service
    /// to signal that the session is live.
    ///
    /// Inbound events are delivered on `events` until the connection closes
    /// or errors. Resolves only once the remote side has acknowledged setup.
    pub async fn connect(
        config: &LiveConfig,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> Result<Self> {
        if config.api_key.is_empty() {
            bail!("No API key configured for the speech service");
        }

        let url = format!("{}?key={}", LIVE_ENDPOINT, config.api_key);
        let (mut ws_stream, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .context("Failed to connect to the speech service")?;

        let setup = build_setup_message(&config.model, &config.voice, &config.system_instruction);
        let setup_json = serde_json::to_string(&setup)?;
        ws_stream
            .send(WsMessage::Text(setup_json))
            .await
            .context("Failed to send setup message")?;

        // The service sends JSON in both text and binary frames; wait for the
        // acknowledgement on the unsplit stream before streaming anything.
        let acknowledged = tokio::time::timeout(SETUP_TIMEOUT, async {
            while let Some(msg) = ws_stream.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) if text.contains("setupComplete") => return Ok(()),
                    Ok(WsMessage::Binary(data)) if data.first() == Some(&b'{') => {
                        if let Ok(text) = std::str::from_utf8(&data) {
                            if text.contains("setupComplete") {
                                return Ok(());
                            }
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        bail!("Connection closed during setup: {:?}", frame)
                    }
                    Ok(_) => {}
                    Err(e) => bail!("Transport error during setup: {}", e),
                }
            }
            bail!("Stream ended before setup completed")
        })
        .await;

        match acknowledged {
            Ok(Ok(())) => info!("Live session setup complete"),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow!("Timed out waiting for setup acknowledgement")),
        }

        let state = Arc::new(RwLock::new(ConnectionState::Open));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (ws_sink, ws_source) = ws_stream.split();

        tokio::spawn(outbound_loop(outbound_rx, ws_sink, state.clone(), events.clone()));
        tokio::spawn(inbound_loop(ws_source, events, state.clone()));

        Ok(Self {
            outbound: outbound_tx,
            state,
        })
    }

    /// Enqueue one microphone frame.
    ///
    /// Valid while the session is open; silently dropped once it is closed or
    /// errored. Never blocks and never fails.
    pub fn send_frame(&self, frame: AudioFrame) {
        if self.state() == ConnectionState::Open {
            let _ = self.outbound.send(Outbound::Frame(frame));
        }
    }

    /// Tell the service the microphone stopped so it flushes its tail.
    pub fn send_stream_end(&self) {
        if self.state() == ConnectionState::Open {
            let _ = self.outbound.send(Outbound::StreamEnd);
        }
    }

    /// Terminate the connection. Safe to call repeatedly, and safe to call on
    /// a connection that already failed.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }
}

/// Drains the frame queue onto the socket.
async fn outbound_loop(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut sink: impl Sink<WsMessage> + Unpin,
    state: Arc<RwLock<ConnectionState>>,
    events: mpsc::UnboundedSender<LiveEvent>,
) {
    while let Some(msg) = rx.recv().await {
        let frame = match msg {
            Outbound::Frame(frame) => match serde_json::to_string(&build_audio_message(&frame)) {
                Ok(json) => WsMessage::Text(json),
                Err(e) => {
                    error!("Failed to serialize audio frame: {}", e);
                    continue;
                }
            },
            Outbound::StreamEnd => {
                match serde_json::to_string(&build_audio_stream_end_message()) {
                    Ok(json) => WsMessage::Text(json),
                    Err(e) => {
                        error!("Failed to serialize stream-end message: {}", e);
                        continue;
                    }
                }
            }
            Outbound::Close => {
                let _ = sink.send(WsMessage::Close(None)).await;
                set_state(&state, ConnectionState::Closed);
                break;
            }
        };

        if sink.send(frame).await.is_err() {
            warn!("Outbound send failed, marking session errored");
            set_state(&state, ConnectionState::Errored);
            let _ = events.send(LiveEvent::Error("Failed to send audio to the service".to_string()));
            break;
        }
    }

    debug!("Outbound loop terminated");
}

/// Parses server frames and forwards their events to the session loop.
async fn inbound_loop(
    mut source: impl Stream<Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
    events: mpsc::UnboundedSender<LiveEvent>,
    state: Arc<RwLock<ConnectionState>>,
) {
    while let Some(msg) = source.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                for event in parse_server_message(&text) {
                    if events.send(event).is_err() {
                        debug!("Event receiver dropped, closing inbound loop");
                        return;
                    }
                }
            }
            Ok(WsMessage::Binary(data)) if data.first() == Some(&b'{') => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    for event in parse_server_message(text) {
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                }
            }
            Ok(WsMessage::Close(_)) => {
                set_state_if_open(&state, ConnectionState::Closed);
                let _ = events.send(LiveEvent::Closed);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Transport error: {}", e);
                set_state(&state, ConnectionState::Errored);
                let _ = events.send(LiveEvent::Error(e.to_string()));
                break;
            }
        }
    }

    set_state_if_open(&state, ConnectionState::Closed);
    debug!("Inbound loop terminated");
}

fn set_state(state: &Arc<RwLock<ConnectionState>>, next: ConnectionState) {
    *state.write().unwrap() = next;
}

/// Errored is terminal; a late close frame must not mask it.
fn set_state_if_open(state: &Arc<RwLock<ConnectionState>>, next: ConnectionState) {
    let mut guard = state.write().unwrap();
    if *guard == ConnectionState::Open || *guard == ConnectionState::Connecting {
        *guard = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_transport(initial: ConnectionState) -> (LiveTransport, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LiveTransport {
                outbound: tx,
                state: Arc::new(RwLock::new(initial)),
            },
            rx,
        )
    }

    #[test]
    fn test_send_frame_while_open_enqueues() {
        let (transport, mut rx) = detached_transport(ConnectionState::Open);
        transport.send_frame(AudioFrame {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        });
        assert!(matches!(rx.try_recv(), Ok(Outbound::Frame(_))));
    }

    #[test]
    fn test_send_frame_after_error_is_dropped_silently() {
        let (transport, mut rx) = detached_transport(ConnectionState::Errored);
        transport.send_frame(AudioFrame {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (transport, mut rx) = detached_transport(ConnectionState::Open);
        transport.close();
        transport.close();
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
        // A closed receiver must not make close() panic either
        drop(rx);
        transport.close();
    }

    #[test]
    fn test_errored_state_is_terminal() {
        let state = Arc::new(RwLock::new(ConnectionState::Errored));
        set_state_if_open(&state, ConnectionState::Closed);
        assert_eq!(*state.read().unwrap(), ConnectionState::Errored);
    }
}
