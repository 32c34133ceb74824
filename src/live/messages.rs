//! # Live Streaming Wire Format
//!
//! Typed messages for the bidirectional speech service connection.
//!
//! ## Protocol:
//! 1. Client opens the WebSocket and sends one `setup` message (model,
//!    examiner persona, AUDIO response modality, requested voice, and flags
//!    asking the service to transcribe both audio directions)
//! 2. Server acknowledges with `setupComplete`
//! 3. Client streams `realtimeInput` frames of base64 PCM16
//! 4. Server interleaves transcript fragments, inline audio chunks
//!    (base64 PCM16 at 24kHz mono) and `turnComplete` signals
//!
//! A single server frame can carry several of these at once, so parsing
//! returns a list of events.

use crate::audio::capture::AudioFrame;
use crate::audio::codec;
use serde::Serialize;

/// First message on the wire; everything the service needs to run a session.
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: SetupPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    /// Presence of the empty object enables candidate-speech transcription
    pub input_audio_transcription: TranscriptionConfig,
    /// Presence of the empty object enables examiner-speech transcription
    pub output_audio_transcription: TranscriptionConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Serialized as `{}`; the service treats presence as opt-in.
#[derive(Debug, Serialize)]
pub struct TranscriptionConfig {}

/// Outbound microphone frame wrapper.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
pub struct RealtimeInput {
    pub audio: AudioBlob,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioBlob {
    pub mime_type: String,
    pub data: String,
}

/// Signals that the microphone closed so the service flushes its tail.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStreamEndMessage {
    pub realtime_input: AudioStreamEndPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStreamEndPayload {
    pub audio_stream_end: bool,
}

/// Build the session setup message.
pub fn build_setup_message(
    model: &str,
    voice: &str,
    system_instruction: &str,
) -> SetupMessage {
    SetupMessage {
        setup: SetupPayload {
            model: format!("models/{}", model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                },
            },
            system_instruction: Some(SystemInstruction {
                parts: vec![TextPart {
                    text: system_instruction.to_string(),
                }],
            }),
            input_audio_transcription: TranscriptionConfig {},
            output_audio_transcription: TranscriptionConfig {},
        },
    }
}

/// Wrap a capture-pipeline frame for the wire.
pub fn build_audio_message(frame: &AudioFrame) -> RealtimeInputMessage {
    RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: AudioBlob {
                mime_type: frame.mime_type.clone(),
                data: frame.data.clone(),
            },
        },
    }
}

pub fn build_audio_stream_end_message() -> AudioStreamEndMessage {
    AudioStreamEndMessage {
        realtime_input: AudioStreamEndPayload {
            audio_stream_end: true,
        },
    }
}

// ── Server messages ────────────────────────────────────────────────

/// One parsed event from the server.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// Setup acknowledged - ready to stream
    SetupComplete,
    /// Decoded examiner audio chunk (raw PCM16 at the output rate)
    Audio(Vec<u8>),
    /// Transcript fragment of the candidate's speech
    InputTranscript(String),
    /// Transcript fragment of the examiner's speech
    OutputTranscript(String),
    /// The examiner finished a response turn
    TurnComplete,
    /// Transport-level or server-reported error
    Error(String),
    /// Connection closed by the remote side
    Closed,
}

/// Parse one server frame into its events.
///
/// Transcript fragments and audio chunks live under `serverContent`;
/// `setupComplete` and `error` are top-level. Unknown fields are ignored.
pub fn parse_server_message(json_text: &str) -> Vec<LiveEvent> {
    let mut events = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(e) => {
            events.push(LiveEvent::Error(format!("Malformed server message: {}", e)));
            return events;
        }
    };

    if value.get("setupComplete").is_some() {
        events.push(LiveEvent::SetupComplete);
    }

    if let Some(content) = value.get("serverContent") {
        if let Some(text) = content
            .pointer("/inputTranscription/text")
            .and_then(|v| v.as_str())
        {
            if !text.is_empty() {
                events.push(LiveEvent::InputTranscript(text.to_string()));
            }
        }

        if let Some(text) = content
            .pointer("/outputTranscription/text")
            .and_then(|v| v.as_str())
        {
            if !text.is_empty() {
                events.push(LiveEvent::OutputTranscript(text.to_string()));
            }
        }

        if let Some(parts) = content.pointer("/modelTurn/parts").and_then(|v| v.as_array()) {
            for part in parts {
                if let Some(data) = part.pointer("/inlineData/data").and_then(|v| v.as_str()) {
                    match codec::decode_base64(data) {
                        Ok(bytes) => events.push(LiveEvent::Audio(bytes)),
                        Err(e) => events.push(LiveEvent::Error(format!(
                            "Undecodable audio chunk: {}",
                            e
                        ))),
                    }
                }
            }
        }

        if content.get("turnComplete").and_then(|v| v.as_bool()) == Some(true) {
            events.push(LiveEvent::TurnComplete);
        }
    }

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown server error");
        events.push(LiveEvent::Error(message.to_string()));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_message_serialization() {
        let msg = build_setup_message("live-model", "Zephyr", "You are an examiner.");
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"model\":\"models/live-model\""));
        assert!(json.contains("\"responseModalities\":[\"AUDIO\"]"));
        assert!(json.contains("\"voiceName\":\"Zephyr\""));
        assert!(json.contains("\"systemInstruction\""));
        assert!(json.contains("\"inputAudioTranscription\":{}"));
        assert!(json.contains("\"outputAudioTranscription\":{}"));
    }

    #[test]
    fn test_audio_message_serialization() {
        let frame = AudioFrame {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        let json = serde_json::to_string(&build_audio_message(&frame)).unwrap();
        assert!(json.contains("\"realtimeInput\""));
        assert!(json.contains("\"mimeType\":\"audio/pcm;rate=16000\""));
        assert!(json.contains("\"data\":\"AAAA\""));
    }

    #[test]
    fn test_parse_setup_complete() {
        let events = parse_server_message(r#"{"setupComplete": {}}"#);
        assert!(matches!(events[0], LiveEvent::SetupComplete));
    }

    #[test]
    fn test_parse_mixed_server_content() {
        let json = r#"{
            "serverContent": {
                "inputTranscription": {"text": "Hel"},
                "outputTranscription": {"text": "Good"},
                "modelTurn": {"parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}}]},
                "turnComplete": true
            }
        }"#;
        let events = parse_server_message(json);

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], LiveEvent::InputTranscript(t) if t == "Hel"));
        assert!(matches!(&events[1], LiveEvent::OutputTranscript(t) if t == "Good"));
        assert!(matches!(&events[2], LiveEvent::Audio(bytes) if bytes.len() == 3));
        assert!(matches!(events[3], LiveEvent::TurnComplete));
    }

    #[test]
    fn test_parse_error_message() {
        let events = parse_server_message(r#"{"error": {"message": "quota exceeded"}}"#);
        assert!(matches!(&events[0], LiveEvent::Error(m) if m == "quota exceeded"));
    }

    #[test]
    fn test_parse_garbage_is_an_error_event() {
        let events = parse_server_message("not json at all");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], LiveEvent::Error(_)));
    }
}
