//! JSON message protocol for the Live API WebSocket.
//!
//! Client frames are `setup` (once, first) and `realtimeInput`. Server frames
//! are decoded into `RemoteEvent`s in the order the session should apply them.

use crate::codec::EncodedAudioChunk;
use crate::defaults;
use crate::error::{ParleyError, Result};
use crate::remote::client::SessionSettings;
use crate::session::events::RemoteEvent;
use serde::{Deserialize, Serialize};

const RESPONSE_MODALITY_AUDIO: &str = "AUDIO";

// Client messages

#[derive(Debug, Serialize)]
struct SetupMessage<'a> {
    setup: Setup<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: String,
    generation_config: GenerationConfig<'a>,
    system_instruction: Content<'a>,
    input_audio_transcription: Empty,
    output_audio_transcription: Empty,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Serialize)]
struct Empty {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage<'a> {
    realtime_input: RealtimeInput<'a>,
}

#[derive(Debug, Serialize)]
struct RealtimeInput<'a> {
    audio: Blob<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    data: &'a str,
    mime_type: &'a str,
}

/// Qualify a bare model name with the `models/` resource prefix.
pub fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

/// Serialize the setup frame: audio replies in the configured voice,
/// the persona as system instruction, transcription in both directions.
pub fn setup_message(settings: &SessionSettings) -> Result<String> {
    let message = SetupMessage {
        setup: Setup {
            model: model_resource(&settings.model),
            generation_config: GenerationConfig {
                response_modalities: [RESPONSE_MODALITY_AUDIO],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &settings.voice,
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: [TextPart {
                    text: &settings.persona,
                }],
            },
            input_audio_transcription: Empty::default(),
            output_audio_transcription: Empty::default(),
        },
    };
    Ok(serde_json::to_string(&message)?)
}

/// Serialize one captured chunk as a `realtimeInput` frame.
pub fn realtime_input_message(chunk: &EncodedAudioChunk) -> Result<String> {
    let message = RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: Blob {
                data: &chunk.data,
                mime_type: &chunk.mime_type,
            },
        },
    };
    Ok(serde_json::to_string(&message)?)
}

// Server messages

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    data: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoAway {
    time_left: Option<String>,
}

fn decode_error(e: serde_json::Error) -> ParleyError {
    ParleyError::Decode {
        message: format!("invalid server message: {}", e),
    }
}

/// Decode a text frame from the server.
///
/// Within one `serverContent`, events come out as: interrupted, input
/// transcript, output transcript, audio parts, turn complete. Frames with
/// nothing the session cares about yield no events.
pub fn parse_server_message(text: &str) -> Result<Vec<RemoteEvent>> {
    let message: ServerMessage = serde_json::from_str(text).map_err(decode_error)?;
    Ok(message.into_events())
}

/// Decode a binary frame; the server sends the same JSON in either form.
pub fn parse_server_frame(bytes: &[u8]) -> Result<Vec<RemoteEvent>> {
    let message: ServerMessage = serde_json::from_slice(bytes).map_err(decode_error)?;
    Ok(message.into_events())
}

impl ServerMessage {
    fn into_events(self) -> Vec<RemoteEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(RemoteEvent::Opened);
        }

        if let Some(content) = self.server_content {
            if content.interrupted {
                events.push(RemoteEvent::Interrupted);
            }
            if let Some(text) = content.input_transcription.and_then(|t| t.text) {
                events.push(RemoteEvent::InputTranscript(text));
            }
            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                events.push(RemoteEvent::OutputTranscript(text));
            }
            if let Some(turn) = content.model_turn {
                for inline in turn.parts.into_iter().filter_map(|p| p.inline_data) {
                    let mime_type = inline
                        .mime_type
                        .unwrap_or_else(|| defaults::PLAYBACK_MIME_TYPE.to_string());
                    events.push(RemoteEvent::Audio(EncodedAudioChunk::new(
                        inline.data,
                        mime_type,
                    )));
                }
            }
            if content.turn_complete {
                events.push(RemoteEvent::TurnComplete);
            }
        }

        if let Some(go_away) = self.go_away {
            events.push(RemoteEvent::GoAway {
                time_left: go_away.time_left,
            });
        }

        events
    }
}
