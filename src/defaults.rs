//! Default configuration constants for parley.
//!
//! Shared by the config layer, the audio pipeline and the session so the
//! fixed wire formats live in one place.

/// Microphone capture rate in Hz. Gemini Live expects 16 kHz PCM input.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Playback rate in Hz for model audio replies.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Samples per captured frame. Each full frame becomes one uploaded chunk
/// (256ms at 16 kHz).
pub const CAPTURE_FRAME_SIZE: usize = 4096;

/// Quantization scale between `f32` samples and 16-bit PCM, both directions.
pub const PCM16_SCALE: f32 = 32768.0;

/// MIME descriptor attached to outbound audio chunks.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Assumed format of reply audio that arrives without a MIME type.
pub const PLAYBACK_MIME_TYPE: &str = "audio/pcm;rate=24000";

/// Default Gemini Live model with native audio output.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice for synthesized replies.
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Default system persona sent in the session setup.
pub const DEFAULT_PERSONA: &str = "You are a friendly, helpful voice assistant. \
Answer in the language the user speaks, keep replies short and conversational, \
and never read out markdown or lists.";

/// Bidirectional streaming endpoint for the Live API.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Fixed key under which the API key is persisted.
pub const CREDENTIAL_KEY: &str = "gemini_api_key";

/// Environment variable that overrides the stored API key.
pub const CREDENTIAL_ENV: &str = "GEMINI_API_KEY";

/// Application directory name under the XDG config/data roots.
pub const APP_DIR: &str = "parley";
