//! Status line texts shown by the shell.

use crate::error::ParleyError;

pub const READY: &str = "Press Enter to start talking";
pub const CONNECTING: &str = "Connecting...";
pub const LISTENING: &str = "Listening. Press Enter to stop";
pub const STOPPED: &str = "Stopped";
pub const ENDED: &str = "Session ended";
pub const MISSING_KEY: &str = "No API key. Run `parley key set` or export GEMINI_API_KEY";
pub const MIC_UNAVAILABLE: &str = "Microphone unavailable";
pub const SPEAKER_UNAVAILABLE: &str = "Speaker unavailable";
pub const CONNECTION_FAILED: &str = "Could not connect. Please try again";
pub const FAILED: &str = "Something went wrong. Please try again";

/// Status for a failure while starting a session.
pub fn for_error(error: &ParleyError) -> &'static str {
    match error {
        ParleyError::MissingCredential => MISSING_KEY,
        ParleyError::DeviceUnavailable { .. } => MIC_UNAVAILABLE,
        ParleyError::AudioOutput { .. } => SPEAKER_UNAVAILABLE,
        ParleyError::Connection { .. } => CONNECTION_FAILED,
        ParleyError::RemoteClosed { .. } => ENDED,
        _ => FAILED,
    }
}
