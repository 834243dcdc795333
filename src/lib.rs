//! parley - Realtime voice chat with Gemini Live
//!
//! Streams microphone audio to a speech-to-speech model, plays the spoken
//! replies back gaplessly and assembles a live transcript.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod config;
pub mod credential;
pub mod defaults;
pub mod error;
pub mod remote;
pub mod session;
pub mod shell;
pub mod telemetry;

// Core seams (capture → remote → playback)
pub use audio::clock::{ClockFactory, OutputClock};
pub use audio::input::{AudioInput, ChunkSink};
pub use credential::CredentialStore;
pub use remote::client::{RemoteConnector, RemoteSession};

// Session
pub use session::controller::Controller;
pub use session::events::{RemoteEvent, SessionId, SessionState};

// Error handling
pub use error::{ParleyError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
