//! Session lifecycle states and the events a remote session reports.

use crate::codec::EncodedAudioChunk;
use std::fmt;
use std::sync::Arc;

/// Identifies one connection attempt. Increases with every `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
}

impl SessionState {
    /// Connecting or open: resources are held and `stop` has work to do.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// Something the remote session reported.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// The server acknowledged the setup message.
    Opened,
    /// Partial transcription of the user's speech.
    InputTranscript(String),
    /// Partial transcription of the model's reply.
    OutputTranscript(String),
    /// One chunk of reply audio (16-bit PCM, 24 kHz).
    Audio(EncodedAudioChunk),
    TurnComplete,
    /// The user barged in; queued reply audio must stop.
    Interrupted,
    /// The server will close the connection soon.
    GoAway { time_left: Option<String> },
    Error(String),
    Closed { reason: Option<String> },
}

/// Delivery of remote events back to the thread that owns the session.
pub type RemoteEventSink = Arc<dyn Fn(SessionId, RemoteEvent) + Send + Sync>;
