//! Session lifecycle: Idle → Connecting → Open → Idle.
//!
//! The controller owns every per-session resource (output clock, microphone,
//! remote handle) and is driven from a single thread: user intents,
//! remote events and playback-ended notices all arrive as method calls.
//! Events are tagged with the session they belong to; anything from a
//! session that is no longer active is ignored.

use crate::audio::clock::{ClockFactory, OutputClock, SourceId};
use crate::audio::input::AudioInput;
use crate::audio::playback::PlaybackScheduler;
use crate::codec::EncodedAudioChunk;
use crate::credential::CredentialStore;
use crate::defaults;
use crate::error::{ParleyError, Result};
use crate::remote::client::{ConnectRequest, RemoteConnector, RemoteSession, SessionSettings};
use crate::session::events::{RemoteEvent, SessionId, SessionState};
use crate::session::status;
use crate::session::transcript::{Speaker, Transcript};
use crate::shell::{ChatMessage, RenderProps};

/// Resources held for one session.
struct LiveSession {
    id: SessionId,
    scheduler: Option<PlaybackScheduler<Box<dyn OutputClock>>>,
    remote: Option<Box<dyn RemoteSession>>,
}

pub struct Controller {
    input: Box<dyn AudioInput>,
    connector: Box<dyn RemoteConnector>,
    clocks: Box<dyn ClockFactory>,
    credentials: Box<dyn CredentialStore>,
    settings: SessionSettings,
    state: SessionState,
    active: Option<LiveSession>,
    sessions_started: u64,
    transcript: Transcript,
    status: String,
}

impl Controller {
    pub fn new(
        input: Box<dyn AudioInput>,
        connector: Box<dyn RemoteConnector>,
        clocks: Box<dyn ClockFactory>,
        credentials: Box<dyn CredentialStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            input,
            connector,
            clocks,
            credentials,
            settings,
            state: SessionState::Idle,
            active: None,
            sessions_started: 0,
            transcript: Transcript::new(),
            status: status::READY.to_string(),
        }
    }

    /// Open a new session. Does nothing unless idle.
    ///
    /// # Errors
    /// Returns `ParleyError::MissingCredential` without touching any device
    /// when no API key is available. Device and connection failures release
    /// whatever was already acquired before returning the error.
    pub fn start(&mut self) -> Result<()> {
        self.start_with(|_| {})
    }

    /// Like [`start`](Self::start), but hands the Connecting view to
    /// `connecting` before any device is opened.
    pub fn start_with(&mut self, connecting: impl FnOnce(&RenderProps)) -> Result<()> {
        if self.state != SessionState::Idle {
            tracing::debug!(state = ?self.state, "start ignored, session already active");
            return Ok(());
        }

        let Some(api_key) = self.credentials.get() else {
            self.status = status::MISSING_KEY.to_string();
            return Err(ParleyError::MissingCredential);
        };

        self.sessions_started += 1;
        let id = SessionId(self.sessions_started);
        self.state = SessionState::Connecting;
        self.status = status::CONNECTING.to_string();
        self.active = Some(LiveSession {
            id,
            scheduler: None,
            remote: None,
        });
        tracing::info!(session = %id, model = %self.settings.model, "starting session");
        connecting(&self.render_props());

        if let Err(e) = self.open_session(id, api_key) {
            tracing::error!(session = %id, error = %e, "failed to start session");
            self.teardown();
            self.status = status::for_error(&e).to_string();
            return Err(e);
        }
        Ok(())
    }

    fn open_session(&mut self, id: SessionId, api_key: String) -> Result<()> {
        let clock = self.clocks.create(defaults::PLAYBACK_SAMPLE_RATE)?;
        // Upper bits carry the session so late ended-notices never match a newer source
        let scheduler = PlaybackScheduler::new(clock).with_id_base(id.0 << 32);
        if let Some(live) = self.active.as_mut() {
            live.scheduler = Some(scheduler);
        }

        self.input.acquire()?;

        let request = ConnectRequest {
            api_key,
            settings: self.settings.clone(),
        };
        let remote = self.connector.connect(id, &request)?;
        if let Some(live) = self.active.as_mut() {
            live.remote = Some(remote);
        }
        Ok(())
    }

    /// End the current session, if any.
    pub fn stop(&mut self) {
        if !self.state.is_active() {
            return;
        }
        tracing::info!(session = ?self.active_session(), "stopping session");
        self.teardown();
        self.status = status::STOPPED.to_string();
    }

    /// The record button: start when idle, stop otherwise.
    pub fn toggle(&mut self) {
        self.toggle_with(|_| {});
    }

    /// Like [`toggle`](Self::toggle), passing `connecting` on to
    /// [`start_with`](Self::start_with).
    pub fn toggle_with(&mut self, connecting: impl FnOnce(&RenderProps)) {
        match self.state {
            SessionState::Idle => {
                if let Err(e) = self.start_with(connecting) {
                    tracing::warn!(error = %e, "could not start session");
                }
            }
            SessionState::Connecting | SessionState::Open => self.stop(),
            SessionState::Closing => {}
        }
    }

    /// Apply one event reported by session `id`.
    pub fn handle_remote(&mut self, id: SessionId, event: RemoteEvent) {
        if self.active_session() != Some(id) {
            tracing::debug!(session = %id, "ignoring event from inactive session");
            return;
        }

        let connecting = self.state == SessionState::Connecting;
        let content = matches!(
            event,
            RemoteEvent::InputTranscript(_)
                | RemoteEvent::OutputTranscript(_)
                | RemoteEvent::Audio(_)
                | RemoteEvent::TurnComplete
                | RemoteEvent::Interrupted
        );
        if content && self.state != SessionState::Open {
            tracing::debug!(session = %id, state = ?self.state, "ignoring content before open");
            return;
        }

        match event {
            RemoteEvent::Opened => self.on_opened(id),
            RemoteEvent::InputTranscript(text) => self.transcript.append(Speaker::User, &text),
            RemoteEvent::OutputTranscript(text) => {
                self.transcript.append(Speaker::Assistant, &text)
            }
            RemoteEvent::Audio(chunk) => self.on_audio(id, &chunk),
            RemoteEvent::TurnComplete => self.transcript.close_open_turns(),
            RemoteEvent::Interrupted => {
                tracing::debug!(session = %id, "barge-in, flushing playback");
                if let Some(scheduler) = self.scheduler_mut() {
                    scheduler.interrupt();
                }
                self.transcript.close_open_turns();
            }
            RemoteEvent::GoAway { time_left } => {
                tracing::warn!(session = %id, time_left = ?time_left, "server will close the session soon");
            }
            RemoteEvent::Error(message) => {
                tracing::error!(session = %id, %message, "remote session failed");
                self.teardown();
                self.status = if connecting {
                    status::CONNECTION_FAILED
                } else {
                    status::FAILED
                }
                .to_string();
            }
            RemoteEvent::Closed { reason } => {
                let closed = if connecting {
                    ParleyError::Connection {
                        message: format!(
                            "closed during setup: {}",
                            reason.as_deref().unwrap_or("no reason given")
                        ),
                    }
                } else {
                    ParleyError::RemoteClosed { reason }
                };
                tracing::info!(session = %id, "{}", closed);
                self.teardown();
                self.status = status::for_error(&closed).to_string();
            }
        }
    }

    fn on_opened(&mut self, id: SessionId) {
        if self.state != SessionState::Connecting {
            return;
        }
        let Some(uplink) = self
            .active
            .as_ref()
            .and_then(|live| live.remote.as_ref())
            .map(|remote| remote.uplink())
        else {
            return;
        };

        if let Err(e) = self.input.start(uplink) {
            tracing::error!(session = %id, error = %e, "failed to start capture");
            self.teardown();
            self.status = status::for_error(&e).to_string();
            return;
        }
        self.state = SessionState::Open;
        self.status = status::LISTENING.to_string();
        tracing::info!(session = %id, "session open");
    }

    fn on_audio(&mut self, id: SessionId, chunk: &EncodedAudioChunk) {
        let Some(scheduler) = self.scheduler_mut() else {
            return;
        };
        match scheduler.enqueue(chunk) {
            Ok(source) => tracing::trace!(
                session = %id,
                start_at = source.start_at,
                duration = source.duration,
                "scheduled reply audio"
            ),
            Err(e) => tracing::warn!(session = %id, error = %e, "dropping reply audio chunk"),
        }
    }

    /// The output clock finished playing `source`.
    pub fn playback_ended(&mut self, source: SourceId) {
        if let Some(scheduler) = self.scheduler_mut() {
            scheduler.source_ended(source);
        }
    }

    /// Release everything the current session holds and return to idle.
    ///
    /// Every step is guarded, so this is safe to call at any point and any
    /// number of times.
    fn teardown(&mut self) {
        let Some(mut live) = self.active.take() else {
            self.state = SessionState::Idle;
            return;
        };
        self.state = SessionState::Closing;

        if let Some(scheduler) = live.scheduler.as_mut() {
            scheduler.interrupt();
        }
        self.input.stop();
        if let Some(mut scheduler) = live.scheduler.take() {
            scheduler.shutdown();
        }
        if let Some(mut remote) = live.remote.take()
            && !remote.is_closed()
        {
            remote.close();
        }
        self.transcript.close_open_turns();

        self.state = SessionState::Idle;
        tracing::debug!(session = %live.id, "session torn down");
    }

    fn scheduler_mut(&mut self) -> Option<&mut PlaybackScheduler<Box<dyn OutputClock>>> {
        self.active.as_mut().and_then(|live| live.scheduler.as_mut())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Id of the session currently holding resources.
    pub fn active_session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|live| live.id)
    }

    /// Sources scheduled on the current session's clock and not yet ended.
    pub fn live_sources(&self) -> usize {
        self.active
            .as_ref()
            .and_then(|live| live.scheduler.as_ref())
            .map_or(0, PlaybackScheduler::live_count)
    }

    /// View model for the shell.
    pub fn render_props(&self) -> RenderProps {
        RenderProps {
            messages: self
                .transcript
                .turns()
                .iter()
                .map(|turn| ChatMessage {
                    sender: turn.speaker,
                    text: turn.text.clone(),
                })
                .collect(),
            is_recording: self.state == SessionState::Open,
            status: self.status.clone(),
            disabled: self.state == SessionState::Closing,
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.teardown();
    }
}
