//! Remote session transport.
//!
//! `LiveConnector` opens a WebSocket per session on the tokio runtime. The
//! connection task owns both halves of the socket: it writes queued uplink
//! frames in FIFO order and turns every server frame into `RemoteEvent`s
//! delivered through the event sink, tagged with the session id.

use crate::audio::input::ChunkSink;
use crate::codec::EncodedAudioChunk;
use crate::defaults;
use crate::error::{ParleyError, Result};
use crate::remote::protocol::{
    parse_server_frame, parse_server_message, realtime_input_message, setup_message,
};
use crate::session::events::{RemoteEvent, RemoteEventSink, SessionId};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// How long a closing connection may take to finish its close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// How long the server has to answer the setup frame with `setupComplete`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// What a session asks the model for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub model: String,
    pub voice: String,
    pub persona: String,
    pub endpoint: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            persona: defaults::DEFAULT_PERSONA.to_string(),
            endpoint: defaults::DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub api_key: String,
    pub settings: SessionSettings,
}

// Keep the key out of logs.
impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("api_key", &"<redacted>")
            .field("settings", &self.settings)
            .finish()
    }
}

/// Opens remote sessions.
pub trait RemoteConnector: Send {
    /// Begin connecting. Returns immediately; the outcome arrives as
    /// `RemoteEvent::Opened` or `RemoteEvent::Error` for `id`.
    ///
    /// # Errors
    /// Returns `ParleyError::Connection` if the attempt cannot even be started
    fn connect(&mut self, id: SessionId, request: &ConnectRequest)
    -> Result<Box<dyn RemoteSession>>;
}

/// Handle to one outstanding remote connection.
pub trait RemoteSession: Send {
    /// A sink that uploads captured chunks in the order it receives them.
    fn uplink(&self) -> Box<dyn ChunkSink>;

    /// Close the connection without waiting for acknowledgment. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

enum Outbound {
    Frame(String),
    Close,
}

/// Uplink side of a live connection, usable from the audio thread.
struct Uplink {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChunkSink for Uplink {
    fn send(&mut self, chunk: EncodedAudioChunk) {
        match realtime_input_message(&chunk) {
            Ok(frame) => {
                // A closed connection drops the frame.
                let _ = self.outbound.send(Outbound::Frame(frame));
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode realtime input"),
        }
    }
}

/// Connector for the Live API over tokio-tungstenite.
pub struct LiveConnector {
    events: RemoteEventSink,
    handshake_timeout: Duration,
}

impl LiveConnector {
    pub fn new(events: RemoteEventSink) -> Self {
        Self {
            events,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    /// Bound on connecting plus waiting for `setupComplete`.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

fn build_request(
    endpoint: &str,
    api_key: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = endpoint
        .into_client_request()
        .map_err(|e| ParleyError::Connection {
            message: format!("invalid endpoint {}: {}", endpoint, e),
        })?;
    let key = HeaderValue::from_str(api_key).map_err(|_| ParleyError::Connection {
        message: "API key contains invalid header characters".to_string(),
    })?;
    request.headers_mut().insert(API_KEY_HEADER, key);
    Ok(request)
}

impl RemoteConnector for LiveConnector {
    fn connect(
        &mut self,
        id: SessionId,
        request: &ConnectRequest,
    ) -> Result<Box<dyn RemoteSession>> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| ParleyError::Connection {
                message: format!("no async runtime: {}", e),
            })?;
        let ws_request = build_request(&request.settings.endpoint, &request.api_key)?;
        let setup = setup_message(&request.settings)?;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(run_connection(
            id,
            ws_request,
            setup,
            self.handshake_timeout,
            outbound_rx,
            Arc::clone(&self.events),
        ));
        tracing::info!(session = %id, endpoint = %request.settings.endpoint, "connecting");

        Ok(Box::new(LiveSession {
            outbound,
            task: Some(task),
        }))
    }
}

struct LiveSession {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

impl RemoteSession for LiveSession {
    fn uplink(&self) -> Box<dyn ChunkSink> {
        Box::new(Uplink {
            outbound: self.outbound.clone(),
        })
    }

    fn close(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if self.outbound.send(Outbound::Close).is_err() {
            // Connection task already finished
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let abort = task.abort_handle();
                runtime.spawn(async move {
                    if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                        abort.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
    }

    fn is_closed(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_connection(
    id: SessionId,
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    setup: String,
    handshake_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: RemoteEventSink,
) {
    let fail = |message: String| {
        events(id, RemoteEvent::Error(message));
        events(id, RemoteEvent::Closed { reason: None });
    };
    let timed_out = || format!("no setupComplete within {:?}", handshake_timeout);

    let deadline = tokio::time::Instant::now() + handshake_timeout;
    let ws_stream = match tokio::time::timeout_at(deadline, connect_async(request)).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            fail(format!("connection failed: {}", e));
            return;
        }
        Err(_) => {
            fail(timed_out());
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    if let Err(e) = ws_tx.send(Message::Text(setup.into())).await {
        fail(format!("failed to send setup: {}", e));
        return;
    }
    tracing::debug!(session = %id, "setup sent");

    let handshake = tokio::time::sleep_until(deadline);
    tokio::pin!(handshake);
    let mut opened = false;

    loop {
        tokio::select! {
            _ = &mut handshake, if !opened => {
                tracing::warn!(session = %id, "setup handshake timed out");
                fail(timed_out());
                return;
            }
            frame = ws_rx.next() => {
                let parsed = match frame {
                    Some(Ok(Message::Text(text))) => parse_server_message(&text),
                    Some(Ok(Message::Binary(bytes))) => parse_server_frame(&bytes),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        tracing::info!(session = %id, reason = ?reason, "server closed connection");
                        events(id, RemoteEvent::Closed { reason });
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        fail(format!("websocket error: {}", e));
                        return;
                    }
                    None => {
                        events(id, RemoteEvent::Closed { reason: None });
                        return;
                    }
                };
                match parsed {
                    Ok(parsed) => {
                        for event in parsed {
                            opened |= matches!(event, RemoteEvent::Opened);
                            events(id, event);
                        }
                    }
                    Err(e) => tracing::warn!(session = %id, error = %e, "dropping server frame"),
                }
            }
            message = outbound.recv() => match message {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                        fail(format!("failed to send audio: {}", e));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = ws_tx.close().await {
                        tracing::debug!(session = %id, error = %e, "close handshake failed");
                    }
                    return;
                }
            }
        }
    }
}

/// A call recorded by `MockConnector`.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Connect {
        id: SessionId,
        request: ConnectRequest,
    },
    Upload {
        id: SessionId,
        chunk: EncodedAudioChunk,
    },
    Close(SessionId),
}

#[derive(Default)]
struct MockRemoteState {
    calls: Vec<RemoteCall>,
    fail_connect: Option<String>,
    open: Vec<SessionId>,
}

/// Mock connector for testing.
///
/// Records connects, uploaded chunks and closes. Sessions it hands out are
/// driven by the test, which feeds `RemoteEvent`s to the controller directly.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockRemoteState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on connect
    pub fn with_connect_failure(self, message: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_connect = Some(message.to_string());
        }
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Connect { .. }))
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Close(_)))
            .count()
    }

    /// Chunks uploaded on any session, in upload order.
    pub fn uploads(&self) -> Vec<EncodedAudioChunk> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::Upload { chunk, .. } => Some(chunk),
                _ => None,
            })
            .collect()
    }

    /// Sessions handed out and not yet closed.
    pub fn open_sessions(&self) -> Vec<SessionId> {
        self.state
            .lock()
            .map(|s| s.open.clone())
            .unwrap_or_default()
    }
}

impl RemoteConnector for MockConnector {
    fn connect(
        &mut self,
        id: SessionId,
        request: &ConnectRequest,
    ) -> Result<Box<dyn RemoteSession>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ParleyError::Other("mock connector poisoned".to_string()))?;
        state.calls.push(RemoteCall::Connect {
            id,
            request: request.clone(),
        });
        if let Some(message) = state.fail_connect.clone() {
            return Err(ParleyError::Connection { message });
        }
        state.open.push(id);
        Ok(Box::new(MockRemoteSession {
            id,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MockRemoteSession {
    id: SessionId,
    state: Arc<Mutex<MockRemoteState>>,
    closed: bool,
}

impl RemoteSession for MockRemoteSession {
    fn uplink(&self) -> Box<dyn ChunkSink> {
        let id = self.id;
        let state = Arc::clone(&self.state);
        Box::new(move |chunk: EncodedAudioChunk| {
            if let Ok(mut state) = state.lock()
                && state.open.contains(&id)
            {
                state.calls.push(RemoteCall::Upload { id, chunk });
            }
        })
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(mut state) = self.state.lock() {
            state.open.retain(|open| *open != self.id);
            state.calls.push(RemoteCall::Close(self.id));
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
