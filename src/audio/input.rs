use crate::audio::frame::FrameAccumulator;
use crate::codec::EncodedAudioChunk;
use crate::error::{ParleyError, Result};
use std::sync::{Arc, Mutex};

/// Receiver of encoded capture frames, normally the open session's uplink.
pub trait ChunkSink: Send {
    /// Deliver one encoded frame. Fire-and-forget.
    fn send(&mut self, chunk: EncodedAudioChunk);
}

impl<F> ChunkSink for F
where
    F: FnMut(EncodedAudioChunk) + Send,
{
    fn send(&mut self, chunk: EncodedAudioChunk) {
        self(chunk)
    }
}

/// Trait for microphone capture devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait AudioInput: Send {
    /// Acquire exclusive access to the capture device.
    ///
    /// Audio may start flowing immediately, but nothing is delivered until
    /// `start` attaches a sink.
    ///
    /// # Errors
    /// Returns `ParleyError::DeviceUnavailable` if no device exists or access is denied
    fn acquire(&mut self) -> Result<()>;

    /// Begin delivering one encoded chunk per captured frame to `sink`.
    fn start(&mut self, sink: Box<dyn ChunkSink>) -> Result<()>;

    /// Disconnect the sink and release the device. Safe to call repeatedly.
    fn stop(&mut self);

    /// Whether the device is currently held.
    fn is_acquired(&self) -> bool;
}

/// Frame assembly and encoding between a device callback and a sink.
///
/// Samples fed while no sink is attached are discarded, as are partial
/// frames left over when a sink is attached.
pub struct CaptureTap {
    accumulator: FrameAccumulator,
    sink: Option<Box<dyn ChunkSink>>,
    delivered: u64,
    dropped_samples: u64,
}

impl CaptureTap {
    pub fn new(frame_size: usize) -> Self {
        Self {
            accumulator: FrameAccumulator::new(frame_size),
            sink: None,
            delivered: 0,
            dropped_samples: 0,
        }
    }

    pub fn attach(&mut self, sink: Box<dyn ChunkSink>) {
        self.accumulator.clear();
        self.sink = Some(sink);
    }

    pub fn detach(&mut self) {
        self.sink = None;
        self.accumulator.clear();
    }

    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Feed mono 16 kHz samples from the device.
    pub fn feed(&mut self, samples: &[f32]) {
        let Some(sink) = self.sink.as_mut() else {
            self.dropped_samples += samples.len() as u64;
            return;
        };
        let delivered = &mut self.delivered;
        self.accumulator.push(samples, |frame| {
            sink.send(EncodedAudioChunk::from_frame(frame));
            *delivered += 1;
        });
    }

    /// Frames handed to a sink since creation.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Samples discarded because no sink was attached.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }
}

impl Default for CaptureTap {
    fn default() -> Self {
        Self::new(crate::defaults::CAPTURE_FRAME_SIZE)
    }
}

#[derive(Default)]
struct MockInputState {
    acquired: bool,
    acquire_calls: usize,
    start_calls: usize,
    release_calls: usize,
    fail_acquire: Option<String>,
    tap: Option<CaptureTap>,
}

/// Mock capture device for testing.
///
/// Clones share state, so a test can keep one handle while the session owns
/// another, then push synthetic audio through the real encoding path.
#[derive(Clone)]
pub struct MockInput {
    state: Arc<Mutex<MockInputState>>,
    frame_size: usize,
}

impl MockInput {
    /// Create a new mock input with the production frame size
    pub fn new() -> Self {
        Self::with_frame_size(crate::defaults::CAPTURE_FRAME_SIZE)
    }

    /// Create a mock input producing frames of `frame_size` samples
    pub fn with_frame_size(frame_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockInputState::default())),
            frame_size,
        }
    }

    /// Configure the mock to fail on acquire, as if permission was denied
    pub fn with_acquire_failure(self, message: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_acquire = Some(message.to_string());
        }
        self
    }

    /// Simulate the device producing samples.
    pub fn push_samples(&self, samples: &[f32]) {
        if let Ok(mut state) = self.state.lock()
            && let Some(tap) = state.tap.as_mut()
        {
            tap.feed(samples);
        }
    }

    pub fn acquire_calls(&self) -> usize {
        self.state.lock().map(|s| s.acquire_calls).unwrap_or(0)
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().map(|s| s.start_calls).unwrap_or(0)
    }

    /// Number of times a held device was actually released.
    pub fn release_calls(&self) -> usize {
        self.state.lock().map(|s| s.release_calls).unwrap_or(0)
    }

    pub fn is_streaming(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.tap.as_ref().is_some_and(CaptureTap::is_attached))
            .unwrap_or(false)
    }
}

impl Default for MockInput {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> ParleyError {
    ParleyError::Other("mock input state poisoned".to_string())
}

impl AudioInput for MockInput {
    fn acquire(&mut self) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.acquire_calls += 1;
        if let Some(message) = state.fail_acquire.clone() {
            return Err(ParleyError::DeviceUnavailable { message });
        }
        state.acquired = true;
        state.tap = Some(CaptureTap::new(self.frame_size));
        Ok(())
    }

    fn start(&mut self, sink: Box<dyn ChunkSink>) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let tap = state
            .tap
            .as_mut()
            .ok_or_else(|| ParleyError::DeviceUnavailable {
                message: "capture device not acquired".to_string(),
            })?;
        tap.attach(sink);
        state.start_calls += 1;
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut state) = self.state.lock()
            && state.acquired
        {
            state.acquired = false;
            state.tap = None;
            state.release_calls += 1;
        }
    }

    fn is_acquired(&self) -> bool {
        self.state.lock().map(|s| s.acquired).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn collecting_sink() -> (Box<dyn ChunkSink>, mpsc::Receiver<EncodedAudioChunk>) {
        let (tx, rx) = mpsc::channel();
        let sink = move |chunk: EncodedAudioChunk| {
            let _ = tx.send(chunk);
        };
        (Box::new(sink), rx)
    }

    #[test]
    fn test_tap_drops_samples_until_sink_attached() {
        let mut tap = CaptureTap::new(4);
        tap.feed(&[0.1; 10]);
        assert_eq!(tap.dropped_samples(), 10);
        assert_eq!(tap.delivered(), 0);

        let (sink, rx) = collecting_sink();
        tap.attach(sink);
        tap.feed(&[0.0; 8]);
        assert_eq!(tap.delivered(), 2);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_tap_preserves_frame_order() {
        let mut tap = CaptureTap::new(2);
        let (sink, rx) = collecting_sink();
        tap.attach(sink);
        tap.feed(&[0.5, 0.5, -0.5, -0.5]);

        let chunks: Vec<_> = rx.try_iter().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].decode_mono().unwrap(), vec![0.5, 0.5]);
        assert_eq!(chunks[1].decode_mono().unwrap(), vec![-0.5, -0.5]);
        assert!(chunks.iter().all(|c| c.mime_type == "audio/pcm;rate=16000"));
    }

    #[test]
    fn test_tap_detach_stops_delivery() {
        let mut tap = CaptureTap::new(2);
        let (sink, rx) = collecting_sink();
        tap.attach(sink);
        tap.detach();
        tap.feed(&[0.0; 4]);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_mock_input_acquire_failure_reports_device_unavailable() {
        let mut input = MockInput::new().with_acquire_failure("permission denied");
        match input.acquire() {
            Err(ParleyError::DeviceUnavailable { message }) => {
                assert_eq!(message, "permission denied");
            }
            other => panic!("Expected DeviceUnavailable, got {:?}", other),
        }
        assert!(!input.is_acquired());
    }

    #[test]
    fn test_mock_input_start_requires_acquire() {
        let mut input = MockInput::new();
        let (sink, _rx) = collecting_sink();
        assert!(input.start(sink).is_err());
    }

    #[test]
    fn test_mock_input_stop_is_idempotent() {
        let mut input = MockInput::with_frame_size(2);
        let observer = input.clone();
        input.acquire().unwrap();
        let (sink, rx) = collecting_sink();
        input.start(sink).unwrap();
        observer.push_samples(&[0.0, 0.0]);
        assert_eq!(rx.try_iter().count(), 1);

        input.stop();
        input.stop();
        assert_eq!(observer.release_calls(), 1);
        assert!(!observer.is_streaming());

        observer.push_samples(&[0.0, 0.0]);
        assert_eq!(rx.try_iter().count(), 0);
    }
}
