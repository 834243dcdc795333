//! Output clock abstraction used by the playback scheduler.
//!
//! A clock renders mono buffers at scheduled times (seconds on its own
//! timeline) and reports when each source finishes.

use crate::error::{ParleyError, Result};
use std::sync::{Arc, Mutex};

/// Identifier of one scheduled playback source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

/// Callback invoked (possibly from the audio thread) when a source finishes.
pub type EndedNotifier = Arc<dyn Fn(SourceId) + Send + Sync>;

/// A monotonic audio timeline that can play buffers at given start times.
pub trait OutputClock: Send {
    /// Current position of the timeline in seconds.
    fn now(&self) -> f64;

    /// Fixed sample rate of buffers handed to `schedule`.
    fn sample_rate(&self) -> u32;

    /// Play `samples` (mono, at `sample_rate`) starting at `start_at` seconds.
    fn schedule(&mut self, id: SourceId, samples: Vec<f32>, start_at: f64) -> Result<()>;

    /// Stop a source immediately. Unknown or finished ids are ignored.
    fn stop_source(&mut self, id: SourceId);

    /// Release the output device. Further scheduling fails.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Creates output clocks; one clock per session.
pub trait ClockFactory: Send {
    fn create(&mut self, sample_rate: u32) -> Result<Box<dyn OutputClock>>;
}

impl OutputClock for Box<dyn OutputClock> {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn schedule(&mut self, id: SourceId, samples: Vec<f32>, start_at: f64) -> Result<()> {
        (**self).schedule(id, samples, start_at)
    }

    fn stop_source(&mut self, id: SourceId) {
        (**self).stop_source(id)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// A call recorded by `ManualClock`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockCall {
    Schedule {
        id: SourceId,
        start_at: f64,
        samples: usize,
    },
    Stop(SourceId),
    Close,
}

#[derive(Debug, Default)]
struct ManualClockState {
    now: f64,
    closed: bool,
    calls: Vec<ClockCall>,
}

/// Test clock whose time only moves when told to.
///
/// Clones share state so a test can advance time on a handle while the
/// scheduler owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualClockState>>,
    sample_rate: u32,
}

impl ManualClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualClockState::default())),
            sample_rate,
        }
    }

    pub fn set_time(&self, seconds: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.now = seconds;
        }
    }

    pub fn advance(&self, seconds: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.now += seconds;
        }
    }

    pub fn calls(&self) -> Vec<ClockCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// Number of `close` calls that reached an open clock.
    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ClockCall::Close))
            .count()
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> f64 {
        self.state.lock().map(|s| s.now).unwrap_or(0.0)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, id: SourceId, samples: Vec<f32>, start_at: f64) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ParleyError::Other("manual clock poisoned".to_string()))?;
        if state.closed {
            return Err(ParleyError::AudioOutput {
                message: "clock is closed".to_string(),
            });
        }
        state.calls.push(ClockCall::Schedule {
            id,
            start_at,
            samples: samples.len(),
        });
        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(ClockCall::Stop(id));
        }
    }

    fn close(&mut self) {
        if let Ok(mut state) = self.state.lock()
            && !state.closed
        {
            state.closed = true;
            state.calls.push(ClockCall::Close);
        }
    }

    fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(true)
    }
}

/// Factory handing out `ManualClock`s; keeps every clock it made for inspection.
#[derive(Debug, Clone, Default)]
pub struct ManualClockFactory {
    created: Arc<Mutex<Vec<ManualClock>>>,
    fail: bool,
}

impl ManualClockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the factory to fail, as if no output device existed
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn clocks(&self) -> Vec<ManualClock> {
        self.created
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Most recently created clock.
    pub fn last(&self) -> Option<ManualClock> {
        self.clocks().pop()
    }
}

impl ClockFactory for ManualClockFactory {
    fn create(&mut self, sample_rate: u32) -> Result<Box<dyn OutputClock>> {
        if self.fail {
            return Err(ParleyError::AudioOutput {
                message: "no output device".to_string(),
            });
        }
        let clock = ManualClock::new(sample_rate);
        if let Ok(mut created) = self.created.lock() {
            created.push(clock.clone());
        }
        Ok(Box::new(clock))
    }
}
