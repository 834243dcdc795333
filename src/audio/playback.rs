//! Gapless sequencing of streamed reply audio.
//!
//! Each decoded chunk is scheduled at `max(next_start_time, clock.now())`, so
//! chunks play back-to-back in arrival order and never overlap, even when
//! they arrive late.

use crate::audio::clock::{OutputClock, SourceId};
use crate::codec::EncodedAudioChunk;
use crate::error::Result;
use std::collections::HashSet;

/// A buffer accepted by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    /// Start time on the output clock, in seconds.
    pub start_at: f64,
    /// Duration in seconds.
    pub duration: f64,
}

impl ScheduledSource {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

pub struct PlaybackScheduler<C: OutputClock> {
    clock: C,
    live: HashSet<SourceId>,
    next_start_time: f64,
    next_id: u64,
}

impl<C: OutputClock> PlaybackScheduler<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            live: HashSet::new(),
            next_start_time: 0.0,
            next_id: 0,
        }
    }

    /// Number source ids from `base` so ids from different schedulers never collide.
    pub fn with_id_base(mut self, base: u64) -> Self {
        self.next_id = base;
        self
    }

    /// Decode a chunk and schedule it right after everything already queued.
    ///
    /// # Errors
    /// Returns `ParleyError::Decode` for a malformed chunk, leaving the cursor and
    /// live set untouched. Returns `ParleyError::AudioOutput` if the clock is closed.
    pub fn enqueue(&mut self, chunk: &EncodedAudioChunk) -> Result<ScheduledSource> {
        let samples = chunk.decode_mono()?;
        let duration = samples.len() as f64 / self.clock.sample_rate() as f64;
        let start_at = self.next_start_time.max(self.clock.now());

        let id = SourceId(self.next_id);
        self.clock.schedule(id, samples, start_at)?;
        self.next_id += 1;
        self.next_start_time = start_at + duration;
        self.live.insert(id);

        Ok(ScheduledSource {
            id,
            start_at,
            duration,
        })
    }

    /// Release a source after the clock reports it finished.
    pub fn source_ended(&mut self, id: SourceId) {
        self.live.remove(&id);
    }

    /// Stop everything that is playing or queued and rewind the cursor.
    pub fn interrupt(&mut self) {
        let mut stopped: Vec<SourceId> = self.live.drain().collect();
        stopped.sort();
        for id in stopped {
            self.clock.stop_source(id);
        }
        self.next_start_time = 0.0;
    }

    /// Interrupt, then release the output clock. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.interrupt();
        if !self.clock.is_closed() {
            self.clock.close();
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: SourceId) -> bool {
        self.live.contains(&id)
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
