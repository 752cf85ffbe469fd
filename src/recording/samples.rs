// Numeric sample history and timing helpers built on the ring buffer

use std::time::{Duration, Instant};

use super::preroll::RingBuffer;

/// Motion scores kept for averaging and plotting (about 8 seconds at 30 fps)
pub const MOTION_SAMPLES: usize = 32 * 8;

/// Timing measurements kept per cost estimate
pub const TIMING_SAMPLES: usize = 64;

/// Rolling history of `f64` samples with an average over the filled slots
pub struct SampleHistory {
    ring: RingBuffer<f64>,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.ring.push(value);
    }

    /// Mean of the currently filled entries, or 0.0 when nothing was added
    pub fn average(&self) -> f64 {
        let filled = self.ring.len();
        if filled == 0 {
            return 0.0;
        }
        self.ring.iter().sum::<f64>() / filled as f64
    }

    /// Samples oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.ring.iter().copied()
    }

    pub fn oldest(&self) -> Option<f64> {
        self.ring.oldest().copied()
    }

    pub fn newest(&self) -> Option<f64> {
        self.ring.newest().copied()
    }

    /// Filled entries
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Samples ever pushed
    pub fn total(&self) -> u64 {
        self.ring.total()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Stopwatch that records elapsed microseconds into a sample history
pub struct TimingSamples {
    history: SampleHistory,
    started_at: Option<Instant>,
}

impl TimingSamples {
    pub fn new() -> Self {
        Self::with_capacity(TIMING_SAMPLES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: SampleHistory::new(capacity),
            started_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Record the time since the last `start()`. Does nothing if not started.
    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.record(started_at.elapsed());
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.history.push(elapsed.as_micros() as f64);
    }

    pub fn average_ms(&self) -> f64 {
        self.history.average() / 1000.0
    }

    pub fn samples(&self) -> &SampleHistory {
        &self.history
    }
}

impl Default for TimingSamples {
    fn default() -> Self {
        Self::new()
    }
}
