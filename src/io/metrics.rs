// Moving-window throughput tracking

use std::collections::VecDeque;
use std::time::Duration;

/// Throughput over the most recent chunks.
///
/// Rate is total bytes over total write time within the window, so one slow chunk is
/// smoothed out rather than dominating the estimate.
#[derive(Debug, Clone)]
pub struct ThroughputTracker {
    window: usize,
    samples: VecDeque<(u64, Duration)>,
}

impl ThroughputTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn record(&mut self, bytes: u64, elapsed: Duration) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back((bytes, elapsed));
    }

    /// Average bytes per second, 0 until any measurable time has been recorded
    pub fn bytes_per_second(&self) -> u64 {
        let (bytes, time) = self
            .samples
            .iter()
            .fold((0u64, Duration::ZERO), |(b, t), (bytes, elapsed)| {
                (b + bytes, t + *elapsed)
            });

        let secs = time.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (bytes as f64 / secs) as u64
    }

    /// Seconds to write `remaining` bytes at the current rate
    pub fn eta(&self, remaining: u64) -> Option<u64> {
        match self.bytes_per_second() {
            0 => None,
            rate => Some(remaining / rate + u64::from(remaining % rate != 0)),
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
