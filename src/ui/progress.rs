use std::time::{Duration, Instant};

/// Shown while no throughput estimate exists yet
pub const ETA_UNKNOWN: &str = "Calculating...";

/// Rate limiter for progress events within one step.
///
/// The final event of a step always passes so every step can report 100%.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn should_emit(&mut self, is_final: bool) -> bool {
        let now = Instant::now();
        let due = match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };

        if due || is_final {
            self.last = Some(now);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Percentage of `done` over `total`, clamped to [0, 100] and rounded to 2 decimals
pub fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let pct = (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
    (pct * 100.0).round() / 100.0
}

/// Convert a byte count to readable string
pub fn human_bytes(bytes: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bytes <= 0.0 || !bytes.is_finite() {
        return "0.00 B".to_string();
    }
    let mut val = bytes;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2} {}", val, units[i])
}

pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", human_bytes(bytes_per_second as f64))
}

/// Format seconds as HH:MM:SS
pub fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

pub fn format_eta(eta_seconds: Option<u64>) -> String {
    eta_seconds
        .map(format_duration)
        .unwrap_or_else(|| ETA_UNKNOWN.to_string())
}
