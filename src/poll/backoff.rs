use std::time::Duration;

/// Exponential delay between polls.
///
/// Starts at zero so the first request goes out immediately. Each `next`
/// moves to `min` and then doubles up to `max`; `reset` drops back to zero.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            current: Duration::ZERO,
        }
    }

    /// Delay to wait before the next request.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Grow the delay and return it.
    pub fn next(&mut self) -> Duration {
        self.current = if self.current.is_zero() {
            self.min
        } else {
            std::cmp::min(self.current.saturating_mul(2), self.max)
        };
        self.current
    }

    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }
}
