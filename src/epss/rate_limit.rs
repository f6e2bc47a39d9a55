use std::sync::Mutex;
use std::time::{Duration, Instant};
use crate::utils::clock::Clock;

/// Minimum spacing between consecutive upstream calls.
///
/// Owned by the score client; every HTTP attempt (retries included) takes one
/// slot.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next call is allowed, then claim the slot.
    pub async fn acquire(&self, clock: &dyn Clock) {
        let wait = {
            let last = self.last_call.lock().unwrap();
            match *last {
                Some(t) => self.min_interval.saturating_sub(clock.now().saturating_duration_since(t)),
                None => Duration::ZERO,
            }
        };

        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limiter pacing");
            clock.sleep(wait).await;
        }

        *self.last_call.lock().unwrap() = Some(clock.now());
    }
}
