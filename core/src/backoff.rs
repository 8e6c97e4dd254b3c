use std::time::Duration;

use rand::Rng;

/// Exponential backoff between update attempts
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
    /// Delays are stretched by a random factor in `[1.0, 1.0 + jitter_ratio)`; 0 disables jitter
    pub jitter_ratio: f64,
}

impl Default for Backoff {
    fn default() -> Self { Self { base: Duration::from_millis(100), factor: 2, max: Duration::from_secs(5), jitter_ratio: 0.2 } }
}

impl Backoff {
    /// Delay after the `attempt`th failed try (1-based), before jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base.min(self.max);
        for _ in 1..attempt {
            delay = match delay.checked_mul(self.factor) {
                Some(next) => next.min(self.max),
                None => self.max,
            };
        }
        delay
    }

    pub fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let stretch = 1.0 + rand::thread_rng().gen::<f64>() * self.jitter_ratio;
        delay.mul_f64(stretch).min(self.max)
    }
}
