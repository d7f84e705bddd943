use std::time::Duration;

/// Reconnect policy for the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Consecutive channel failures tolerated before falling back to polling.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        reconnect_delay(attempt, self.base, self.max)
    }
}

/// `min(2^attempt * base, max)`, saturating instead of overflowing.
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

pub const ADAPTIVE_MIN_INTERVAL: Duration = Duration::from_secs(5);
pub const ADAPTIVE_MAX_INTERVAL: Duration = Duration::from_secs(60);
pub const ADAPTIVE_GROWTH: f64 = 1.2;

/// Poll interval that stretches while fetched data stays identical.
///
/// Starts at the minimum, grows by [`ADAPTIVE_GROWTH`] for each fetch whose
/// bytes equal the previous one, snaps back to the minimum as soon as the
/// bytes differ and jumps to the maximum after a failed fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveInterval {
    current: Duration,
    min: Duration,
    max: Duration,
    growth: f64,
    last_payload: Option<Vec<u8>>,
}

impl Default for AdaptiveInterval {
    fn default() -> Self {
        Self::new(ADAPTIVE_MIN_INTERVAL, ADAPTIVE_MAX_INTERVAL, ADAPTIVE_GROWTH)
    }
}

impl AdaptiveInterval {
    pub fn new(min: Duration, max: Duration, growth: f64) -> Self {
        Self {
            current: min,
            min,
            max,
            growth,
            last_payload: None,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Records a successful fetch and returns whether the payload changed.
    pub fn observe(&mut self, payload: &[u8]) -> bool {
        let changed = self.last_payload.as_deref() != Some(payload);
        if changed {
            self.current = self.min;
            self.last_payload = Some(payload.to_vec());
        } else {
            let grown = (self.current.as_millis() as f64 * self.growth).round() as u64;
            self.current = Duration::from_millis(grown).min(self.max);
        }
        changed
    }

    pub fn observe_error(&mut self) {
        self.current = self.max;
    }
}
