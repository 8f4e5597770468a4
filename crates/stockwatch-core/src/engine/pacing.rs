// # Cycle Pacing
//
// Fixed base interval plus a small random jitter between cycle starts, so
// the polling signature is not perfectly periodic.
//
// ## Testing
//
// The jitter source is injectable; contract tests use `FixedJitter` to get
// deterministic delays.

use std::time::Duration;

/// Source of the per-cycle jitter
pub trait JitterSource: Send + Sync {
    /// Jitter to add to the next pause, at most `max`
    fn jitter(&self, max: Duration) -> Duration;
}

/// Uniformly random jitter in `[0, max]`
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn jitter(&self, max: Duration) -> Duration {
        let max_ms = max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random_range(0..=max_ms))
    }
}

/// Constant jitter, clamped to the configured maximum
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub Duration);

impl JitterSource for FixedJitter {
    fn jitter(&self, max: Duration) -> Duration {
        self.0.min(max)
    }
}

/// Pause schedule between polling cycles
pub struct Pacing {
    interval: Duration,
    max_jitter: Duration,
    source: Box<dyn JitterSource>,
}

impl Pacing {
    /// Create a pacing with random jitter
    pub fn new(interval: Duration, max_jitter: Duration) -> Self {
        Self {
            interval,
            max_jitter,
            source: Box::new(RandomJitter),
        }
    }

    /// Replace the jitter source
    pub fn with_jitter_source(mut self, source: Box<dyn JitterSource>) -> Self {
        self.source = source;
        self
    }

    /// Period between consecutive cycle starts
    pub fn next_delay(&self) -> Duration {
        self.interval + self.source.jitter(self.max_jitter)
    }
}

impl std::fmt::Debug for Pacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacing")
            .field("interval", &self.interval)
            .field("max_jitter", &self.max_jitter)
            .finish()
    }
}
