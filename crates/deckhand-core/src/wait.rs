//! Retry timing for the two polling loops of a deploy.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Jenkins needs a few seconds to hand a queue item to an executor and
/// builds take minutes, so polling faster than this gains nothing.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before the next attempt of a polling loop.
pub trait Backoff: Send + Sync + std::fmt::Debug {
    /// `attempt` is the number of attempts made so far (1 after the first).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Same delay between every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval(pub Duration);

impl Backoff for FixedInterval {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// How one polling loop retries.
///
/// The default polls every five seconds with no attempt or time limit.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub backoff: Arc<dyn Backoff>,
    /// Give up after this many attempts.
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first attempt.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_POLL_INTERVAL)
    }
}

impl PollPolicy {
    /// Unbounded polling at a fixed interval.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            backoff: Arc::new(FixedInterval(interval)),
            max_attempts: None,
            deadline: None,
        }
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.deadline.is_none()
    }

    /// Whether a loop that started at `started` and has made `attempts`
    /// attempts must stop instead of waiting for another one.
    pub fn exhausted(&self, attempts: u32, started: Instant) -> bool {
        let out_of_attempts = self.max_attempts.is_some_and(|max| attempts >= max);
        // An interval too large to add to the elapsed time can never fit.
        let out_of_time = self.deadline.is_some_and(|deadline| {
            started
                .elapsed()
                .checked_add(self.backoff.delay(attempts))
                .map_or(true, |next| next > deadline)
        });
        out_of_attempts || out_of_time
    }
}
