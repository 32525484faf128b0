use lease_election::RetryTimer;
use rand::Rng;
use std::time::Duration;

use super::fixed_retry_timer::FixedRetryTimer;

/// Adds random jitter on top of a fixed backoff, so candidates failing together do not retry
/// in lockstep. Pauses fall into `[backoff, backoff + jitter)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RandomizedRetryTimer {
    base: FixedRetryTimer,
    jitter: Duration,
}

impl RandomizedRetryTimer {
    pub fn new(backoff: Duration, jitter: Duration) -> RandomizedRetryTimer {
        RandomizedRetryTimer {
            base: FixedRetryTimer::new(backoff),
            jitter,
        }
    }
}

impl From<FixedRetryTimer> for RandomizedRetryTimer {
    /// Jitter of up to the base backoff itself.
    fn from(base: FixedRetryTimer) -> Self {
        RandomizedRetryTimer {
            base,
            jitter: base.backoff(),
        }
    }
}

impl RetryTimer for RandomizedRetryTimer {
    fn next_retry_timeout(&self) -> Duration {
        let jitter_micros = self.jitter.as_micros() as u64;
        if jitter_micros == 0 {
            return self.base.next_retry_timeout();
        }

        let extra = rand::thread_rng().gen_range(0..jitter_micros);
        self.base.next_retry_timeout() + Duration::from_micros(extra)
    }
}
