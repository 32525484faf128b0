use lease_election::RetryTimer;
use std::time::Duration;

const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Waits the same backoff before every retry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct FixedRetryTimer {
    backoff: Duration,
}

impl FixedRetryTimer {
    pub fn new(backoff: Duration) -> FixedRetryTimer {
        FixedRetryTimer { backoff }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for FixedRetryTimer {
    fn default() -> Self {
        FixedRetryTimer::new(DEFAULT_BACKOFF)
    }
}

impl RetryTimer for FixedRetryTimer {
    fn next_retry_timeout(&self) -> Duration {
        self.backoff
    }
}
