use std::time::Duration;

use crate::errors::{new_err, ErrorKind, Result};
use crate::leadership::{LeaderTask, RetryTimer};
use crate::store::CoordinationStore;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ElectionTimings {
    /// Bound on lease grant and revoke calls.
    pub lease_timeout: Duration,
    /// Bound on the campaign transaction and on point reads while following.
    pub store_timeout: Duration,
}

impl Default for ElectionTimings {
    fn default() -> Self {
        ElectionTimings {
            lease_timeout: Duration::from_secs(1),
            store_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ElectionConfiguration<S, T, Rt>
where
    S: CoordinationStore,
    T: LeaderTask,
    Rt: RetryTimer,
{
    pub leader_key: String,
    /// Payload written under `leader_key` while this instance leads.
    pub identity: Vec<u8>,
    pub lease_ttl: Duration,
    pub store: S,
    pub leader_task: T,
    pub retry_timer: Rt,
    pub timings: ElectionTimings,
}

impl<S, T, Rt> ElectionConfiguration<S, T, Rt>
where
    S: CoordinationStore,
    T: LeaderTask,
    Rt: RetryTimer,
{
    pub fn validate(&self) -> Result<()> {
        if self.leader_key.is_empty() {
            return new_err(
                ErrorKind::InvalidConfiguration,
                "Leader key is empty".to_string(),
                String::new(),
            );
        }

        if self.lease_ttl == Duration::from_secs(0) {
            return new_err(
                ErrorKind::InvalidConfiguration,
                format!("Lease TTL is zero for key {}", self.leader_key),
                String::new(),
            );
        }

        let zero = Duration::from_secs(0);
        if self.timings.lease_timeout == zero || self.timings.store_timeout == zero {
            return new_err(
                ErrorKind::InvalidConfiguration,
                "Store timeouts must be positive".to_string(),
                format!("{:?}", self.timings),
            );
        }

        Ok(())
    }
}
