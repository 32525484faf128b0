use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::context::Context;
use crate::store::{Revision, Term};

pub mod campaign;
pub mod follower;
pub mod lease;


/// Leader-only workload run for the duration of one leading epoch.
///
/// `start` must return promptly once `ctx` is cancelled: cancellation is the only signal the
/// task gets that the lease backing its exclusivity is gone.
pub trait LeaderTask: Send + Sync + 'static {
    fn start(&self, ctx: &Context, term: Term);
}

impl<F> LeaderTask for F
where
    F: Fn(&Context, Term) + Send + Sync + 'static,
{
    fn start(&self, ctx: &Context, term: Term) {
        self(ctx, term)
    }
}

/// Provides the pause between retries of failed store interactions.
pub trait RetryTimer: Send + Sync + Clone + 'static {
    fn next_retry_timeout(&self) -> Duration;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum ElectionStatus {
    Electing,
    #[display(fmt = "Leading(term={})", _0)]
    Leading(Term),
    #[display(fmt = "Following(revision={})", _0)]
    Following(Revision),
    Stopped,
}

impl ElectionStatus {
    pub fn is_leader(&self) -> bool {
        match self {
            ElectionStatus::Leading(_) => true,
            _ => false,
        }
    }
}

/// Shared, read-only view of the current election status.
#[derive(Clone, Debug)]
pub struct StatusReader {
    status: Arc<RwLock<ElectionStatus>>,
}

impl StatusReader {
    pub(crate) fn new(status: Arc<RwLock<ElectionStatus>>) -> StatusReader {
        StatusReader { status }
    }

    pub fn status(&self) -> ElectionStatus {
        *self.status.read()
    }
}
