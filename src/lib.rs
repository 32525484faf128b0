//! Lease-based leader election over a linearizable coordination store.
//!
//! Each election instance cycles between campaigning for a leadership key, leading while its
//! lease is kept alive, and following until the key is released. The store is reached only
//! through the `CoordinationStore` capability trait.

#![warn(missing_debug_implementations, unsafe_code)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate crossbeam_channel;
#[macro_use]
extern crate derive_more;

mod common;
mod context;
mod election;
mod errors;
mod leadership;
mod store;

pub use common::{race, run_worker, RaceOutcome, Winner, Worker, WorkerPool};
pub use context::Context;
pub use election::configuration::{ElectionConfiguration, ElectionTimings};
pub use election::{ElectionStateMachine, ElectionWorker};
pub use errors::{new_err, ElectionError, ErrorKind, Result};
pub use leadership::campaign::{Campaign, ClaimOutcome};
pub use leadership::follower::FollowerMonitor;
pub use leadership::lease::LeaseManager;
pub use leadership::{ElectionStatus, LeaderTask, RetryTimer, StatusReader};
pub use store::{
    Compare, CoordinationStore, EventKind, GetResponse, KeepAliveResponse, KeyValue, LeaseId, PutOp, Revision, Term,
    TxnRequest, TxnResponse, WatchEvent, WatchResponse,
};

/// Starts an election instance on its own thread.
pub fn start_election<S, T, Rt>(config: ElectionConfiguration<S, T, Rt>) -> Result<ElectionWorker>
where
    S: CoordinationStore,
    T: LeaderTask,
    Rt: RetryTimer,
{
    election::start(config)
}
