//! Capability boundary to the coordination store.
//!
//! The engine never talks to a concrete store client. Everything it needs (leases, a single
//! compare-and-put transaction, point reads and watches) goes through `CoordinationStore`, so an
//! in-memory implementation can stand in for a consensus-backed one.

use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::context::Context;
use crate::errors::{ElectionError, Result};

/// Logical clock assigned by the store to every mutation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From)]
pub struct Revision(pub i64);

impl Revision {
    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

/// Revision at which a leadership claim succeeded. Identifies one leading epoch.
pub type Term = Revision;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From)]
pub struct LeaseId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub create_revision: Revision,
    pub mod_revision: Revision,
    pub lease: Option<LeaseId>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Compare {
    /// Holds when the key was created at the given revision. Revision zero means "absent".
    CreateRevision(String, Revision),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PutOp {
    pub key: String,
    pub value: Vec<u8>,
    pub lease: Option<LeaseId>,
}

/// Single-branch transaction: apply `put` atomically if `compare` holds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxnRequest {
    pub compare: Compare,
    pub put: PutOp,
}

impl TxnRequest {
    /// Creates `key` bound to `lease` only if the key does not exist.
    pub fn create_if_absent(key: &str, value: &[u8], lease: LeaseId) -> TxnRequest {
        TxnRequest {
            compare: Compare::CreateRevision(key.to_string(), Revision(0)),
            put: PutOp {
                key: key.to_string(),
                value: value.to_vec(),
                lease: Some(lease),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxnResponse {
    pub succeeded: bool,
    /// Store revision after the transaction was evaluated.
    pub revision: Revision,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GetResponse {
    pub revision: Revision,
    pub kv: Option<KeyValue>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeepAliveResponse {
    pub lease_id: LeaseId,
    /// Remaining time to live. Zero means the store no longer knows the lease.
    pub ttl: Duration,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum EventKind {
    Put,
    Delete,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub key: String,
    pub revision: Revision,
}

#[derive(Clone, Debug)]
pub enum WatchResponse {
    Events {
        revision: Revision,
        events: Vec<WatchEvent>,
    },
    Failed(ElectionError),
}

/// Operations of a linearizable key-value store used by the election.
///
/// Every call must return once `ctx` is cancelled or its deadline passes. Streams returned by
/// `keep_alive` and `watch` end by disconnecting the channel and must stop producing once `ctx`
/// is cancelled.
pub trait CoordinationStore: Send + Sync + Clone + 'static {
    fn grant(&self, ctx: &Context, ttl: Duration) -> Result<LeaseId>;

    fn revoke(&self, ctx: &Context, lease_id: LeaseId) -> Result<()>;

    fn keep_alive(&self, ctx: &Context, lease_id: LeaseId) -> Result<Receiver<KeepAliveResponse>>;

    fn txn(&self, ctx: &Context, request: TxnRequest) -> Result<TxnResponse>;

    fn get(&self, ctx: &Context, key: &str) -> Result<GetResponse>;

    fn watch(&self, ctx: &Context, key: &str, from_revision: Revision) -> Result<Receiver<WatchResponse>>;
}

#[cfg(test)]
pub(crate) mod mock;
