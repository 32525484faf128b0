use std::time::Duration;

use crate::context::Context;
use crate::errors::Result;
use crate::leadership::lease::LeaseManager;
use crate::store::{CoordinationStore, LeaseId, Revision, Term, TxnRequest};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClaimOutcome {
    /// The key was created bound to `lease_id`; the caller owns the lease from now on.
    Won { lease_id: LeaseId, term: Term },
    /// Someone else holds the key. Watch for its deletion after `revision`.
    Lost { revision: Revision },
}

impl ClaimOutcome {
    pub fn won(&self) -> bool {
        match self {
            ClaimOutcome::Won { .. } => true,
            ClaimOutcome::Lost { .. } => false,
        }
    }

    pub fn revision(&self) -> Revision {
        match *self {
            ClaimOutcome::Won { term, .. } => term,
            ClaimOutcome::Lost { revision } => revision,
        }
    }
}

/// Attempts to claim the leadership key with a single compare-and-put transaction.
#[derive(Clone, Debug)]
pub struct Campaign<S: CoordinationStore> {
    store: S,
    lease_manager: LeaseManager<S>,
    txn_timeout: Duration,
}

impl<S: CoordinationStore> Campaign<S> {
    pub fn new(store: S, lease_manager: LeaseManager<S>, txn_timeout: Duration) -> Campaign<S> {
        Campaign {
            store,
            lease_manager,
            txn_timeout,
        }
    }

    /// Grants a fresh lease and writes `identity` under `key` if the key does not exist.
    ///
    /// The transaction result alone decides the outcome. The lease is revoked on every path
    /// except a won claim, so a failed call never leaves a lease behind.
    pub fn claim(&self, ctx: &Context, key: &str, identity: &[u8], ttl: Duration) -> Result<ClaimOutcome> {
        let lease_id = self.lease_manager.grant(ctx, ttl)?;

        let txn_ctx = ctx.with_timeout(self.txn_timeout);
        let txn_result = self
            .store
            .txn(&txn_ctx, TxnRequest::create_if_absent(key, identity, lease_id));

        let response = match txn_result {
            Ok(response) => response,
            Err(err) => {
                debug!("Campaign transaction for key {} failed: {}", key, err);
                self.lease_manager.revoke_quietly(lease_id);
                return Err(err);
            }
        };

        if response.succeeded {
            info!("Key {} claimed with lease {} at revision {}", key, lease_id, response.revision);
            return Ok(ClaimOutcome::Won {
                lease_id,
                term: response.revision,
            });
        }

        debug!("Key {} is held by another candidate at revision {}", key, response.revision);
        self.lease_manager.revoke_quietly(lease_id);

        Ok(ClaimOutcome::Lost {
            revision: response.revision,
        })
    }
}
