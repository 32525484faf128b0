use std::time::Duration;

use crate::context::Context;
use crate::errors::{ElectionError, ErrorKind, Result};
use crate::store::{CoordinationStore, LeaseId};

/// Owns the lifecycle of the lease backing one leading attempt: grant, keep-alive, revoke.
#[derive(Clone, Debug)]
pub struct LeaseManager<S: CoordinationStore> {
    store: S,
    lease_timeout: Duration,
}

impl<S: CoordinationStore> LeaseManager<S> {
    /// `lease_timeout` bounds grant and revoke independently of the caller's deadline.
    pub fn new(store: S, lease_timeout: Duration) -> LeaseManager<S> {
        LeaseManager { store, lease_timeout }
    }

    pub fn grant(&self, ctx: &Context, ttl: Duration) -> Result<LeaseId> {
        let grant_ctx = ctx.with_timeout(self.lease_timeout);
        let lease_id = self.store.grant(&grant_ctx, ttl)?;

        trace!("Lease {} granted with ttl={:?}", lease_id, ttl);
        Ok(lease_id)
    }

    /// Revokes the lease. Runs on its own timeout scope so stepping down after cancellation
    /// still reaches the store. A lease that cannot be revoked expires by its TTL.
    pub fn revoke(&self, lease_id: LeaseId) -> Result<()> {
        let revoke_ctx = Context::new().with_timeout(self.lease_timeout);
        self.store.revoke(&revoke_ctx, lease_id)?;

        trace!("Lease {} revoked", lease_id);
        Ok(())
    }

    pub(crate) fn revoke_quietly(&self, lease_id: LeaseId) {
        if let Err(err) = self.revoke(lease_id) {
            match err.kind() {
                ErrorKind::LeaseNotFound => debug!("Lease {} already gone: {}", lease_id, err),
                _ => warn!("Cannot revoke lease {}: {}", lease_id, err),
            }
        }
    }

    /// Keeps the lease alive until renewal stops, returning the reason it stopped.
    ///
    /// Every exit path yields exactly one terminal error: `StreamClosed` when the renewal
    /// stream ends, `LeaseExpired` when the store no longer knows the lease, or the reason
    /// `ctx` ended (`Cancelled` or `Timeout`), in which case the lease is revoked before returning.
    pub fn keep_alive(&self, ctx: &Context, lease_id: LeaseId) -> ElectionError {
        let renewals = match self.store.keep_alive(ctx, lease_id) {
            Ok(renewals) => renewals,
            Err(err) => return self.stop_keep_alive(ctx, lease_id, err),
        };

        debug!("Keep-alive started for lease {}", lease_id);
        loop {
            select!(
                recv(renewals) -> response => {
                    match response {
                        Ok(response) if response.ttl == Duration::from_secs(0) => {
                            let err = ElectionError::new(
                                ErrorKind::LeaseExpired,
                                format!("Lease {} expired", lease_id),
                                String::new(),
                            );
                            return self.stop_keep_alive(ctx, lease_id, err);
                        },
                        Ok(response) => {
                            trace!("Lease {} renewed, ttl={:?}", lease_id, response.ttl);
                        },
                        Err(_) => {
                            let err = ElectionError::new(
                                ErrorKind::StreamClosed,
                                format!("Keep-alive stream closed for lease {}", lease_id),
                                String::new(),
                            );
                            return self.stop_keep_alive(ctx, lease_id, err);
                        },
                    }
                },
                recv(ctx.done()) -> _ => {
                    let err = ElectionError::new(
                        ctx.ended().kind(),
                        format!("Keep-alive stopped for lease {}", lease_id),
                        String::new(),
                    );
                    return self.stop_keep_alive(ctx, lease_id, err);
                },
            );
        }
    }

    fn stop_keep_alive(&self, ctx: &Context, lease_id: LeaseId, err: ElectionError) -> ElectionError {
        match ctx.err() {
            Some(ctx_err) => {
                self.revoke_quietly(lease_id);

                if err.kind() != ctx_err.kind() {
                    return ElectionError::new(
                        ctx_err.kind(),
                        format!("Keep-alive stopped for lease {}", lease_id),
                        err.to_string(),
                    );
                }
            }
            None => warn!("Keep-alive failed for lease {}: {}", lease_id, err),
        }

        err
    }
}
