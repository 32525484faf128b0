use std::time::Duration;

use crate::context::Context;
use crate::errors::Result;
use crate::leadership::RetryTimer;
use crate::store::{CoordinationStore, EventKind, Revision, WatchResponse};

enum WatchOutcome {
    KeyDeleted,
    StreamBroken,
}

/// Waits, while following, until the leadership key can be campaigned for again.
#[derive(Clone, Debug)]
pub struct FollowerMonitor<S: CoordinationStore, Rt: RetryTimer> {
    store: S,
    get_timeout: Duration,
    retry_timer: Rt,
}

impl<S: CoordinationStore, Rt: RetryTimer> FollowerMonitor<S, Rt> {
    pub fn new(store: S, get_timeout: Duration, retry_timer: Rt) -> FollowerMonitor<S, Rt> {
        FollowerMonitor {
            store,
            get_timeout,
            retry_timer,
        }
    }

    /// Returns once `key` is deleted after `from_revision` or found absent.
    ///
    /// Watch failures are never taken as "key open": the key is read directly instead and, if
    /// still held, watched again from the revision of that read. Errors only when `ctx` ends.
    pub fn wait_until_open(&self, ctx: &Context, key: &str, from_revision: Revision) -> Result<()> {
        let mut revision = from_revision;
        loop {
            if let WatchOutcome::KeyDeleted = self.watch_for_deletion(ctx, key, revision)? {
                debug!("Key {} deleted, leadership is open", key);
                return Ok(());
            }

            match self.read_revision(ctx, key)? {
                None => {
                    debug!("Key {} is absent, leadership is open", key);
                    return Ok(());
                }
                Some(read_revision) => {
                    trace!("Key {} still held at revision {}", key, read_revision);
                    revision = read_revision;
                    ctx.sleep(self.retry_timer.next_retry_timeout())?;
                }
            }
        }
    }

    fn watch_for_deletion(&self, ctx: &Context, key: &str, revision: Revision) -> Result<WatchOutcome> {
        let watch_rx = match self.store.watch(ctx, key, revision.next()) {
            Ok(watch_rx) => watch_rx,
            Err(err) => {
                ctx.check()?;
                warn!("Cannot watch key {}: {}", key, err);
                return Ok(WatchOutcome::StreamBroken);
            }
        };

        loop {
            select!(
                recv(watch_rx) -> response => match response {
                    Ok(WatchResponse::Events { events, .. }) => {
                        let deleted = events
                            .iter()
                            .any(|event| event.kind == EventKind::Delete && event.key == key);
                        if deleted {
                            return Ok(WatchOutcome::KeyDeleted);
                        }
                    },
                    Ok(WatchResponse::Failed(err)) => {
                        warn!("Watch on key {} failed: {}", key, err);
                        return Ok(WatchOutcome::StreamBroken);
                    },
                    Err(_) => {
                        ctx.check()?;
                        warn!("Watch stream on key {} closed", key);
                        return Ok(WatchOutcome::StreamBroken);
                    },
                },
                recv(ctx.done()) -> _ => return Err(ctx.ended()),
            );
        }
    }

    /// Point-reads the key until a read succeeds. Returns the read revision if the key exists.
    fn read_revision(&self, ctx: &Context, key: &str) -> Result<Option<Revision>> {
        loop {
            let get_ctx = ctx.with_timeout(self.get_timeout);
            match self.store.get(&get_ctx, key) {
                Ok(response) => {
                    let revision = response.revision;
                    return Ok(response.kv.map(|_| revision));
                }
                Err(err) => {
                    ctx.check()?;
                    warn!("Cannot read key {}: {}", key, err);
                    ctx.sleep(self.retry_timer.next_retry_timeout())?;
                }
            }
        }
    }
}
