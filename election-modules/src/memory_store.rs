//! In-memory coordination store.
//!
//! A single mutex makes every operation linearizable. Revisions start at 1 and advance on each
//! put or delete, lease grants leave them unchanged. Clients obtained with `client()` share the
//! data but carry their own fault switches, which is how tests partition one candidate away
//! from the store while others keep working. Watch history is compacted to the most recent
//! events; watching from a compacted revision fails like it does on a real store.

use std::cmp;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use lease_election::{
    new_err, run_worker, Compare, Context, CoordinationStore, ElectionError, ErrorKind, EventKind, GetResponse,
    KeepAliveResponse, KeyValue, LeaseId, Result, Revision, TxnRequest, TxnResponse, WatchEvent, WatchResponse,
    Worker,
};

const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Clone, Debug)]
pub struct MemoryStore {
    backend: Arc<Mutex<Backend>>,
    faults: Arc<Mutex<Faults>>,
}

#[derive(Debug)]
struct Backend {
    revision: Revision,
    next_lease_id: i64,
    keys: HashMap<String, KeyValue>,
    leases: HashMap<LeaseId, LeaseEntry>,
    history: Vec<WatchEvent>,
    history_limit: usize,
    // events up to this revision were dropped from history
    compacted: Revision,
    watchers: Vec<Watcher>,
    revoked: Vec<LeaseId>,
}

#[derive(Debug)]
struct LeaseEntry {
    ttl: Duration,
    expires_at: Instant,
    keys: HashSet<String>,
}

#[derive(Debug)]
struct Watcher {
    key: String,
    ctx: Context,
    events_tx: Sender<WatchResponse>,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    failing_watches: usize,
    failing_gets: usize,
    keep_alive_ack_limit: Option<usize>,
    latency: Duration,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Store retaining at most `history_limit` events for watch replay.
    pub fn with_history_limit(history_limit: usize) -> MemoryStore {
        MemoryStore {
            backend: Arc::new(Mutex::new(Backend::new(history_limit))),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// New client of the same store with its own fault switches.
    pub fn client(&self) -> MemoryStore {
        MemoryStore {
            backend: self.backend.clone(),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Makes every call of this client fail, including running keep-alive renewals.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    /// The next `count` watches fail right after they are opened.
    pub fn fail_next_watches(&self, count: usize) {
        self.faults.lock().failing_watches = count;
    }

    pub fn fail_next_gets(&self, count: usize) {
        self.faults.lock().failing_gets = count;
    }

    /// Keep-alive streams opened by this client close after `count` renewals.
    pub fn limit_keep_alive_acks(&self, count: usize) {
        self.faults.lock().keep_alive_ack_limit = Some(count);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().latency = latency;
    }

    /// Leases for which a revoke request reached the store, in arrival order.
    pub fn revoked_leases(&self) -> Vec<LeaseId> {
        self.backend.lock().revoked.clone()
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        let mut backend = self.backend.lock();
        backend.expire_leases(Instant::now());
        backend.keys.get(key).map(|kv| kv.value.clone())
    }

    pub fn current_revision(&self) -> Revision {
        self.backend.lock().revision
    }

    /// Leases granted and neither revoked nor expired, in id order.
    pub fn live_leases(&self) -> Vec<LeaseId> {
        let mut backend = self.backend.lock();
        backend.expire_leases(Instant::now());
        let mut leases: Vec<LeaseId> = backend.leases.keys().cloned().collect();
        leases.sort();
        leases
    }

    pub fn compacted_revision(&self) -> Revision {
        self.backend.lock().compacted
    }

    /// Watches still registered with the store.
    pub fn active_watches(&self) -> usize {
        self.backend.lock().watchers.len()
    }

    /// Expires a lease immediately as if its TTL had run out.
    pub fn expire_lease(&self, lease_id: LeaseId) -> bool {
        let mut backend = self.backend.lock();
        let expired = backend.remove_lease(lease_id);
        if expired {
            info!("Lease {} expired", lease_id);
        }
        expired
    }

    pub fn expire_leases(&self) {
        self.backend.lock().expire_leases(Instant::now());
    }

    /// Expires leases whose TTL passed every `interval` until the worker is terminated.
    pub fn start_lease_reaper(&self, interval: Duration) -> Worker {
        run_worker(
            |(store, interval): (MemoryStore, Duration), ctx: Context| {
                debug!("Lease reaper started");
                while ctx.sleep(interval).is_ok() {
                    store.expire_leases();
                }
                debug!("Lease reaper stopped");
            },
            (self.clone(), interval),
        )
    }

    fn begin(&self, ctx: &Context) -> Result<()> {
        let (unavailable, latency) = {
            let faults = self.faults.lock();
            (faults.unavailable, faults.latency)
        };

        if latency > Duration::from_secs(0) {
            ctx.sleep(latency)?;
        }
        ctx.check()?;

        if unavailable {
            return new_err(ErrorKind::StoreUnavailable, "Store unavailable".to_string(), String::new());
        }
        Ok(())
    }

    fn run_keep_alive(&self, ctx: Context, lease_id: LeaseId, ttl: Duration, renewals_tx: Sender<KeepAliveResponse>) {
        let interval = cmp::max(ttl / 3, Duration::from_millis(5));
        let mut acks = 0;

        loop {
            select!(
                recv(ctx.done()) -> _ => break,
                recv(crossbeam_channel::after(interval)) -> _ => {},
            );

            let (unavailable, ack_limit) = {
                let faults = self.faults.lock();
                (faults.unavailable, faults.keep_alive_ack_limit)
            };
            if unavailable {
                debug!("Keep-alive for lease {} lost the store", lease_id);
                break;
            }
            if let Some(limit) = ack_limit {
                if acks >= limit {
                    debug!("Keep-alive for lease {} stopped after {} renewals", lease_id, acks);
                    break;
                }
            }

            let remaining = self.backend.lock().renew(lease_id);
            let response = KeepAliveResponse {
                lease_id,
                ttl: remaining.unwrap_or_else(|| Duration::from_secs(0)),
            };
            if renewals_tx.send(response).is_err() || remaining.is_none() {
                break;
            }
            acks += 1;
        }

        trace!("Keep-alive stream for lease {} closed", lease_id);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl CoordinationStore for MemoryStore {
    fn grant(&self, ctx: &Context, ttl: Duration) -> Result<LeaseId> {
        self.begin(ctx)?;

        let mut backend = self.backend.lock();
        let now = Instant::now();
        backend.expire_leases(now);

        backend.next_lease_id += 1;
        let lease_id = LeaseId(backend.next_lease_id);
        backend.leases.insert(
            lease_id,
            LeaseEntry {
                ttl,
                expires_at: now + ttl,
                keys: HashSet::new(),
            },
        );

        Ok(lease_id)
    }

    fn revoke(&self, ctx: &Context, lease_id: LeaseId) -> Result<()> {
        self.begin(ctx)?;

        let mut backend = self.backend.lock();
        backend.revoked.push(lease_id);
        backend.expire_leases(Instant::now());

        if !backend.remove_lease(lease_id) {
            return new_err(ErrorKind::LeaseNotFound, format!("Lease {} not found", lease_id), String::new());
        }
        Ok(())
    }

    fn keep_alive(&self, ctx: &Context, lease_id: LeaseId) -> Result<Receiver<KeepAliveResponse>> {
        self.begin(ctx)?;

        let ttl = {
            let mut backend = self.backend.lock();
            backend.expire_leases(Instant::now());
            match backend.leases.get(&lease_id) {
                Some(lease) => lease.ttl,
                None => {
                    return new_err(ErrorKind::LeaseNotFound, format!("Lease {} not found", lease_id), String::new())
                }
            }
        };

        let (renewals_tx, renewals_rx): (Sender<KeepAliveResponse>, Receiver<KeepAliveResponse>) =
            crossbeam_channel::unbounded();
        let store = self.clone();
        let keep_alive_ctx = ctx.clone();
        thread::spawn(move || store.run_keep_alive(keep_alive_ctx, lease_id, ttl, renewals_tx));

        Ok(renewals_rx)
    }

    fn txn(&self, ctx: &Context, request: TxnRequest) -> Result<TxnResponse> {
        self.begin(ctx)?;

        let mut backend = self.backend.lock();
        backend.expire_leases(Instant::now());

        let holds = match &request.compare {
            Compare::CreateRevision(key, revision) => {
                let current = backend
                    .keys
                    .get(key)
                    .map(|kv| kv.create_revision)
                    .unwrap_or(Revision(0));
                current == *revision
            }
        };

        if holds {
            backend.put(request.put.key, request.put.value, request.put.lease)?;
        }

        Ok(TxnResponse {
            succeeded: holds,
            revision: backend.revision,
        })
    }

    fn get(&self, ctx: &Context, key: &str) -> Result<GetResponse> {
        self.begin(ctx)?;

        {
            let mut faults = self.faults.lock();
            if faults.failing_gets > 0 {
                faults.failing_gets -= 1;
                return new_err(ErrorKind::StoreUnavailable, format!("Cannot read key {}", key), String::new());
            }
        }

        let mut backend = self.backend.lock();
        backend.expire_leases(Instant::now());

        Ok(GetResponse {
            revision: backend.revision,
            kv: backend.keys.get(key).cloned(),
        })
    }

    fn watch(&self, ctx: &Context, key: &str, from_revision: Revision) -> Result<Receiver<WatchResponse>> {
        self.begin(ctx)?;

        let (events_tx, events_rx): (Sender<WatchResponse>, Receiver<WatchResponse>) = crossbeam_channel::unbounded();

        let watch_fails = {
            let mut faults = self.faults.lock();
            if faults.failing_watches > 0 {
                faults.failing_watches -= 1;
                true
            } else {
                false
            }
        };
        if watch_fails {
            let err = ElectionError::new(
                ErrorKind::StreamClosed,
                format!("Watch on key {} dropped by the store", key),
                String::new(),
            );
            let _ = events_tx.send(WatchResponse::Failed(err));
            return Ok(events_rx);
        }

        let mut backend = self.backend.lock();
        backend.expire_leases(Instant::now());
        backend.watchers.retain(|watcher| !watcher.ctx.is_done());

        if from_revision <= backend.compacted {
            let err = ElectionError::new(
                ErrorKind::StreamClosed,
                format!("Watch on key {} from revision {} failed", key, from_revision),
                format!("history compacted up to revision {}", backend.compacted),
            );
            let _ = events_tx.send(WatchResponse::Failed(err));
            return Ok(events_rx);
        }

        for event in backend
            .history
            .iter()
            .filter(|event| event.key == key && event.revision >= from_revision)
        {
            let _ = events_tx.send(WatchResponse::Events {
                revision: event.revision,
                events: vec![event.clone()],
            });
        }

        backend.watchers.push(Watcher {
            key: key.to_string(),
            ctx: ctx.clone(),
            events_tx,
        });

        Ok(events_rx)
    }
}

impl Backend {
    fn new(history_limit: usize) -> Backend {
        Backend {
            revision: Revision(1),
            next_lease_id: 0,
            keys: HashMap::new(),
            leases: HashMap::new(),
            history: Vec::new(),
            history_limit: cmp::max(history_limit, 1),
            compacted: Revision(0),
            watchers: Vec::new(),
            revoked: Vec::new(),
        }
    }

    fn put(&mut self, key: String, value: Vec<u8>, lease: Option<LeaseId>) -> Result<()> {
        if let Some(lease_id) = lease {
            if !self.leases.contains_key(&lease_id) {
                return new_err(ErrorKind::LeaseNotFound, format!("Lease {} not found", lease_id), String::new());
            }
        }

        let previous = self.keys.get(&key).cloned();
        if let Some(previous_lease) = previous.as_ref().and_then(|kv| kv.lease) {
            if let Some(entry) = self.leases.get_mut(&previous_lease) {
                entry.keys.remove(&key);
            }
        }

        self.revision = self.revision.next();
        let create_revision = previous.map(|kv| kv.create_revision).unwrap_or(self.revision);
        if let Some(lease_id) = lease {
            if let Some(entry) = self.leases.get_mut(&lease_id) {
                entry.keys.insert(key.clone());
            }
        }

        self.keys.insert(
            key.clone(),
            KeyValue {
                key: key.clone(),
                value,
                create_revision,
                mod_revision: self.revision,
                lease,
            },
        );
        self.notify(WatchEvent {
            kind: EventKind::Put,
            key,
            revision: self.revision,
        });

        Ok(())
    }

    fn delete(&mut self, key: &str) {
        if self.keys.remove(key).is_none() {
            return;
        }

        self.revision = self.revision.next();
        self.notify(WatchEvent {
            kind: EventKind::Delete,
            key: key.to_string(),
            revision: self.revision,
        });
    }

    fn renew(&mut self, lease_id: LeaseId) -> Option<Duration> {
        let now = Instant::now();
        self.expire_leases(now);

        let lease = self.leases.get_mut(&lease_id)?;
        lease.expires_at = now + lease.ttl;
        Some(lease.ttl)
    }

    fn remove_lease(&mut self, lease_id: LeaseId) -> bool {
        let lease = match self.leases.remove(&lease_id) {
            Some(lease) => lease,
            None => return false,
        };

        let mut keys: Vec<String> = lease.keys.into_iter().collect();
        keys.sort();
        for key in keys {
            self.delete(&key);
        }
        true
    }

    fn expire_leases(&mut self, now: Instant) {
        let mut expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(lease_id, _)| *lease_id)
            .collect();
        expired.sort();

        for lease_id in expired {
            debug!("Lease {} reached its TTL", lease_id);
            self.remove_lease(lease_id);
        }
    }

    fn notify(&mut self, event: WatchEvent) {
        self.history.push(event.clone());
        if self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            self.compacted = self.history[excess - 1].revision;
            self.history.drain(..excess);
            trace!("Watch history compacted up to revision {}", self.compacted);
        }

        self.watchers.retain(|watcher| {
            if watcher.ctx.is_done() {
                return false;
            }
            if watcher.key != event.key {
                return true;
            }

            let response = WatchResponse::Events {
                revision: event.revision,
                events: vec![event.clone()],
            };
            watcher.events_tx.send(response).is_ok()
        });
    }
}
