use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::context::Context;
use crate::errors::{new_err, ErrorKind, Result};
use crate::store::{
    CoordinationStore, GetResponse, KeepAliveResponse, LeaseId, Revision, TxnRequest, TxnResponse, WatchResponse,
};

/// Scripted store: answers are configured up front, calls are recorded.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockStore {
    pub state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub next_lease: i64,
    pub grant_error: Option<ErrorKind>,
    pub txn_result: Option<Result<TxnResponse>>,
    pub txn_calls: usize,
    pub revoked: Vec<LeaseId>,
    pub keep_alive_acks: Vec<Duration>,
    pub keep_alive_open: bool,
    pub watch_scripts: VecDeque<Vec<WatchResponse>>,
    pub watch_open: bool,
    pub get_results: VecDeque<Result<GetResponse>>,
    pub get_calls: usize,
    open_keep_alives: Vec<Sender<KeepAliveResponse>>,
    open_watches: Vec<Sender<WatchResponse>>,
}

impl MockStore {
    pub fn new() -> MockStore {
        MockStore::default()
    }

    pub fn revoked(&self) -> Vec<LeaseId> {
        self.state.lock().revoked.clone()
    }
}

impl CoordinationStore for MockStore {
    fn grant(&self, ctx: &Context, _ttl: Duration) -> Result<LeaseId> {
        ctx.check()?;
        let mut state = self.state.lock();
        if let Some(kind) = state.grant_error {
            return new_err(kind, "Cannot grant lease".to_string(), String::new());
        }

        state.next_lease += 1;
        Ok(LeaseId(state.next_lease))
    }

    fn revoke(&self, ctx: &Context, lease_id: LeaseId) -> Result<()> {
        ctx.check()?;
        self.state.lock().revoked.push(lease_id);
        Ok(())
    }

    fn keep_alive(&self, ctx: &Context, lease_id: LeaseId) -> Result<Receiver<KeepAliveResponse>> {
        ctx.check()?;
        let mut state = self.state.lock();
        let (tx, rx): (Sender<KeepAliveResponse>, Receiver<KeepAliveResponse>) = crossbeam_channel::unbounded();
        for ttl in state.keep_alive_acks.iter() {
            let _ = tx.send(KeepAliveResponse { lease_id, ttl: *ttl });
        }
        if state.keep_alive_open {
            state.open_keep_alives.push(tx);
        }

        Ok(rx)
    }

    fn txn(&self, ctx: &Context, _request: TxnRequest) -> Result<TxnResponse> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.txn_calls += 1;

        state.txn_result.clone().unwrap_or(Ok(TxnResponse {
            succeeded: true,
            revision: Revision(1),
        }))
    }

    fn get(&self, ctx: &Context, _key: &str) -> Result<GetResponse> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.get_calls += 1;

        state.get_results.pop_front().unwrap_or(Ok(GetResponse {
            revision: Revision(1),
            kv: None,
        }))
    }

    fn watch(&self, ctx: &Context, _key: &str, _from_revision: Revision) -> Result<Receiver<WatchResponse>> {
        ctx.check()?;
        let mut state = self.state.lock();
        let script = match state.watch_scripts.pop_front() {
            Some(script) => script,
            None => return new_err(ErrorKind::StoreUnavailable, "Cannot watch".to_string(), String::new()),
        };

        let (tx, rx): (Sender<WatchResponse>, Receiver<WatchResponse>) = crossbeam_channel::unbounded();
        for response in script {
            let _ = tx.send(response);
        }
        if state.watch_open {
            state.open_watches.push(tx);
        }

        Ok(rx)
    }
}
