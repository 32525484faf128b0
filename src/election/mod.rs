use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::common::{self, Winner, Worker};
use crate::context::Context;
use crate::errors::Result;
use crate::leadership::campaign::{Campaign, ClaimOutcome};
use crate::leadership::follower::FollowerMonitor;
use crate::leadership::lease::LeaseManager;
use crate::leadership::{ElectionStatus, LeaderTask, RetryTimer, StatusReader};
use crate::store::{CoordinationStore, LeaseId, Revision, Term};

pub mod configuration;


use configuration::ElectionConfiguration;

/// Cycles one election instance through electing, leading and following until cancelled.
pub struct ElectionStateMachine<S, T, Rt>
where
    S: CoordinationStore,
    T: LeaderTask,
    Rt: RetryTimer,
{
    leader_key: String,
    identity: Vec<u8>,
    lease_ttl: Duration,
    leader_task: T,
    retry_timer: Rt,
    lease_manager: LeaseManager<S>,
    campaign: Campaign<S>,
    follower: FollowerMonitor<S, Rt>,
    status: Arc<RwLock<ElectionStatus>>,
}

impl<S, T, Rt> ElectionStateMachine<S, T, Rt>
where
    S: CoordinationStore,
    T: LeaderTask,
    Rt: RetryTimer,
{
    pub fn new(config: ElectionConfiguration<S, T, Rt>) -> Result<ElectionStateMachine<S, T, Rt>> {
        config.validate()?;

        let lease_manager = LeaseManager::new(config.store.clone(), config.timings.lease_timeout);
        let campaign = Campaign::new(
            config.store.clone(),
            lease_manager.clone(),
            config.timings.store_timeout,
        );
        let follower = FollowerMonitor::new(
            config.store,
            config.timings.store_timeout,
            config.retry_timer.clone(),
        );

        Ok(ElectionStateMachine {
            leader_key: config.leader_key,
            identity: config.identity,
            lease_ttl: config.lease_ttl,
            leader_task: config.leader_task,
            retry_timer: config.retry_timer,
            lease_manager,
            campaign,
            follower,
            status: Arc::new(RwLock::new(ElectionStatus::Electing)),
        })
    }

    pub fn status_reader(&self) -> StatusReader {
        StatusReader::new(self.status.clone())
    }

    /// Blocks until `ctx` ends. Store faults and lease loss are retried internally; when the
    /// call returns, no lease acquired by it is left alive and no leader task is running.
    pub fn run(&self, ctx: &Context) {
        info!("Election for key {} started", self.leader_key);
        loop {
            if let Some(err) = ctx.err() {
                debug!("Election for key {} ends: {}", self.leader_key, err);
                break;
            }

            self.set_status(ElectionStatus::Electing);
            let claim_result = self
                .campaign
                .claim(ctx, &self.leader_key, &self.identity, self.lease_ttl);

            let outcome = match claim_result {
                Ok(outcome) => outcome,
                Err(err) => {
                    if ctx.err().is_some() {
                        break;
                    }

                    warn!("Campaign for key {} failed: {}", self.leader_key, err);
                    if ctx.sleep(self.retry_timer.next_retry_timeout()).is_err() {
                        break;
                    }
                    continue;
                }
            };

            match outcome {
                ClaimOutcome::Won { lease_id, term } => self.lead(ctx, lease_id, term),
                ClaimOutcome::Lost { revision } => {
                    if let Err(err) = self.follow(ctx, revision) {
                        debug!("Following key {} ends: {}", self.leader_key, err);
                        break;
                    }
                }
            }
        }

        self.set_status(ElectionStatus::Stopped);
        info!("Election for key {} stopped", self.leader_key);
    }

    fn lead(&self, ctx: &Context, lease_id: LeaseId, term: Term) {
        self.set_status(ElectionStatus::Leading(term));

        let outcome = common::race(
            ctx,
            |scope| self.leader_task.start(scope, term),
            |scope| self.lease_manager.keep_alive(scope, lease_id),
        );

        match (outcome.winner, outcome.second) {
            (Winner::First, _) => info!("Leader task for term {} finished, stepping down", term),
            (Winner::Second, Some(err)) => info!("Leadership for term {} lost: {}", term, err),
            (Winner::Second, None) => error!("Keep-alive for lease {} aborted", lease_id),
        }

        self.lease_manager.revoke_quietly(lease_id);
    }

    fn follow(&self, ctx: &Context, revision: Revision) -> Result<()> {
        self.set_status(ElectionStatus::Following(revision));

        self.follower.wait_until_open(ctx, &self.leader_key, revision)
    }

    fn set_status(&self, status: ElectionStatus) {
        let mut current = self.status.write();
        if *current != status {
            info!("Election for key {}: {} -> {}", self.leader_key, *current, status);
            *current = status;
        }
    }
}

impl<S, T, Rt> fmt::Debug for ElectionStateMachine<S, T, Rt>
where
    S: CoordinationStore,
    T: LeaderTask,
    Rt: RetryTimer,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ElectionStateMachine")
            .field("leader_key", &self.leader_key)
            .field("lease_ttl", &self.lease_ttl)
            .field("status", &*self.status.read())
            .finish()
    }
}

/// Election state machine running on its own thread.
#[derive(Debug)]
pub struct ElectionWorker {
    worker: Worker,
    status: StatusReader,
}

impl ElectionWorker {
    pub fn status(&self) -> ElectionStatus {
        self.status.status()
    }

    pub fn status_reader(&self) -> StatusReader {
        self.status.clone()
    }

    /// Cancels the election. The worker steps down and revokes its lease before exiting.
    pub fn terminate(&self) {
        self.worker.terminate();
    }

    pub fn join(self) {
        self.worker.join();
    }

    /// Hands the underlying worker over, e.g. to stop several elections through a `WorkerPool`.
    pub fn into_worker(self) -> Worker {
        self.worker
    }
}

pub fn start<S, T, Rt>(config: ElectionConfiguration<S, T, Rt>) -> Result<ElectionWorker>
where
    S: CoordinationStore,
    T: LeaderTask,
    Rt: RetryTimer,
{
    let state_machine = ElectionStateMachine::new(config)?;
    let status = state_machine.status_reader();

    let worker = common::run_worker(
        |state_machine: ElectionStateMachine<S, T, Rt>, ctx: Context| state_machine.run(&ctx),
        state_machine,
    );

    Ok(ElectionWorker { worker, status })
}
