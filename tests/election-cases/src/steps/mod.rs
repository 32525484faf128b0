use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use election_modules::{FixedRetryTimer, MemoryStore};
use lease_election::{
    Campaign, Context, ElectionConfiguration, ElectionStatus, ElectionTimings, ElectionWorker, LeaderTask,
    LeaseManager, Term,
};

pub const LEADER_KEY: &str = "svc/leader";

pub fn lease_ttl() -> Duration {
    Duration::from_millis(300)
}

pub fn timings() -> ElectionTimings {
    ElectionTimings {
        lease_timeout: Duration::from_millis(200),
        store_timeout: Duration::from_millis(200),
    }
}

pub fn retry_timer() -> FixedRetryTimer {
    FixedRetryTimer::new(Duration::from_millis(20))
}

pub fn sleep_ms(milliseconds: u64) {
    thread::sleep(Duration::from_millis(milliseconds));
}

pub fn campaign(store: &MemoryStore) -> Campaign<MemoryStore> {
    let lease_manager = LeaseManager::new(store.clone(), timings().lease_timeout);
    Campaign::new(store.clone(), lease_manager, timings().store_timeout)
}

pub fn election_configuration(
    store: MemoryStore,
    identity: &str,
    leader_task: RecordingTask,
) -> ElectionConfiguration<MemoryStore, RecordingTask, FixedRetryTimer> {
    ElectionConfiguration {
        leader_key: LEADER_KEY.to_string(),
        identity: identity.as_bytes().to_vec(),
        lease_ttl: lease_ttl(),
        store,
        leader_task,
        retry_timer: retry_timer(),
        timings: timings(),
    }
}

pub fn start_election(store: MemoryStore, identity: &str, leader_task: RecordingTask) -> ElectionWorker {
    let config = election_configuration(store, identity, leader_task);
    lease_election::start_election(config).expect("valid election configuration")
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub fn wait_for<F: Fn() -> bool>(description: &str, timeout: Duration, condition: F) {
    let started = Instant::now();
    while !condition() {
        if started.elapsed() > timeout {
            panic!("Timed out waiting for: {}", description);
        }
        thread::sleep(Duration::from_millis(5));
    }
    trace!("Reached: {} in {:?}", description, started.elapsed());
}

pub fn wait_for_leader(worker: &ElectionWorker) -> Term {
    wait_for("instance leads", Duration::from_secs(3), || worker.status().is_leader());

    match worker.status() {
        ElectionStatus::Leading(term) => term,
        status => panic!("Leader expected, got {}", status),
    }
}

/// Joins the worker and returns how long the join took.
pub fn terminate_and_join(worker: ElectionWorker) -> Duration {
    let started = Instant::now();
    worker.terminate();
    worker.join();
    started.elapsed()
}

#[derive(Debug, Default)]
pub struct TaskRecord {
    pub started_terms: Vec<Term>,
    pub cancelled_terms: Vec<Term>,
}

/// Leader task recording the terms it ran for and the terms it observed cancellation in.
#[derive(Clone, Debug, Default)]
pub struct RecordingTask {
    record: Arc<Mutex<TaskRecord>>,
}

impl RecordingTask {
    pub fn started_terms(&self) -> Vec<Term> {
        self.record.lock().started_terms.clone()
    }

    pub fn cancelled_terms(&self) -> Vec<Term> {
        self.record.lock().cancelled_terms.clone()
    }
}

impl LeaderTask for RecordingTask {
    fn start(&self, ctx: &Context, term: Term) {
        info!("Leader task started for term {}", term);
        self.record.lock().started_terms.push(term);

        ctx.done().recv().ok();

        info!("Leader task cancelled for term {}", term);
        self.record.lock().cancelled_terms.push(term);
    }
}
