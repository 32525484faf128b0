use std::time::Duration;

use election_modules::MemoryStore;
use lease_election::ElectionStatus;

use crate::steps;
use crate::steps::RecordingTask;

/// Two instances race for one key; the leader loses the store, its lease expires and the
/// follower takes over.
pub fn run() {
    let store = MemoryStore::new();
    let reaper = store.start_lease_reaper(Duration::from_millis(10));

    let store_a = store.client();
    let task_a = RecordingTask::default();
    let worker_a = steps::start_election(store_a.clone(), "node-a", task_a.clone());
    let term_a = steps::wait_for_leader(&worker_a);

    let task_b = RecordingTask::default();
    let worker_b = steps::start_election(store.client(), "node-b", task_b.clone());
    steps::wait_for("B follows from A's term", Duration::from_secs(2), || {
        worker_b.status() == ElectionStatus::Following(term_a)
    });
    assert_eq!(Some(b"node-a".to_vec()), store.value(steps::LEADER_KEY));

    info!("Partitioning node-a from the store");
    store_a.set_unavailable(true);

    steps::wait_for("A steps down", Duration::from_secs(2), || {
        task_a.cancelled_terms().contains(&term_a)
    });
    let term_b = steps::wait_for_leader(&worker_b);

    assert!(term_b > term_a);
    assert_eq!(Some(b"node-b".to_vec()), store.value(steps::LEADER_KEY));
    assert_eq!(vec![term_a], task_a.started_terms());
    assert_eq!(vec![term_b], task_b.started_terms());

    info!("Reconnecting node-a");
    store_a.set_unavailable(false);
    steps::wait_for("A follows B", Duration::from_secs(2), || match worker_a.status() {
        ElectionStatus::Following(revision) => revision >= term_b,
        _ => false,
    });

    steps::terminate_and_join(worker_a);
    steps::terminate_and_join(worker_b);
    reaper.terminate();
    reaper.join();

    assert_eq!(vec![term_b], task_b.cancelled_terms());
    assert_eq!(None, store.value(steps::LEADER_KEY));
}
