use std::time::Duration;

use election_modules::MemoryStore;
use lease_election::ElectionStatus;

use crate::steps;
use crate::steps::RecordingTask;

pub fn run() {
    let store = MemoryStore::new();
    let client = store.client();
    client.set_unavailable(true);
    let task = RecordingTask::default();

    let worker = steps::start_election(client.clone(), "node-a", task.clone());

    steps::sleep_ms(100);
    assert_eq!(ElectionStatus::Electing, worker.status());
    assert!(task.started_terms().is_empty());

    // store reachable again, but slower than the lease timeout
    client.set_latency(Duration::from_millis(400));
    client.set_unavailable(false);
    steps::sleep_ms(100);
    assert_eq!(ElectionStatus::Electing, worker.status());

    client.set_latency(Duration::from_millis(0));
    let term = steps::wait_for_leader(&worker);
    assert_eq!(Some(b"node-a".to_vec()), store.value(steps::LEADER_KEY));

    steps::terminate_and_join(worker);
    assert_eq!(vec![term], task.cancelled_terms());
}
