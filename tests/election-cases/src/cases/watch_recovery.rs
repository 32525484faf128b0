use std::thread;
use std::time::Duration;

use election_modules::MemoryStore;
use lease_election::{ClaimOutcome, Context, CoordinationStore, FollowerMonitor};

use crate::steps;

pub fn run() {
    let store = MemoryStore::new();
    let (holder_lease, holder_term) = match steps::campaign(&store)
        .claim(&Context::new(), steps::LEADER_KEY, b"holder", Duration::from_secs(30))
        .expect("claim evaluated")
    {
        ClaimOutcome::Won { lease_id, term } => (lease_id, term),
        ClaimOutcome::Lost { .. } => panic!("fresh key must be claimable"),
    };

    // every watch of the follower dies right away, and the first reads fail too
    let follower_store = store.client();
    follower_store.fail_next_watches(usize::MAX);
    follower_store.fail_next_gets(3);

    let (open_tx, open_rx) = crossbeam_channel::bounded(1);
    let handle = thread::spawn(move || {
        let monitor = FollowerMonitor::new(follower_store, steps::timings().store_timeout, steps::retry_timer());
        let result = monitor.wait_until_open(&Context::new(), steps::LEADER_KEY, holder_term);
        open_tx.send(result.is_ok()).expect("can report result");
    });

    steps::sleep_ms(100);
    assert!(open_rx.try_recv().is_err(), "key is still held");

    store
        .revoke(&Context::new(), holder_lease)
        .expect("holder lease revoked");

    let open = open_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("deletion detected by polling");
    assert!(open);
    handle.join().expect("follower finished");
}
