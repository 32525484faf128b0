use rayon::prelude::*;

use election_modules::MemoryStore;
use lease_election::{ClaimOutcome, Context, LeaseId, Revision};

use crate::steps;

const CANDIDATES: u8 = 16;

pub fn run() {
    let store = MemoryStore::new();

    let (first_term, first_lease) = claim_concurrently(&store, Revision(0));
    assert_eq!(CANDIDATES as usize - 1, store.revoked_leases().len());
    assert!(!store.revoked_leases().contains(&first_lease));

    // the key opens again only once the winner's lease is gone
    store.expire_lease(first_lease);
    assert_eq!(None, store.value(steps::LEADER_KEY));

    let (second_term, _) = claim_concurrently(&store, first_term);
    assert!(second_term > first_term);
}

fn claim_concurrently(store: &MemoryStore, previous_term: Revision) -> (Revision, LeaseId) {
    let campaign = steps::campaign(store);

    let outcomes: Vec<ClaimOutcome> = (0..CANDIDATES)
        .into_par_iter()
        .map(|candidate| {
            campaign
                .claim(&Context::new(), steps::LEADER_KEY, &[candidate], steps::lease_ttl() * 10)
                .expect("claim evaluated")
        })
        .collect();

    let winners: Vec<(Revision, LeaseId)> = outcomes
        .iter()
        .filter_map(|outcome| match *outcome {
            ClaimOutcome::Won { lease_id, term } => Some((term, lease_id)),
            ClaimOutcome::Lost { .. } => None,
        })
        .collect();
    assert_eq!(1, winners.len(), "exactly one candidate wins");

    let (term, lease_id) = winners[0];
    assert!(term > previous_term);
    for lost in outcomes.iter().filter(|outcome| !outcome.won()) {
        assert!(lost.revision() >= term, "lost claim observed the winner's key");
    }

    info!("Concurrent claims: term {} won by one of {} candidates", term, CANDIDATES);
    (term, lease_id)
}
