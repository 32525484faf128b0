#[macro_use]
extern crate log;
extern crate chrono;
extern crate env_logger;

extern crate election_modules;
extern crate lease_election;

use std::io::Write;
use std::thread;
use std::time::Duration;

use chrono::prelude::{DateTime, Local};

use election_modules::{MemoryStore, RandomizedRetryTimer};
use lease_election::{Context, ElectionConfiguration, ElectionTimings, ElectionWorker, Term, WorkerPool};

fn init_logger() {
    env_logger::builder()
        .format(|buf, record| {
            let now: DateTime<Local> = Local::now();
            writeln!(buf, "{:5}: {} - {}", record.level(), now.format("%H:%M:%S.%3f").to_string(), record.args())
        })
        .init();
}

fn main() {
    init_logger();

    let store = MemoryStore::new();
    let reaper = store.start_lease_reaper(Duration::from_millis(100));

    info!("Starting election nodes");
    let mut nodes: Vec<(u64, ElectionWorker)> = (1..=3)
        .map(|node_id| (node_id, start_node(node_id, store.client())))
        .collect();

    // hand leadership over by stopping whoever leads
    for _ in 0..2 {
        thread::sleep(Duration::from_secs(3));

        let leader_position = nodes.iter().position(|(_, worker)| worker.status().is_leader());
        if let Some(position) = leader_position {
            let (node_id, worker) = nodes.remove(position);
            info!("Stopping leader node {}", node_id);
            worker.terminate();
            worker.join();
        }
    }

    thread::sleep(Duration::from_secs(3));
    for (node_id, worker) in &nodes {
        info!("Node {} status: {}", node_id, worker.status());
    }

    let mut workers = WorkerPool::new(nodes.into_iter().map(|(_, worker)| worker.into_worker()).collect());
    workers.push(reaper);
    workers.terminate();
    workers.join();

    info!("Server stopped");
}

fn start_node(node_id: u64, store: MemoryStore) -> ElectionWorker {
    let leader_task = move |ctx: &Context, term: Term| {
        info!("Node {} leads in term {}", node_id, term);
        while ctx.sleep(Duration::from_millis(500)).is_ok() {
            trace!("Node {} does leader-only work in term {}", node_id, term);
        }
        info!("Node {} stops leading in term {}", node_id, term);
    };

    let config = ElectionConfiguration {
        leader_key: "demo/leader".to_string(),
        identity: format!("node-{}", node_id).into_bytes(),
        lease_ttl: Duration::from_secs(2),
        store,
        leader_task,
        retry_timer: RandomizedRetryTimer::new(Duration::from_millis(200), Duration::from_millis(400)),
        timings: ElectionTimings::default(),
    };

    match lease_election::start_election(config) {
        Ok(worker) => worker,
        Err(err) => panic!("Cannot start node {}: {}", node_id, err),
    }
}
