#[macro_use]
extern crate log;
#[macro_use]
extern crate crossbeam_channel;
extern crate lease_election;

mod memory_store;
mod retry;

pub use memory_store::MemoryStore;
pub use retry::fixed_retry_timer::FixedRetryTimer;
pub use retry::randomized_retry_timer::RandomizedRetryTimer;
