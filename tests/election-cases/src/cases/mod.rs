pub mod leader_handoff;
pub mod mutual_exclusion;
pub mod transient_errors;
pub mod watch_recovery;
