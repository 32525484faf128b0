//! # Election test cases
//!
//! Integration cases for the lease-based election, run against the in-memory store.

#[macro_use]
extern crate log;
pub mod cases;
mod steps;
