//! Test doubles for the tax analysis ports. Not intended for production use.

pub mod db;
pub mod fixtures;

pub use db::{Failures, InMemoryDatabase, Interference, State};
pub use fixtures::analysis_payload;
