//! Login attempt tracking module.
//!
//! Counts failed logins per email and per client IP inside a sliding window
//! and locks either identifier out once it crosses its limit.

mod redis_store;
mod store;
mod sweeper;
mod tracker;

pub use redis_store::RedisStore;
pub use store::{AttemptStore, MemoryStore};
pub use sweeper::sweeper_worker;
pub use tracker::{LockoutPolicy, LoginTracker};
