//! Postgres outbox adapter: skip-locked batch claiming, outcome marking,
//! dead-letter inspection/replay, and the per-owner advisory lock.

pub mod lock;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use lock::{OwnerLockGuard, OwnerLocks};
pub use store::OutboxStore;
