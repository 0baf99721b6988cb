//! Outbox-driven synchronization worker: claims interaction events from the
//! relational outbox and rebuilds the affected user's edge set in the graph.

pub mod b2b;
pub mod b2c;
pub mod completion;
pub mod router;
pub mod source;
pub mod worker;

pub use completion::CompletionTracker;
pub use router::Router;
pub use worker::SyncWorker;
