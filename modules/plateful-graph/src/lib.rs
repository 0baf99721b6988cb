//! Neo4j side of the sync: connection handling, the transactional edge-set
//! writer, and read helpers for inspection and tests.

pub mod client;
pub mod reader;
pub mod writer;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use reader::{EdgeSummary, GraphReader};
pub use writer::GraphWriter;
