pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Result, SyncError};
pub use types::{
    DesiredEdge, EdgeProps, EventStatus, NewOutboxEvent, Operation, OutboxEvent, Owner,
    OwnerLabel, RelType, AGGREGATE_B2B, AGGREGATE_B2C, SYNCED_AGGREGATE_TYPES,
};
