//! Dispatch by aggregate type. Pure classification: an unrecognized type is a
//! permanent failure, since retrying cannot fix a classification the system
//! does not know.

use plateful_common::{OutboxEvent, SyncError, AGGREGATE_B2B, AGGREGATE_B2C};

use crate::b2b::B2BPipeline;
use crate::b2c::B2CPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    B2C,
    B2B,
}

pub fn route(aggregate_type: &str) -> Option<Route> {
    match aggregate_type {
        AGGREGATE_B2C => Some(Route::B2C),
        AGGREGATE_B2B => Some(Route::B2B),
        _ => None,
    }
}

pub struct Router {
    b2c: B2CPipeline,
    b2b: B2BPipeline,
}

impl Router {
    pub fn new(b2c: B2CPipeline, b2b: B2BPipeline) -> Self {
        Self { b2c, b2b }
    }

    pub async fn dispatch(&self, event: &OutboxEvent) -> Result<(), SyncError> {
        match route(&event.aggregate_type) {
            Some(Route::B2C) => self.b2c.process(event).await,
            Some(Route::B2B) => self.b2b.process(event).await,
            None => Err(SyncError::UnroutableEvent(event.aggregate_type.clone())),
        }
    }
}
