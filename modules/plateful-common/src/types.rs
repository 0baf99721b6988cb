//! Shared domain types: outbox events, graph owners, relationship types and
//! the desired-edge model exchanged between pipelines and the graph writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Aggregate type handled by the B2C pipeline.
pub const AGGREGATE_B2C: &str = "b2c_interaction";
/// Aggregate type handled by the B2B pipeline.
pub const AGGREGATE_B2B: &str = "b2b_interaction";
/// The aggregate types this worker claims from the outbox. Everything else
/// stays in the table for other consumers.
pub const SYNCED_AGGREGATE_TYPES: &[&str] = &[AGGREGATE_B2C, AGGREGATE_B2B];

/// Upstream state-change kind recorded on an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upsert,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "upsert" | "insert" | "update" => Some(Operation::Upsert),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// Lifecycle status of an outbox event. Transitions are monotonic:
/// pending -> claimed -> (done | failed -> ... -> dead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Claimed,
    Done,
    Failed,
    Dead,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Claimed => "claimed",
            EventStatus::Done => "done",
            EventStatus::Failed => "failed",
            EventStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EventStatus::Pending),
            "claimed" => Some(EventStatus::Claimed),
            "done" => Some(EventStatus::Done),
            "failed" => Some(EventStatus::Failed),
            "dead" => Some(EventStatus::Dead),
            _ => None,
        }
    }
}

/// One row of the `outbox_events` table, as claimed by a worker.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: i64,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub source_table: String,
    /// Raw operation string; parse via [`OutboxEvent::operation`] so unknown
    /// values surface as a malformed-payload error instead of a panic.
    pub operation: String,
    pub payload: Option<serde_json::Value>,
    pub status: EventStatus,
    pub attempt_count: i32,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn operation(&self) -> Result<Operation, SyncError> {
        Operation::parse(&self.operation).ok_or_else(|| {
            SyncError::MalformedPayload(format!(
                "unknown operation {:?} on event {}",
                self.operation, self.id
            ))
        })
    }
}

/// Insert parameters for a new outbox event. Upstream writers (and tests)
/// enqueue with this; the worker itself only updates status and lease fields.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub source_table: String,
    pub operation: Operation,
    pub payload: Option<serde_json::Value>,
}

/// Node label of an edge-owning user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerLabel {
    B2CCustomer,
    VendorUser,
}

impl OwnerLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerLabel::B2CCustomer => "B2CCustomer",
            OwnerLabel::VendorUser => "VendorUser",
        }
    }
}

/// An edge-owning node with the properties set on upsert.
#[derive(Debug, Clone)]
pub enum Owner {
    Customer {
        id: String,
        email: Option<String>,
        full_name: Option<String>,
        updated_at: Option<DateTime<Utc>>,
    },
    VendorUser {
        id: String,
        email: Option<String>,
        role: Option<String>,
        updated_at: Option<DateTime<Utc>>,
    },
}

impl Owner {
    pub fn label(&self) -> OwnerLabel {
        match self {
            Owner::Customer { .. } => OwnerLabel::B2CCustomer,
            Owner::VendorUser { .. } => OwnerLabel::VendorUser,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Owner::Customer { id, .. } => id,
            Owner::VendorUser { id, .. } => id,
        }
    }
}

/// Relationship types owned by synced users. At most one edge of a given type
/// exists between an owner and a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelType {
    Viewed,
    Cooked,
    Saved,
    Rated,
    ViewedProduct,
    Purchased,
    SavedProduct,
    RatedProduct,
    ApprovedMatch,
    RejectedMatch,
}

impl RelType {
    /// All relationship types a B2C customer owns.
    pub const B2C_SCOPE: [RelType; 8] = [
        RelType::Viewed,
        RelType::Cooked,
        RelType::Saved,
        RelType::Rated,
        RelType::ViewedProduct,
        RelType::Purchased,
        RelType::SavedProduct,
        RelType::RatedProduct,
    ];

    /// All relationship types a vendor user owns.
    pub const B2B_SCOPE: [RelType; 3] = [
        RelType::ViewedProduct,
        RelType::ApprovedMatch,
        RelType::RejectedMatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::Viewed => "VIEWED",
            RelType::Cooked => "COOKED",
            RelType::Saved => "SAVED",
            RelType::Rated => "RATED",
            RelType::ViewedProduct => "VIEWED_PRODUCT",
            RelType::Purchased => "PURCHASED",
            RelType::SavedProduct => "SAVED_PRODUCT",
            RelType::RatedProduct => "RATED_PRODUCT",
            RelType::ApprovedMatch => "APPROVED_MATCH",
            RelType::RejectedMatch => "REJECTED_MATCH",
        }
    }

    /// Label of the node this relationship points at.
    pub fn target_label(&self) -> &'static str {
        match self {
            RelType::Viewed | RelType::Cooked | RelType::Saved | RelType::Rated => "Recipe",
            _ => "Product",
        }
    }
}

/// Properties carried on a rewritten edge. Absent fields end up absent on the
/// edge: the writer replaces the property map wholesale, never merges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeProps {
    pub count: Option<i64>,
    pub last_at: Option<DateTime<Utc>>,
    pub rating: Option<i64>,
    pub first_saved_at: Option<DateTime<Utc>>,
    pub quantity_total: Option<i64>,
    pub price_total: Option<f64>,
    pub source_product_id: Option<String>,
    pub reason: Option<String>,
}

/// One edge the graph should contain after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredEdge {
    pub target_id: String,
    pub rel: RelType,
    pub props: EdgeProps,
}
