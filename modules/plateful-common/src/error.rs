use thiserror::Error;

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Failure taxonomy for event processing. Claim contention is deliberately
/// absent: skip-locked claiming means a contended row is simply not returned.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("source read failed: {0}")]
    SourceRead(#[from] sqlx::Error),

    #[error("graph write failed: {0}")]
    GraphWrite(#[from] neo4rs::Error),

    #[error("unroutable aggregate type: {0}")]
    UnroutableEvent(String),

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Permanent failures are dead-lettered on first sight; retrying cannot
    /// fix them. Everything else is retried with backoff up to the ceiling.
    pub fn is_permanent(&self) -> bool {
        match self {
            SyncError::UnroutableEvent(_) | SyncError::MalformedPayload(_) => true,
            // A constraint violation means the input is corrupt, not that the
            // server is unavailable. Matched on the server error code text so
            // connectivity errors stay retryable.
            SyncError::GraphWrite(e) => e.to_string().contains("ConstraintValidationFailed"),
            SyncError::SourceRead(_) | SyncError::Other(_) => false,
        }
    }
}
