use ballot_types::VoteKey;

/// Errors from vote store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write lost a race: the row already exists on insert, or vanished
    /// before an update or delete.
    #[error("write conflict on vote {key}")]
    Conflict { key: VoteKey },

    /// The backend cannot serve requests (poisoned lock, closed log).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
