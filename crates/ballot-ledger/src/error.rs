use ballot_store::StoreError;
use ballot_types::{TargetId, VoteKey, VoterId};

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("voter not found: {0}")]
    VoterNotFound(VoterId),

    #[error("target not found: {0}")]
    TargetNotFound(TargetId),

    /// Concurrent writers kept winning the race for this pair.
    #[error("vote {key} still contended after {attempts} attempts")]
    Contended { key: VoteKey, attempts: u32 },

    /// The caller's deadline passed before the write was committed.
    #[error("deadline exceeded before the vote was committed")]
    DeadlineExceeded,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    /// Whether the same call may succeed if repeated later.
    ///
    /// Unknown voters and targets are client errors and never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::VoterNotFound(_) | Self::TargetNotFound(_) => false,
            Self::Contended { .. } | Self::DeadlineExceeded => true,
            Self::Storage(e) => !matches!(e, StoreError::Serialization(_)),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
