//! Existence checks for the two sides of a vote.
//!
//! Voters and targets are owned by other services. The ledger only asks
//! whether an identifier resolves before recording a vote, through the
//! [`VoterDirectory`] and [`TargetDirectory`] traits.

use std::collections::HashSet;
use std::sync::RwLock;

use ballot_types::{TargetId, VoterId};

use crate::error::{StoreError, StoreResult};

/// Resolves voter identifiers.
pub trait VoterDirectory: Send + Sync {
    fn voter_exists(&self, voter: &VoterId) -> StoreResult<bool>;
}

/// Resolves target identifiers.
pub trait TargetDirectory: Send + Sync {
    fn target_exists(&self, target: &TargetId) -> StoreResult<bool>;
}

/// A directory that resolves every identifier.
///
/// Used by operator tooling where identity is enforced upstream.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenDirectory;

impl VoterDirectory for OpenDirectory {
    fn voter_exists(&self, _voter: &VoterId) -> StoreResult<bool> {
        Ok(true)
    }
}

impl TargetDirectory for OpenDirectory {
    fn target_exists(&self, _target: &TargetId) -> StoreResult<bool> {
        Ok(true)
    }
}

/// In-memory registry of known voters and targets.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    voters: RwLock<HashSet<VoterId>>,
    targets: RwLock<HashSet<TargetId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a voter. Returns `false` if it was already known.
    pub fn add_voter(&self, voter: VoterId) -> StoreResult<bool> {
        let mut voters = self
            .voters
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(voters.insert(voter))
    }

    /// Register a target. Returns `false` if it was already known.
    pub fn add_target(&self, target: TargetId) -> StoreResult<bool> {
        let mut targets = self
            .targets
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(targets.insert(target))
    }

    pub fn remove_voter(&self, voter: &VoterId) -> StoreResult<bool> {
        let mut voters = self
            .voters
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(voters.remove(voter))
    }

    pub fn remove_target(&self, target: &TargetId) -> StoreResult<bool> {
        let mut targets = self
            .targets
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(targets.remove(target))
    }
}

impl VoterDirectory for InMemoryDirectory {
    fn voter_exists(&self, voter: &VoterId) -> StoreResult<bool> {
        let voters = self
            .voters
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(voters.contains(voter))
    }
}

impl TargetDirectory for InMemoryDirectory {
    fn target_exists(&self, target: &TargetId) -> StoreResult<bool> {
        let targets = self
            .targets
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(targets.contains(target))
    }
}
