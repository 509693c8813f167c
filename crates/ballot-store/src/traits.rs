//! The [`VoteStore`] trait defining the vote persistence interface.
//!
//! Any backend (in-memory, log-structured, database) implements this trait to
//! provide keyed vote storage for the ledger.

use ballot_types::{Direction, TargetId, Vote, VoteKey, VoterId};

use crate::error::StoreResult;

/// Keyed storage for settled votes.
///
/// Implementations must be thread-safe (`Send + Sync`) and satisfy these
/// invariants:
/// - At most one vote exists per [`VoteKey`].
/// - Each mutating call is atomic and either fully applies or returns an
///   error with no state change.
/// - Scans never observe a partially applied mutation.
pub trait VoteStore: Send + Sync {
    /// Read the vote for a key.
    ///
    /// Returns `Ok(None)` if the voter holds no vote on the target.
    fn get(&self, key: &VoteKey) -> StoreResult<Option<Vote>>;

    /// Insert a new vote.
    ///
    /// Fails with [`StoreError::Conflict`](crate::StoreError::Conflict) if a
    /// vote already exists for the key.
    fn insert(&self, vote: &Vote) -> StoreResult<()>;

    /// Set the direction of an existing vote in place.
    ///
    /// Fails with `Conflict` if no vote exists for the key.
    fn update(&self, key: &VoteKey, direction: Direction) -> StoreResult<()>;

    /// Delete a vote. Returns `true` if the vote existed.
    fn delete(&self, key: &VoteKey) -> StoreResult<bool>;

    /// All votes on a target, ordered by voter.
    fn scan_target(&self, target: &TargetId) -> StoreResult<Vec<Vote>>;

    /// All votes cast by a voter, ordered by target.
    fn scan_voter(&self, voter: &VoterId) -> StoreResult<Vec<Vote>>;

    /// Remove every vote cast by a voter. Returns the number removed.
    fn purge_voter(&self, voter: &VoterId) -> StoreResult<usize>;

    /// Remove every vote on a target. Returns the number removed.
    fn purge_target(&self, target: &TargetId) -> StoreResult<usize>;

    /// Total number of stored votes.
    fn len(&self) -> StoreResult<usize>;

    /// Returns `true` if the store holds no votes.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}
