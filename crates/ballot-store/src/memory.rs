//! In-memory vote store for testing and ephemeral use.
//!
//! [`InMemoryVoteStore`] keeps every vote in a [`VoteIndex`] protected by a
//! `RwLock`. Writers hold the lock only for the duration of a single keyed
//! mutation, so votes on unrelated pairs never wait on each other for longer
//! than one map operation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use ballot_types::{Direction, TargetId, Vote, VoteKey, VoterId};

use crate::error::{StoreError, StoreResult};
use crate::traits::VoteStore;

/// Primary map keyed by `(voter, target)` plus a target-side secondary index
/// for tally scans.
#[derive(Debug, Default)]
pub(crate) struct VoteIndex {
    rows: BTreeMap<VoteKey, Direction>,
    by_target: BTreeMap<TargetId, BTreeSet<VoterId>>,
}

impl VoteIndex {
    pub(crate) fn get(&self, key: &VoteKey) -> Option<Vote> {
        self.rows
            .get(key)
            .map(|direction| Vote::new(key.voter, key.target, *direction))
    }

    pub(crate) fn contains(&self, key: &VoteKey) -> bool {
        self.rows.contains_key(key)
    }

    pub(crate) fn insert(&mut self, vote: &Vote) -> StoreResult<()> {
        let key = vote.key();
        if self.rows.contains_key(&key) {
            return Err(StoreError::Conflict { key });
        }
        self.put(vote);
        Ok(())
    }

    pub(crate) fn update(&mut self, key: &VoteKey, direction: Direction) -> StoreResult<()> {
        match self.rows.get_mut(key) {
            Some(current) => {
                *current = direction;
                Ok(())
            }
            None => Err(StoreError::Conflict { key: *key }),
        }
    }

    /// Unconditional upsert, used when replaying a log.
    pub(crate) fn put(&mut self, vote: &Vote) {
        self.rows.insert(vote.key(), vote.direction);
        self.by_target
            .entry(vote.target)
            .or_default()
            .insert(vote.voter);
    }

    pub(crate) fn remove(&mut self, key: &VoteKey) -> bool {
        if self.rows.remove(key).is_none() {
            return false;
        }
        if let Some(voters) = self.by_target.get_mut(&key.target) {
            voters.remove(&key.voter);
            if voters.is_empty() {
                self.by_target.remove(&key.target);
            }
        }
        true
    }

    pub(crate) fn scan_target(&self, target: &TargetId) -> Vec<Vote> {
        let Some(voters) = self.by_target.get(target) else {
            return Vec::new();
        };
        voters
            .iter()
            .filter_map(|voter| self.get(&VoteKey::new(*voter, *target)))
            .collect()
    }

    pub(crate) fn scan_voter(&self, voter: &VoterId) -> Vec<Vote> {
        let lo = VoteKey::new(*voter, TargetId::from_u128(u128::MIN));
        let hi = VoteKey::new(*voter, TargetId::from_u128(u128::MAX));
        self.rows
            .range(lo..=hi)
            .map(|(key, direction)| Vote::new(key.voter, key.target, *direction))
            .collect()
    }

    pub(crate) fn purge_voter(&mut self, voter: &VoterId) -> usize {
        let keys: Vec<VoteKey> = self.scan_voter(voter).iter().map(Vote::key).collect();
        keys.iter().filter(|key| self.remove(key)).count()
    }

    pub(crate) fn purge_target(&mut self, target: &TargetId) -> usize {
        let Some(voters) = self.by_target.remove(target) else {
            return 0;
        };
        voters
            .into_iter()
            .filter(|voter| self.rows.remove(&VoteKey::new(*voter, *target)).is_some())
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn votes(&self) -> impl Iterator<Item = Vote> + '_ {
        self.rows
            .iter()
            .map(|(key, direction)| Vote::new(key.voter, key.target, *direction))
    }
}

pub(crate) fn read_lock(index: &RwLock<VoteIndex>) -> StoreResult<RwLockReadGuard<'_, VoteIndex>> {
    index
        .read()
        .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
}

pub(crate) fn write_lock(
    index: &RwLock<VoteIndex>,
) -> StoreResult<RwLockWriteGuard<'_, VoteIndex>> {
    index
        .write()
        .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
}

/// An in-memory implementation of [`VoteStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryVoteStore {
    index: RwLock<VoteIndex>,
}

impl InMemoryVoteStore {
    /// Create a new empty vote store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored vote, ordered by `(voter, target)`.
    pub fn all_votes(&self) -> StoreResult<Vec<Vote>> {
        Ok(read_lock(&self.index)?.votes().collect())
    }
}

impl VoteStore for InMemoryVoteStore {
    fn get(&self, key: &VoteKey) -> StoreResult<Option<Vote>> {
        Ok(read_lock(&self.index)?.get(key))
    }

    fn insert(&self, vote: &Vote) -> StoreResult<()> {
        write_lock(&self.index)?.insert(vote)
    }

    fn update(&self, key: &VoteKey, direction: Direction) -> StoreResult<()> {
        write_lock(&self.index)?.update(key, direction)
    }

    fn delete(&self, key: &VoteKey) -> StoreResult<bool> {
        Ok(write_lock(&self.index)?.remove(key))
    }

    fn scan_target(&self, target: &TargetId) -> StoreResult<Vec<Vote>> {
        Ok(read_lock(&self.index)?.scan_target(target))
    }

    fn scan_voter(&self, voter: &VoterId) -> StoreResult<Vec<Vote>> {
        Ok(read_lock(&self.index)?.scan_voter(voter))
    }

    fn purge_voter(&self, voter: &VoterId) -> StoreResult<usize> {
        Ok(write_lock(&self.index)?.purge_voter(voter))
    }

    fn purge_target(&self, target: &TargetId) -> StoreResult<usize> {
        Ok(write_lock(&self.index)?.purge_target(target))
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(read_lock(&self.index)?.len())
    }
}
