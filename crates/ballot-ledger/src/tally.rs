use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ballot_store::VoteStore;
use ballot_types::{Direction, TargetId};

use crate::error::LedgerResult;

/// Upvote and downvote counts for one target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub upvotes: u64,
    pub downvotes: u64,
}

impl Tally {
    pub fn new(upvotes: u64, downvotes: u64) -> Self {
        Self { upvotes, downvotes }
    }

    pub fn record(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.upvotes += 1,
            Direction::Down => self.downvotes += 1,
        }
    }

    /// Number of voters holding a settled opinion.
    pub fn total(&self) -> u64 {
        self.upvotes + self.downvotes
    }

    /// Upvotes minus downvotes.
    pub fn score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }
}

impl FromIterator<Direction> for Tally {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut tally = Tally::default();
        for direction in iter {
            tally.record(direction);
        }
        tally
    }
}

/// Read side of the ledger.
///
/// Each tally is computed from one store scan, so it reflects the last
/// committed state and never a half-applied vote.
#[derive(Clone)]
pub struct TallyReader {
    store: Arc<dyn VoteStore>,
}

impl TallyReader {
    pub fn new(store: Arc<dyn VoteStore>) -> Self {
        Self { store }
    }

    /// Tally a target. A target nobody voted on tallies to `(0, 0)`.
    pub fn tally(&self, target: &TargetId) -> LedgerResult<Tally> {
        let votes = self.store.scan_target(target)?;
        Ok(votes.iter().map(|vote| vote.direction).collect())
    }

    /// Tally several targets, in input order.
    pub fn tally_many(&self, targets: &[TargetId]) -> LedgerResult<Vec<(TargetId, Tally)>> {
        targets
            .iter()
            .map(|target| Ok((*target, self.tally(target)?)))
            .collect()
    }
}

impl std::fmt::Debug for TallyReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TallyReader").finish_non_exhaustive()
    }
}
