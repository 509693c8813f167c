use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use ballot_store::{StoreError, StoreResult, TargetDirectory, VoteStore, VoterDirectory};
use ballot_types::{TargetId, Vote, VoteKey, VoteRequest, VoterId};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::tally::{Tally, TallyReader};
use crate::transition::{Outcome, Transition};

/// The authoritative mapping from `(voter, target)` to a settled vote.
///
/// Every vote call runs a read-decide-write cycle against the store. The
/// store's uniqueness constraint turns a lost race into a
/// [`StoreError::Conflict`]; the ledger then re-reads and decides again, up
/// to [`LedgerConfig::max_attempts`] times. Calls on different pairs never
/// coordinate with each other.
pub struct VoteLedger {
    store: Arc<dyn VoteStore>,
    voters: Arc<dyn VoterDirectory>,
    targets: Arc<dyn TargetDirectory>,
    reader: TallyReader,
    config: LedgerConfig,
}

impl VoteLedger {
    pub fn new(
        store: Arc<dyn VoteStore>,
        voters: Arc<dyn VoterDirectory>,
        targets: Arc<dyn TargetDirectory>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            reader: TallyReader::new(Arc::clone(&store)),
            store,
            voters,
            targets,
            config,
        }
    }

    /// Build a ledger whose voters and targets come from one directory.
    pub fn with_directory<D>(
        store: Arc<dyn VoteStore>,
        directory: Arc<D>,
        config: LedgerConfig,
    ) -> Self
    where
        D: VoterDirectory + TargetDirectory + 'static,
    {
        let voters: Arc<dyn VoterDirectory> = directory.clone();
        let targets: Arc<dyn TargetDirectory> = directory;
        Self::new(store, voters, targets, config)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VoteStore> {
        &self.store
    }

    pub fn tally_reader(&self) -> &TallyReader {
        &self.reader
    }

    /// Cast, change, or retract a vote from the two request flags.
    pub fn vote(
        &self,
        voter: VoterId,
        target: TargetId,
        wants_upvote: bool,
        wants_downvote: bool,
    ) -> LedgerResult<Outcome> {
        self.vote_request(voter, target, VoteRequest::new(wants_upvote, wants_downvote))
    }

    pub fn vote_request(
        &self,
        voter: VoterId,
        target: TargetId,
        request: VoteRequest,
    ) -> LedgerResult<Outcome> {
        let deadline = self
            .config
            .default_timeout()
            .map(|timeout| Instant::now() + timeout);
        self.run(voter, target, request, deadline)
    }

    /// Like [`Self::vote_request`], aborting with
    /// [`LedgerError::DeadlineExceeded`] if `deadline` passes before the
    /// write is committed. An aborted call leaves the stored state unchanged.
    pub fn vote_before(
        &self,
        voter: VoterId,
        target: TargetId,
        request: VoteRequest,
        deadline: Instant,
    ) -> LedgerResult<Outcome> {
        self.run(voter, target, request, Some(deadline))
    }

    /// Withdraw a voter's opinion. Returns `Removed` or `NoOp`.
    pub fn retract(&self, voter: VoterId, target: TargetId) -> LedgerResult<Outcome> {
        self.vote_request(voter, target, VoteRequest::neutral())
    }

    /// The voter's current vote on the target, if any.
    pub fn find(&self, voter: VoterId, target: TargetId) -> LedgerResult<Option<Vote>> {
        Ok(self.store.get(&VoteKey::new(voter, target))?)
    }

    /// Every settled vote cast by a voter, ordered by target.
    pub fn votes_by_voter(&self, voter: VoterId) -> LedgerResult<Vec<Vote>> {
        Ok(self.store.scan_voter(&voter)?)
    }

    pub fn tally(&self, target: TargetId) -> LedgerResult<Tally> {
        self.reader.tally(&target)
    }

    /// Drop every vote cast by a voter that is being deleted.
    pub fn forget_voter(&self, voter: VoterId) -> LedgerResult<usize> {
        let removed = self.store.purge_voter(&voter)?;
        debug!(voter = %voter, removed, "forgot voter");
        Ok(removed)
    }

    /// Drop every vote on a target that is being deleted.
    pub fn forget_target(&self, target: TargetId) -> LedgerResult<usize> {
        let removed = self.store.purge_target(&target)?;
        debug!(target = %target, removed, "forgot target");
        Ok(removed)
    }

    fn run(
        &self,
        voter: VoterId,
        target: TargetId,
        request: VoteRequest,
        deadline: Option<Instant>,
    ) -> LedgerResult<Outcome> {
        check_deadline(deadline)?;
        if !self.voters.voter_exists(&voter)? {
            return Err(LedgerError::VoterNotFound(voter));
        }
        if !self.targets.target_exists(&target)? {
            return Err(LedgerError::TargetNotFound(target));
        }

        let key = VoteKey::new(voter, target);
        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            check_deadline(deadline)?;
            let existing = self.store.get(&key)?;
            let transition = Transition::decide(existing.as_ref(), request);

            check_deadline(deadline)?;
            match self.apply(&key, transition) {
                Ok(()) => {
                    let outcome = transition.outcome();
                    debug!(%key, attempt, ?outcome, "vote applied");
                    return Ok(outcome);
                }
                Err(e) if e.is_conflict() => {
                    debug!(%key, attempt, "vote write conflict; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(%key, attempts, "vote write conflicts exhausted retries");
        Err(LedgerError::Contended { key, attempts })
    }

    fn apply(&self, key: &VoteKey, transition: Transition) -> StoreResult<()> {
        match transition {
            Transition::Insert(direction) => self
                .store
                .insert(&Vote::new(key.voter, key.target, direction)),
            Transition::Update(direction) => self.store.update(key, direction),
            // The row we saw is gone; re-decide against the current state.
            Transition::Delete => match self.store.delete(key)? {
                true => Ok(()),
                false => Err(StoreError::Conflict { key: *key }),
            },
            Transition::Skip => Ok(()),
        }
    }
}

impl std::fmt::Debug for VoteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn check_deadline(deadline: Option<Instant>) -> LedgerResult<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(LedgerError::DeadlineExceeded),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use ballot_store::{InMemoryDirectory, InMemoryVoteStore, OpenDirectory, WalConfig, WalVoteStore};
    use ballot_types::Direction;
    use proptest::prelude::*;

    struct Fixture {
        ledger: VoteLedger,
        store: Arc<InMemoryVoteStore>,
        directory: Arc<InMemoryDirectory>,
    }

    /// A ledger over an in-memory store with `voters` voters and `targets`
    /// targets registered, numbered from 1.
    fn fixture(voters: u128, targets: u128) -> Fixture {
        let store = Arc::new(InMemoryVoteStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        for n in 1..=voters {
            directory.add_voter(voter(n)).unwrap();
        }
        for n in 1..=targets {
            directory.add_target(target(n)).unwrap();
        }
        let ledger = VoteLedger::with_directory(
            store.clone(),
            directory.clone(),
            LedgerConfig::default(),
        );
        Fixture {
            ledger,
            store,
            directory,
        }
    }

    fn voter(n: u128) -> VoterId {
        VoterId::from_u128(n)
    }

    fn target(n: u128) -> TargetId {
        TargetId::from_u128(n)
    }

    // ---- Transition table through the ledger ----

    #[test]
    fn first_settled_vote_is_created() {
        let f = fixture(1, 1);
        let outcome = f.ledger.vote(voter(1), target(1), true, false).unwrap();
        assert_eq!(outcome, Outcome::Created);

        let stored = f.ledger.find(voter(1), target(1)).unwrap().unwrap();
        assert_eq!(stored.direction, Direction::Up);
    }

    #[test]
    fn neutral_vote_without_row_is_noop() {
        let f = fixture(1, 1);
        assert_eq!(f.ledger.vote(voter(1), target(1), false, false).unwrap(), Outcome::NoOp);
        assert_eq!(f.ledger.vote(voter(1), target(1), true, true).unwrap(), Outcome::NoOp);
        assert!(f.store.is_empty().unwrap());
    }

    #[test]
    fn neutral_vote_removes_row_regardless_of_prior_state() {
        for (prior, neutral) in [(true, true), (true, false), (false, true), (false, false)] {
            let f = fixture(1, 1);
            f.ledger.vote(voter(1), target(1), prior, !prior).unwrap();

            let outcome = f.ledger.vote(voter(1), target(1), neutral, neutral).unwrap();
            assert_eq!(outcome, Outcome::Removed);
            assert!(f.ledger.find(voter(1), target(1)).unwrap().is_none());
        }
    }

    #[test]
    fn repeated_settle_is_idempotent_update() {
        let f = fixture(1, 1);
        assert_eq!(f.ledger.vote(voter(1), target(1), true, false).unwrap(), Outcome::Created);
        let first = f.ledger.find(voter(1), target(1)).unwrap();

        assert_eq!(f.ledger.vote(voter(1), target(1), true, false).unwrap(), Outcome::Updated);
        assert_eq!(f.ledger.find(voter(1), target(1)).unwrap(), first);
        assert_eq!(f.store.len().unwrap(), 1);
    }

    #[test]
    fn flip_leaves_single_downvote() {
        let f = fixture(1, 1);
        f.ledger.vote(voter(1), target(1), true, false).unwrap();
        assert_eq!(f.ledger.vote(voter(1), target(1), false, true).unwrap(), Outcome::Updated);

        let votes = f.store.all_votes().unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].direction, Direction::Down);
    }

    #[test]
    fn retract_is_neutral_vote() {
        let f = fixture(1, 1);
        f.ledger.vote_request(voter(1), target(1), VoteRequest::down()).unwrap();
        assert_eq!(f.ledger.retract(voter(1), target(1)).unwrap(), Outcome::Removed);
        assert_eq!(f.ledger.retract(voter(1), target(1)).unwrap(), Outcome::NoOp);
    }

    // ---- Referential checks ----

    #[test]
    fn unknown_voter_is_rejected_without_row() {
        let f = fixture(1, 1);
        let err = f.ledger.vote(voter(99), target(1), true, false).unwrap_err();
        assert!(matches!(err, LedgerError::VoterNotFound(v) if v == voter(99)));
        assert!(f.store.is_empty().unwrap());
    }

    #[test]
    fn unknown_target_is_rejected_without_row() {
        let f = fixture(1, 1);
        let err = f.ledger.vote(voter(1), target(99), true, false).unwrap_err();
        assert!(matches!(err, LedgerError::TargetNotFound(t) if t == target(99)));
        assert!(f.store.is_empty().unwrap());
    }

    #[test]
    fn voter_check_runs_before_target_check() {
        let f = fixture(0, 0);
        let err = f.ledger.vote(voter(1), target(1), true, false).unwrap_err();
        assert!(matches!(err, LedgerError::VoterNotFound(_)));
    }

    #[test]
    fn removed_voter_can_no_longer_vote() {
        let f = fixture(1, 1);
        f.ledger.vote(voter(1), target(1), true, false).unwrap();
        f.directory.remove_voter(&voter(1)).unwrap();

        let err = f.ledger.vote(voter(1), target(1), false, false).unwrap_err();
        assert!(matches!(err, LedgerError::VoterNotFound(_)));
        // The stored vote is untouched until cascade cleanup runs.
        assert!(f.ledger.find(voter(1), target(1)).unwrap().is_some());
    }

    // ---- Tallies and secondary reads ----

    #[test]
    fn tally_counts_settled_votes() {
        let f = fixture(4, 2);
        f.ledger.vote(voter(1), target(1), true, false).unwrap();
        f.ledger.vote(voter(2), target(1), true, false).unwrap();
        f.ledger.vote(voter(3), target(1), false, true).unwrap();
        // Retracted votes do not count.
        f.ledger.vote(voter(4), target(1), true, false).unwrap();
        f.ledger.vote(voter(4), target(1), true, true).unwrap();

        assert_eq!(f.ledger.tally(target(1)).unwrap(), Tally::new(2, 1));
        assert_eq!(f.ledger.tally(target(2)).unwrap(), Tally::new(0, 0));
    }

    #[test]
    fn votes_by_voter_lists_own_votes() {
        let f = fixture(2, 3);
        f.ledger.vote(voter(1), target(3), false, true).unwrap();
        f.ledger.vote(voter(1), target(1), true, false).unwrap();
        f.ledger.vote(voter(2), target(2), true, false).unwrap();

        let votes = f.ledger.votes_by_voter(voter(1)).unwrap();
        assert_eq!(
            votes,
            vec![
                Vote::new(voter(1), target(1), Direction::Up),
                Vote::new(voter(1), target(3), Direction::Down),
            ]
        );
    }

    #[test]
    fn forget_cascades_votes() {
        let f = fixture(3, 2);
        f.ledger.vote(voter(1), target(1), true, false).unwrap();
        f.ledger.vote(voter(2), target(1), false, true).unwrap();
        f.ledger.vote(voter(1), target(2), false, true).unwrap();
        f.ledger.vote(voter(3), target(2), true, false).unwrap();

        assert_eq!(f.ledger.forget_target(target(1)).unwrap(), 2);
        assert_eq!(f.ledger.tally(target(1)).unwrap(), Tally::default());

        assert_eq!(f.ledger.forget_voter(voter(1)).unwrap(), 1);
        assert_eq!(f.ledger.tally(target(2)).unwrap(), Tally::new(1, 0));
    }

    // ---- Deadlines ----

    #[test]
    fn expired_deadline_leaves_state_unchanged() {
        let f = fixture(1, 1);
        f.ledger.vote(voter(1), target(1), true, false).unwrap();

        let err = f
            .ledger
            .vote_before(voter(1), target(1), VoteRequest::down(), Instant::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::DeadlineExceeded));
        assert_eq!(
            f.ledger.find(voter(1), target(1)).unwrap().unwrap().direction,
            Direction::Up
        );
    }

    #[test]
    fn generous_deadline_commits() {
        let f = fixture(1, 1);
        let deadline = Instant::now() + Duration::from_secs(60);
        let outcome = f
            .ledger
            .vote_before(voter(1), target(1), VoteRequest::up(), deadline)
            .unwrap();
        assert_eq!(outcome, Outcome::Created);
    }

    #[test]
    fn configured_timeout_applies_to_plain_votes() {
        let store = Arc::new(InMemoryVoteStore::new());
        let config = LedgerConfig {
            default_timeout_ms: Some(0),
            ..Default::default()
        };
        let ledger = VoteLedger::with_directory(store.clone(), Arc::new(OpenDirectory), config);

        let err = ledger.vote(voter(1), target(1), true, false).unwrap_err();
        assert!(matches!(err, LedgerError::DeadlineExceeded));
        assert!(store.is_empty().unwrap());
    }

    // ---- Conflict retry ----

    /// Lets a rival writer slip in between the ledger's read and its first
    /// insert, the way a concurrent caller would.
    struct RacingStore {
        inner: InMemoryVoteStore,
        rival: Direction,
        raced: AtomicU32,
    }

    impl VoteStore for RacingStore {
        fn get(&self, key: &VoteKey) -> StoreResult<Option<Vote>> {
            self.inner.get(key)
        }

        fn insert(&self, vote: &Vote) -> StoreResult<()> {
            if self.raced.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner
                    .insert(&Vote::new(vote.voter, vote.target, self.rival))?;
            }
            self.inner.insert(vote)
        }

        fn update(&self, key: &VoteKey, direction: Direction) -> StoreResult<()> {
            self.inner.update(key, direction)
        }

        fn delete(&self, key: &VoteKey) -> StoreResult<bool> {
            self.inner.delete(key)
        }

        fn scan_target(&self, target: &TargetId) -> StoreResult<Vec<Vote>> {
            self.inner.scan_target(target)
        }

        fn scan_voter(&self, voter: &VoterId) -> StoreResult<Vec<Vote>> {
            self.inner.scan_voter(voter)
        }

        fn purge_voter(&self, voter: &VoterId) -> StoreResult<usize> {
            self.inner.purge_voter(voter)
        }

        fn purge_target(&self, target: &TargetId) -> StoreResult<usize> {
            self.inner.purge_target(target)
        }

        fn len(&self) -> StoreResult<usize> {
            self.inner.len()
        }
    }

    /// Every write loses the race.
    #[derive(Default)]
    struct ContendedStore {
        writes: AtomicU32,
    }

    impl VoteStore for ContendedStore {
        fn get(&self, _key: &VoteKey) -> StoreResult<Option<Vote>> {
            Ok(None)
        }

        fn insert(&self, vote: &Vote) -> StoreResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict { key: vote.key() })
        }

        fn update(&self, key: &VoteKey, _direction: Direction) -> StoreResult<()> {
            Err(StoreError::Conflict { key: *key })
        }

        fn delete(&self, _key: &VoteKey) -> StoreResult<bool> {
            Ok(false)
        }

        fn scan_target(&self, _target: &TargetId) -> StoreResult<Vec<Vote>> {
            Ok(Vec::new())
        }

        fn scan_voter(&self, _voter: &VoterId) -> StoreResult<Vec<Vote>> {
            Ok(Vec::new())
        }

        fn purge_voter(&self, _voter: &VoterId) -> StoreResult<usize> {
            Ok(0)
        }

        fn purge_target(&self, _target: &TargetId) -> StoreResult<usize> {
            Ok(0)
        }

        fn len(&self) -> StoreResult<usize> {
            Ok(0)
        }
    }

    /// Every write fails with a non-conflict storage error. `row` is what
    /// reads return; `fail_reads` makes reads fail too.
    #[derive(Default)]
    struct FailingStore {
        row: Option<Vote>,
        fail_reads: bool,
        writes: AtomicU32,
    }

    impl FailingStore {
        fn holding(vote: Vote) -> Self {
            Self {
                row: Some(vote),
                ..Default::default()
            }
        }

        fn write_failure(&self) -> StoreError {
            self.writes.fetch_add(1, Ordering::SeqCst);
            StoreError::Io(std::io::Error::other("disk full"))
        }
    }

    impl VoteStore for FailingStore {
        fn get(&self, _key: &VoteKey) -> StoreResult<Option<Vote>> {
            if self.fail_reads {
                return Err(StoreError::Unavailable("replica offline".into()));
            }
            Ok(self.row)
        }

        fn insert(&self, _vote: &Vote) -> StoreResult<()> {
            Err(self.write_failure())
        }

        fn update(&self, _key: &VoteKey, _direction: Direction) -> StoreResult<()> {
            Err(self.write_failure())
        }

        fn delete(&self, _key: &VoteKey) -> StoreResult<bool> {
            Err(self.write_failure())
        }

        fn scan_target(&self, _target: &TargetId) -> StoreResult<Vec<Vote>> {
            Ok(self.row.into_iter().collect())
        }

        fn scan_voter(&self, _voter: &VoterId) -> StoreResult<Vec<Vote>> {
            Ok(self.row.into_iter().collect())
        }

        fn purge_voter(&self, _voter: &VoterId) -> StoreResult<usize> {
            Err(self.write_failure())
        }

        fn purge_target(&self, _target: &TargetId) -> StoreResult<usize> {
            Err(self.write_failure())
        }

        fn len(&self) -> StoreResult<usize> {
            Ok(usize::from(self.row.is_some()))
        }
    }

    fn ledger_over(store: Arc<FailingStore>) -> VoteLedger {
        VoteLedger::with_directory(store, Arc::new(OpenDirectory), LedgerConfig::default())
    }

    #[test]
    fn failed_insert_surfaces_without_retry() {
        let store = Arc::new(FailingStore::default());
        let err = ledger_over(store.clone())
            .vote(voter(1), target(1), true, false)
            .unwrap_err();
        assert!(
            matches!(err, LedgerError::Storage(StoreError::Io(_))),
            "expected Storage, got: {err}"
        );
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_update_and_delete_surface_without_retry() {
        let existing = Vote::new(voter(1), target(1), Direction::Up);

        let store = Arc::new(FailingStore::holding(existing));
        let err = ledger_over(store.clone())
            .vote(voter(1), target(1), false, true)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(StoreError::Io(_))));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        let store = Arc::new(FailingStore::holding(existing));
        let err = ledger_over(store.clone())
            .retract(voter(1), target(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(StoreError::Io(_))));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_read_surfaces_before_any_write() {
        let store = Arc::new(FailingStore {
            fail_reads: true,
            ..Default::default()
        });
        let err = ledger_over(store.clone())
            .vote(voter(1), target(1), true, false)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Storage(StoreError::Unavailable(_))
        ));
        assert!(err.is_retryable());
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_purge_surfaces() {
        let store = Arc::new(FailingStore::default());
        let ledger = ledger_over(store.clone());
        assert!(matches!(
            ledger.forget_voter(voter(1)),
            Err(LedgerError::Storage(_))
        ));
        assert!(matches!(
            ledger.forget_target(target(1)),
            Err(LedgerError::Storage(_))
        ));
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lost_insert_race_becomes_update() {
        let store = Arc::new(RacingStore {
            inner: InMemoryVoteStore::new(),
            rival: Direction::Down,
            raced: AtomicU32::new(0),
        });
        let ledger =
            VoteLedger::with_directory(store.clone(), Arc::new(OpenDirectory), LedgerConfig::default());

        let outcome = ledger.vote(voter(1), target(1), true, false).unwrap();
        assert_eq!(outcome, Outcome::Updated);

        let votes = store.inner.all_votes().unwrap();
        assert_eq!(votes, vec![Vote::new(voter(1), target(1), Direction::Up)]);
    }

    #[test]
    fn persistent_conflicts_surface_as_contended() {
        let store = Arc::new(ContendedStore::default());
        let config = LedgerConfig {
            max_attempts: 3,
            ..Default::default()
        };
        let ledger = VoteLedger::with_directory(store.clone(), Arc::new(OpenDirectory), config);

        let err = ledger.vote(voter(1), target(1), false, true).unwrap_err();
        assert!(
            matches!(err, LedgerError::Contended { attempts: 3, .. }),
            "expected Contended, got: {err}"
        );
        assert!(err.is_retryable());
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn vanished_row_on_retract_becomes_noop() {
        // ContendedStore never holds a row, so the neutral request is a
        // plain no-op without touching the write path.
        let ledger = VoteLedger::with_directory(
            Arc::new(ContendedStore::default()),
            Arc::new(OpenDirectory),
            LedgerConfig::default(),
        );
        assert_eq!(ledger.retract(voter(1), target(1)).unwrap(), Outcome::NoOp);
    }

    // ---- Concurrency ----

    #[test]
    fn concurrent_identical_votes_leave_one_row() {
        const THREADS: usize = 16;
        let f = fixture(1, 1);
        let barrier = Barrier::new(THREADS);

        let outcomes: Vec<LedgerResult<Outcome>> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        f.ledger.vote(voter(1), target(1), true, false)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let outcomes: Vec<Outcome> = outcomes.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Created).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Updated).count(), THREADS - 1);

        let votes = f.store.all_votes().unwrap();
        assert_eq!(votes, vec![Vote::new(voter(1), target(1), Direction::Up)]);
    }

    #[test]
    fn concurrent_toggles_never_duplicate_rows() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 50;
        let f = fixture(1, 1);
        let barrier = Barrier::new(THREADS + 1);

        thread::scope(|s| {
            for n in 0..THREADS {
                let f = &f;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    for round in 0..ROUNDS {
                        let request = match (n + round) % 3 {
                            0 => VoteRequest::up(),
                            1 => VoteRequest::down(),
                            _ => VoteRequest::neutral(),
                        };
                        match f.ledger.vote_request(voter(1), target(1), request) {
                            Ok(_) | Err(LedgerError::Contended { .. }) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                });
            }

            // Tallies taken mid-flight only ever see committed state.
            barrier.wait();
            for _ in 0..ROUNDS {
                let tally = f.ledger.tally(target(1)).unwrap();
                assert!(tally.total() <= 1, "tally saw duplicate rows: {tally:?}");
            }
        });

        assert!(f.store.len().unwrap() <= 1);
    }

    #[test]
    fn different_pairs_do_not_interfere() {
        const VOTERS: u128 = 12;
        let f = fixture(VOTERS, 1);

        thread::scope(|s| {
            for n in 1..=VOTERS {
                let f = &f;
                s.spawn(move || {
                    let outcome = f.ledger.vote(voter(n), target(1), n % 2 == 0, n % 2 == 1).unwrap();
                    assert_eq!(outcome, Outcome::Created);
                });
            }
        });

        assert_eq!(f.ledger.tally(target(1)).unwrap(), Tally::new(6, 6));
    }

    // ---- Durable backend ----

    #[test]
    fn ledger_over_wal_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.wal");
        {
            let store = Arc::new(WalVoteStore::open(&path, WalConfig::default()).unwrap());
            let ledger =
                VoteLedger::with_directory(store, Arc::new(OpenDirectory), LedgerConfig::default());
            ledger.vote(voter(1), target(1), true, false).unwrap();
            ledger.vote(voter(2), target(1), false, true).unwrap();
            ledger.vote(voter(2), target(1), true, false).unwrap();
            ledger.vote(voter(3), target(1), true, false).unwrap();
            ledger.retract(voter(3), target(1)).unwrap();
        }

        let store = Arc::new(WalVoteStore::open(&path, WalConfig::default()).unwrap());
        let ledger = VoteLedger::with_directory(store, Arc::new(OpenDirectory), LedgerConfig::default());
        assert_eq!(ledger.tally(target(1)).unwrap(), Tally::new(2, 0));
        assert!(ledger.find(voter(3), target(1)).unwrap().is_none());
    }

    // ---- Model agreement ----

    fn expected_outcome(model: &HashMap<VoteKey, Direction>, key: &VoteKey, request: VoteRequest) -> Outcome {
        match (model.contains_key(key), request.is_neutral()) {
            (true, true) => Outcome::Removed,
            (true, false) => Outcome::Updated,
            (false, false) => Outcome::Created,
            (false, true) => Outcome::NoOp,
        }
    }

    proptest! {
        #[test]
        fn ledger_agrees_with_model(
            ops in prop::collection::vec((1u128..=3, 1u128..=2, any::<bool>(), any::<bool>()), 0..64)
        ) {
            let f = fixture(3, 2);
            let mut model: HashMap<VoteKey, Direction> = HashMap::new();

            for (v, t, up, down) in ops {
                let key = VoteKey::new(voter(v), target(t));
                let request = VoteRequest::new(up, down);
                let expected = expected_outcome(&model, &key, request);

                let outcome = f.ledger.vote(voter(v), target(t), up, down).unwrap();
                prop_assert_eq!(outcome, expected);

                match request.direction() {
                    Some(direction) => {
                        model.insert(key, direction);
                    }
                    None => {
                        model.remove(&key);
                    }
                }
                prop_assert_eq!(
                    f.ledger.find(voter(v), target(t)).unwrap().map(|vote| vote.direction),
                    model.get(&key).copied()
                );
            }

            prop_assert_eq!(f.store.len().unwrap(), model.len());
            for t in 1..=2 {
                let expected: Tally = model
                    .iter()
                    .filter(|(key, _)| key.target == target(t))
                    .map(|(_, direction)| *direction)
                    .collect();
                prop_assert_eq!(f.ledger.tally(target(t)).unwrap(), expected);
            }
        }
    }
}
