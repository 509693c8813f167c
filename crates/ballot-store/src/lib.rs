//! Vote persistence for the ballot ledger.
//!
//! This crate is the persistence collaborator of the ledger. It stores at most
//! one [`Vote`](ballot_types::Vote) per `(voter, target)` pair and exposes the
//! keyed operations the ledger builds its transition logic on.
//!
//! # Storage Backends
//!
//! All backends implement the [`VoteStore`] trait:
//!
//! - [`InMemoryVoteStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`WalVoteStore`] -- the same index made durable by a CRC-framed log
//!
//! # Design Rules
//!
//! 1. The `(voter, target)` pair is a uniqueness constraint: a second insert
//!    for the same key is a [`StoreError::Conflict`].
//! 2. An update or delete that finds no row is also a conflict, so callers
//!    can tell "someone got there first" apart from success.
//! 3. Every mutation is atomic; scans observe a consistent snapshot.
//! 4. All I/O errors are propagated, never silently ignored.
//!
//! The [`directory`] module holds the existence-check collaborators for
//! voters and targets.

pub mod directory;
pub mod error;
pub mod memory;
pub mod traits;
pub mod wal;

pub use directory::{InMemoryDirectory, OpenDirectory, TargetDirectory, VoterDirectory};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryVoteStore;
pub use traits::VoteStore;
pub use wal::{SyncMode, WalConfig, WalVoteStore};
