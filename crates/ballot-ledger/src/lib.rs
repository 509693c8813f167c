//! Vote ledger core.
//!
//! This crate is the heart of ballot. It provides:
//! - The [`Transition`] decision table mapping a stored vote and a
//!   [`VoteRequest`](ballot_types::VoteRequest) to one of four outcomes
//! - [`VoteLedger`], which validates voters and targets, applies the
//!   transition atomically, and retries on write conflicts
//! - [`TallyReader`], the read side reducing a target's votes to a [`Tally`]
//! - [`LedgerConfig`] for retry and timeout tuning

pub mod config;
pub mod error;
pub mod ledger;
pub mod tally;
pub mod transition;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use ledger::VoteLedger;
pub use tally::{Tally, TallyReader};
pub use transition::{Outcome, Transition};
