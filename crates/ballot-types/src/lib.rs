//! Foundation types for the ballot vote ledger.
//!
//! This crate provides the identifiers and value types shared by every other
//! ballot crate. It has no storage or policy logic of its own.
//!
//! # Key Types
//!
//! - [`VoterId`] / [`TargetId`] -- Opaque UUID identifiers for the two sides of a vote
//! - [`Direction`] -- The settled opinion of a vote (up or down)
//! - [`Vote`] -- A persisted, settled vote keyed by [`VoteKey`]
//! - [`VoteRequest`] -- The two independent flags a caller submits

pub mod error;
pub mod identity;
pub mod vote;

pub use error::TypeError;
pub use identity::{TargetId, VoterId};
pub use vote::{Direction, Vote, VoteKey, VoteRequest};
