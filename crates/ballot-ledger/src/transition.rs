//! The vote transition table.
//!
//! | stored vote? | neutral request? | transition | outcome   |
//! |--------------|------------------|------------|-----------|
//! | yes          | yes              | `Delete`   | `Removed` |
//! | yes          | no               | `Update`   | `Updated` |
//! | no           | no               | `Insert`   | `Created` |
//! | no           | yes              | `Skip`     | `NoOp`    |

use std::fmt;

use serde::{Deserialize, Serialize};

use ballot_types::{Direction, Vote, VoteRequest};

/// What a vote call did to the stored state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A new vote was stored.
    Created,
    /// The existing vote was set to the requested direction. This includes
    /// setting it to the direction it already had.
    Updated,
    /// The existing vote was retracted.
    Removed,
    /// Neutral request with nothing to retract.
    NoOp,
}

impl Outcome {
    /// Returns `true` if the stored state was written.
    pub fn wrote(self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Removed => "removed",
            Self::NoOp => "no-op",
        };
        f.write_str(s)
    }
}

/// The single storage action a vote call performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Insert(Direction),
    Update(Direction),
    Delete,
    Skip,
}

impl Transition {
    /// Decide the next action from the currently stored vote and the request.
    pub fn decide(existing: Option<&Vote>, request: VoteRequest) -> Self {
        match (existing.is_some(), request.direction()) {
            (true, None) => Self::Delete,
            (true, Some(direction)) => Self::Update(direction),
            (false, Some(direction)) => Self::Insert(direction),
            (false, None) => Self::Skip,
        }
    }

    pub fn outcome(self) -> Outcome {
        match self {
            Self::Insert(_) => Outcome::Created,
            Self::Update(_) => Outcome::Updated,
            Self::Delete => Outcome::Removed,
            Self::Skip => Outcome::NoOp,
        }
    }
}
