use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{TargetId, VoterId};

/// The settled opinion carried by a vote.
///
/// There is no "abstain" variant: abstention is represented by the absence
/// of a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `true` maps to [`Direction::Up`], `false` to [`Direction::Down`].
    pub fn from_upvote(upvote: bool) -> Self {
        if upvote {
            Self::Up
        } else {
            Self::Down
        }
    }

    pub fn is_up(self) -> bool {
        matches!(self, Self::Up)
    }

    /// The opposite direction.
    pub fn flipped(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Natural key of a vote: one voter, one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoteKey {
    pub voter: VoterId,
    pub target: TargetId,
}

impl VoteKey {
    pub fn new(voter: VoterId, target: TargetId) -> Self {
        Self { voter, target }
    }
}

impl fmt::Display for VoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.voter.short_id(), self.target.short_id())
    }
}

/// A settled vote as persisted by a vote store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: VoterId,
    pub target: TargetId,
    pub direction: Direction,
}

impl Vote {
    pub fn new(voter: VoterId, target: TargetId, direction: Direction) -> Self {
        Self {
            voter,
            target,
            direction,
        }
    }

    pub fn key(&self) -> VoteKey {
        VoteKey::new(self.voter, self.target)
    }

    /// Convenience for callers that still think in booleans.
    pub fn is_upvote(&self) -> bool {
        self.direction.is_up()
    }
}

/// The two independent flags submitted with a vote call.
///
/// All four combinations are legal. When the flags agree the request is
/// *neutral* and means "hold no opinion".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub wants_upvote: bool,
    pub wants_downvote: bool,
}

impl VoteRequest {
    pub fn new(wants_upvote: bool, wants_downvote: bool) -> Self {
        Self {
            wants_upvote,
            wants_downvote,
        }
    }

    pub fn up() -> Self {
        Self::new(true, false)
    }

    pub fn down() -> Self {
        Self::new(false, true)
    }

    pub fn neutral() -> Self {
        Self::new(false, false)
    }

    pub fn is_neutral(&self) -> bool {
        self.wants_upvote == self.wants_downvote
    }

    /// The direction a non-neutral request settles on, `None` when neutral.
    pub fn direction(&self) -> Option<Direction> {
        if self.is_neutral() {
            None
        } else {
            Some(Direction::from_upvote(self.wants_upvote))
        }
    }
}
