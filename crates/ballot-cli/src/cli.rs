use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ballot_types::{TargetId, VoterId};

#[derive(Parser)]
#[command(name = "ballot", about = "Ballot: one vote per voter per target", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Vote log path, overriding the configuration file
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Cast, change, or retract a vote
    ///
    /// Any well-formed voter and target id is accepted. This binary keeps no
    /// voter or target registry; existence checks belong to the service that
    /// owns those records.
    Vote(VoteArgs),
    /// Retract a vote
    Retract(PairArgs),
    /// Show a voter's current vote on a target
    Find(PairArgs),
    /// Show upvote and downvote counts
    Tally(TallyArgs),
    /// List every vote cast by a voter
    Votes(VoterArgs),
    /// Drop all votes cast by a deleted voter
    ForgetVoter(VoterArgs),
    /// Drop all votes on a deleted target
    ForgetTarget(TargetArgs),
    /// Rewrite the vote log to live votes only
    Compact,
    /// Print a fresh identifier
    NewId,
}

/// Passing neither flag, or both, is a neutral request that retracts.
#[derive(Args)]
pub struct VoteArgs {
    pub voter: VoterId,
    pub target: TargetId,
    #[arg(long)]
    pub up: bool,
    #[arg(long)]
    pub down: bool,
}

#[derive(Args)]
pub struct PairArgs {
    pub voter: VoterId,
    pub target: TargetId,
}

#[derive(Args)]
pub struct TallyArgs {
    #[arg(required = true)]
    pub targets: Vec<TargetId>,
}

#[derive(Args)]
pub struct VoterArgs {
    pub voter: VoterId,
}

#[derive(Args)]
pub struct TargetArgs {
    pub target: TargetId,
}
