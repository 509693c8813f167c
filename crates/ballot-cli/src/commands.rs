use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tracing::info;

use ballot_ledger::{Outcome, Tally, VoteLedger};
use ballot_store::{OpenDirectory, WalVoteStore};
use ballot_types::{Direction, TargetId, Vote, VoteRequest, VoterId};

use crate::cli::*;
use crate::config::BallotConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = BallotConfig::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_path = data;
    }
    let format = cli.format;

    if let Command::NewId = cli.command {
        return cmd_new_id(format);
    }

    let store = Arc::new(
        WalVoteStore::open(&config.data_path, config.wal.clone())
            .with_context(|| format!("opening vote log {}", config.data_path.display()))?,
    );
    let ledger = VoteLedger::with_directory(store.clone(), Arc::new(OpenDirectory), config.ledger);

    match cli.command {
        Command::Vote(args) => {
            let request = VoteRequest::new(args.up, args.down);
            cmd_vote(&ledger, args.voter, args.target, request, format)
        }
        Command::Retract(args) => {
            cmd_vote(&ledger, args.voter, args.target, VoteRequest::neutral(), format)
        }
        Command::Find(args) => cmd_find(&ledger, args.voter, args.target, format),
        Command::Tally(args) => cmd_tally(&ledger, &args.targets, format),
        Command::Votes(args) => cmd_votes(&ledger, args.voter, format),
        Command::ForgetVoter(args) => {
            let removed = ledger.forget_voter(args.voter)?;
            print_removed(removed, &args.voter.to_string(), format);
            Ok(())
        }
        Command::ForgetTarget(args) => {
            let removed = ledger.forget_target(args.target)?;
            print_removed(removed, &args.target.to_string(), format);
            Ok(())
        }
        Command::Compact => {
            let before = store.log_len()?;
            let after = store.compact()?;
            info!(before, after, "compacted");
            match format {
                OutputFormat::Json => println!("{}", json!({ "before": before, "after": after })),
                OutputFormat::Text => println!(
                    "{} Compacted vote log: {} → {} bytes",
                    "✓".green().bold(),
                    before,
                    after.to_string().bold()
                ),
            }
            Ok(())
        }
        Command::NewId => cmd_new_id(format),
    }
}

fn cmd_vote(
    ledger: &VoteLedger,
    voter: VoterId,
    target: TargetId,
    request: VoteRequest,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let outcome = ledger.vote_request(voter, target, request)?;
    let tally = ledger.tally(target)?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "outcome": outcome, "tally": tally })
        ),
        OutputFormat::Text => {
            let label = match outcome {
                Outcome::Created => "created".green(),
                Outcome::Updated => "updated".yellow(),
                Outcome::Removed => "removed".red(),
                Outcome::NoOp => "no-op".dimmed(),
            };
            println!("{} Vote {} on {}", "✓".green().bold(), label, target.short_id().cyan());
            println!("  {}", tally_line(&tally));
        }
    }
    Ok(())
}

fn cmd_find(
    ledger: &VoteLedger,
    voter: VoterId,
    target: TargetId,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let vote = ledger.find(voter, target)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "vote": vote })),
        OutputFormat::Text => match vote {
            Some(vote) => println!("{}", vote_line(&vote)),
            None => println!("{} holds no vote on {}", voter.short_id().cyan(), target.short_id().cyan()),
        },
    }
    Ok(())
}

fn cmd_tally(ledger: &VoteLedger, targets: &[TargetId], format: OutputFormat) -> anyhow::Result<()> {
    let tallies = ledger.tally_reader().tally_many(targets)?;
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = tallies
                .iter()
                .map(|(target, tally)| json!({ "target": target, "upvotes": tally.upvotes, "downvotes": tally.downvotes }))
                .collect();
            println!("{}", json!(rows));
        }
        OutputFormat::Text => {
            for (target, tally) in &tallies {
                println!("{}  {}", target.short_id().cyan(), tally_line(tally));
            }
        }
    }
    Ok(())
}

fn cmd_votes(ledger: &VoteLedger, voter: VoterId, format: OutputFormat) -> anyhow::Result<()> {
    let votes = ledger.votes_by_voter(voter)?;
    match format {
        OutputFormat::Json => println!("{}", json!(votes)),
        OutputFormat::Text if votes.is_empty() => {
            println!("{} has not voted.", voter.short_id().cyan())
        }
        OutputFormat::Text => {
            for vote in &votes {
                println!("{}", vote_line(vote));
            }
        }
    }
    Ok(())
}

fn cmd_new_id(format: OutputFormat) -> anyhow::Result<()> {
    let id = VoterId::new();
    match format {
        OutputFormat::Json => println!("{}", json!({ "id": id })),
        OutputFormat::Text => println!("{id}"),
    }
    Ok(())
}

fn print_removed(removed: usize, owner: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", json!({ "removed": removed })),
        OutputFormat::Text => println!("Removed {} vote(s) for {}", removed.to_string().bold(), owner),
    }
}

fn vote_line(vote: &Vote) -> String {
    let arrow = match vote.direction {
        Direction::Up => "▲ up".green(),
        Direction::Down => "▼ down".red(),
    };
    format!("{} → {}  {}", vote.voter.short_id().cyan(), vote.target.short_id().cyan(), arrow)
}

fn tally_line(tally: &Tally) -> String {
    format!(
        "{} {}  {} {}  score {}",
        "▲".green(),
        tally.upvotes,
        "▼".red(),
        tally.downvotes,
        tally.score().to_string().bold()
    )
}
