use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ballot_ledger::LedgerConfig;
use ballot_store::WalConfig;

/// Settings for the `ballot` binary.
///
/// ```toml
/// data_path = "/var/lib/ballot/votes.wal"
///
/// [ledger]
/// max_attempts = 8
/// default_timeout_ms = 2000
///
/// [wal]
/// sync_mode = "every-write"
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BallotConfig {
    pub data_path: PathBuf,
    pub ledger: LedgerConfig,
    pub wal: WalConfig,
}

impl Default for BallotConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("ballot.wal"),
            ledger: LedgerConfig::default(),
            wal: WalConfig::default(),
        }
    }
}

impl BallotConfig {
    /// Load from a TOML file, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
