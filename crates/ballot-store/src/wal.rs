//! Durable vote store backed by an append-only log.
//!
//! [`WalVoteStore`] keeps the same [`VoteIndex`] as the in-memory store and
//! records every mutation in a log file before applying it. Reopening the
//! store replays the log to rebuild the index.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ballot_types::{Direction, TargetId, Vote, VoteKey, VoterId};

use crate::error::{StoreError, StoreResult};
use crate::memory::VoteIndex;
use crate::traits::VoteStore;

/// A single logged mutation.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    Put(Vote),
    Remove(VoteKey),
    PurgeVoter(VoterId),
    PurgeTarget(TargetId),
}

impl LogRecord {
    fn apply(&self, index: &mut VoteIndex) {
        match self {
            LogRecord::Put(vote) => index.put(vote),
            LogRecord::Remove(key) => {
                index.remove(key);
            }
            LogRecord::PurgeVoter(voter) => {
                index.purge_voter(voter);
            }
            LogRecord::PurgeTarget(target) => {
                index.purge_target(target);
            }
        }
    }
}

/// Flush/sync strategy for the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every write (safest, highest latency).
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

/// Configuration for the log-backed store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Append handle for the log. Frames go straight to the file in one
/// `write_all`, so a failed append never leaves bytes buffered in memory.
struct LogWriter {
    file: File,
    offset: u64,
    /// Cut the next frame after this many bytes and fail the write.
    #[cfg(test)]
    tear_next: Option<usize>,
}

impl LogWriter {
    fn new(file: File, offset: u64) -> Self {
        Self {
            file,
            offset,
            #[cfg(test)]
            tear_next: None,
        }
    }

    fn append(&mut self, frame: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.offset))?;
        #[cfg(test)]
        if let Some(cut) = self.tear_next.take() {
            self.file.write_all(&frame[..cut.min(frame.len())])?;
            return Err(io::Error::other("torn write"));
        }
        self.file.write_all(frame)
    }

    /// Drop anything written past `offset`.
    fn rollback(&mut self) -> io::Result<()> {
        self.file.set_len(self.offset)?;
        self.file.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }
}

struct WalState {
    index: VoteIndex,
    log: LogWriter,
    /// Set when a failed append could not be rolled back. The tail of the
    /// file is then unknown and no further writes are accepted.
    broken: bool,
}

/// Crash-recoverable [`VoteStore`].
///
/// A mutation is appended to the log before it touches the index, so a
/// failed append leaves the store unchanged. Torn entries at the tail of
/// the log (from a crash mid-write) are dropped on open.
pub struct WalVoteStore {
    path: PathBuf,
    state: RwLock<WalState>,
    config: WalConfig,
}

impl WalVoteStore {
    /// Open (or create) a log at the given path and replay it.
    pub fn open(path: &Path, config: WalConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut index = VoteIndex::default();
        let valid_len = if path.exists() {
            replay(path, &mut index)?
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > valid_len {
            warn!(
                path = %path.display(),
                valid_len,
                "truncating torn tail of vote log"
            );
            file.set_len(valid_len)?;
        }

        info!(path = %path.display(), votes = index.len(), "opened vote log");
        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(WalState {
                index,
                log: LogWriter::new(file, valid_len),
                broken: false,
            }),
            config,
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log in bytes.
    pub fn log_len(&self) -> StoreResult<u64> {
        Ok(self.read_state()?.log.offset)
    }

    /// Rewrite the log so it holds exactly one `Put` per live vote.
    ///
    /// The compacted log is written to a temporary file in the same
    /// directory and renamed over the old one. The append handle for the new
    /// log is taken before the rename, so once the rename succeeds nothing
    /// can fail and leave the store writing to the unlinked old file.
    pub fn compact(&self) -> StoreResult<u64> {
        let mut state = self.write_state()?;
        if state.broken {
            return Err(broken_log());
        }
        let before = state.log.offset;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let mut written = 0u64;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for vote in state.index.votes() {
                let frame = encode_frame(&LogRecord::Put(vote))?;
                out.write_all(&frame)?;
                written += frame.len() as u64;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;
        let file = tmp.as_file().try_clone()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        state.log = LogWriter::new(file, written);

        debug!(before, after = written, "compacted vote log");
        Ok(written)
    }

    fn read_state(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, WalState>> {
        self.state
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write_state(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, WalState>> {
        self.state
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    /// Append a record and, only once it is in the log, apply it.
    fn commit(&self, state: &mut WalState, record: LogRecord) -> StoreResult<()> {
        if state.broken {
            return Err(broken_log());
        }
        let frame = encode_frame(&record)?;
        let start = state.log.offset;

        if let Err(e) = self.write_frame(&mut state.log, &frame) {
            warn!(offset = start, error = %e, "vote log append failed; rolling back");
            if let Err(rollback) = state.log.rollback() {
                warn!(offset = start, error = %rollback, "vote log rollback failed");
                state.broken = true;
            }
            return Err(e.into());
        }

        state.log.offset += frame.len() as u64;
        record.apply(&mut state.index);
        debug!(offset = start, len = frame.len(), "vote log append");
        Ok(())
    }

    fn write_frame(&self, log: &mut LogWriter, frame: &[u8]) -> io::Result<()> {
        log.append(frame)?;
        if matches!(self.config.sync_mode, SyncMode::EveryWrite) {
            log.file.sync_data()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WalVoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalVoteStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

impl VoteStore for WalVoteStore {
    fn get(&self, key: &VoteKey) -> StoreResult<Option<Vote>> {
        Ok(self.read_state()?.index.get(key))
    }

    fn insert(&self, vote: &Vote) -> StoreResult<()> {
        let mut state = self.write_state()?;
        if state.index.contains(&vote.key()) {
            return Err(StoreError::Conflict { key: vote.key() });
        }
        self.commit(&mut state, LogRecord::Put(*vote))
    }

    fn update(&self, key: &VoteKey, direction: Direction) -> StoreResult<()> {
        let mut state = self.write_state()?;
        if !state.index.contains(key) {
            return Err(StoreError::Conflict { key: *key });
        }
        let vote = Vote::new(key.voter, key.target, direction);
        self.commit(&mut state, LogRecord::Put(vote))
    }

    fn delete(&self, key: &VoteKey) -> StoreResult<bool> {
        let mut state = self.write_state()?;
        if !state.index.contains(key) {
            return Ok(false);
        }
        self.commit(&mut state, LogRecord::Remove(*key))?;
        Ok(true)
    }

    fn scan_target(&self, target: &TargetId) -> StoreResult<Vec<Vote>> {
        Ok(self.read_state()?.index.scan_target(target))
    }

    fn scan_voter(&self, voter: &VoterId) -> StoreResult<Vec<Vote>> {
        Ok(self.read_state()?.index.scan_voter(voter))
    }

    fn purge_voter(&self, voter: &VoterId) -> StoreResult<usize> {
        let mut state = self.write_state()?;
        let count = state.index.scan_voter(voter).len();
        if count > 0 {
            self.commit(&mut state, LogRecord::PurgeVoter(*voter))?;
        }
        Ok(count)
    }

    fn purge_target(&self, target: &TargetId) -> StoreResult<usize> {
        let mut state = self.write_state()?;
        let count = state.index.scan_target(target).len();
        if count > 0 {
            self.commit(&mut state, LogRecord::PurgeTarget(*target))?;
        }
        Ok(count)
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.read_state()?.index.len())
    }
}

fn encode_frame(record: &LogRecord) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization("log record exceeds 4 GiB".into()))?;
    let crc = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn broken_log() -> StoreError {
    StoreError::Unavailable("vote log tail is unknown after a failed rollback".into())
}

/// Replay every valid record into `index`.
///
/// Entries that fail the CRC check are skipped. Replay stops at the first
/// entry whose length runs past the end of the file; the returned offset is
/// the end of the last complete entry.
fn replay(path: &Path, index: &mut VoteIndex) -> StoreResult<u64> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
    let file_len = bytes.len();

    let mut offset = 0usize;
    let mut applied = 0usize;
    while offset + HEADER_SIZE <= file_len {
        let header = &bytes[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let end = offset + HEADER_SIZE + length;
        if length == 0 || end > file_len {
            warn!(offset, length, file_len, "invalid log entry length; stopping replay");
            break;
        }

        let payload = &bytes[offset + HEADER_SIZE..end];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping log entry"
            );
            offset = end;
            continue;
        }

        match bincode::deserialize::<LogRecord>(payload) {
            Ok(record) => {
                record.apply(index);
                applied += 1;
            }
            Err(e) => {
                warn!(offset, error = %e, "failed to decode log entry; skipping");
            }
        }
        offset = end;
    }

    debug!(applied, votes = index.len(), "vote log replay complete");
    Ok(offset as u64)
}
