//! Durable entry log: the authoritative transcript for a session.
//!
//! One JSON message per line. Appends are durable immediately; writes that
//! arrive mid-turn (e.g. tool results) may be staged with [`EntryLog::buffer`]
//! and drained by [`EntryLog::flush`]. Reconciliation before and after
//! summarization always flushes, then reloads from this log, so the view
//! being summarized never trails the durable transcript.

use crate::errors::CompactionError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::Message;

pub struct EntryLog {
    path: PathBuf,
    pending: Vec<Message>,
}

impl EntryLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message durably.
    pub fn append(&mut self, message: &Message) -> Result<(), CompactionError> {
        let line = self.encode(message)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| CompactionError::LogWriteFailed {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| CompactionError::LogWriteFailed {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }

    /// Stage a message for a later durable write.
    pub fn buffer(&mut self, message: Message) {
        self.pending.push(message);
    }

    /// Number of staged writes not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drain staged writes to disk. Idempotent when nothing is pending.
    pub fn flush(&mut self) -> Result<(), CompactionError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut batch = String::new();
        for message in &self.pending {
            batch.push_str(&self.encode(message)?);
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| CompactionError::LogWriteFailed {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(batch.as_bytes())
            .map_err(|source| CompactionError::LogWriteFailed {
                path: self.path.clone(),
                source,
            })?;

        self.pending.clear();
        Ok(())
    }

    /// Read and parse the durable log. Staged-but-unflushed writes are not
    /// included.
    pub fn entries(&self) -> Result<Vec<Message>, CompactionError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|source| CompactionError::LogReadFailed {
                path: self.path.clone(),
                source,
            })?;

        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let message: Message =
                serde_json::from_str(line).map_err(|source| CompactionError::LogParseFailed {
                    path: self.path.clone(),
                    line: idx + 1,
                    source,
                })?;
            entries.push(message);
        }

        Ok(entries)
    }

    /// Atomically rewrite the log with a compacted transcript, so later
    /// reloads see the summary plus the kept tail instead of the full
    /// pre-compaction history.
    pub fn checkpoint(&mut self, entries: &[Message]) -> Result<(), CompactionError> {
        let mut content = String::new();
        for message in entries {
            content.push_str(&self.encode(message)?);
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).map_err(|source| CompactionError::LogWriteFailed {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| CompactionError::LogWriteFailed {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    fn encode(&self, message: &Message) -> Result<String, CompactionError> {
        let json =
            serde_json::to_string(message).map_err(|source| CompactionError::LogEncodeFailed {
                path: self.path.clone(),
                source,
            })?;
        Ok(format!("{json}\n"))
    }
}
