//! Typed error hierarchy for the compaction pipeline.
//!
//! Two top-level enums cover the two subsystems:
//! - `CompactionError` — entry-log reconciliation and summarization failures
//! - `LedgerError` — durable session-store read/merge/write failures

use thiserror::Error;

/// Errors from the compaction orchestrator and the durable entry log.
#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("Failed to read entry log at {path}: {source}")]
    LogReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write entry log at {path}: {source}")]
    LogWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed entry on line {line} of {path}: {source}")]
    LogParseFailed {
        path: std::path::PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode entry for {path}: {source}")]
    LogEncodeFailed {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Summarization failed: {0}")]
    Summarization(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the durable session store.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to read session store at {path}: {source}")]
    StoreReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse session store at {path}: {source}")]
    StoreParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode session store for {path}: {source}")]
    StoreEncodeFailed {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write session store at {path}: {source}")]
    StoreWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
