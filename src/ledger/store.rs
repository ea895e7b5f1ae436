//! Durable session store: a JSON map of session id to ledger entry.
//!
//! Updates are read-merge-write: load the persisted map (or an empty one),
//! apply the mutation, and replace the file atomically via a temp file and
//! rename. At most one durable update happens per compaction.

use std::fs;
use std::path::Path;

use crate::errors::LedgerError;

use super::SessionStore;

/// Load the persisted store. A missing or empty file is an empty store.
pub fn load_store(path: &Path) -> Result<SessionStore, LedgerError> {
    if !path.exists() {
        return Ok(SessionStore::new());
    }

    let content = fs::read_to_string(path).map_err(|source| LedgerError::StoreReadFailed {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Ok(SessionStore::new());
    }

    serde_json::from_str(&content).map_err(|source| LedgerError::StoreParseFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomic read-merge-write against the persisted store.
pub fn update_store<F>(path: &Path, mutate: F) -> Result<(), LedgerError>
where
    F: FnOnce(&mut SessionStore),
{
    let mut store = load_store(path)?;
    mutate(&mut store);

    let json =
        serde_json::to_string_pretty(&store).map_err(|source| LedgerError::StoreEncodeFailed {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| LedgerError::StoreWriteFailed {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).map_err(|source| LedgerError::StoreWriteFailed {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| LedgerError::StoreWriteFailed {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}
