//! Session ledger: persisted accounting for compaction counts and cached
//! token totals.
//!
//! The ledger is the source of truth for accounting fields. After a
//! compaction, [`increment_compaction_count`] records the new count and
//! refreshes the cached token totals so that a stale pre-compaction total can
//! never linger — a stale high total could suppress a needed future
//! compaction or trip unrelated memory-pressure logic.

mod store;

pub use store::{load_store, update_store};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::errors::LedgerError;

/// Persisted accounting record for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Incremented exactly once per successful compaction; never decreases.
    #[serde(default)]
    pub compaction_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

impl SessionEntry {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            compaction_count: 0,
            total_tokens: None,
            input_tokens: None,
            output_tokens: None,
            updated_at: now,
        }
    }
}

/// In-memory session store, keyed by session id. Injected explicitly into
/// the updater; there is no ambient process-wide store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionStore {
    entries: HashMap<String, SessionEntry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&SessionEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: SessionEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Inputs to [`increment_compaction_count`]. Every field is optional; the
/// updater is a silent no-op when there is nothing addressable to update.
pub struct LedgerUpdate<'a> {
    /// Fallback entry used when the store has no record under `session_key`.
    pub session_entry: Option<SessionEntry>,
    pub store: Option<&'a mut SessionStore>,
    pub session_key: Option<&'a str>,
    /// Durable store file; when present, the same field-level update is
    /// applied to the persisted copy via an atomic read-merge-write.
    pub store_path: Option<&'a Path>,
    /// Timestamp for `updated_at`; defaults to now.
    pub now: Option<DateTime<Utc>>,
    /// Post-compaction token estimate; `None` means unknown.
    pub tokens_after: Option<u64>,
}

impl<'a> LedgerUpdate<'a> {
    pub fn new(store: &'a mut SessionStore, session_key: &'a str) -> Self {
        Self {
            session_entry: None,
            store: Some(store),
            session_key: Some(session_key),
            store_path: None,
            now: None,
            tokens_after: None,
        }
    }
}

/// Record a completed compaction: bump the compaction count and refresh
/// cached token totals, in memory and (when a path is given) durably.
///
/// Returns `Ok(None)` without mutating anything when the store or key is
/// missing, or when neither the store nor the fallback entry resolves —
/// callers that do not track compaction counts are unaffected.
pub fn increment_compaction_count(
    update: LedgerUpdate<'_>,
) -> Result<Option<u32>, LedgerError> {
    let LedgerUpdate {
        session_entry,
        store,
        session_key,
        store_path,
        now,
        tokens_after,
    } = update;

    let (Some(store), Some(key)) = (store, session_key) else {
        return Ok(None);
    };
    let Some(entry) = store.get(key).cloned().or(session_entry) else {
        debug!(session_key = key, "no session entry to update, skipping");
        return Ok(None);
    };

    let now = now.unwrap_or_else(Utc::now);
    let next_count = entry.compaction_count + 1;

    let mut updated = entry;
    apply_compaction_update(&mut updated, next_count, now, tokens_after);
    store.insert(key, updated.clone());

    if let Some(path) = store_path {
        // Merge the same field-level update onto the persisted copy, which
        // may have diverged from the in-memory store in the meantime.
        update_store(path, |persisted| {
            let mut merged = persisted.get(key).cloned().unwrap_or_else(|| updated.clone());
            apply_compaction_update(&mut merged, next_count, now, tokens_after);
            persisted.insert(key, merged);
        })?;
    }

    debug!(session_key = key, compaction_count = next_count, "recorded compaction");
    Ok(Some(next_count))
}

/// The field-level update applied to both the in-memory and persisted entry.
fn apply_compaction_update(
    entry: &mut SessionEntry,
    next_count: u32,
    now: DateTime<Utc>,
    tokens_after: Option<u64>,
) {
    entry.compaction_count = next_count;
    entry.updated_at = now;

    match tokens_after {
        // A trusted aggregate estimate replaces the total; the input/output
        // breakdown is no longer derivable from an aggregate, so clear it.
        Some(tokens) if tokens > 0 => {
            entry.total_tokens = Some(tokens);
            entry.input_tokens = None;
            entry.output_tokens = None;
        }
        // Known-zero estimate: leave cached totals untouched.
        Some(_) => {}
        // Unknown estimate: reset to zero. A stale pre-compaction total is
        // worse than a conservative zero that later usage will correct.
        None => {
            entry.total_tokens = Some(0);
            entry.input_tokens = Some(0);
            entry.output_tokens = Some(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seeded_entry(count: u32, total: u64) -> SessionEntry {
        SessionEntry {
            compaction_count: count,
            total_tokens: Some(total),
            input_tokens: Some(total / 2),
            output_tokens: Some(total / 2),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_known_tokens_after_replaces_total_and_clears_breakdown() {
        // Scenario A: {count: 2, total: 500}, tokens_after = 120.
        let mut store = SessionStore::new();
        store.insert("s1", seeded_entry(2, 500));

        let result = increment_compaction_count(LedgerUpdate {
            tokens_after: Some(120),
            ..LedgerUpdate::new(&mut store, "s1")
        })
        .unwrap();

        assert_eq!(result, Some(3));
        let entry = store.get("s1").unwrap();
        assert_eq!(entry.compaction_count, 3);
        assert_eq!(entry.total_tokens, Some(120));
        assert_eq!(entry.input_tokens, None);
        assert_eq!(entry.output_tokens, None);
    }

    #[test]
    fn test_unknown_tokens_after_resets_totals_to_zero() {
        // Scenario B: same entry, tokens_after unknown.
        let mut store = SessionStore::new();
        store.insert("s1", seeded_entry(2, 500));

        let result = increment_compaction_count(LedgerUpdate {
            tokens_after: None,
            ..LedgerUpdate::new(&mut store, "s1")
        })
        .unwrap();

        assert_eq!(result, Some(3));
        let entry = store.get("s1").unwrap();
        assert_eq!(entry.total_tokens, Some(0));
        assert_eq!(entry.input_tokens, Some(0));
        assert_eq!(entry.output_tokens, Some(0));
    }

    #[test]
    fn test_zero_tokens_after_leaves_totals_untouched() {
        let mut store = SessionStore::new();
        store.insert("s1", seeded_entry(2, 500));

        let result = increment_compaction_count(LedgerUpdate {
            tokens_after: Some(0),
            ..LedgerUpdate::new(&mut store, "s1")
        })
        .unwrap();

        assert_eq!(result, Some(3));
        let entry = store.get("s1").unwrap();
        assert_eq!(entry.total_tokens, Some(500));
        assert_eq!(entry.input_tokens, Some(250));
        assert_eq!(entry.output_tokens, Some(250));
    }

    #[test]
    fn test_missing_store_or_key_is_noop() {
        let result = increment_compaction_count(LedgerUpdate {
            session_entry: Some(seeded_entry(1, 100)),
            store: None,
            session_key: Some("s1"),
            store_path: None,
            now: None,
            tokens_after: Some(50),
        })
        .unwrap();
        assert_eq!(result, None);

        let mut store = SessionStore::new();
        store.insert("s1", seeded_entry(1, 100));
        let result = increment_compaction_count(LedgerUpdate {
            session_entry: None,
            store: Some(&mut store),
            session_key: None,
            store_path: None,
            now: None,
            tokens_after: Some(50),
        })
        .unwrap();
        assert_eq!(result, None);
        // Repeated no-ops never mutate.
        assert_eq!(store.get("s1").unwrap().compaction_count, 1);
    }

    #[test]
    fn test_missing_entry_without_fallback_is_noop() {
        // Scenario D: store and key present, entry absent, no fallback.
        let mut store = SessionStore::new();
        let result = increment_compaction_count(LedgerUpdate::new(&mut store, "absent")).unwrap();
        assert_eq!(result, None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_fallback_entry_used_when_store_misses() {
        let mut store = SessionStore::new();
        let result = increment_compaction_count(LedgerUpdate {
            session_entry: Some(seeded_entry(4, 900)),
            tokens_after: Some(100),
            ..LedgerUpdate::new(&mut store, "s1")
        })
        .unwrap();

        assert_eq!(result, Some(5));
        let entry = store.get("s1").unwrap();
        assert_eq!(entry.compaction_count, 5);
        assert_eq!(entry.total_tokens, Some(100));
    }

    #[test]
    fn test_compaction_count_is_monotonic() {
        let mut store = SessionStore::new();
        store.insert("s1", SessionEntry::new(Utc::now()));

        for expected in 1..=5u32 {
            let result = increment_compaction_count(LedgerUpdate {
                tokens_after: Some(10),
                ..LedgerUpdate::new(&mut store, "s1")
            })
            .unwrap();
            assert_eq!(result, Some(expected));
            assert_eq!(store.get("s1").unwrap().compaction_count, expected);
        }
    }

    #[test]
    fn test_updated_at_uses_supplied_timestamp() {
        let mut store = SessionStore::new();
        store.insert("s1", seeded_entry(0, 100));
        let stamp = Utc::now() - chrono::Duration::hours(3);

        increment_compaction_count(LedgerUpdate {
            now: Some(stamp),
            tokens_after: Some(10),
            ..LedgerUpdate::new(&mut store, "s1")
        })
        .unwrap();

        assert_eq!(store.get("s1").unwrap().updated_at, stamp);
    }

    #[test]
    fn test_durable_update_merges_onto_persisted_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        // The persisted copy diverged: another process recorded different
        // token totals under the same key.
        update_store(&path, |persisted| {
            persisted.insert("s1", seeded_entry(2, 9_999));
        })
        .unwrap();

        let mut store = SessionStore::new();
        store.insert("s1", seeded_entry(2, 500));

        let result = increment_compaction_count(LedgerUpdate {
            store_path: Some(&path),
            tokens_after: Some(120),
            ..LedgerUpdate::new(&mut store, "s1")
        })
        .unwrap();
        assert_eq!(result, Some(3));

        let persisted = load_store(&path).unwrap();
        let entry = persisted.get("s1").unwrap();
        assert_eq!(entry.compaction_count, 3);
        assert_eq!(entry.total_tokens, Some(120));
        assert_eq!(entry.input_tokens, None);
    }

    #[test]
    fn test_durable_update_creates_entry_when_persisted_copy_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let mut store = SessionStore::new();
        store.insert("s1", seeded_entry(0, 100));

        increment_compaction_count(LedgerUpdate {
            store_path: Some(&path),
            tokens_after: None,
            ..LedgerUpdate::new(&mut store, "s1")
        })
        .unwrap();

        let persisted = load_store(&path).unwrap();
        let entry = persisted.get("s1").unwrap();
        assert_eq!(entry.compaction_count, 1);
        assert_eq!(entry.total_tokens, Some(0));
        assert_eq!(entry.input_tokens, Some(0));
        assert_eq!(entry.output_tokens, Some(0));
    }

    #[test]
    fn test_entry_serde_skips_absent_breakdown() {
        let mut entry = seeded_entry(3, 120);
        entry.input_tokens = None;
        entry.output_tokens = None;

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("total_tokens"));
        assert!(!json.contains("input_tokens"));
        assert!(!json.contains("output_tokens"));

        let back: SessionEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
