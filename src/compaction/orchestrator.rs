//! Compaction orchestrator: reconcile, summarize, reconcile, account.
//!
//! The central correctness requirement is that the message list handed to the
//! summarizer, and the transcript used for post-compaction token accounting,
//! both reflect every durably appended message — including ones written
//! concurrently with the compaction call. A single reconciliation primitive
//! (flush pending writes, then rebuild the view from the durable log) runs
//! immediately before summarization and again immediately after it.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::estimate::{TokenEstimator, estimate_total};
use super::{CompactionConfig, CompactionOutcome, Summarizer};
use crate::errors::CompactionError;
use crate::session::{EntryLog, Message, Session};

/// Orchestrates a single compaction attempt for a session.
///
/// Exactly one summarization call is made per invocation; there is no retry
/// loop. The caller decides whether to retry a failed compaction.
#[derive(Debug, Clone)]
pub struct Compactor {
    config: CompactionConfig,
}

impl Compactor {
    pub fn new(config: CompactionConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CompactionConfig::default())
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Check whether the session looks due for compaction. Advisory only;
    /// an unestimable transcript is never reported as due.
    pub fn should_compact(&self, session: &Session, estimator: &dyn TokenEstimator) -> bool {
        estimate_total(session.messages(), estimator)
            .map(|tokens| self.config.should_compact(tokens, session.len()))
            .unwrap_or(false)
    }

    /// Run one compaction: reconcile the session view with the durable log,
    /// summarize, reconcile again, rebuild the transcript as summary plus
    /// kept tail, and compute the post-compaction token estimate.
    ///
    /// Reconciliation and summarization failures are fatal and propagate.
    /// Token-estimation failure is not: it degrades `tokens_after` to `None`.
    /// Pending log writes are flushed on every exit path.
    pub async fn compact(
        &self,
        session: &mut Session,
        log: &mut EntryLog,
        summarizer: &dyn Summarizer,
        estimator: &dyn TokenEstimator,
        custom_instructions: Option<&str>,
    ) -> Result<CompactionOutcome, CompactionError> {
        let result = self
            .run(session, log, summarizer, estimator, custom_instructions)
            .await;

        // Pending writes must not be stranded by a failed compaction. On the
        // success path this is a no-op; on the error path it is best-effort
        // and never masks the original error.
        if let Err(flush_err) = log.flush() {
            match result {
                Ok(_) => return Err(flush_err),
                Err(_) => warn!(error = %flush_err, "flush failed while unwinding compaction"),
            }
        }

        result
    }

    async fn run(
        &self,
        session: &mut Session,
        log: &mut EntryLog,
        summarizer: &dyn Summarizer,
        estimator: &dyn TokenEstimator,
        custom_instructions: Option<&str>,
    ) -> Result<CompactionOutcome, CompactionError> {
        synchronize(log, session)?;
        let snapshot: Vec<Message> = session.messages().to_vec();
        debug!(messages = snapshot.len(), "starting compaction");

        let outcome = summarizer
            .summarize(
                &snapshot,
                self.config.keep_recent_messages,
                custom_instructions,
            )
            .await
            .map_err(CompactionError::Summarization)?;

        // Capture anything appended while the summarizer was running.
        synchronize(log, session)?;

        // The summarized prefix is the snapshot strictly before the cut
        // point. Filtering the reloaded view by id keeps both the verbatim
        // tail and any concurrent appends, in log order.
        let cut = match &outcome.first_kept_entry_id {
            Some(id) => snapshot
                .iter()
                .position(|m| &m.id == id)
                .unwrap_or(snapshot.len()),
            None => snapshot.len(),
        };
        let summarized: HashSet<&str> = snapshot[..cut].iter().map(|m| m.id.as_str()).collect();

        let mut rebuilt = vec![Message::summary(outcome.summary.clone())];
        rebuilt.extend(
            session
                .messages()
                .iter()
                .filter(|m| !summarized.contains(m.id.as_str()))
                .cloned(),
        );

        log.checkpoint(&rebuilt)?;
        session.replace(rebuilt);

        let tokens_after = match estimate_total(session.messages(), estimator) {
            Ok(total) if total <= outcome.tokens_before => Some(total),
            Ok(total) => {
                warn!(
                    tokens_after = total,
                    tokens_before = outcome.tokens_before,
                    "post-compaction estimate exceeds pre-compaction count, discarding"
                );
                None
            }
            Err(err) => {
                warn!(error = %err, "token estimation failed, post-compaction count unknown");
                None
            }
        };

        debug!(
            tokens_before = outcome.tokens_before,
            ?tokens_after,
            kept = session.len(),
            "compaction complete"
        );

        Ok(CompactionOutcome {
            compacted: true,
            summary: outcome.summary,
            first_kept_entry_id: outcome.first_kept_entry_id,
            tokens_before: outcome.tokens_before,
            tokens_after,
            details: outcome.details,
        })
    }
}

/// The canonical reconciliation primitive: flush any staged writes, then
/// rebuild the session view from the authoritative durable log.
fn synchronize(log: &mut EntryLog, session: &mut Session) -> Result<(), CompactionError> {
    log.flush()?;
    session.replace(log.entries()?);
    Ok(())
}
