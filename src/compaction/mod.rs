//! Conversation Compaction
//!
//! This module replaces a transcript prefix with a generated summary to keep
//! context size bounded, without losing messages that land in the durable log
//! while the summarization call is in flight.
//!
//! ## Features
//!
//! - **Reconciliation**: the session view is rebuilt from the durable entry
//!   log immediately before and after summarization
//! - **One attempt per invocation**: no internal retry loop; summarization
//!   failure propagates to the caller
//! - **Degrading token accounting**: a failed or implausible post-compaction
//!   estimate degrades to "unknown" instead of failing the compaction
//!
//! ## Usage
//!
//! ```ignore
//! use recap::compaction::{CompactionConfig, Compactor, HeuristicEstimator};
//!
//! let compactor = Compactor::new(CompactionConfig::default());
//! let outcome = compactor
//!     .compact(&mut session, &mut log, &summarizer, &HeuristicEstimator, None)
//!     .await?;
//! ```

mod config;
mod estimate;
mod orchestrator;

pub use config::{CompactionConfig, ContextLimit, parse_context_limit};
pub use estimate::{HeuristicEstimator, TokenEstimator, estimate_total};
pub use orchestrator::Compactor;

use crate::session::Message;
use async_trait::async_trait;

/// Approximate characters per token used by the heuristic estimator.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Default model context window size in tokens.
pub const DEFAULT_MODEL_WINDOW_TOKENS: u64 = 200_000;

/// Safety margin below the context limit at which compaction triggers
/// (percentage points). If the limit is 80%, compaction triggers at 70%.
pub const COMPACTION_SAFETY_MARGIN: f32 = 10.0;

/// Result of the opaque summarization operation.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    /// The generated summary text.
    pub summary: String,
    /// Cut point: id of the first message retained verbatim. `None` means
    /// the entire snapshot was summarized.
    pub first_kept_entry_id: Option<String>,
    /// Token count of the transcript prior to compaction, as reported by the
    /// summarization operation.
    pub tokens_before: u64,
    /// Opaque diagnostic payload.
    pub details: serde_json::Value,
}

/// Outcome handed back to the caller after a completed compaction.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub compacted: bool,
    pub summary: String,
    pub first_kept_entry_id: Option<String>,
    pub tokens_before: u64,
    /// `None` means the post-compaction estimate could not be trusted.
    pub tokens_after: Option<u64>,
    pub details: serde_json::Value,
}

/// The model-calling summarization routine, treated as opaque: potentially
/// slow, potentially failing. Exactly one call is made per compaction.
///
/// `keep_recent_messages` is the configured tail-size hint: how many of the
/// most recent messages the caller would like kept verbatim. Implementations
/// may honor it exactly, loosely, or not at all; the cut point they return in
/// [`SummaryOutcome::first_kept_entry_id`] is what actually decides the tail.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        messages: &[Message],
        keep_recent_messages: usize,
        custom_instructions: Option<&str>,
    ) -> anyhow::Result<SummaryOutcome>;
}
