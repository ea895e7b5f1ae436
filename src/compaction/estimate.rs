//! Per-message token estimation.

use anyhow::Result;

use super::CHARS_PER_TOKEN;
use crate::session::Message;

/// Estimates the token cost of a single message.
///
/// Implementations may fail (e.g. a tokenizer that rejects malformed input);
/// the orchestrator degrades a failed estimate to "unknown" rather than
/// failing the compaction.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, message: &Message) -> Result<u64>;
}

/// Character-count heuristic: roughly 4 characters per token.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, message: &Message) -> Result<u64> {
        Ok(message.content.len() as u64 / CHARS_PER_TOKEN)
    }
}

/// Sum per-message estimates over a transcript. Fails if any single estimate
/// fails; saturates instead of overflowing.
pub fn estimate_total(messages: &[Message], estimator: &dyn TokenEstimator) -> Result<u64> {
    let mut total: u64 = 0;
    for message in messages {
        total = total.saturating_add(estimator.estimate(message)?);
    }
    Ok(total)
}
