//! Context limit configuration and the compaction trigger policy.

use anyhow::{Context, Result};

use super::{COMPACTION_SAFETY_MARGIN, DEFAULT_MODEL_WINDOW_TOKENS};

/// Represents a context limit configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextLimit {
    /// Percentage of the model window (e.g., 80%)
    Percentage(f32),
    /// Absolute token count
    Absolute(u64),
}

impl ContextLimit {
    /// Calculate the effective token limit based on the model window size.
    pub fn effective_limit(&self, model_window_tokens: u64) -> u64 {
        match self {
            ContextLimit::Percentage(pct) => {
                ((model_window_tokens as f32) * (*pct / 100.0)) as u64
            }
            ContextLimit::Absolute(tokens) => *tokens,
        }
    }

    /// Check if this limit is a percentage.
    pub fn is_percentage(&self) -> bool {
        matches!(self, ContextLimit::Percentage(_))
    }
}

impl Default for ContextLimit {
    fn default() -> Self {
        ContextLimit::Percentage(80.0)
    }
}

impl std::fmt::Display for ContextLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextLimit::Percentage(pct) => write!(f, "{}%", pct),
            ContextLimit::Absolute(tokens) => write!(f, "{}", tokens),
        }
    }
}

/// Parse a context limit string into a ContextLimit.
///
/// Accepts:
/// - Percentage format: "80%", "60%", etc.
/// - Absolute format: "120000", "50000", etc.
pub fn parse_context_limit(s: &str) -> Result<ContextLimit> {
    let s = s.trim();

    if s.is_empty() {
        anyhow::bail!("Context limit cannot be empty");
    }

    if let Some(num_str) = s.strip_suffix('%') {
        let pct: f32 = num_str
            .parse()
            .with_context(|| format!("Invalid percentage in context limit: {}", s))?;

        if pct <= 0.0 || pct > 100.0 {
            anyhow::bail!(
                "Context limit percentage must be between 0 and 100, got {}",
                pct
            );
        }

        Ok(ContextLimit::Percentage(pct))
    } else {
        let tokens: u64 = s
            .parse()
            .with_context(|| format!("Invalid absolute context limit: {}", s))?;

        if tokens == 0 {
            anyhow::bail!("Context limit cannot be zero");
        }

        Ok(ContextLimit::Absolute(tokens))
    }
}

/// Compaction configuration for a session.
///
/// The trigger policy here is advisory: the orchestrator performs exactly one
/// compaction per invocation, and the caller decides when to invoke it.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Configured context limit.
    pub context_limit: ContextLimit,
    /// Model context window size in tokens.
    pub model_window_tokens: u64,
    /// Advisory tail size handed to summarizers: how many recent messages to
    /// keep verbatim.
    pub keep_recent_messages: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            context_limit: ContextLimit::default(),
            model_window_tokens: DEFAULT_MODEL_WINDOW_TOKENS,
            keep_recent_messages: 10,
        }
    }
}

impl CompactionConfig {
    /// Parse a config from a limit string (e.g. "80%" or "120000").
    pub fn with_limit(limit_str: &str, model_window_tokens: u64) -> Result<Self> {
        Ok(Self {
            context_limit: parse_context_limit(limit_str)?,
            model_window_tokens,
            keep_recent_messages: Self::default().keep_recent_messages,
        })
    }

    /// Get the effective token limit.
    pub fn effective_limit(&self) -> u64 {
        self.context_limit.effective_limit(self.model_window_tokens)
    }

    /// Token count at which compaction should be triggered: the effective
    /// limit minus a safety margin.
    pub fn compaction_threshold(&self) -> u64 {
        let limit = self.effective_limit();
        let margin = (limit as f32 * (COMPACTION_SAFETY_MARGIN / 100.0)) as u64;
        limit.saturating_sub(margin)
    }

    /// Check if a session at `current_tokens` with `message_count` messages
    /// is due for compaction. Needs at least 2 messages to have something
    /// worth summarizing.
    pub fn should_compact(&self, current_tokens: u64, message_count: usize) -> bool {
        message_count >= 2 && current_tokens >= self.compaction_threshold()
    }
}
