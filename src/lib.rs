//! Conversation history compaction with correct token bookkeeping.
//!
//! `recap` keeps a long-running conversational agent's transcript bounded:
//! the [`compaction`] module replaces a transcript prefix with a generated
//! summary without losing messages appended concurrently with the
//! summarization call, and the [`ledger`] module records the compaction and
//! refreshes cached token totals in a durable session store.

pub mod compaction;
pub mod errors;
pub mod ledger;
pub mod session;
