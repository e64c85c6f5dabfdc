//! `gapfill-llm`: the LLM-backed collaborators of the campaign
//! orchestrator, over any OpenAI-compatible chat-completions endpoint.
//!
//! Three capabilities, each a thin typed layer over [`ChatClient`]:
//!
//! - [`ChatClient::rank_candidates`] scores candidates for outreach order
//! - [`ChatClient::compose`] produces one outbound WhatsApp message per
//!   [`gapfill_core::types::MessagePurpose`]
//! - [`ChatClient::classify_reply`] tags an inbound reply as
//!   accept/decline/unclear with a confidence
//!
//! Parsing of model output is deliberately forgiving: a bad ranking entry is
//! dropped, a bad classification degrades to unclear. Transport and API
//! failures surface as [`LlmError`] for the engine's retry policy.

pub mod classify;
pub mod client;
pub mod compose;
pub mod error;
pub mod rank;
pub mod types;

pub use classify::parse_classification;
pub use client::ChatClient;
pub use compose::{AppointmentSummary, ComposeContext, HistoryLine};
pub use error::LlmError;
pub use rank::RankedCandidate;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, LlmError>;
