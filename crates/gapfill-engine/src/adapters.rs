//! Collaborator seams consumed by the engine, plus their production
//! implementations over [`gapfill_llm::ChatClient`].
//!
//! Every adapter call is a potentially slow network operation; the engine
//! never holds a campaign lock across one except for the narrow commit step.

use async_trait::async_trait;

use gapfill_core::candidates::CandidateProfile;
use gapfill_core::error::{GapfillError, Result};
use gapfill_core::types::{Classified, MessagePurpose};
use gapfill_llm::{ChatClient, ComposeContext, RankedCandidate};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Orders candidates for outreach, best first.
#[async_trait]
pub trait RankingOracle: Send + Sync {
    async fn rank(&self, profiles: &[CandidateProfile]) -> Result<Vec<RankedCandidate>>;
}

/// Produces one human-readable outbound message.
#[async_trait]
pub trait Composer: Send + Sync {
    async fn compose(&self, purpose: MessagePurpose, ctx: &ComposeContext) -> Result<String>;
}

/// Tags an inbound reply with intent and confidence.
#[async_trait]
pub trait ReplyClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classified>;
}

/// Delivers one message to one address; returns an opaque delivery token.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str, body: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// ChatClient implementations
// ---------------------------------------------------------------------------

fn adapter_err(e: gapfill_llm::LlmError) -> GapfillError {
    GapfillError::Adapter(e.to_string())
}

#[async_trait]
impl RankingOracle for ChatClient {
    async fn rank(&self, profiles: &[CandidateProfile]) -> Result<Vec<RankedCandidate>> {
        self.rank_candidates(profiles).await.map_err(adapter_err)
    }
}

#[async_trait]
impl Composer for ChatClient {
    async fn compose(&self, purpose: MessagePurpose, ctx: &ComposeContext) -> Result<String> {
        ChatClient::compose(self, purpose, ctx).await.map_err(adapter_err)
    }
}

#[async_trait]
impl ReplyClassifier for ChatClient {
    async fn classify(&self, text: &str) -> Result<Classified> {
        self.classify_reply(text).await.map_err(adapter_err)
    }
}
