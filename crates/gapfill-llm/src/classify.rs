//! Reply classification: accept / decline / unclear with a confidence score.
//!
//! Classification never hard-fails on content: malformed JSON, unknown
//! intents, and out-of-range confidences all degrade to `Unclear`.

use serde_json::Value;
use tracing::warn;

use gapfill_core::types::{Classified, ReplyIntent};

use crate::client::ChatClient;
use crate::error::Result;

const CLASSIFY_SYSTEM_PROMPT: &str = "Analyze customer WhatsApp response to a reschedule offer. \
Return JSON: {\"intent\": \"accept|decline|unclear\", \"confidence\": 0.0-1.0}";

/// Parse a classifier body, defaulting to unclear on anything unexpected.
pub fn parse_classification(body: &Value) -> Classified {
    let intent = match body.get("intent").and_then(Value::as_str) {
        Some("accept") => ReplyIntent::Accept,
        Some("decline") => ReplyIntent::Decline,
        Some("unclear") => ReplyIntent::Unclear,
        other => {
            warn!(?other, "unknown classifier intent, treating as unclear");
            return Classified::unclear();
        }
    };
    let confidence = body
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    Classified { intent, confidence }
}

impl ChatClient {
    /// Classify one inbound reply.
    pub async fn classify_reply(&self, text: &str) -> Result<Classified> {
        let body = self.complete_json(CLASSIFY_SYSTEM_PROMPT, text).await?;
        Ok(parse_classification(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accept_with_confidence() {
        let c = parse_classification(&json!({"intent": "accept", "confidence": 0.92}));
        assert_eq!(c.intent, ReplyIntent::Accept);
        assert!((c.confidence - 0.92).abs() < 1e-9);
    }

    #[test]
    fn unknown_intent_degrades_to_unclear() {
        let c = parse_classification(&json!({"intent": "maybe", "confidence": 0.9}));
        assert_eq!(c.intent, ReplyIntent::Unclear);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn missing_confidence_is_zero() {
        let c = parse_classification(&json!({"intent": "decline"}));
        assert_eq!(c.intent, ReplyIntent::Decline);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn confidence_clamped_into_unit_range() {
        let c = parse_classification(&json!({"intent": "accept", "confidence": 3.5}));
        assert_eq!(c.confidence, 1.0);
    }
}
