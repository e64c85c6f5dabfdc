//! Candidate ranking: score each candidate 0–10 from sentiment, booking
//! history, and responsiveness.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use gapfill_core::candidates::CandidateProfile;

use crate::client::ChatClient;
use crate::error::Result;

const RANK_SYSTEM_PROMPT: &str = "You evaluate customers for slot-filling campaigns. \
Score each customer 0-10 based on: \
- Message sentiment (avoid recent complaints) \
- Booking history (prefer repeat customers) \
- Responsiveness \
Return JSON with a \"customers\" array containing objects with \"customer_id\", \
\"score\" (0-10), and \"reason\" fields.";

// ---------------------------------------------------------------------------
// RankedCandidate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankedCandidate {
    pub customer_id: Uuid,
    pub score: f64,
    #[serde(default)]
    pub reason: String,
}

/// Parse the oracle's JSON body into a score-descending list.
///
/// The sort is stable: equal scores keep the order the oracle returned.
/// Entries with unparseable ids are dropped with a warning rather than
/// failing the whole ranking.
pub fn parse_rank_response(body: &Value) -> Vec<RankedCandidate> {
    let entries = body
        .get("customers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut ranked: Vec<RankedCandidate> = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<RankedCandidate>(entry) {
            Ok(r) => ranked.push(r),
            Err(e) => warn!(error = %e, "dropping unparseable ranking entry"),
        }
    }
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

impl ChatClient {
    /// Ask the oracle to rank `profiles`. Returns candidates best-first.
    pub async fn rank_candidates(
        &self,
        profiles: &[CandidateProfile],
    ) -> Result<Vec<RankedCandidate>> {
        let payload = serde_json::to_string(profiles)?;
        let body = self.complete_json(RANK_SYSTEM_PROMPT, &payload).await?;
        Ok(parse_rank_response(&body))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_and_sorts_descending() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let body = json!({"customers": [
            {"customer_id": a, "score": 4.0, "reason": "meh"},
            {"customer_id": b, "score": 9.0, "reason": "loyal"},
        ]});
        let ranked = parse_rank_response(&body);
        assert_eq!(ranked[0].customer_id, b);
        assert_eq!(ranked[1].customer_id, a);
    }

    #[test]
    fn ties_keep_oracle_order() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let body = json!({"customers": ids
            .iter()
            .map(|id| json!({"customer_id": id, "score": 5.0}))
            .collect::<Vec<_>>()});
        let ranked = parse_rank_response(&body);
        let got: Vec<Uuid> = ranked.iter().map(|r| r.customer_id).collect();
        assert_eq!(got, ids);
    }

    #[test]
    fn malformed_entries_dropped_not_fatal() {
        let good = Uuid::new_v4();
        let body = json!({"customers": [
            {"customer_id": "not-a-uuid", "score": 8.0},
            {"customer_id": good, "score": 3.0},
        ]});
        let ranked = parse_rank_response(&body);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].customer_id, good);
    }

    #[test]
    fn missing_customers_array_is_empty() {
        assert!(parse_rank_response(&json!({})).is_empty());
    }
}
