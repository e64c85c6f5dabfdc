//! Two customers accept the same slot at the same instant; exactly one may
//! win, every time.

mod support;

use std::sync::Arc;
use std::time::Duration;

use gapfill_core::types::{CampaignStatus, OutreachStatus, ReplyOutcome};
use support::*;

// Long enough that real-time wave timers never fire mid-test.
const WAIT: Duration = Duration::from_secs(30 * 60);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptances_resolve_to_one_winner() {
    for _ in 0..100 {
        let h = harness();
        let c1 = seed_candidate(&h.db, "+1", "C1", 7, "boiler");
        let c2 = seed_candidate(&h.db, "+2", "C2", 8, "boiler");
        *h.oracle.order.lock().unwrap() = vec![c1.id, c2.id];
        let start = h.engine.start_campaign(boiler_campaign(WAIT)).await.unwrap();

        let a = {
            let engine = Arc::clone(&h.engine);
            let campaign = start.campaign_id;
            tokio::spawn(async move { engine.submit_reply(c1.id, campaign, "yes").await })
        };
        let b = {
            let engine = Arc::clone(&h.engine);
            let campaign = start.campaign_id;
            tokio::spawn(async move { engine.submit_reply(c2.id, campaign, "yes").await })
        };
        let (ra, rb) = tokio::join!(a, b);
        let outcomes = [ra.unwrap().unwrap(), rb.unwrap().unwrap()];

        let wins = outcomes
            .iter()
            .filter(|o| **o == ReplyOutcome::Accepted)
            .count();
        let losses = outcomes
            .iter()
            .filter(|o| **o == ReplyOutcome::LostRace)
            .count();
        assert_eq!(wins, 1, "exactly one acceptance must win: {outcomes:?}");
        assert_eq!(losses, 1);

        // The store agrees with the outcomes.
        let campaign = h.db.get_campaign(start.campaign_id).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Filled);
        let winner = campaign.winner.unwrap();
        let attempts = h.db.attempts_for_campaign(start.campaign_id).unwrap();
        let accepted: Vec<_> = attempts
            .iter()
            .filter(|a| a.status == OutreachStatus::Accepted)
            .collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].customer_id, winner);

        // The winner's appointment moved to the slot.
        let appointments = h.db.appointments_for_customer(winner).unwrap();
        assert_eq!(appointments[0].scheduled_time, campaign.slot_time);
    }
}
