//! The campaign state machine: candidate selection, wave dispatch, cascade
//! scheduling, and reply resolution.
//!
//! # Concurrency
//!
//! Three independent event handlers may run concurrently for the same
//! campaign: `start_campaign`, `on_wave_timer`, and `submit_reply`. The
//! critical section (everything between reading `Campaign.status` and
//! committing a terminal transition) is serialized two ways:
//!
//! 1. a per-campaign `tokio::sync::Mutex` held only around the decision +
//!    commit, never across compose/notify calls;
//! 2. the store's conditional transitions (`fill_if_active`,
//!    `expire_if_active`), which re-read status inside an exclusive write
//!    transaction and refuse to write if the campaign already left `Active`.
//!
//! The store is the final arbiter; the lock exists so concurrent handlers
//! resolve in a predictable order. Losing the conditional write is a normal
//! outcome ([`ReplyOutcome::LostRace`]), never an error.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gapfill_core::candidates::{build_profile, select_candidates, Candidate};
use gapfill_core::config::Policy;
use gapfill_core::error::{GapfillError, Result};
use gapfill_core::model::{Campaign, Customer, MessageRecord, OutreachAttempt};
use gapfill_core::store::{FillOutcome, SlotFillDb};
use gapfill_core::types::{CampaignStatus, Classified, MessagePurpose, ReplyIntent, ReplyOutcome};
use gapfill_llm::ComposeContext;

use crate::adapters::{Composer, Notifier, RankingOracle, ReplyClassifier};
use crate::scheduler::WaveScheduler;

const SLOT_FILLED_FALLBACK: &str = "Sorry, this slot was just filled by another customer!";

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

/// Input to [`SlotFillEngine::start_campaign`].
#[derive(Debug, Clone)]
pub struct StartCampaign {
    pub slot_time: DateTime<Utc>,
    pub service_type: String,
    pub discount_percent: u8,
    /// Delay before each subsequent wave.
    pub wait: Duration,
    pub context: Option<String>,
}

/// Summary of a started campaign.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignStart {
    pub campaign_id: Uuid,
    /// `Expired` when no candidates were found, a normal terminal state
    /// rather than an error.
    pub status: CampaignStatus,
    pub candidates_evaluated: usize,
    pub contacted: Vec<ContactedCustomer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactedCustomer {
    pub customer_id: Uuid,
    pub name: String,
    pub phone: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// SlotFillEngine
// ---------------------------------------------------------------------------

pub struct SlotFillEngine {
    db: Arc<SlotFillDb>,
    oracle: Arc<dyn RankingOracle>,
    composer: Arc<dyn Composer>,
    classifier: Arc<dyn ReplyClassifier>,
    notifier: Arc<dyn Notifier>,
    scheduler: WaveScheduler,
    policy: Policy,
    locks: StdMutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SlotFillEngine {
    /// Build an engine. The returned receiver carries fired wave timers;
    /// pass it to [`SlotFillEngine::spawn_timer_loop`].
    pub fn new(
        db: Arc<SlotFillDb>,
        oracle: Arc<dyn RankingOracle>,
        composer: Arc<dyn Composer>,
        classifier: Arc<dyn ReplyClassifier>,
        notifier: Arc<dyn Notifier>,
        policy: Policy,
    ) -> (Arc<Self>, mpsc::Receiver<Uuid>) {
        let (scheduler, rx) = WaveScheduler::new(64);
        let engine = Arc::new(Self {
            db,
            oracle,
            composer,
            classifier,
            notifier,
            scheduler,
            policy,
            locks: StdMutex::new(HashMap::new()),
        });
        (engine, rx)
    }

    /// Consume fired wave timers. Errors are logged, never fatal to the loop.
    pub fn spawn_timer_loop(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<Uuid>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(campaign_id) = rx.recv().await {
                if let Err(e) = engine.on_wave_timer(campaign_id).await {
                    warn!(campaign = %campaign_id, error = %e, "wave timer handler failed");
                }
            }
        })
    }

    /// Campaigns with a registered wave timer.
    pub fn pending_timers(&self) -> usize {
        self.scheduler.armed()
    }

    fn campaign_lock(&self, campaign_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("campaign lock registry poisoned");
        locks
            .entry(campaign_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the registry entry once a campaign is terminal. Handlers still
    /// holding a clone of the Arc finish normally; any later handler gets a
    /// fresh mutex and resolves against the store's conditional transitions.
    fn release_lock(&self, campaign_id: Uuid) {
        let mut locks = self.locks.lock().expect("campaign lock registry poisoned");
        locks.remove(&campaign_id);
    }

    /// Campaigns with a live lock registry entry.
    pub fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .expect("campaign lock registry poisoned")
            .len()
    }

    // -----------------------------------------------------------------------
    // start_campaign
    // -----------------------------------------------------------------------

    /// Open a campaign for a cancelled slot and dispatch wave 1.
    ///
    /// An empty candidate pool (even after the any-service fallback) yields
    /// an `Expired` campaign and an empty contact list, as success.
    /// A wave 1 in which *no* message could be sent expires the campaign
    /// and returns an error; partial failure within the wave is tolerated.
    pub async fn start_campaign(&self, request: StartCampaign) -> Result<CampaignStart> {
        let campaign = Campaign::new(
            request.slot_time,
            request.service_type,
            request.discount_percent,
            request.wait,
            request.context,
        );
        self.db.insert_campaign(&campaign)?;
        info!(
            campaign = %campaign.id,
            service = %campaign.service_type,
            discount = campaign.discount_percent,
            "campaign created"
        );

        let candidates = select_candidates(
            &self.db,
            self.policy.window,
            &campaign.service_type,
            &HashSet::new(),
            self.policy.fallback_cap,
            Utc::now(),
        )?;
        if candidates.is_empty() {
            info!(campaign = %campaign.id, "no candidates found, expiring");
            self.db.expire_if_active(campaign.id)?;
            return Ok(CampaignStart {
                campaign_id: campaign.id,
                status: CampaignStatus::Expired,
                candidates_evaluated: 0,
                contacted: Vec::new(),
            });
        }

        let ordered = self.rank(&candidates).await?;
        let wave: Vec<Candidate> = ordered.into_iter().take(self.policy.wave_size).collect();
        let contacted = self.dispatch_wave(&campaign, &wave, 1).await?;
        if contacted.is_empty() {
            // Nobody was reached, so nothing could ever resolve this
            // campaign. Close it out rather than leave it dangling.
            self.db.expire_if_active(campaign.id)?;
            return Err(GapfillError::WaveFailed {
                campaign: campaign.id,
                wave: 1,
            });
        }

        self.scheduler.arm(campaign.id, campaign.wait);
        info!(
            campaign = %campaign.id,
            contacted = contacted.len(),
            wait_secs = campaign.wait.as_secs(),
            "wave 1 dispatched, next wave armed"
        );
        Ok(CampaignStart {
            campaign_id: campaign.id,
            status: CampaignStatus::Active,
            candidates_evaluated: candidates.len(),
            contacted,
        })
    }

    /// Order candidates by oracle score, best first. Ties keep the oracle's
    /// declared order; candidates the oracle omitted keep selection order at
    /// the tail.
    async fn rank(&self, candidates: &[Candidate]) -> Result<Vec<Candidate>> {
        let mut profiles = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            profiles.push(build_profile(
                &self.db,
                candidate,
                self.policy.rank_history_limit,
            )?);
        }
        let ranked = self.oracle.rank(&profiles).await?;

        let mut by_id: HashMap<Uuid, Candidate> = candidates
            .iter()
            .map(|c| (c.customer.id, c.clone()))
            .collect();
        let mut ordered = Vec::with_capacity(candidates.len());
        for entry in &ranked {
            if let Some(candidate) = by_id.remove(&entry.customer_id) {
                debug!(customer = %entry.customer_id, score = entry.score, "ranked candidate");
                ordered.push(candidate);
            }
        }
        for candidate in candidates {
            if let Some(rest) = by_id.remove(&candidate.customer.id) {
                ordered.push(rest);
            }
        }
        Ok(ordered)
    }

    // -----------------------------------------------------------------------
    // dispatch_wave
    // -----------------------------------------------------------------------

    /// Compose and deliver one offer per candidate, persisting an outreach
    /// attempt and an outbound message-log row per successful send.
    ///
    /// One bad candidate never aborts the wave: compose or send failures are
    /// logged and the wave moves on.
    async fn dispatch_wave(
        &self,
        campaign: &Campaign,
        wave: &[Candidate],
        wave_number: u32,
    ) -> Result<Vec<ContactedCustomer>> {
        let mut contacted = Vec::new();
        for candidate in wave {
            let customer = &candidate.customer;
            let history = self
                .db
                .recent_messages(customer.id, self.policy.compose_history_limit)?;
            let ctx = ComposeContext::from_records(
                customer,
                campaign,
                Some(&candidate.appointment),
                &history,
                None,
            );

            let text = match self.composer.compose(MessagePurpose::Offer, &ctx).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        campaign = %campaign.id,
                        customer = %customer.id,
                        error = %e,
                        "offer compose failed, skipping candidate"
                    );
                    continue;
                }
            };
            let sid = match self.notifier.send(&customer.phone, &text).await {
                Ok(sid) => sid,
                Err(e) => {
                    warn!(
                        campaign = %campaign.id,
                        customer = %customer.id,
                        error = %e,
                        "offer delivery failed, skipping candidate"
                    );
                    continue;
                }
            };

            self.db.insert_attempt(&OutreachAttempt::sent(
                campaign.id,
                customer.id,
                wave_number,
                text.clone(),
            ))?;
            self.db
                .append_message(&MessageRecord::outbound(customer.id, text.clone(), Some(sid)))?;
            contacted.push(ContactedCustomer {
                customer_id: customer.id,
                name: customer.name.clone(),
                phone: customer.phone.clone(),
                message: text,
            });
        }
        Ok(contacted)
    }

    // -----------------------------------------------------------------------
    // on_wave_timer
    // -----------------------------------------------------------------------

    /// Wave timer fired: dispatch the next wave, or expire the campaign if
    /// every eligible candidate has been contacted.
    ///
    /// A timer landing on a campaign that already resolved is a silent
    /// no-op. The lock is held only for the status check and the expire
    /// decision, not across the dispatch sends; an attempt created while an
    /// acceptance commits concurrently resolves through the lost-race path
    /// when that customer replies.
    pub async fn on_wave_timer(&self, campaign_id: Uuid) -> Result<()> {
        let lock = self.campaign_lock(campaign_id);
        let next_wave = {
            let _guard = lock.lock().await;

            let campaign = self.db.get_campaign(campaign_id)?;
            if campaign.status.is_terminal() {
                debug!(campaign = %campaign_id, status = %campaign.status, "timer fired on resolved campaign");
                self.scheduler.disarm(campaign_id);
                self.release_lock(campaign_id);
                return Ok(());
            }

            let contacted = self.db.contacted_customer_ids(campaign_id)?;
            let remaining = select_candidates(
                &self.db,
                self.policy.window,
                &campaign.service_type,
                &contacted,
                self.policy.fallback_cap,
                Utc::now(),
            )?;
            if remaining.is_empty() {
                info!(campaign = %campaign_id, "candidates exhausted, expiring");
                self.db.expire_if_active(campaign_id)?;
                self.scheduler.disarm(campaign_id);
                self.release_lock(campaign_id);
                return Ok(());
            }
            (campaign, remaining)
        };
        let (campaign, remaining) = next_wave;

        let ordered = self.rank(&remaining).await?;
        let wave: Vec<Candidate> = ordered.into_iter().take(self.policy.wave_size).collect();
        let wave_number = self.db.max_wave(campaign_id)? + 1;
        let contacted = self.dispatch_wave(&campaign, &wave, wave_number).await?;
        info!(
            campaign = %campaign_id,
            wave = wave_number,
            contacted = contacted.len(),
            "cascade wave dispatched"
        );

        self.scheduler.arm(campaign_id, campaign.wait);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // submit_reply
    // -----------------------------------------------------------------------

    /// Resolve one inbound reply.
    ///
    /// The inbound message is persisted before classification, so no reply
    /// is ever lost even if every downstream step fails. Classifier failure
    /// degrades to unclear. Composer/notifier failures in the response path
    /// are retried once and otherwise logged; they never unwind a committed
    /// transition.
    pub async fn submit_reply(
        &self,
        customer_id: Uuid,
        campaign_id: Uuid,
        text: &str,
    ) -> Result<ReplyOutcome> {
        let customer = self.db.get_customer(customer_id)?;
        let campaign = self.db.get_campaign(campaign_id)?;
        if self.db.get_attempt(campaign_id, customer_id)?.is_none() {
            return Err(GapfillError::OutreachNotFound {
                campaign: campaign_id,
                customer: customer_id,
            });
        }

        self.db
            .append_message(&MessageRecord::inbound(customer_id, text, None))?;

        let classified = match self.classifier.classify(text).await {
            Ok(c) => c,
            Err(e) => {
                warn!(customer = %customer_id, error = %e, "classification failed, treating as unclear");
                Classified::unclear()
            }
        };
        info!(
            campaign = %campaign_id,
            customer = %customer_id,
            intent = ?classified.intent,
            confidence = classified.confidence,
            "reply classified"
        );

        match classified.intent {
            ReplyIntent::Accept if classified.confidence > self.policy.accept_threshold => {
                self.accept_outcome(&customer, &campaign, text).await
            }
            ReplyIntent::Decline if classified.confidence > self.policy.decline_threshold => {
                self.decline_outcome(&customer, &campaign, text).await
            }
            _ => self.unclear_outcome(&customer, &campaign, text).await,
        }
    }

    /// The acceptance path: conditional Filled commit, then confirmation and
    /// loser fan-out.
    async fn accept_outcome(
        &self,
        customer: &Customer,
        campaign: &Campaign,
        reply: &str,
    ) -> Result<ReplyOutcome> {
        let lock = self.campaign_lock(campaign.id);
        let outcome = {
            let _guard = lock.lock().await;
            // Status re-read, winner flip, loser flips, and the reschedule
            // all commit in one store transaction.
            self.db.fill_if_active(campaign.id, customer.id, Utc::now())?
        };

        let losers = match outcome {
            FillOutcome::Lost => {
                info!(
                    campaign = %campaign.id,
                    customer = %customer.id,
                    "acceptance lost the race"
                );
                self.release_lock(campaign.id);
                self.send_logged(customer, SLOT_FILLED_FALLBACK).await;
                return Ok(ReplyOutcome::LostRace);
            }
            FillOutcome::Won { losers } => losers,
        };

        self.scheduler.disarm(campaign.id);
        self.release_lock(campaign.id);
        info!(
            campaign = %campaign.id,
            winner = %customer.id,
            losers = losers.len(),
            "campaign filled"
        );

        let ctx = ComposeContext::from_records(customer, campaign, None, &[], Some(reply));
        if let Some(confirmation) = self
            .compose_with_retry(MessagePurpose::ConfirmAccept, &ctx)
            .await
        {
            self.send_logged(customer, &confirmation).await;
        }

        for loser in &losers {
            self.notify_filled(campaign, loser).await;
        }
        Ok(ReplyOutcome::Accepted)
    }

    /// Best-effort per-loser notification; one failure never blocks the rest.
    async fn notify_filled(&self, campaign: &Campaign, loser: &OutreachAttempt) {
        let customer = match self.db.get_customer(loser.customer_id) {
            Ok(c) => c,
            Err(e) => {
                warn!(customer = %loser.customer_id, error = %e, "loser lookup failed");
                return;
            }
        };
        let ctx = ComposeContext::from_records(&customer, campaign, None, &[], None);
        if let Some(text) = self
            .compose_with_retry(MessagePurpose::NotifyFilled, &ctx)
            .await
        {
            self.send_logged(&customer, &text).await;
        }
    }

    async fn decline_outcome(
        &self,
        customer: &Customer,
        campaign: &Campaign,
        reply: &str,
    ) -> Result<ReplyOutcome> {
        let changed = self
            .db
            .mark_declined_if_sent(campaign.id, customer.id, Utc::now())?;
        if !changed {
            debug!(
                campaign = %campaign.id,
                customer = %customer.id,
                "decline on already-resolved attempt, skipping ack"
            );
            return Ok(ReplyOutcome::Declined);
        }

        let ctx = ComposeContext::from_records(customer, campaign, None, &[], Some(reply));
        if let Some(ack) = self
            .compose_with_retry(MessagePurpose::AckDecline, &ctx)
            .await
        {
            self.send_logged(customer, &ack).await;
        }
        Ok(ReplyOutcome::Declined)
    }

    async fn unclear_outcome(
        &self,
        customer: &Customer,
        campaign: &Campaign,
        reply: &str,
    ) -> Result<ReplyOutcome> {
        let ctx = ComposeContext::from_records(customer, campaign, None, &[], Some(reply));
        if let Some(clarification) = self.compose_with_retry(MessagePurpose::Clarify, &ctx).await {
            self.send_logged(customer, &clarification).await;
        }
        Ok(ReplyOutcome::Clarify)
    }

    // -----------------------------------------------------------------------
    // Response-path helpers
    // -----------------------------------------------------------------------

    /// Compose with a single retry; `None` after the retry also fails.
    async fn compose_with_retry(
        &self,
        purpose: MessagePurpose,
        ctx: &ComposeContext,
    ) -> Option<String> {
        for attempt in 0..2 {
            match self.composer.compose(purpose, ctx).await {
                Ok(text) => return Some(text),
                Err(e) => {
                    warn!(purpose = %purpose, attempt, error = %e, "compose failed");
                }
            }
        }
        None
    }

    /// Deliver with a single retry and append to the message log either way.
    ///
    /// The log row is written even when both delivery attempts fail (with no
    /// delivery sid), so the record of what the customer was told, or was
    /// meant to be told, survives a notifier outage.
    async fn send_logged(&self, customer: &Customer, body: &str) {
        let mut sid = None;
        for attempt in 0..2 {
            match self.notifier.send(&customer.phone, body).await {
                Ok(s) => {
                    sid = Some(s);
                    break;
                }
                Err(e) => {
                    warn!(customer = %customer.id, attempt, error = %e, "delivery failed");
                }
            }
        }
        if let Err(e) = self
            .db
            .append_message(&MessageRecord::outbound(customer.id, body, sid))
        {
            warn!(customer = %customer.id, error = %e, "message log append failed");
        }
    }
}
