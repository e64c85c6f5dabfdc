//! Durable storage for campaigns, outreach, customers, appointments, and the
//! message log, using redb.
//!
//! # Table design
//!
//! Customers, appointments, and campaigns are keyed by raw UUID bytes.
//! Messages use a 24-byte composite key:
//! ```text
//! [ timestamp_ms: u64 big-endian (8 bytes) | uuid: 16 bytes ]
//! ```
//! so byte ordering equals timestamp ordering and "most recent first" is a
//! reverse scan. Outreach attempts use a 32-byte composite key:
//! ```text
//! [ campaign uuid: 16 bytes | customer uuid: 16 bytes ]
//! ```
//! which makes "at most one attempt per (campaign, customer)" a key-level
//! property and turns per-campaign queries into a prefix range scan.
//!
//! # Transitions
//!
//! The two terminal campaign transitions ([`SlotFillDb::fill_if_active`] and
//! [`SlotFillDb::expire_if_active`]) re-read the campaign status inside a
//! single write transaction. redb serializes write transactions, so whichever
//! caller commits first wins and the other observes the already-changed
//! status and gets the lost-race result.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{GapfillError, Result};
use crate::model::{Appointment, Campaign, Customer, MessageRecord, OutreachAttempt};
use crate::types::{AppointmentStatus, CampaignStatus, OutreachStatus};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const CUSTOMERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("customers");
const APPOINTMENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("appointments");
const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");
const CAMPAIGNS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("campaigns");
const OUTREACH: TableDefinition<&[u8], &[u8]> = TableDefinition::new("outreach");

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn message_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

fn outreach_key(campaign_id: Uuid, customer_id: Uuid) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(campaign_id.as_bytes());
    key[16..].copy_from_slice(customer_id.as_bytes());
    key
}

/// Inclusive prefix bounds covering every outreach row of one campaign.
fn outreach_bounds(campaign_id: Uuid) -> ([u8; 32], [u8; 32]) {
    let mut lo = [0u8; 32];
    let mut hi = [0xffu8; 32];
    lo[..16].copy_from_slice(campaign_id.as_bytes());
    hi[..16].copy_from_slice(campaign_id.as_bytes());
    (lo, hi)
}

fn db_err<E: std::fmt::Display>(e: E) -> GapfillError {
    GapfillError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// FillOutcome
// ---------------------------------------------------------------------------

/// Result of a conditional Filled transition.
#[derive(Debug)]
pub enum FillOutcome {
    /// The transition committed. `losers` are the attempts that were still
    /// `Sent` and were flipped to `NotifiedFilled` in the same transaction.
    Won { losers: Vec<OutreachAttempt> },
    /// The campaign was no longer `Active`; nothing was written.
    Lost,
}

// ---------------------------------------------------------------------------
// SlotFillDb
// ---------------------------------------------------------------------------

/// The durable store behind the campaign orchestrator.
pub struct SlotFillDb {
    db: Database,
}

impl SlotFillDb {
    /// Open or create the database at `path`, ensuring all tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(CUSTOMERS).map_err(db_err)?;
        wt.open_table(APPOINTMENTS).map_err(db_err)?;
        wt.open_table(MESSAGES).map_err(db_err)?;
        wt.open_table(CAMPAIGNS).map_err(db_err)?;
        wt.open_table(OUTREACH).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Customers
    // -----------------------------------------------------------------------

    pub fn insert_customer(&self, customer: &Customer) -> Result<()> {
        self.put(CUSTOMERS, customer.id.as_bytes(), customer)
    }

    pub fn get_customer(&self, id: Uuid) -> Result<Customer> {
        self.get(CUSTOMERS, id.as_bytes())?
            .ok_or(GapfillError::CustomerNotFound(id))
    }

    pub fn customer_by_phone(&self, phone: &str) -> Result<Option<Customer>> {
        let all: Vec<Customer> = self.scan(CUSTOMERS)?;
        Ok(all.into_iter().find(|c| c.phone == phone))
    }

    /// Look up a customer by phone, creating one if absent.
    pub fn upsert_customer_by_phone(&self, phone: &str, name: &str) -> Result<Customer> {
        if let Some(existing) = self.customer_by_phone(phone)? {
            return Ok(existing);
        }
        let customer = Customer::new(phone, name);
        self.insert_customer(&customer)?;
        Ok(customer)
    }

    // -----------------------------------------------------------------------
    // Appointments
    // -----------------------------------------------------------------------

    pub fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        self.put(APPOINTMENTS, appointment.id.as_bytes(), appointment)
    }

    pub fn appointments_for_customer(&self, customer_id: Uuid) -> Result<Vec<Appointment>> {
        let all: Vec<Appointment> = self.scan(APPOINTMENTS)?;
        Ok(all
            .into_iter()
            .filter(|a| a.customer_id == customer_id)
            .collect())
    }

    pub fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        self.get(APPOINTMENTS, id.as_bytes())
    }

    /// Number of completed bookings for one customer (ranking signal).
    pub fn completed_booking_count(&self, customer_id: Uuid) -> Result<usize> {
        Ok(self
            .appointments_for_customer(customer_id)?
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .count())
    }

    /// All `Scheduled` appointments with `scheduled_time` in `[start, end]`.
    pub fn scheduled_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let all: Vec<Appointment> = self.scan(APPOINTMENTS)?;
        Ok(all
            .into_iter()
            .filter(|a| {
                a.status == AppointmentStatus::Scheduled
                    && a.scheduled_time >= start
                    && a.scheduled_time <= end
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Message log
    // -----------------------------------------------------------------------

    pub fn append_message(&self, message: &MessageRecord) -> Result<()> {
        let key = message_key(message.timestamp, message.id);
        self.put(MESSAGES, key.as_slice(), message)
    }

    /// The customer's most recent messages, newest first.
    pub fn recent_messages(&self, customer_id: Uuid, limit: usize) -> Result<Vec<MessageRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(MESSAGES).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)?.rev() {
            let (_, v) = entry.map_err(db_err)?;
            let record: MessageRecord = serde_json::from_slice(v.value())?;
            if record.customer_id == customer_id {
                result.push(record);
                if result.len() == limit {
                    break;
                }
            }
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Campaigns
    // -----------------------------------------------------------------------

    pub fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.put(CAMPAIGNS, campaign.id.as_bytes(), campaign)
    }

    pub fn get_campaign(&self, id: Uuid) -> Result<Campaign> {
        self.get(CAMPAIGNS, id.as_bytes())?
            .ok_or(GapfillError::CampaignNotFound(id))
    }

    // -----------------------------------------------------------------------
    // Outreach
    // -----------------------------------------------------------------------

    /// Insert a new attempt. Rejects a second attempt for the same
    /// (campaign, customer) pair: a customer is contacted at most once per
    /// campaign across all waves.
    pub fn insert_attempt(&self, attempt: &OutreachAttempt) -> Result<()> {
        let key = outreach_key(attempt.campaign_id, attempt.customer_id);
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(OUTREACH).map_err(db_err)?;
            if table.get(key.as_slice()).map_err(db_err)?.is_some() {
                return Err(GapfillError::AlreadyContacted {
                    campaign: attempt.campaign_id,
                    customer: attempt.customer_id,
                });
            }
            let value = serde_json::to_vec(attempt)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    pub fn get_attempt(&self, campaign_id: Uuid, customer_id: Uuid) -> Result<Option<OutreachAttempt>> {
        let key = outreach_key(campaign_id, customer_id);
        self.get(OUTREACH, key.as_slice())
    }

    pub fn attempts_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<OutreachAttempt>> {
        let (lo, hi) = outreach_bounds(campaign_id);
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(OUTREACH).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table
            .range(lo.as_slice()..=hi.as_slice())
            .map_err(db_err)?
        {
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    pub fn contacted_customer_ids(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self
            .attempts_for_campaign(campaign_id)?
            .into_iter()
            .map(|a| a.customer_id)
            .collect())
    }

    /// Highest wave number dispatched so far, 0 if none.
    pub fn max_wave(&self, campaign_id: Uuid) -> Result<u32> {
        Ok(self
            .attempts_for_campaign(campaign_id)?
            .iter()
            .map(|a| a.wave)
            .max()
            .unwrap_or(0))
    }

    // -----------------------------------------------------------------------
    // Conditional transitions
    // -----------------------------------------------------------------------

    /// Commit `Active → Filled` for `campaign_id` with `winner_id`, or report
    /// a lost race.
    ///
    /// In one write transaction: re-read the campaign (not Active ⇒
    /// [`FillOutcome::Lost`], nothing written); set status to `Filled` and
    /// record the winner; mark the winner's attempt `Accepted` with
    /// `responded_at = now`; flip every other `Sent` attempt to
    /// `NotifiedFilled`; move the winner's earliest `Scheduled` appointment
    /// to the campaign's slot time.
    ///
    /// Errors if the winner has no outreach attempt on this campaign, since
    /// a `Filled` campaign with zero `Accepted` rows would be inconsistent.
    pub fn fill_if_active(
        &self,
        campaign_id: Uuid,
        winner_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<FillOutcome> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let outcome = {
            let mut campaigns = wt.open_table(CAMPAIGNS).map_err(db_err)?;
            let mut outreach = wt.open_table(OUTREACH).map_err(db_err)?;
            let mut appointments = wt.open_table(APPOINTMENTS).map_err(db_err)?;

            let mut campaign: Campaign = match campaigns
                .get(campaign_id.as_bytes().as_slice())
                .map_err(db_err)?
            {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => return Err(GapfillError::CampaignNotFound(campaign_id)),
            };
            if campaign.status != CampaignStatus::Active {
                return Ok(FillOutcome::Lost);
            }

            // Collect this campaign's attempts before mutating the table.
            let (lo, hi) = outreach_bounds(campaign_id);
            let mut attempts: Vec<OutreachAttempt> = Vec::new();
            for entry in outreach
                .range(lo.as_slice()..=hi.as_slice())
                .map_err(db_err)?
            {
                let (_, v) = entry.map_err(db_err)?;
                attempts.push(serde_json::from_slice(v.value())?);
            }
            if !attempts.iter().any(|a| a.customer_id == winner_id) {
                return Err(GapfillError::Store(format!(
                    "winner {winner_id} has no outreach attempt on campaign {campaign_id}"
                )));
            }

            campaign.status = CampaignStatus::Filled;
            campaign.winner = Some(winner_id);
            let value = serde_json::to_vec(&campaign)?;
            campaigns
                .insert(campaign_id.as_bytes().as_slice(), value.as_slice())
                .map_err(db_err)?;

            let mut losers = Vec::new();
            for mut attempt in attempts {
                if attempt.customer_id == winner_id {
                    attempt.status = OutreachStatus::Accepted;
                    attempt.responded_at = Some(now);
                } else if attempt.status == OutreachStatus::Sent {
                    attempt.status = OutreachStatus::NotifiedFilled;
                    losers.push(attempt.clone());
                } else {
                    continue;
                }
                let key = outreach_key(attempt.campaign_id, attempt.customer_id);
                let value = serde_json::to_vec(&attempt)?;
                outreach
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(db_err)?;
            }

            // The reschedule: winner's earliest scheduled appointment moves
            // to the freed slot, in the same transaction as the status flip.
            let mut winner_appointments: Vec<Appointment> = Vec::new();
            for entry in appointments.iter().map_err(db_err)? {
                let (_, v) = entry.map_err(db_err)?;
                let a: Appointment = serde_json::from_slice(v.value())?;
                if a.customer_id == winner_id && a.status == AppointmentStatus::Scheduled {
                    winner_appointments.push(a);
                }
            }
            winner_appointments.sort_by_key(|a| a.scheduled_time);
            if let Some(mut earliest) = winner_appointments.into_iter().next() {
                earliest.scheduled_time = campaign.slot_time;
                let value = serde_json::to_vec(&earliest)?;
                appointments
                    .insert(earliest.id.as_bytes().as_slice(), value.as_slice())
                    .map_err(db_err)?;
            }

            FillOutcome::Won { losers }
        };
        wt.commit().map_err(db_err)?;
        Ok(outcome)
    }

    /// Commit `Active → Expired`. Returns `false` (nothing written) if the
    /// campaign already left `Active`.
    pub fn expire_if_active(&self, campaign_id: Uuid) -> Result<bool> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let expired = {
            let mut campaigns = wt.open_table(CAMPAIGNS).map_err(db_err)?;
            let mut campaign: Campaign = match campaigns
                .get(campaign_id.as_bytes().as_slice())
                .map_err(db_err)?
            {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => return Err(GapfillError::CampaignNotFound(campaign_id)),
            };
            if campaign.status != CampaignStatus::Active {
                false
            } else {
                campaign.status = CampaignStatus::Expired;
                let value = serde_json::to_vec(&campaign)?;
                campaigns
                    .insert(campaign_id.as_bytes().as_slice(), value.as_slice())
                    .map_err(db_err)?;
                true
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(expired)
    }

    /// Mark one attempt `Declined` iff it is still `Sent`. Returns `false`
    /// for a double-submitted decline or an already-resolved attempt.
    pub fn mark_declined_if_sent(
        &self,
        campaign_id: Uuid,
        customer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let key = outreach_key(campaign_id, customer_id);
        let wt = self.db.begin_write().map_err(db_err)?;
        let declined = {
            let mut table = wt.open_table(OUTREACH).map_err(db_err)?;
            let mut attempt: OutreachAttempt = match table.get(key.as_slice()).map_err(db_err)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => return Ok(false),
            };
            if attempt.status != OutreachStatus::Sent {
                false
            } else {
                attempt.status = OutreachStatus::Declined;
                attempt.responded_at = Some(now);
                let value = serde_json::to_vec(&attempt)?;
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(db_err)?;
                true
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(declined)
    }

    // -----------------------------------------------------------------------
    // Generic helpers
    // -----------------------------------------------------------------------

    fn put<T: serde::Serialize>(
        &self,
        def: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(def).map_err(db_err)?;
            table.insert(key, bytes.as_slice()).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        def: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> Result<Option<T>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(def).map_err(db_err)?;
        match table.get(key).map_err(db_err)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn scan<T: serde::de::DeserializeOwned>(
        &self,
        def: TableDefinition<&[u8], &[u8]>,
    ) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(def).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
