//! Persisted records: customers, appointments, the message log, campaigns,
//! and outreach attempts. All rows are JSON-encoded into the redb store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;
use uuid::Uuid;

use crate::types::{AppointmentStatus, CampaignStatus, Direction, OutreachStatus};

// ---------------------------------------------------------------------------
// Customer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    /// E.164 phone number, unique per customer.
    pub phone: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(phone: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone: phone.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Appointment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    pub service_type: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled(
        customer_id: Uuid,
        scheduled_time: DateTime<Utc>,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            scheduled_time,
            service_type: service_type.into(),
            status: AppointmentStatus::Scheduled,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageRecord
// ---------------------------------------------------------------------------

/// One row of the append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub direction: Direction,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// Delivery token returned by the notifier, if any.
    pub delivery_sid: Option<String>,
}

impl MessageRecord {
    pub fn inbound(customer_id: Uuid, body: impl Into<String>, sid: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            direction: Direction::Inbound,
            body: body.into(),
            timestamp: Utc::now(),
            delivery_sid: sid,
        }
    }

    pub fn outbound(customer_id: Uuid, body: impl Into<String>, sid: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            direction: Direction::Outbound,
            body: body.into(),
            timestamp: Utc::now(),
            delivery_sid: sid,
        }
    }
}

// ---------------------------------------------------------------------------
// Campaign
// ---------------------------------------------------------------------------

/// One cancelled-slot-filling effort.
///
/// Owned exclusively by the store; orchestration code never caches a copy
/// across an await point; it re-reads before every decision that branches
/// on `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    /// The cancelled slot being offered.
    pub slot_time: DateTime<Utc>,
    pub service_type: String,
    pub discount_percent: u8,
    /// Delay between waves.
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub wait: Duration,
    /// Free-text context from the business owner, woven into offers.
    pub context: Option<String>,
    pub status: CampaignStatus,
    /// Set iff `status == Filled`.
    pub winner: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        slot_time: DateTime<Utc>,
        service_type: impl Into<String>,
        discount_percent: u8,
        wait: Duration,
        context: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_time,
            service_type: service_type.into(),
            discount_percent,
            wait,
            context,
            status: CampaignStatus::Active,
            winner: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutreachAttempt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachAttempt {
    pub campaign_id: Uuid,
    pub customer_id: Uuid,
    /// 1-based wave number.
    pub wave: u32,
    /// The exact offer text that was sent.
    pub message: String,
    pub status: OutreachStatus,
    pub sent_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl OutreachAttempt {
    pub fn sent(campaign_id: Uuid, customer_id: Uuid, wave: u32, message: impl Into<String>) -> Self {
        Self {
            campaign_id,
            customer_id,
            wave,
            message: message.into(),
            status: OutreachStatus::Sent,
            sent_at: Utc::now(),
            responded_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers for Duration (serialized as seconds: u64)
// ---------------------------------------------------------------------------

fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_u64(d.as_secs())
}

fn deserialize_duration<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(d)?;
    Ok(Duration::from_secs(secs))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_starts_active_without_winner() {
        let c = Campaign::new(
            Utc::now(),
            "boiler",
            10,
            Duration::from_secs(1800),
            Some("first come first served".into()),
        );
        assert_eq!(c.status, CampaignStatus::Active);
        assert!(c.winner.is_none());
    }

    #[test]
    fn campaign_wait_roundtrips_as_seconds() {
        let c = Campaign::new(Utc::now(), "boiler", 10, Duration::from_secs(1800), None);
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"wait\":1800"));
        let back: Campaign = serde_json::from_str(&json).unwrap();
        assert_eq!(back.wait, Duration::from_secs(1800));
    }

    #[test]
    fn attempt_starts_sent() {
        let a = OutreachAttempt::sent(Uuid::new_v4(), Uuid::new_v4(), 1, "hi");
        assert_eq!(a.status, OutreachStatus::Sent);
        assert!(a.responded_at.is_none());
    }
}
