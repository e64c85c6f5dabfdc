//! Candidate selection: a read-only projection over the appointment ledger.
//!
//! A candidate is a customer with at least one `Scheduled` appointment whose
//! time falls inside the campaign's look-ahead window. Exact service-type
//! matches are preferred; if none exist the selection falls back to any
//! service type, capped at [`crate::config::Policy::fallback_cap`]. The
//! fallback keeps campaigns usable when exact inventory is thin: a degraded
//! but valid campaign, not a failure.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Appointment, Customer, MessageRecord};
use crate::store::SlotFillDb;
use crate::types::Direction;

// ---------------------------------------------------------------------------
// CandidateWindow
// ---------------------------------------------------------------------------

/// Look-ahead window for candidate appointments, as offsets from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
pub struct CandidateWindow {
    #[serde(default = "default_min_lead_days")]
    pub min_lead_days: i64,
    #[serde(default = "default_max_lead_days")]
    pub max_lead_days: i64,
}

fn default_min_lead_days() -> i64 {
    5
}

fn default_max_lead_days() -> i64 {
    21
}

impl Default for CandidateWindow {
    fn default() -> Self {
        Self {
            min_lead_days: default_min_lead_days(),
            max_lead_days: default_max_lead_days(),
        }
    }
}

impl CandidateWindow {
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now + chrono::Duration::days(self.min_lead_days),
            now + chrono::Duration::days(self.max_lead_days),
        )
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A customer eligible for outreach, paired with the upcoming appointment
/// that qualified them (used to personalize the offer).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub customer: Customer,
    pub appointment: Appointment,
}

/// Select candidates for one wave.
///
/// Customers in `exclude` (already contacted on this campaign) are skipped.
/// Each customer appears at most once, keyed to their earliest qualifying
/// appointment. Results are ordered by appointment time, then customer id,
/// so repeated calls see a stable order.
pub fn select_candidates(
    db: &SlotFillDb,
    window: CandidateWindow,
    service_type: &str,
    exclude: &HashSet<Uuid>,
    fallback_cap: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>> {
    let (start, end) = window.bounds(now);
    let in_window = db.scheduled_in_window(start, end)?;

    let exact: Vec<&Appointment> = in_window
        .iter()
        .filter(|a| a.service_type == service_type && !exclude.contains(&a.customer_id))
        .collect();

    let (pool, cap) = if exact.is_empty() {
        let any: Vec<&Appointment> = in_window
            .iter()
            .filter(|a| !exclude.contains(&a.customer_id))
            .collect();
        (any, Some(fallback_cap))
    } else {
        (exact, None)
    };

    // One appointment per customer: keep the earliest.
    let mut earliest: HashMap<Uuid, &Appointment> = HashMap::new();
    for a in pool {
        earliest
            .entry(a.customer_id)
            .and_modify(|held| {
                if a.scheduled_time < held.scheduled_time {
                    *held = a;
                }
            })
            .or_insert(a);
    }

    let mut picked: Vec<&Appointment> = earliest.into_values().collect();
    picked.sort_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then(a.customer_id.cmp(&b.customer_id))
    });
    if let Some(cap) = cap {
        picked.truncate(cap);
    }

    let mut candidates = Vec::with_capacity(picked.len());
    for appointment in picked {
        let customer = db.get_customer(appointment.customer_id)?;
        candidates.push(Candidate {
            customer,
            appointment: appointment.clone(),
        });
    }
    Ok(candidates)
}

// ---------------------------------------------------------------------------
// CandidateProfile (ranking payload)
// ---------------------------------------------------------------------------

/// What the ranking oracle sees per candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateProfile {
    pub customer_id: Uuid,
    pub name: String,
    /// Completed bookings, a loyalty signal.
    pub booking_count: usize,
    pub recent_messages: Vec<ProfileMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileMessage {
    pub direction: Direction,
    pub body: String,
}

/// Build the ranking payload for one candidate from store history.
///
/// Message bodies are truncated to 100 chars to keep the prompt bounded.
pub fn build_profile(
    db: &SlotFillDb,
    candidate: &Candidate,
    history_limit: usize,
) -> Result<CandidateProfile> {
    let booking_count = db.completed_booking_count(candidate.customer.id)?;
    let recent = db.recent_messages(candidate.customer.id, history_limit)?;
    Ok(CandidateProfile {
        customer_id: candidate.customer.id,
        name: candidate.customer.name.clone(),
        booking_count,
        recent_messages: recent
            .iter()
            .take(3)
            .map(|m: &MessageRecord| ProfileMessage {
                direction: m.direction,
                body: m.body.chars().take(100).collect(),
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Appointment, Customer};
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, SlotFillDb) {
        let dir = TempDir::new().unwrap();
        let db = SlotFillDb::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn seed(db: &SlotFillDb, phone: &str, days_out: i64, service: &str) -> Customer {
        let customer = db.upsert_customer_by_phone(phone, phone).unwrap();
        let apt = Appointment::scheduled(
            customer.id,
            Utc::now() + chrono::Duration::days(days_out),
            service,
        );
        db.insert_appointment(&apt).unwrap();
        customer
    }

    #[test]
    fn exact_service_match_preferred() {
        let (_dir, db) = open_tmp();
        let boiler = seed(&db, "+1", 7, "boiler");
        let _drain = seed(&db, "+2", 7, "drain");

        let found = select_candidates(
            &db,
            CandidateWindow::default(),
            "boiler",
            &HashSet::new(),
            5,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].customer.id, boiler.id);
    }

    #[test]
    fn fallback_to_any_service_is_capped() {
        let (_dir, db) = open_tmp();
        for i in 0..7 {
            seed(&db, &format!("+{i}"), 7 + i, "drain");
        }
        let found = select_candidates(
            &db,
            CandidateWindow::default(),
            "boiler",
            &HashSet::new(),
            5,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(found.len(), 5, "fallback must honor the cap");
    }

    #[test]
    fn excluded_customers_skipped() {
        let (_dir, db) = open_tmp();
        let a = seed(&db, "+1", 7, "boiler");
        let b = seed(&db, "+2", 8, "boiler");
        let exclude: HashSet<Uuid> = [a.id].into_iter().collect();

        let found = select_candidates(
            &db,
            CandidateWindow::default(),
            "boiler",
            &exclude,
            5,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].customer.id, b.id);
    }

    #[test]
    fn one_candidate_per_customer_earliest_appointment() {
        let (_dir, db) = open_tmp();
        let customer = db.upsert_customer_by_phone("+1", "Ada").unwrap();
        let late = Appointment::scheduled(
            customer.id,
            Utc::now() + chrono::Duration::days(14),
            "boiler",
        );
        let early = Appointment::scheduled(
            customer.id,
            Utc::now() + chrono::Duration::days(6),
            "boiler",
        );
        db.insert_appointment(&late).unwrap();
        db.insert_appointment(&early).unwrap();

        let found = select_candidates(
            &db,
            CandidateWindow::default(),
            "boiler",
            &HashSet::new(),
            5,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].appointment.id, early.id);
    }

    #[test]
    fn empty_window_yields_no_candidates() {
        let (_dir, db) = open_tmp();
        seed(&db, "+1", 40, "boiler"); // beyond max lead
        let found = select_candidates(
            &db,
            CandidateWindow::default(),
            "boiler",
            &HashSet::new(),
            5,
            Utc::now(),
        )
        .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn profile_counts_completed_bookings_only() {
        let (_dir, db) = open_tmp();
        let customer = db.upsert_customer_by_phone("+1", "Ada").unwrap();
        let mut done = Appointment::scheduled(
            customer.id,
            Utc::now() - chrono::Duration::days(30),
            "boiler",
        );
        done.status = crate::types::AppointmentStatus::Completed;
        db.insert_appointment(&done).unwrap();
        let upcoming = Appointment::scheduled(
            customer.id,
            Utc::now() + chrono::Duration::days(7),
            "boiler",
        );
        db.insert_appointment(&upcoming).unwrap();

        let candidate = Candidate {
            customer: customer.clone(),
            appointment: upcoming,
        };
        let profile = build_profile(&db, &candidate, 10).unwrap();
        assert_eq!(profile.booking_count, 1);
    }
}
