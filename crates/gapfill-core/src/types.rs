use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// CampaignStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a slot-fill campaign.
///
/// Transitions: `Active → Filled` (a customer accepted) or
/// `Active → Expired` (candidates exhausted). Both terminal states are
/// immutable; only the store's conditional transitions may perform them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Filled,
    Expired,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Filled => "filled",
            CampaignStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, CampaignStatus::Active)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = crate::error::GapfillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CampaignStatus::Active),
            "filled" => Ok(CampaignStatus::Filled),
            "expired" => Ok(CampaignStatus::Expired),
            _ => Err(crate::error::GapfillError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// OutreachStatus
// ---------------------------------------------------------------------------

/// One customer's participation in one wave of one campaign.
///
/// Created as `Sent`; moves to `Accepted`/`Declined` when that customer's
/// reply is resolved, or to `NotifiedFilled` when a different customer's
/// acceptance closes the campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachStatus {
    Sent,
    Accepted,
    Declined,
    NotifiedFilled,
}

impl OutreachStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutreachStatus::Sent => "sent",
            OutreachStatus::Accepted => "accepted",
            OutreachStatus::Declined => "declined",
            OutreachStatus::NotifiedFilled => "notified_filled",
        }
    }
}

impl fmt::Display for OutreachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AppointmentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Direction of a logged message relative to the business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        })
    }
}

// ---------------------------------------------------------------------------
// MessagePurpose
// ---------------------------------------------------------------------------

/// What an outbound message is for; selects the compose prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePurpose {
    Offer,
    ConfirmAccept,
    AckDecline,
    Clarify,
    NotifyFilled,
}

impl MessagePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            MessagePurpose::Offer => "offer",
            MessagePurpose::ConfirmAccept => "confirm_accept",
            MessagePurpose::AckDecline => "ack_decline",
            MessagePurpose::Clarify => "clarify",
            MessagePurpose::NotifyFilled => "notify_filled",
        }
    }
}

impl fmt::Display for MessagePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ReplyIntent
// ---------------------------------------------------------------------------

/// Classifier output for an inbound customer reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyIntent {
    Accept,
    Decline,
    Unclear,
}

/// A classified reply: intent plus classifier confidence in `[0, 1]`.
///
/// The intent only drives control flow when confidence clears the policy
/// threshold; everything below it is treated as unclear.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classified {
    pub intent: ReplyIntent,
    pub confidence: f64,
}

impl Classified {
    pub fn unclear() -> Self {
        Self {
            intent: ReplyIntent::Unclear,
            confidence: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// ReplyOutcome
// ---------------------------------------------------------------------------

/// Result of resolving one inbound reply.
///
/// `LostRace` is a normal outcome, not an error: the acceptance arrived
/// after another customer's acceptance (or expiry) had already committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    Accepted,
    LostRace,
    Declined,
    Clarify,
}

impl fmt::Display for ReplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplyOutcome::Accepted => "accepted",
            ReplyOutcome::LostRace => "lost_race",
            ReplyOutcome::Declined => "declined",
            ReplyOutcome::Clarify => "clarify",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn campaign_status_roundtrip() {
        for s in [
            CampaignStatus::Active,
            CampaignStatus::Filled,
            CampaignStatus::Expired,
        ] {
            assert_eq!(CampaignStatus::from_str(s.as_str()).unwrap(), s);
        }
        assert!(CampaignStatus::from_str("bogus").is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CampaignStatus::Active.is_terminal());
        assert!(CampaignStatus::Filled.is_terminal());
        assert!(CampaignStatus::Expired.is_terminal());
    }

    #[test]
    fn outreach_status_serde_snake_case() {
        let json = serde_json::to_string(&OutreachStatus::NotifiedFilled).unwrap();
        assert_eq!(json, "\"notified_filled\"");
    }
}
