//! Message composition: one prompt pair per [`MessagePurpose`], personalized
//! from campaign, customer, appointment, and chat history.

use chrono::{DateTime, Utc};

use gapfill_core::model::{Appointment, Campaign, Customer, MessageRecord};
use gapfill_core::types::{Direction, MessagePurpose};

use crate::client::ChatClient;
use crate::error::Result;

// ---------------------------------------------------------------------------
// ComposeContext
// ---------------------------------------------------------------------------

/// Everything a compose call may personalize on. Fields irrelevant to a
/// given purpose are simply unused by its prompt.
#[derive(Debug, Clone)]
pub struct ComposeContext {
    pub customer_name: String,
    pub slot_time: DateTime<Utc>,
    pub service_type: String,
    pub discount_percent: u8,
    pub owner_context: Option<String>,
    /// The candidate's own upcoming appointment (offers reference it).
    pub appointment: Option<AppointmentSummary>,
    /// Recent chat history, oldest first.
    pub history: Vec<HistoryLine>,
    /// The customer's inbound reply, for response-style messages.
    pub reply: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppointmentSummary {
    pub service_type: String,
    pub scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HistoryLine {
    pub direction: Direction,
    pub body: String,
}

impl ComposeContext {
    /// Build from store records. `history` is taken newest-first (as the
    /// message log returns it) and rendered oldest-first.
    pub fn from_records(
        customer: &Customer,
        campaign: &Campaign,
        appointment: Option<&Appointment>,
        history: &[MessageRecord],
        reply: Option<&str>,
    ) -> Self {
        let mut lines: Vec<HistoryLine> = history
            .iter()
            .map(|m| HistoryLine {
                direction: m.direction,
                body: m.body.clone(),
            })
            .collect();
        lines.reverse();
        Self {
            customer_name: customer.name.clone(),
            slot_time: campaign.slot_time,
            service_type: campaign.service_type.clone(),
            discount_percent: campaign.discount_percent,
            owner_context: campaign.context.clone(),
            appointment: appointment.map(|a| AppointmentSummary {
                service_type: a.service_type.clone(),
                scheduled_time: a.scheduled_time,
            }),
            history: lines,
            reply: reply.map(str::to_string),
        }
    }
}

fn format_history(history: &[HistoryLine]) -> String {
    if history.is_empty() {
        return "No previous messages".to_string();
    }
    history
        .iter()
        .map(|line| {
            let who = match line.direction {
                Direction::Inbound => "Customer",
                Direction::Outbound => "Business",
            };
            format!("{who}: {}", line.body)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %I:%M %p").to_string()
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// (system, user) prompt pair for one purpose.
pub fn build_prompt(purpose: MessagePurpose, ctx: &ComposeContext) -> (String, String) {
    let reply = ctx.reply.as_deref().unwrap_or("");
    match purpose {
        MessagePurpose::Offer => {
            let system = "You are a friendly small business owner reaching out to a customer \
via WhatsApp to offer them an earlier appointment slot.\n\
Guidelines:\n\
- Use their first name\n\
- Keep it casual and warm (this is WhatsApp)\n\
- Reference their existing appointment briefly\n\
- Mention the discount as an incentive\n\
- If there's chat history, reference it naturally\n\
- If business owner provided context, weave it in naturally\n\
- Keep it under 3 sentences\n\
- Use emojis sparingly (max 1-2)\n\
- End with a clear question/call to action"
                .to_string();
            let existing = match &ctx.appointment {
                Some(a) => format!("{} on {}", a.service_type, format_time(a.scheduled_time)),
                None => "none on file".to_string(),
            };
            let user = format!(
                "Customer name: {}\n\
Their current appointment: {existing}\n\n\
New slot being offered: {}\n\
Discount: {}%\n\n\
Recent chat history with this customer:\n{}\n\n\
Business owner's context: {}\n\n\
Generate a personalized WhatsApp message offering them the earlier slot.",
                ctx.customer_name,
                format_time(ctx.slot_time),
                ctx.discount_percent,
                format_history(&ctx.history),
                ctx.owner_context.as_deref().unwrap_or("Regular slot fill"),
            );
            (system, user)
        }
        MessagePurpose::ConfirmAccept => {
            let system = "Generate a warm confirmation message for a customer who accepted \
the slot offer. Be enthusiastic, confirm details, and maintain the friendly tone."
                .to_string();
            let user = format!(
                "Customer {} just accepted your offer for {}.\n\
Their message: \"{reply}\"\n\
Discount: {}%\n\n\
Generate a confirmation response (2 sentences max).",
                ctx.customer_name,
                format_time(ctx.slot_time),
                ctx.discount_percent,
            );
            (system, user)
        }
        MessagePurpose::AckDecline => {
            let system = "Generate a friendly acknowledgment for a customer who declined. \
Be understanding, confirm their original appointment stands."
                .to_string();
            let user = format!(
                "Customer {} declined your reschedule offer.\n\
Their message: \"{reply}\"\n\n\
Generate a friendly acknowledgment (1-2 sentences).",
                ctx.customer_name,
            );
            (system, user)
        }
        MessagePurpose::Clarify => {
            let system = "Generate a clarifying message to help customer understand \
the offer and respond clearly."
                .to_string();
            let user = format!(
                "Customer {} sent an unclear response to your slot offer.\n\
Their message: \"{reply}\"\n\
Slot offered: {}\n\
Discount: {}%\n\n\
Generate a clarifying message asking for YES or NO (2 sentences max).",
                ctx.customer_name,
                format_time(ctx.slot_time),
                ctx.discount_percent,
            );
            (system, user)
        }
        MessagePurpose::NotifyFilled => {
            let system = "Generate a polite notification that the slot was filled by someone \
else. Confirm their original appointment still stands. Keep it brief and friendly."
                .to_string();
            let user = format!(
                "Customer {} was offered a slot but someone else accepted first.\n\
Generate a brief notification (1-2 sentences).",
                ctx.customer_name,
            );
            (system, user)
        }
    }
}

impl ChatClient {
    /// Compose one outbound message for `purpose`.
    pub async fn compose(&self, purpose: MessagePurpose, ctx: &ComposeContext) -> Result<String> {
        let (system, user) = build_prompt(purpose, ctx);
        self.complete(&system, &user).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ComposeContext {
        ComposeContext {
            customer_name: "Ada".into(),
            slot_time: Utc::now(),
            service_type: "boiler".into(),
            discount_percent: 10,
            owner_context: Some("urgent fill".into()),
            appointment: Some(AppointmentSummary {
                service_type: "boiler".into(),
                scheduled_time: Utc::now() + chrono::Duration::days(7),
            }),
            history: vec![HistoryLine {
                direction: Direction::Inbound,
                body: "thanks for last time!".into(),
            }],
            reply: Some("yes please!".into()),
        }
    }

    #[test]
    fn offer_prompt_carries_discount_and_context() {
        let (_, user) = build_prompt(MessagePurpose::Offer, &ctx());
        assert!(user.contains("Ada"));
        assert!(user.contains("10%"));
        assert!(user.contains("urgent fill"));
        assert!(user.contains("Customer: thanks for last time!"));
    }

    #[test]
    fn offer_prompt_without_history_says_so() {
        let mut c = ctx();
        c.history.clear();
        let (_, user) = build_prompt(MessagePurpose::Offer, &c);
        assert!(user.contains("No previous messages"));
    }

    #[test]
    fn confirm_prompt_quotes_reply() {
        let (_, user) = build_prompt(MessagePurpose::ConfirmAccept, &ctx());
        assert!(user.contains("\"yes please!\""));
    }

    #[test]
    fn history_rendered_oldest_first() {
        let customer = Customer::new("+1", "Ada");
        let campaign = Campaign::new(
            Utc::now(),
            "boiler",
            10,
            std::time::Duration::from_secs(60),
            None,
        );
        // Store order: newest first.
        let newest = MessageRecord::inbound(customer.id, "newest", None);
        let oldest = MessageRecord::outbound(customer.id, "oldest", None);
        let built =
            ComposeContext::from_records(&customer, &campaign, None, &[newest, oldest], None);
        assert_eq!(built.history[0].body, "oldest");
        assert_eq!(built.history[1].body, "newest");
    }
}
