//! WhatsApp delivery over the Twilio Messages API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use gapfill_core::config::Settings;
use gapfill_core::error::{GapfillError, Result};

use crate::adapters::Notifier;

// ---------------------------------------------------------------------------
// WhatsAppNotifier
// ---------------------------------------------------------------------------

/// Sends one WhatsApp message per call via Twilio; returns the message SID.
///
/// If `recipient_override` is set (sandbox deployments with a single test
/// number), every delivery is rerouted there. The engine still logs each
/// message against its intended recipient; the override changes only where
/// the bytes land.
#[derive(Debug, Clone)]
pub struct WhatsAppNotifier {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    recipient_override: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
}

impl WhatsAppNotifier {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: settings.twilio_account_sid.clone(),
            auth_token: settings.twilio_auth_token.clone(),
            from_number: settings.twilio_whatsapp_number.clone(),
            recipient_override: settings.test_recipient_override.clone(),
            base_url: "https://api.twilio.com".to_string(),
        }
    }

    /// Point at a different API host (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    async fn send(&self, address: &str, body: &str) -> Result<String> {
        let to = self.recipient_override.as_deref().unwrap_or(address);
        if to != address {
            info!(intended = %address, actual = %to, "recipient override active");
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let params = [
            ("From", format!("whatsapp:{}", self.from_number)),
            ("To", format!("whatsapp:{to}")),
            ("Body", body.to_string()),
        ];

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| GapfillError::Adapter(format!("whatsapp send failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GapfillError::Adapter(format!(
                "whatsapp send failed ({status}): {body}"
            )));
        }

        let parsed: TwilioMessageResponse = response
            .json()
            .await
            .map_err(|e| GapfillError::Adapter(format!("bad twilio response: {e}")))?;
        Ok(parsed.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(override_to: Option<&str>) -> Settings {
        Settings {
            openai_api_key: "k".into(),
            openai_base_url: "http://localhost".into(),
            openai_model: "m".into(),
            twilio_account_sid: "AC123".into(),
            twilio_auth_token: "tok".into(),
            twilio_whatsapp_number: "+440000".into(),
            test_recipient_override: override_to.map(str::to_string),
        }
    }

    #[test]
    fn override_carried_from_settings() {
        let n = WhatsAppNotifier::new(&settings(Some("+441111")));
        assert_eq!(n.recipient_override.as_deref(), Some("+441111"));
        let n = WhatsAppNotifier::new(&settings(None));
        assert!(n.recipient_override.is_none());
    }
}
