//! Deployment settings (env) and orchestration policy (defaults, optionally
//! overridden from a YAML file).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::candidates::CandidateWindow;
use crate::error::{GapfillError, Result};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Tunable orchestration constants. Every field has a default so a missing
/// or partial `gapfill.yaml` is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Candidates contacted per wave.
    #[serde(default = "default_wave_size")]
    pub wave_size: usize,
    /// Cap on the any-service fallback when no exact match exists.
    #[serde(default = "default_fallback_cap")]
    pub fallback_cap: usize,
    /// An accept classification only counts above this confidence.
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    /// Same, for declines.
    #[serde(default = "default_decline_threshold")]
    pub decline_threshold: f64,
    /// Message-history depth fed to the ranking oracle.
    #[serde(default = "default_rank_history_limit")]
    pub rank_history_limit: usize,
    /// Message-history depth fed to the message composer.
    #[serde(default = "default_compose_history_limit")]
    pub compose_history_limit: usize,
    #[serde(default)]
    pub window: CandidateWindow,
}

fn default_wave_size() -> usize {
    3
}

fn default_fallback_cap() -> usize {
    5
}

fn default_accept_threshold() -> f64 {
    0.7
}

fn default_decline_threshold() -> f64 {
    0.7
}

fn default_rank_history_limit() -> usize {
    10
}

fn default_compose_history_limit() -> usize {
    5
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            wave_size: default_wave_size(),
            fallback_cap: default_fallback_cap(),
            accept_threshold: default_accept_threshold(),
            decline_threshold: default_decline_threshold(),
            rank_history_limit: default_rank_history_limit(),
            compose_history_limit: default_compose_history_limit(),
            window: CandidateWindow::default(),
        }
    }
}

impl Policy {
    /// Load from a YAML file if it exists, otherwise defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Credentials and endpoints, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    /// The business's WhatsApp sender number.
    pub twilio_whatsapp_number: String,
    /// Sandbox deployments may route every outbound message to one fixed
    /// number. Delivery defaults to each candidate's own phone; this is an
    /// explicit override, never implicit behavior.
    pub test_recipient_override: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            twilio_account_sid: require("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: require("TWILIO_AUTH_TOKEN")?,
            twilio_whatsapp_number: require("TWILIO_WHATSAPP_NUMBER")?,
            test_recipient_override: std::env::var("TEST_WHATSAPP_NUMBER").ok(),
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| GapfillError::Config(format!("missing env var: {name}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults() {
        let p = Policy::default();
        assert_eq!(p.wave_size, 3);
        assert_eq!(p.fallback_cap, 5);
        assert!((p.accept_threshold - 0.7).abs() < 1e-9);
        assert_eq!(p.window.min_lead_days, 5);
        assert_eq!(p.window.max_lead_days, 21);
    }

    #[test]
    fn policy_partial_yaml_fills_defaults() {
        let p: Policy = serde_yaml::from_str("wave_size: 2\n").unwrap();
        assert_eq!(p.wave_size, 2);
        assert_eq!(p.fallback_cap, 5);
    }

    #[test]
    fn policy_load_missing_file_is_default() {
        let p = Policy::load(Path::new("/nonexistent/gapfill.yaml")).unwrap();
        assert_eq!(p.wave_size, 3);
    }
}
