use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GapfillError {
    #[error("campaign not found: {0}")]
    CampaignNotFound(Uuid),

    #[error("customer not found: {0}")]
    CustomerNotFound(Uuid),

    #[error("customer {customer} already contacted for campaign {campaign}")]
    AlreadyContacted { campaign: Uuid, customer: Uuid },

    #[error("no outreach attempt for customer {customer} on campaign {campaign}")]
    OutreachNotFound { campaign: Uuid, customer: Uuid },

    #[error("wave {wave} for campaign {campaign} failed entirely: no message could be sent")]
    WaveFailed { campaign: Uuid, wave: u32 },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GapfillError>;
