//! `gapfill-engine`: the slot-fill campaign orchestrator.
//!
//! Given a freshly cancelled appointment slot, the engine ranks candidate
//! customers, contacts them in waves over WhatsApp, and resolves the first
//! unambiguous acceptance while keeping every other contacted customer's
//! state consistent.
//!
//! # Architecture
//!
//! ```text
//! "slot cancelled" ──► SlotFillEngine::start_campaign
//!                          │  select + rank candidates, dispatch wave 1
//!                          ▼
//!                      WaveScheduler ──(mpsc)──► on_wave_timer
//!                          │                        │ next wave, or Expired
//!                          ▼                        ▼
//! "customer replied" ──► submit_reply ──► Accepted / LostRace / Declined / Clarify
//! ```
//!
//! Collaborators are injected behind the traits in [`adapters`]: the
//! ranking oracle, message composer, and reply classifier (production
//! implementations live on [`gapfill_llm::ChatClient`]) and the notifier
//! ([`notify::WhatsAppNotifier`]). Durable state lives in
//! [`gapfill_core::store::SlotFillDb`].

pub mod adapters;
pub mod engine;
pub mod notify;
pub mod scheduler;

pub use adapters::{Composer, Notifier, RankingOracle, ReplyClassifier};
pub use engine::{CampaignStart, ContactedCustomer, SlotFillEngine, StartCampaign};
pub use notify::WhatsAppNotifier;
pub use scheduler::WaveScheduler;
