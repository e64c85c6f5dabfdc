//! `gapfill-core`: domain model, durable store, and selection policy for
//! the slot-fill campaign orchestrator.
//!
//! The orchestration loop itself (waves, timers, reply resolution) lives in
//! `gapfill-engine`; this crate owns everything it persists and decides on:
//! campaign and outreach state machines, the redb-backed [`store::SlotFillDb`]
//! with its conditional terminal transitions, candidate selection, and
//! policy/configuration.

pub mod candidates;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod types;

pub use error::{GapfillError, Result};
