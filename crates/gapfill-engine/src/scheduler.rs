//! Per-campaign wave timers.
//!
//! The scheduler holds at most one pending timer per campaign id. Arming a
//! key that already has a timer replaces (aborts) the old one; disarming is
//! idempotent. A fired timer sends its campaign id into an mpsc channel;
//! the engine consumes the channel and runs the wave handler, so firing
//! happens at most once per scheduled instant and never overlaps itself for
//! one key.
//!
//! Cancellation is best-effort: a task that has already finished its sleep
//! may still deliver, and the engine's status re-check turns that into a
//! documented no-op.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

pub struct WaveScheduler {
    jobs: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    tx: mpsc::Sender<Uuid>,
}

impl WaveScheduler {
    /// Create a scheduler and the receiving end the engine loop consumes.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                jobs: Mutex::new(HashMap::new()),
                tx,
            },
            rx,
        )
    }

    /// Schedule the next wave for `campaign_id` after `delay`, replacing any
    /// timer already pending for that key.
    pub fn arm(&self, campaign_id: Uuid, delay: Duration) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver dropped means the engine is shutting down.
            let _ = tx.send(campaign_id).await;
        });
        let mut jobs = self.jobs.lock().expect("scheduler lock poisoned");
        if let Some(old) = jobs.insert(campaign_id, handle) {
            old.abort();
            debug!(campaign = %campaign_id, "replaced pending wave timer");
        }
    }

    /// Cancel the pending timer for `campaign_id`, if any.
    pub fn disarm(&self, campaign_id: Uuid) {
        let mut jobs = self.jobs.lock().expect("scheduler lock poisoned");
        if let Some(handle) = jobs.remove(&campaign_id) {
            handle.abort();
            debug!(campaign = %campaign_id, "disarmed wave timer");
        }
    }

    /// Number of keys with a registered timer (finished but unreplaced
    /// handles count until disarmed).
    pub fn armed(&self) -> usize {
        self.jobs.lock().expect("scheduler lock poisoned").len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
