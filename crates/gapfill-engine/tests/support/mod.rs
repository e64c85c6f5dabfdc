//! Shared test harness: a temp-backed store plus scripted adapters.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use gapfill_core::candidates::CandidateProfile;
use gapfill_core::config::Policy;
use gapfill_core::error::{GapfillError, Result};
use gapfill_core::model::{Appointment, Customer};
use gapfill_core::store::SlotFillDb;
use gapfill_core::types::{Classified, MessagePurpose, ReplyIntent};
use gapfill_engine::{
    Composer, Notifier, RankingOracle, ReplyClassifier, SlotFillEngine, StartCampaign,
};
use gapfill_llm::{ComposeContext, RankedCandidate};

// ---------------------------------------------------------------------------
// Mock adapters
// ---------------------------------------------------------------------------

/// Ranks exactly the customers listed in `order`, best first; everyone else
/// is omitted so the engine appends them in selection order.
pub struct ScriptedOracle {
    pub order: Mutex<Vec<Uuid>>,
}

impl ScriptedOracle {
    pub fn new(order: Vec<Uuid>) -> Self {
        Self {
            order: Mutex::new(order),
        }
    }
}

#[async_trait]
impl RankingOracle for ScriptedOracle {
    async fn rank(&self, profiles: &[CandidateProfile]) -> Result<Vec<RankedCandidate>> {
        let order = self.order.lock().unwrap().clone();
        let mut score = order.len() as f64;
        let mut ranked = Vec::new();
        for id in order {
            if profiles.iter().any(|p| p.customer_id == id) {
                ranked.push(RankedCandidate {
                    customer_id: id,
                    score,
                    reason: String::new(),
                });
            }
            score -= 1.0;
        }
        Ok(ranked)
    }
}

/// Deterministic composer: `[purpose] name`.
pub struct TemplateComposer;

#[async_trait]
impl Composer for TemplateComposer {
    async fn compose(&self, purpose: MessagePurpose, ctx: &ComposeContext) -> Result<String> {
        Ok(format!("[{purpose}] {}", ctx.customer_name))
    }
}

/// Classifies by keyword: "yes" accepts at 0.95, "no" declines at 0.9,
/// anything else is unclear at 0.3.
pub struct KeywordClassifier;

#[async_trait]
impl ReplyClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Classified> {
        let lower = text.to_lowercase();
        if lower.contains("yes") {
            Ok(Classified {
                intent: ReplyIntent::Accept,
                confidence: 0.95,
            })
        } else if lower.contains("no") {
            Ok(Classified {
                intent: ReplyIntent::Decline,
                confidence: 0.9,
            })
        } else {
            Ok(Classified {
                intent: ReplyIntent::Unclear,
                confidence: 0.3,
            })
        }
    }
}

/// A classifier whose backend is down.
pub struct BrokenClassifier;

#[async_trait]
impl ReplyClassifier for BrokenClassifier {
    async fn classify(&self, _text: &str) -> Result<Classified> {
        Err(GapfillError::Adapter("classifier unreachable".into()))
    }
}

/// Records every delivery; addresses in `fail` error instead.
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: Mutex<HashSet<String>>,
    counter: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: Mutex::new(HashSet::new()),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn fail_address(&self, address: &str) {
        self.fail.lock().unwrap().insert(address.to_string());
    }

    pub fn sent_to(&self, address: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == address)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, address: &str, body: &str) -> Result<String> {
        if self.fail.lock().unwrap().contains(address) {
            return Err(GapfillError::Adapter(format!("undeliverable: {address}")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), body.to_string()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("SID-{n}"))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub _dir: TempDir,
    pub db: Arc<SlotFillDb>,
    pub oracle: Arc<ScriptedOracle>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Arc<SlotFillEngine>,
    pub timer_rx: mpsc::Receiver<Uuid>,
}

pub fn harness() -> Harness {
    harness_with_classifier(Arc::new(KeywordClassifier))
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn harness_with_classifier(classifier: Arc<dyn ReplyClassifier>) -> Harness {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let db = Arc::new(SlotFillDb::open(&dir.path().join("test.db")).unwrap());
    let oracle = Arc::new(ScriptedOracle::new(Vec::new()));
    let notifier = Arc::new(RecordingNotifier::new());
    let (engine, timer_rx) = SlotFillEngine::new(
        Arc::clone(&db),
        Arc::clone(&oracle) as Arc<dyn RankingOracle>,
        Arc::new(TemplateComposer),
        classifier,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Policy::default(),
    );
    Harness {
        _dir: dir,
        db,
        oracle,
        notifier,
        engine,
        timer_rx,
    }
}

/// Seed a customer with one scheduled appointment `days_out` from now.
pub fn seed_candidate(db: &SlotFillDb, phone: &str, name: &str, days_out: i64, service: &str) -> Customer {
    let customer = db.upsert_customer_by_phone(phone, name).unwrap();
    let appointment = Appointment::scheduled(
        customer.id,
        Utc::now() + chrono::Duration::days(days_out),
        service,
    );
    db.insert_appointment(&appointment).unwrap();
    customer
}

pub fn boiler_campaign(wait: Duration) -> StartCampaign {
    StartCampaign {
        slot_time: Utc::now() + chrono::Duration::days(1),
        service_type: "boiler".into(),
        discount_percent: 10,
        wait,
        context: None,
    }
}
