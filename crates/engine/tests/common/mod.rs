#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use assessment_api::{AssessmentApi, FakeOption, InMemoryAssessment};
use exam_core::model::{AttemptId, OptionId, QuestionId};
use session_engine::{
    AssessmentSession, EngineConfig, ListenerId, ProctorPlatform, ProctorWarning, SessionBuilder,
    SignalKind, SyncStatus,
};

pub const ATTEMPT: AttemptId = AttemptId::new(42);

pub fn qid(n: u64) -> QuestionId {
    QuestionId::new(100 + n)
}

/// Option `j` (1-based, server order) of question `n`.
pub fn opt(n: u64, j: u64) -> OptionId {
    OptionId::new((100 + n) * 10 + j)
}

/// `n` questions with four options each; the first option is correct.
pub fn backend(n: u64, remaining_seconds: u64) -> InMemoryAssessment {
    let api = InMemoryAssessment::new(ATTEMPT, remaining_seconds);
    for q in 1..=n {
        api.push_question(
            100 + q,
            format!("Question {q}"),
            (1..=4)
                .map(|j| FakeOption::new((100 + q) * 10 + j, format!("choice {j}"), j == 1))
                .collect(),
        );
    }
    api
}

/// Canonical order, no option shuffling.
pub fn ordered() -> EngineConfig {
    EngineConfig {
        shuffle_questions: false,
        shuffle_options: false,
        seed: Some(1),
        ..EngineConfig::default()
    }
}

pub fn shuffled(seed: u64) -> EngineConfig {
    EngineConfig {
        seed: Some(seed),
        ..EngineConfig::default()
    }
}

pub fn api_of(backend: &InMemoryAssessment) -> Arc<dyn AssessmentApi> {
    Arc::new(backend.clone())
}

pub async fn load(backend: &InMemoryAssessment, config: EngineConfig) -> AssessmentSession {
    SessionBuilder::new(api_of(backend), config)
        .load(ATTEMPT)
        .await
        .expect("load session")
}

pub async fn load_lockdown(
    backend: &InMemoryAssessment,
    config: EngineConfig,
    platform: &Arc<FakePlatform>,
) -> AssessmentSession {
    SessionBuilder::new(api_of(backend), config)
        .with_lockdown(Arc::clone(platform) as Arc<dyn ProctorPlatform>)
        .with_clock(exam_core::time::fixed_clock())
        .load(ATTEMPT)
        .await
        .expect("load lockdown session")
}

/// Collects every sync status the session publishes.
pub fn record_statuses(session: &AssessmentSession) -> Arc<Mutex<Vec<SyncStatus>>> {
    let mut rx = session.subscribe_sync();
    let seen = Arc::new(Mutex::new(vec![*rx.borrow_and_update()]));
    let sink = Arc::clone(&seen);
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = *rx.borrow_and_update();
            sink.lock().expect("status log").push(status);
        }
    });
    seen
}

#[derive(Default)]
pub struct FakePlatform {
    next: Mutex<u64>,
    live: Mutex<HashSet<u64>>,
    fullscreen_requests: Mutex<u32>,
    warnings: Mutex<Vec<ProctorWarning>>,
}

impl FakePlatform {
    pub fn live_listeners(&self) -> usize {
        self.live.lock().expect("listeners").len()
    }

    pub fn fullscreen_requests(&self) -> u32 {
        *self.fullscreen_requests.lock().expect("fullscreen")
    }

    pub fn warnings(&self) -> Vec<ProctorWarning> {
        self.warnings.lock().expect("warnings").clone()
    }
}

impl ProctorPlatform for FakePlatform {
    fn subscribe(&self, _kind: SignalKind) -> ListenerId {
        let mut next = self.next.lock().expect("listener ids");
        *next += 1;
        self.live.lock().expect("listeners").insert(*next);
        ListenerId::new(*next)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.live.lock().expect("listeners").remove(&id.value());
    }

    fn request_fullscreen(&self) {
        *self.fullscreen_requests.lock().expect("fullscreen") += 1;
    }

    fn show_warning(&self, warning: &ProctorWarning) {
        self.warnings.lock().expect("warnings").push(warning.clone());
    }
}
