use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{
    Attempt, AttemptId, AttemptStatus, OptionData, OptionId, QuestionData, QuestionId,
    ResultSummary, SubmitResult, option_label,
};

use crate::client::AssessmentApi;
use crate::error::ApiError;

/// One recorded call against the fake backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCall {
    Summary,
    Question { no: u32 },
    Answer { question: QuestionId, option: OptionId },
    Mark { question: QuestionId },
    Submit,
}

/// Option definition for [`InMemoryAssessment::push_question`].
#[derive(Debug, Clone)]
pub struct FakeOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

impl FakeOption {
    #[must_use]
    pub fn new(id: u64, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id: OptionId::new(id),
            text: text.into(),
            is_correct,
        }
    }
}

#[derive(Debug, Clone)]
struct FakeQuestion {
    id: QuestionId,
    prompt: String,
    options: Vec<FakeOption>,
    explanation: Option<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    status: Option<AttemptStatus>,
    remaining_seconds: u64,
    questions: Vec<FakeQuestion>,
    answers: HashMap<QuestionId, OptionId>,
    marked: HashSet<QuestionId>,
    calls: Vec<ApiCall>,
    latency: Duration,
    question_latency: HashMap<u32, Duration>,
    fail_answers: u32,
    fail_answer_for: HashSet<QuestionId>,
    fail_marks: u32,
    fail_questions: u32,
    fail_submits: u32,
    passing_score: f64,
}

/// Assessment backend kept in memory.
///
/// Records every call and lets tests inject failures and latency. Grading is
/// a straight count of correct options.
#[derive(Clone)]
pub struct InMemoryAssessment {
    attempt_id: AttemptId,
    state: Arc<Mutex<FakeState>>,
}

impl InMemoryAssessment {
    #[must_use]
    pub fn new(attempt_id: AttemptId, remaining_seconds: u64) -> Self {
        Self {
            attempt_id,
            state: Arc::new(Mutex::new(FakeState {
                status: Some(AttemptStatus::InProgress),
                remaining_seconds,
                passing_score: 50.0,
                ..FakeState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    /// Append a question; its canonical number is its position.
    pub fn push_question(
        &self,
        id: u64,
        prompt: impl Into<String>,
        options: Vec<FakeOption>,
    ) -> &Self {
        self.lock().questions.push(FakeQuestion {
            id: QuestionId::new(id),
            prompt: prompt.into(),
            options,
            explanation: None,
        });
        self
    }

    pub fn set_explanation(&self, question: QuestionId, explanation: impl Into<String>) {
        let mut state = self.lock();
        if let Some(q) = state.questions.iter_mut().find(|q| q.id == question) {
            q.explanation = Some(explanation.into());
        }
    }

    pub fn set_status(&self, status: AttemptStatus) {
        self.lock().status = Some(status);
    }

    pub fn set_remaining_seconds(&self, seconds: u64) {
        self.lock().remaining_seconds = seconds;
    }

    pub fn set_passing_score(&self, score: f64) {
        self.lock().passing_score = score;
    }

    /// Pre-record an answer as if saved in an earlier visit.
    pub fn seed_answer(&self, question: QuestionId, option: OptionId) {
        self.lock().answers.insert(question, option);
    }

    /// Delay applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Extra delay for fetching one canonical question number.
    pub fn set_question_latency(&self, no: u32, latency: Duration) {
        self.lock().question_latency.insert(no, latency);
    }

    /// Fail the next `n` answer writes.
    pub fn fail_next_answers(&self, n: u32) {
        self.lock().fail_answers = n;
    }

    /// Fail every answer write for one question until cleared.
    pub fn fail_answers_for(&self, question: QuestionId, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.fail_answer_for.insert(question);
        } else {
            state.fail_answer_for.remove(&question);
        }
    }

    pub fn fail_next_marks(&self, n: u32) {
        self.lock().fail_marks = n;
    }

    pub fn fail_next_questions(&self, n: u32) {
        self.lock().fail_questions = n;
    }

    pub fn fail_next_submits(&self, n: u32) {
        self.lock().fail_submits = n;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Answer writes in the order they reached the backend.
    #[must_use]
    pub fn answer_calls(&self) -> Vec<(QuestionId, OptionId)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ApiCall::Answer { question, option } => Some((*question, *option)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn submit_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ApiCall::Submit))
            .count()
    }

    #[must_use]
    pub fn stored_answer(&self, question: QuestionId) -> Option<OptionId> {
        self.lock().answers.get(&question).copied()
    }

    #[must_use]
    pub fn is_marked(&self, question: QuestionId) -> bool {
        self.lock().marked.contains(&question)
    }

    fn status(state: &FakeState) -> AttemptStatus {
        state.status.unwrap_or(AttemptStatus::InProgress)
    }

    async fn record(&self, call: ApiCall) {
        let delay = {
            let mut state = self.lock();
            state.calls.push(call);
            let extra = match call {
                ApiCall::Question { no } => state.question_latency.get(&no).copied(),
                _ => None,
            };
            state.latency + extra.unwrap_or_default()
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_attempt(&self, attempt: AttemptId) -> Result<(), ApiError> {
        if attempt == self.attempt_id {
            Ok(())
        } else {
            Err(ApiError::NotFound)
        }
    }

    fn closed_error() -> ApiError {
        ApiError::Status {
            status: 409,
            message: "attempt is no longer in progress".into(),
        }
    }

    fn take_failure(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }

    fn grade(state: &FakeState) -> SubmitResult {
        let total = state.questions.len();
        let mut correct = 0_u32;
        let mut wrong = 0_u32;
        for question in &state.questions {
            if let Some(chosen) = state.answers.get(&question.id) {
                let right = question
                    .options
                    .iter()
                    .any(|o| o.id == *chosen && o.is_correct);
                if right {
                    correct += 1;
                } else {
                    wrong += 1;
                }
            }
        }
        let total = u32::try_from(total).unwrap_or(u32::MAX);
        let accuracy = if total == 0 {
            0.0
        } else {
            f64::from(correct) * 100.0 / f64::from(total)
        };
        SubmitResult {
            summary: ResultSummary {
                total_questions: total,
                correct,
                wrong,
                unanswered: total.saturating_sub(correct + wrong),
                accuracy,
            },
            total_score: f64::from(correct),
            is_passed: accuracy >= state.passing_score,
            passing_score: state.passing_score,
            has_answer_key: true,
        }
    }
}

#[async_trait]
impl AssessmentApi for InMemoryAssessment {
    async fn attempt_summary(&self, attempt: AttemptId) -> Result<Attempt, ApiError> {
        self.check_attempt(attempt)?;
        self.record(ApiCall::Summary).await;
        let state = self.lock();
        let entries = state.questions.iter().map(|q| {
            (
                q.id,
                state.answers.contains_key(&q.id),
                state.marked.contains(&q.id),
            )
        });
        Ok(Attempt::new(
            attempt,
            Self::status(&state),
            state.remaining_seconds,
            None,
            entries,
        )?)
    }

    async fn question(&self, attempt: AttemptId, no: u32) -> Result<QuestionData, ApiError> {
        self.check_attempt(attempt)?;
        self.record(ApiCall::Question { no }).await;
        let mut state = self.lock();
        if Self::take_failure(&mut state.fail_questions) {
            return Err(ApiError::Unavailable("question fetch failed".into()));
        }
        let index = usize::try_from(no)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or(ApiError::NotFound)?;
        let question = state.questions.get(index).ok_or(ApiError::NotFound)?;
        let status = Self::status(&state);
        let reveal = status.is_terminal();
        let options = question
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| OptionData {
                id: option.id,
                label: option_label(i),
                text: option.text.clone(),
                image_url: None,
                is_correct: reveal.then_some(option.is_correct),
                score: None,
            })
            .collect();

        Ok(QuestionData::new(
            question.id,
            no,
            question.prompt.clone(),
            None,
            options,
            status,
            state.answers.get(&question.id).copied(),
            state.marked.contains(&question.id),
            state.remaining_seconds,
            if reveal {
                question.explanation.clone()
            } else {
                None
            },
        )?)
    }

    async fn answer(
        &self,
        attempt: AttemptId,
        question: QuestionId,
        option: OptionId,
    ) -> Result<(), ApiError> {
        self.check_attempt(attempt)?;
        self.record(ApiCall::Answer { question, option }).await;
        let mut state = self.lock();
        if Self::take_failure(&mut state.fail_answers) || state.fail_answer_for.contains(&question)
        {
            return Err(ApiError::Unavailable("answer write failed".into()));
        }
        if Self::status(&state).is_terminal() {
            return Err(Self::closed_error());
        }
        let known = state
            .questions
            .iter()
            .find(|q| q.id == question)
            .is_some_and(|q| q.options.iter().any(|o| o.id == option));
        if !known {
            return Err(ApiError::NotFound);
        }
        state.answers.insert(question, option);
        Ok(())
    }

    async fn mark(&self, attempt: AttemptId, question: QuestionId) -> Result<(), ApiError> {
        self.check_attempt(attempt)?;
        self.record(ApiCall::Mark { question }).await;
        let mut state = self.lock();
        if Self::take_failure(&mut state.fail_marks) {
            return Err(ApiError::Unavailable("mark toggle failed".into()));
        }
        if Self::status(&state).is_terminal() {
            return Err(Self::closed_error());
        }
        if !state.marked.remove(&question) {
            state.marked.insert(question);
        }
        Ok(())
    }

    async fn submit(&self, attempt: AttemptId) -> Result<SubmitResult, ApiError> {
        self.check_attempt(attempt)?;
        self.record(ApiCall::Submit).await;
        let mut state = self.lock();
        if Self::take_failure(&mut state.fail_submits) {
            return Err(ApiError::Status {
                status: 503,
                message: "grading service unavailable".into(),
            });
        }
        if Self::status(&state).is_terminal() {
            return Err(Self::closed_error());
        }
        state.status = Some(AttemptStatus::Completed);
        Ok(Self::grade(&state))
    }
}
