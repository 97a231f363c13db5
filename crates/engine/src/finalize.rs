use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use assessment_api::AssessmentApi;
use exam_core::model::{AttemptId, StagedAnswer, SubmitResult};
use tracing::{error, info, instrument, warn};

use crate::error::FinalizeError;
use crate::sync::SyncScheduler;
use crate::timer::bounded;

/// What started a finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishTrigger {
    Manual,
    Expiry,
}

impl FinishTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Expiry => "expiry",
        }
    }
}

/// Result of [`FinalizationCoordinator::finish`].
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// This call submitted the attempt.
    Submitted(SubmitResult),
    /// An earlier call already submitted it.
    AlreadyFinished(SubmitResult),
    /// Another finish is running right now; this one did nothing.
    InFlight,
}

impl FinishOutcome {
    #[must_use]
    pub fn result(&self) -> Option<&SubmitResult> {
        match self {
            Self::Submitted(result) | Self::AlreadyFinished(result) => Some(result),
            Self::InFlight => None,
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Flushes outstanding answers and submits the attempt, at most once.
pub struct FinalizationCoordinator {
    api: Arc<dyn AssessmentApi>,
    attempt: AttemptId,
    timeout: Duration,
    in_flight: AtomicBool,
    result: Mutex<Option<SubmitResult>>,
}

impl FinalizationCoordinator {
    #[must_use]
    pub fn new(api: Arc<dyn AssessmentApi>, attempt: AttemptId, timeout: Duration) -> Self {
        Self {
            api,
            attempt,
            timeout,
            in_flight: AtomicBool::new(false),
            result: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn result(&self) -> Option<SubmitResult> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel the pending debounce, write every staged answer the server has
    /// not acknowledged, then submit.
    ///
    /// Flush failures are logged and skipped. `collect_staged` runs only once
    /// this call owns the finish.
    ///
    /// # Errors
    ///
    /// Returns `FinalizeError::Submit` if the submit call fails or times out;
    /// the coordinator is then free to try again.
    #[instrument(skip_all, fields(attempt = %self.attempt, trigger = trigger.as_str()))]
    pub async fn finish<F>(
        &self,
        trigger: FinishTrigger,
        sync: &SyncScheduler,
        collect_staged: F,
    ) -> Result<FinishOutcome, FinalizeError>
    where
        F: FnOnce() -> Vec<StagedAnswer>,
    {
        if let Some(result) = self.result() {
            return Ok(FinishOutcome::AlreadyFinished(result));
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            info!("finish already in flight, ignoring");
            return Ok(FinishOutcome::InFlight);
        };
        // A finish may have completed between the check and the acquire.
        if let Some(result) = self.result() {
            return Ok(FinishOutcome::AlreadyFinished(result));
        }

        sync.cancel_pending();
        let staged = collect_staged();
        let mut flushed = 0_usize;
        for answer in staged.into_iter().filter(|a| sync.needs_write(*a)) {
            match sync.write_now(answer).await {
                Ok(_) => flushed += 1,
                Err(err) => {
                    warn!(question = %answer.question_id, error = %err, "flush failed, submitting anyway");
                }
            }
        }

        match bounded(self.timeout, self.api.submit(self.attempt)).await {
            Ok(result) => {
                info!(flushed, accuracy = result.summary.accuracy, "attempt submitted");
                *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
                Ok(FinishOutcome::Submitted(result))
            }
            Err(err) => {
                error!(error = %err, "submit failed");
                Err(FinalizeError::Submit(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::sync::AckSink;
    use assessment_api::{ApiCall, ApiError, FakeOption, InMemoryAssessment};
    use exam_core::model::{OptionId, QuestionId};

    struct NoopSink;

    impl AckSink for NoopSink {
        fn acknowledged(&self, _answer: StagedAnswer) {}
    }

    fn setup() -> (InMemoryAssessment, SyncScheduler, FinalizationCoordinator) {
        let backend = InMemoryAssessment::new(AttemptId::new(5), 300);
        backend
            .push_question(1, "first", vec![FakeOption::new(11, "a", true), FakeOption::new(12, "b", false)])
            .push_question(2, "second", vec![FakeOption::new(21, "a", false), FakeOption::new(22, "b", true)]);
        let api: Arc<dyn AssessmentApi> = Arc::new(backend.clone());
        let config = EngineConfig::default();
        let sync = SyncScheduler::new(
            Arc::clone(&api),
            AttemptId::new(5),
            &config,
            Arc::new(NoopSink),
        );
        let finalizer = FinalizationCoordinator::new(api, AttemptId::new(5), config.request_timeout());
        (backend, sync, finalizer)
    }

    fn answer(q: u64, o: u64) -> StagedAnswer {
        StagedAnswer::new(QuestionId::new(q), OptionId::new(o))
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_staged_answers_before_submit() {
        let (backend, sync, finalizer) = setup();
        sync.schedule(answer(2, 22));

        let outcome = finalizer
            .finish(FinishTrigger::Manual, &sync, || vec![answer(1, 11), answer(2, 22)])
            .await
            .unwrap();

        assert!(matches!(outcome, FinishOutcome::Submitted(_)));
        assert_eq!(
            backend.calls(),
            vec![
                ApiCall::Answer {
                    question: QuestionId::new(1),
                    option: OptionId::new(11)
                },
                ApiCall::Answer {
                    question: QuestionId::new(2),
                    option: OptionId::new(22)
                },
                ApiCall::Submit,
            ]
        );
        assert_eq!(outcome.result().unwrap().summary.correct, 2);
        assert_eq!(sync.pending(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn second_finish_returns_stored_result() {
        let (backend, sync, finalizer) = setup();
        finalizer.finish(FinishTrigger::Manual, &sync, Vec::new).await.unwrap();
        let again = finalizer.finish(FinishTrigger::Expiry, &sync, Vec::new).await.unwrap();
        assert!(matches!(again, FinishOutcome::AlreadyFinished(_)));
        assert_eq!(backend.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_finishes_submit_once() {
        let (backend, sync, finalizer) = setup();
        backend.set_latency(Duration::from_millis(300));

        let (first, second) = tokio::join!(
            finalizer.finish(FinishTrigger::Manual, &sync, Vec::new),
            finalizer.finish(FinishTrigger::Expiry, &sync, Vec::new),
        );
        let outcomes = [first.unwrap(), second.unwrap()];
        assert!(outcomes.iter().any(|o| matches!(o, FinishOutcome::Submitted(_))));
        assert!(outcomes.iter().any(|o| matches!(o, FinishOutcome::InFlight)));
        assert_eq!(backend.submit_count(), 1);
        assert!(!finalizer.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_failure_does_not_block_submit() {
        let (backend, sync, finalizer) = setup();
        backend.fail_answers_for(QuestionId::new(1), true);

        let outcome = finalizer
            .finish(FinishTrigger::Expiry, &sync, || vec![answer(1, 11), answer(2, 22)])
            .await
            .unwrap();
        assert!(matches!(outcome, FinishOutcome::Submitted(_)));
        assert_eq!(backend.stored_answer(QuestionId::new(1)), None);
        assert_eq!(backend.stored_answer(QuestionId::new(2)), Some(OptionId::new(22)));
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledged_answers_are_not_rewritten() {
        let (backend, sync, finalizer) = setup();
        sync.write_now(answer(1, 11)).await.unwrap();

        finalizer
            .finish(FinishTrigger::Manual, &sync, || vec![answer(1, 11)])
            .await
            .unwrap();
        assert_eq!(backend.answer_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_failure_releases_the_guard() {
        let (backend, sync, finalizer) = setup();
        backend.fail_next_submits(1);

        let err = finalizer.finish(FinishTrigger::Manual, &sync, Vec::new).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Submit(ApiError::Status { status: 503, .. })));
        assert!(!finalizer.is_in_flight());
        assert!(finalizer.result().is_none());

        let retry = finalizer.finish(FinishTrigger::Manual, &sync, Vec::new).await.unwrap();
        assert!(matches!(retry, FinishOutcome::Submitted(_)));
        assert_eq!(backend.submit_count(), 2);
    }
}
