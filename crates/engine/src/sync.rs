//! Debounced answer writes.
//!
//! One debounce timer is shared by all questions: every `schedule` restarts
//! it and only the latest payload is written when it fires. Writes that are
//! already in flight are never cancelled; their effect is gated by a
//! per-question sequence number instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use assessment_api::{ApiError, AssessmentApi};
use exam_core::model::{AttemptId, OptionId, QuestionId, StagedAnswer};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::timer::{Timer, bounded};

/// Global sync indicator shown next to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// Per-question sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuestionSync {
    #[default]
    Unsynced,
    Syncing,
    Synced,
    SyncFailed,
}

/// Receives acknowledged answers so the owner can clear staged values and
/// update its navigation grid.
pub trait AckSink: Send + Sync {
    fn acknowledged(&self, answer: StagedAnswer);
}

/// Outcome of one write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The value was already acknowledged; no request was sent.
    Unchanged,
}

#[derive(Debug, Default)]
struct QuestionBook {
    state: QuestionSync,
    last_acked: Option<OptionId>,
    issued: u64,
    applied: u64,
    outstanding: u32,
}

#[derive(Debug, Default)]
struct SyncBook {
    questions: HashMap<QuestionId, QuestionBook>,
    in_flight: usize,
}

impl SyncBook {
    fn last_acked(&self, question: QuestionId) -> Option<OptionId> {
        self.questions.get(&question).and_then(|q| q.last_acked)
    }

    /// Whether `option` is what the server holds and no write for the
    /// question can still change that.
    fn settled(&self, question: QuestionId, option: OptionId) -> bool {
        self.questions
            .get(&question)
            .is_some_and(|q| q.last_acked == Some(option) && q.outstanding == 0)
    }

    fn begin(&mut self, question: QuestionId) -> u64 {
        let book = self.questions.entry(question).or_default();
        book.issued += 1;
        book.outstanding += 1;
        book.state = QuestionSync::Syncing;
        self.in_flight += 1;
        book.issued
    }

    /// Returns `false` when a newer write already landed.
    fn acknowledge(&mut self, answer: StagedAnswer, seq: u64) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        let book = self.questions.entry(answer.question_id).or_default();
        book.outstanding = book.outstanding.saturating_sub(1);
        if seq < book.applied {
            return false;
        }
        book.applied = seq;
        book.last_acked = Some(answer.option_id);
        if seq == book.issued {
            book.state = QuestionSync::Synced;
        }
        true
    }

    fn fail(&mut self, question: QuestionId, seq: u64) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let book = self.questions.entry(question).or_default();
        book.outstanding = book.outstanding.saturating_sub(1);
        if seq == book.issued {
            book.state = QuestionSync::SyncFailed;
        }
    }
}

struct SyncInner {
    api: Arc<dyn AssessmentApi>,
    attempt: AttemptId,
    debounce: Duration,
    display: Duration,
    timeout: Duration,
    sink: Arc<dyn AckSink>,
    book: Mutex<SyncBook>,
    pending: Mutex<Option<StagedAnswer>>,
    debounce_timer: Mutex<Option<Timer>>,
    revert_timer: Mutex<Option<Timer>>,
    status: watch::Sender<SyncStatus>,
    closed: std::sync::atomic::AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncInner {
    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn set_status(self: &Arc<Self>, status: SyncStatus) {
        self.status.send_replace(status);
        let mut revert = lock(&self.revert_timer);
        *revert = None;
        if matches!(status, SyncStatus::Saved | SyncStatus::Error) && !self.is_closed() {
            let weak = Arc::downgrade(self);
            *revert = Some(Timer::after(self.display, async move {
                if let Some(inner) = weak.upgrade() {
                    inner.status.send_if_modified(|current| {
                        if *current == status {
                            *current = SyncStatus::Idle;
                            true
                        } else {
                            false
                        }
                    });
                }
            }));
        }
    }

    async fn write(self: &Arc<Self>, answer: StagedAnswer) -> Result<WriteOutcome, ApiError> {
        let seq = {
            let mut book = lock(&self.book);
            if book.settled(answer.question_id, answer.option_id) {
                None
            } else {
                Some(book.begin(answer.question_id))
            }
        };
        let Some(seq) = seq else {
            debug!(question = %answer.question_id, "answer already acknowledged, skipping write");
            self.sink.acknowledged(answer);
            return Ok(WriteOutcome::Unchanged);
        };

        self.set_status(SyncStatus::Saving);
        let result = bounded(
            self.timeout,
            self.api
                .answer(self.attempt, answer.question_id, answer.option_id),
        )
        .await;

        match result {
            Ok(()) => {
                let (applied, still_busy) = {
                    let mut book = lock(&self.book);
                    let applied = book.acknowledge(answer, seq);
                    (applied, book.in_flight > 0)
                };
                if applied {
                    self.sink.acknowledged(answer);
                }
                if !still_busy {
                    self.set_status(SyncStatus::Saved);
                }
                Ok(WriteOutcome::Written)
            }
            Err(err) => {
                lock(&self.book).fail(answer.question_id, seq);
                warn!(question = %answer.question_id, error = %err, "answer write failed");
                self.set_status(SyncStatus::Error);
                Err(err)
            }
        }
    }

    fn fire(self: &Arc<Self>) {
        let Some(answer) = lock(&self.pending).take() else {
            return;
        };
        if self.is_closed() {
            return;
        }
        let inner = Arc::clone(self);
        // Detached so cancelling the debounce timer can never abort a write.
        tokio::spawn(async move {
            let _ = inner.write(answer).await;
        });
    }
}

/// Debounces staged answers into answer writes and tracks what the server
/// has acknowledged.
pub struct SyncScheduler {
    inner: Arc<SyncInner>,
}

impl SyncScheduler {
    #[must_use]
    pub fn new(
        api: Arc<dyn AssessmentApi>,
        attempt: AttemptId,
        config: &EngineConfig,
        sink: Arc<dyn AckSink>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            inner: Arc::new(SyncInner {
                api,
                attempt,
                debounce: config.debounce(),
                display: config.status_display(),
                timeout: config.request_timeout(),
                sink,
                book: Mutex::new(SyncBook::default()),
                pending: Mutex::new(None),
                debounce_timer: Mutex::new(None),
                revert_timer: Mutex::new(None),
                status,
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Queue `answer` for writing after the quiet period, replacing whatever
    /// was pending and restarting the timer.
    pub fn schedule(&self, answer: StagedAnswer) {
        if self.inner.is_closed() {
            return;
        }
        let mut timer = lock(&self.inner.debounce_timer);
        let replaced = lock(&self.inner.pending).replace(answer);
        if let Some(previous) = replaced {
            debug!(
                question = %previous.question_id,
                "pending write superseded before the debounce fired"
            );
        }
        let weak: Weak<SyncInner> = Arc::downgrade(&self.inner);
        *timer = Some(Timer::after(self.inner.debounce, async move {
            if let Some(inner) = weak.upgrade() {
                inner.fire();
            }
        }));
    }

    /// Stop the debounce timer and return the payload it would have written.
    pub fn cancel_pending(&self) -> Option<StagedAnswer> {
        let mut timer = lock(&self.inner.debounce_timer);
        *timer = None;
        lock(&self.inner.pending).take()
    }

    #[must_use]
    pub fn pending(&self) -> Option<StagedAnswer> {
        *lock(&self.inner.pending)
    }

    /// Write `answer` right away, bypassing the debounce.
    ///
    /// # Errors
    ///
    /// Returns the `ApiError` of a failed or timed-out write.
    pub async fn write_now(&self, answer: StagedAnswer) -> Result<WriteOutcome, ApiError> {
        self.inner.write(answer).await
    }

    /// Treat a server-reported selection as acknowledged unless the client
    /// already knows better.
    pub fn seed(&self, question: QuestionId, option: Option<OptionId>) {
        let Some(option) = option else {
            return;
        };
        let mut book = lock(&self.inner.book);
        let entry = book.questions.entry(question).or_default();
        if entry.issued == 0 && entry.last_acked.is_none() {
            entry.last_acked = Some(option);
            entry.state = QuestionSync::Synced;
        }
    }

    #[must_use]
    pub fn last_acknowledged(&self, question: QuestionId) -> Option<OptionId> {
        lock(&self.inner.book).last_acked(question)
    }

    /// False only when the server already holds `answer` and no other write
    /// for that question is still in flight.
    #[must_use]
    pub fn needs_write(&self, answer: StagedAnswer) -> bool {
        !lock(&self.inner.book).settled(answer.question_id, answer.option_id)
    }

    #[must_use]
    pub fn question_state(&self, question: QuestionId) -> QuestionSync {
        lock(&self.inner.book)
            .questions
            .get(&question)
            .map(|q| q.state)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.inner.status.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Cancel every timer and refuse further scheduling.
    pub fn close(&self) {
        self.inner
            .closed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.cancel_pending();
        *lock(&self.inner.revert_timer) = None;
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("attempt", &self.inner.attempt)
            .field("status", &self.status())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessment_api::{FakeOption, InMemoryAssessment};

    #[derive(Default)]
    struct RecordingSink {
        acks: Mutex<Vec<StagedAnswer>>,
    }

    impl AckSink for RecordingSink {
        fn acknowledged(&self, answer: StagedAnswer) {
            lock(&self.acks).push(answer);
        }
    }

    fn backend() -> InMemoryAssessment {
        let api = InMemoryAssessment::new(AttemptId::new(1), 600);
        for q in 1..=3_u64 {
            api.push_question(
                q,
                format!("question {q}"),
                (1..=4)
                    .map(|o| FakeOption::new(q * 10 + o, format!("choice {o}"), o == 1))
                    .collect(),
            );
        }
        api
    }

    fn scheduler(api: &InMemoryAssessment) -> (SyncScheduler, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let api: Arc<dyn AssessmentApi> = Arc::new(api.clone());
        let sync = SyncScheduler::new(
            api,
            AttemptId::new(1),
            &EngineConfig::default(),
            Arc::clone(&sink) as Arc<dyn AckSink>,
        );
        (sync, sink)
    }

    fn answer(q: u64, o: u64) -> StagedAnswer {
        StagedAnswer::new(QuestionId::new(q), OptionId::new(o))
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_write() {
        let api = backend();
        let (sync, sink) = scheduler(&api);

        sync.schedule(answer(2, 21));
        tokio::time::sleep(Duration::from_millis(500)).await;
        sync.schedule(answer(2, 22));
        tokio::time::sleep(Duration::from_millis(500)).await;
        sync.schedule(answer(2, 23));
        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(api.answer_calls().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            api.answer_calls(),
            vec![(QuestionId::new(2), OptionId::new(23))]
        );
        assert_eq!(lock(&sink.acks).as_slice(), &[answer(2, 23)]);
        assert_eq!(sync.question_state(QuestionId::new(2)), QuestionSync::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn already_acknowledged_value_is_not_rewritten() {
        let api = backend();
        let (sync, _sink) = scheduler(&api);

        sync.schedule(answer(1, 11));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(api.answer_calls().len(), 1);

        sync.schedule(answer(1, 12));
        sync.schedule(answer(1, 11));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(api.answer_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_server_selection_counts_as_acknowledged() {
        let api = backend();
        let (sync, _sink) = scheduler(&api);
        sync.seed(QuestionId::new(3), Some(OptionId::new(32)));

        assert!(!sync.needs_write(answer(3, 32)));
        sync.schedule(answer(3, 32));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert!(api.answer_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_sets_error_then_reverts_to_idle() {
        let api = backend();
        api.fail_next_answers(1);
        let (sync, sink) = scheduler(&api);

        sync.schedule(answer(1, 11));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(sync.status(), SyncStatus::Error);
        assert_eq!(
            sync.question_state(QuestionId::new(1)),
            QuestionSync::SyncFailed
        );
        assert!(lock(&sink.acks).is_empty());
        assert!(sync.needs_write(answer(1, 11)));

        tokio::time::sleep(Duration::from_millis(1_600)).await;
        assert_eq!(sync.status(), SyncStatus::Idle);

        sync.schedule(answer(1, 11));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(sync.status(), SyncStatus::Saved);
        assert_eq!(api.answer_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_prevents_the_write() {
        let api = backend();
        let (sync, _sink) = scheduler(&api);
        sync.schedule(answer(1, 11));
        assert_eq!(sync.cancel_pending(), Some(answer(1, 11)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(api.answer_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_write_survives_a_new_schedule() {
        let api = backend();
        api.set_latency(Duration::from_millis(800));
        let (sync, _sink) = scheduler(&api);

        sync.schedule(answer(1, 11));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(sync.status(), SyncStatus::Saving);
        sync.schedule(answer(2, 21));
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        assert_eq!(api.stored_answer(QuestionId::new(1)), Some(OptionId::new(11)));
        assert_eq!(sync.last_acknowledged(QuestionId::new(1)), Some(OptionId::new(11)));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_write_times_out() {
        let api = backend();
        api.set_latency(Duration::from_secs(60));
        let (sync, _sink) = scheduler(&api);

        let err = sync.write_now(answer(1, 11)).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout));
        assert_eq!(sync.status(), SyncStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_scheduler_ignores_schedule() {
        let api = backend();
        let (sync, _sink) = scheduler(&api);
        sync.close();
        sync.schedule(answer(1, 11));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(api.answer_calls().is_empty());
        assert_eq!(sync.pending(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reverting_while_a_write_is_in_flight_still_writes() {
        let api = backend();
        let (sync, sink) = scheduler(&api);

        sync.schedule(answer(1, 11));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(sync.last_acknowledged(QuestionId::new(1)), Some(OptionId::new(11)));

        api.set_latency(Duration::from_secs(3));
        sync.schedule(answer(1, 12));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert!(sync.needs_write(answer(1, 11)));

        sync.schedule(answer(1, 11));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(
            api.answer_calls(),
            vec![
                (QuestionId::new(1), OptionId::new(11)),
                (QuestionId::new(1), OptionId::new(12)),
                (QuestionId::new(1), OptionId::new(11)),
            ]
        );
        assert_eq!(api.stored_answer(QuestionId::new(1)), Some(OptionId::new(11)));
        assert_eq!(sync.last_acknowledged(QuestionId::new(1)), Some(OptionId::new(11)));
        assert_eq!(lock(&sink.acks).last(), Some(&answer(1, 11)));
        assert!(!sync.needs_write(answer(1, 11)));
    }

    #[test]
    fn stale_ack_does_not_regress_last_acknowledged() {
        let mut book = SyncBook::default();
        let q = QuestionId::new(1);
        let first = book.begin(q);
        let second = book.begin(q);
        assert!(book.acknowledge(answer(1, 12), second));
        assert!(!book.acknowledge(answer(1, 11), first));
        assert_eq!(book.last_acked(q), Some(OptionId::new(12)));
        assert_eq!(book.in_flight, 0);
    }
}
