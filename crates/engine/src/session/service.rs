use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use assessment_api::AssessmentApi;
use exam_core::Clock;
use exam_core::model::{
    Attempt, AttemptId, AttemptStatus, OptionId, QuestionData, QuestionId, StagedAnswer,
    SubmitResult, ViolationLog,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::events::{SessionEvent, SessionMode, SessionPhase};
use super::view::{NavigationOutcome, SessionSnapshot};
use crate::config::EngineConfig;
use crate::countdown::{CountdownController, Tick};
use crate::error::SessionError;
use crate::finalize::{FinalizationCoordinator, FinishOutcome, FinishTrigger};
use crate::proctor::{BrowserSignal, ProctorPlatform, ProctoringMonitor, Verdict};
use crate::sequencer::{Arrival, QuestionSequencer, Visit};
use crate::stager::{AnswerStager, Selection, SelectionGate};
use crate::sync::{AckSink, SyncScheduler, SyncStatus};
use crate::timer::{Timer, bounded};

const EVENT_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

struct SessionState {
    attempt: Attempt,
    sequencer: QuestionSequencer,
    stager: AnswerStager,
    countdown: CountdownController,
    phase: SessionPhase,
    last_error: Option<String>,
}

impl SessionState {
    fn gate(&self, finalizing: bool) -> SelectionGate {
        SelectionGate {
            in_progress: self.phase.is_active() && self.attempt.status().is_in_progress(),
            read_only: matches!(self.phase, SessionPhase::Review),
            finalizing,
        }
    }

    fn ensure_writable(&self) -> Result<(), SessionError> {
        match &self.phase {
            SessionPhase::Active => Ok(()),
            SessionPhase::Review => Err(SessionError::ReadOnly),
            SessionPhase::Finished(_) | SessionPhase::Closed(_) => {
                Err(SessionError::Terminal(self.attempt.status()))
            }
        }
    }
}

/// Applies server acknowledgements to the session state.
struct StateSink {
    state: Arc<Mutex<SessionState>>,
}

impl AckSink for StateSink {
    fn acknowledged(&self, answer: StagedAnswer) {
        let mut state = lock(&self.state);
        state.stager.clear_if_matches(answer);
        state.attempt.mark_done(answer.question_id);
    }
}

struct SessionInner {
    attempt_id: AttemptId,
    mode: SessionMode,
    config: EngineConfig,
    api: Arc<dyn AssessmentApi>,
    state: Arc<Mutex<SessionState>>,
    sync: SyncScheduler,
    finalizer: FinalizationCoordinator,
    monitor: Option<ProctoringMonitor>,
    ticker: Mutex<Option<Timer>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Stop every background activity. Safe to call more than once.
    fn stop_background(&self) {
        drop(lock(&self.ticker).take());
        self.sync.close();
        if let Some(monitor) = &self.monitor {
            monitor.deactivate();
        }
    }
}

//
// ─── BUILDER ───────────────────────────────────────────────────────────────────
//

/// Loads an attempt and assembles an [`AssessmentSession`] around it.
pub struct SessionBuilder {
    api: Arc<dyn AssessmentApi>,
    config: EngineConfig,
    clock: Clock,
    platform: Option<Arc<dyn ProctorPlatform>>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new(api: Arc<dyn AssessmentApi>, config: EngineConfig) -> Self {
        Self {
            api,
            config,
            clock: Clock::default(),
            platform: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run the session in lockdown mode with proctoring on `platform`.
    #[must_use]
    pub fn with_lockdown(mut self, platform: Arc<dyn ProctorPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Fetch the attempt summary and its first question.
    ///
    /// An attempt that is already terminal opens in review mode: no timer, no
    /// proctoring, no writes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Load` if the summary or the first question
    /// cannot be fetched and `SessionError::Empty` for an attempt without
    /// questions.
    #[instrument(skip_all, fields(attempt = %attempt_id))]
    pub async fn load(self, attempt_id: AttemptId) -> Result<AssessmentSession, SessionError> {
        let timeout = self.config.request_timeout();
        let mut attempt = bounded(timeout, self.api.attempt_summary(attempt_id))
            .await
            .map_err(SessionError::Load)?;
        if attempt.is_empty() {
            return Err(SessionError::Empty);
        }

        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let phase = if attempt.status().is_terminal() {
            SessionPhase::Review
        } else {
            SessionPhase::Active
        };
        let active = phase.is_active();
        let sequencer = QuestionSequencer::new(
            &mut attempt,
            self.config.shuffle_questions,
            self.config.shuffle_options,
            rng,
        );
        let countdown = CountdownController::new(attempt.remaining_seconds());
        let state = Arc::new(Mutex::new(SessionState {
            attempt,
            sequencer,
            stager: AnswerStager::new(),
            countdown,
            phase,
            last_error: None,
        }));

        let sync = SyncScheduler::new(
            Arc::clone(&self.api),
            attempt_id,
            &self.config,
            Arc::new(StateSink {
                state: Arc::clone(&state),
            }),
        );
        let finalizer = FinalizationCoordinator::new(Arc::clone(&self.api), attempt_id, timeout);
        let mode = if self.platform.is_some() {
            SessionMode::Lockdown
        } else {
            SessionMode::Practice
        };
        let monitor = self.platform.filter(|_| active).map(|platform| {
            ProctoringMonitor::attach(platform, self.clock, self.config.fullscreen_retry())
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let session = AssessmentSession {
            inner: Arc::new(SessionInner {
                attempt_id,
                mode,
                config: self.config,
                api: self.api,
                state,
                sync,
                finalizer,
                monitor,
                ticker: Mutex::new(None),
                events,
            }),
        };

        match session.navigate(0).await {
            Ok(_) => {}
            Err(SessionError::Navigation { source, .. }) => return Err(SessionError::Load(source)),
            Err(err) => return Err(err),
        }

        if session.phase().is_active() {
            session.start_ticker();
        }
        info!(mode = ?session.inner.mode, phase = ?session.phase(), "session loaded");
        Ok(session)
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One learner working through one attempt.
///
/// Cloning shares the session. All operations are safe to call from any task
/// on the runtime.
#[derive(Clone)]
pub struct AssessmentSession {
    inner: Arc<SessionInner>,
}

impl AssessmentSession {
    fn start_ticker(&self) {
        let weak = Arc::downgrade(&self.inner);
        let timer = Timer::every(self.inner.config.tick(), move || {
            let Some(inner) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            let tick = lock(&inner.state).countdown.tick();
            match tick {
                Tick::Running(_) => ControlFlow::Continue(()),
                Tick::Expired => {
                    info!(attempt = %inner.attempt_id, "time is up, finishing");
                    inner.emit(SessionEvent::Expired);
                    let session = AssessmentSession { inner };
                    // Finishing drops this ticker, so it cannot run inline.
                    tokio::spawn(async move {
                        let _ = session.finish_with(FinishTrigger::Expiry).await;
                    });
                    ControlFlow::Break(())
                }
                Tick::Idle => ControlFlow::Break(()),
            }
        });
        *lock(&self.inner.ticker) = Some(timer);
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.inner.attempt_id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.inner.mode
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        lock(&self.inner.state).phase.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.state).sequencer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ─── navigation ───────────────────────────────────────────────────────────

    /// Display presentation slot `index`, fetching it if it is not cached.
    ///
    /// A fetch that completes after a newer navigation is cached but reported
    /// as [`NavigationOutcome::Superseded`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::IndexOutOfRange` for an unknown slot and
    /// `SessionError::Navigation` when the fetch fails.
    #[instrument(skip_all, fields(attempt = %self.inner.attempt_id, index = index))]
    pub async fn navigate(&self, index: usize) -> Result<NavigationOutcome, SessionError> {
        let visit = lock(&self.inner.state).sequencer.begin(index)?;
        let ticket = match visit {
            Visit::Cached(question) => return Ok(NavigationOutcome::Shown(question)),
            Visit::Fetch(ticket) => ticket,
        };

        let fetched = bounded(
            self.inner.config.request_timeout(),
            self.inner.api.question(self.inner.attempt_id, ticket.no),
        )
        .await;
        let question = match fetched {
            Ok(question) => question,
            Err(source) => {
                warn!(no = ticket.no, error = %source, "question fetch failed");
                let message = source.to_string();
                let current = {
                    let mut state = lock(&self.inner.state);
                    let current = state.sequencer.is_current(&ticket);
                    if current {
                        state.last_error = Some(message.clone());
                    }
                    current
                };
                if current {
                    self.inner.emit(SessionEvent::NavigationFailed {
                        no: ticket.no,
                        message,
                    });
                }
                return Err(SessionError::Navigation {
                    no: ticket.no,
                    source,
                });
            }
        };

        let status = question.status();
        let remaining = question.remaining_seconds();
        self.inner
            .sync
            .seed(question.id(), question.selected_option_id());

        let (arrival, closed) = {
            let mut state = lock(&self.inner.state);
            let arrival = state.sequencer.complete(ticket, question);
            let mut closed = None;
            if state.phase.is_active() {
                if status.is_terminal() {
                    closed = Some(status);
                } else if matches!(arrival, Arrival::Shown(_)) {
                    state.countdown.resync(remaining);
                    state.attempt.set_remaining_seconds(remaining);
                }
            }
            if matches!(arrival, Arrival::Shown(_)) {
                state.last_error = None;
            }
            (arrival, closed)
        };

        if let Some(status) = closed {
            self.close(status);
            return Ok(NavigationOutcome::Terminal(status));
        }
        Ok(match arrival {
            Arrival::Shown(question) => NavigationOutcome::Shown(question),
            Arrival::Stale => NavigationOutcome::Superseded,
        })
    }

    /// Move one slot forward; `None` on the last question.
    ///
    /// # Errors
    ///
    /// See [`Self::navigate`].
    pub async fn next(&self) -> Result<Option<NavigationOutcome>, SessionError> {
        let target = {
            let state = lock(&self.inner.state);
            let next = state.sequencer.current_index().map_or(0, |index| index + 1);
            (next < state.sequencer.len()).then_some(next)
        };
        match target {
            Some(index) => self.navigate(index).await.map(Some),
            None => Ok(None),
        }
    }

    /// Move one slot back; `None` on the first question.
    ///
    /// # Errors
    ///
    /// See [`Self::navigate`].
    pub async fn previous(&self) -> Result<Option<NavigationOutcome>, SessionError> {
        let target = lock(&self.inner.state)
            .sequencer
            .current_index()
            .and_then(|index| index.checked_sub(1));
        match target {
            Some(index) => self.navigate(index).await.map(Some),
            None => Ok(None),
        }
    }

    /// Jump to a question picked from the navigation grid.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` if the question is not part of
    /// this attempt, otherwise see [`Self::navigate`].
    pub async fn go_to_question(
        &self,
        question: QuestionId,
    ) -> Result<NavigationOutcome, SessionError> {
        let index = lock(&self.inner.state)
            .sequencer
            .index_of(question)
            .ok_or(SessionError::UnknownQuestion(question))?;
        self.navigate(index).await
    }

    // ─── answering ────────────────────────────────────────────────────────────

    /// Stage `option` for `question` and schedule its write.
    ///
    /// Returns `Selection::Ignored` without side effects while the session is
    /// read-only, no longer in progress or finalizing. Never waits on the
    /// network.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for a question that has not
    /// been loaded and `SessionError::UnknownOption` for an option that does
    /// not belong to it.
    pub fn select(&self, question: QuestionId, option: OptionId) -> Result<Selection, SessionError> {
        let answer = StagedAnswer::new(question, option);
        let selection = {
            let mut state = lock(&self.inner.state);
            let gate = state.gate(self.inner.finalizer.is_in_flight());
            if gate != SelectionGate::open() {
                return Ok(state.stager.select(gate, answer));
            }
            let cached = state
                .sequencer
                .cached(question)
                .ok_or(SessionError::UnknownQuestion(question))?;
            if !cached.has_option(option) {
                return Err(SessionError::UnknownOption { question, option });
            }
            let selection = state.stager.select(gate, answer);
            if let Some(cached) = state.sequencer.cached_mut(question) {
                cached.set_selected_option(Some(option));
            }
            selection
        };
        debug!(question = %question, option = %option, "answer staged");
        self.inner.sync.schedule(answer);
        Ok(selection)
    }

    /// Stage the option shown with `label` on the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownLabel` when no option carries `label`,
    /// `SessionError::IndexOutOfRange` if nothing is displayed yet, otherwise
    /// the errors of [`Self::select`].
    pub fn select_label(&self, label: &str) -> Result<Selection, SessionError> {
        let (question, option) = {
            let state = lock(&self.inner.state);
            let current = state.sequencer.current().ok_or(SessionError::IndexOutOfRange {
                index: 0,
                len: state.sequencer.len(),
            })?;
            let option = current.option_by_label(label).map(|o| o.id);
            (current.id(), option)
        };
        match option {
            Some(option) => self.select(question, option),
            None => Err(SessionError::UnknownLabel {
                question,
                label: label.to_owned(),
            }),
        }
    }

    /// Flip the review flag of `question` on the server.
    ///
    /// The flag flips locally first and is put back if the call fails.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ReadOnly`/`Terminal` outside an active session,
    /// `SessionError::UnknownQuestion` and `SessionError::Sync` when the
    /// server rejects the toggle.
    pub async fn toggle_mark(&self, question: QuestionId) -> Result<bool, SessionError> {
        let marked = {
            let mut state = lock(&self.inner.state);
            state.ensure_writable()?;
            let previous = state
                .attempt
                .item(question)
                .map(|item| item.marked)
                .ok_or(SessionError::UnknownQuestion(question))?;
            let marked = !previous;
            state.attempt.set_marked(question, marked);
            if let Some(cached) = state.sequencer.cached_mut(question) {
                cached.set_marked(marked);
            }
            marked
        };

        let result = bounded(
            self.inner.config.request_timeout(),
            self.inner.api.mark(self.inner.attempt_id, question),
        )
        .await;
        if let Err(err) = result {
            warn!(question = %question, error = %err, "mark toggle failed, reverting");
            let mut state = lock(&self.inner.state);
            state.attempt.set_marked(question, !marked);
            if let Some(cached) = state.sequencer.cached_mut(question) {
                cached.set_marked(!marked);
            }
            state.last_error = Some(err.to_string());
            return Err(SessionError::Sync(err));
        }
        Ok(marked)
    }

    // ─── finishing ────────────────────────────────────────────────────────────

    /// Flush outstanding answers and submit the attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ReadOnly`/`Terminal` outside an active session
    /// and `SessionError::Finalize` when the submit fails; staged answers are
    /// kept so the learner can retry.
    pub async fn finish(&self) -> Result<FinishOutcome, SessionError> {
        self.finish_with(FinishTrigger::Manual).await
    }

    async fn finish_with(&self, trigger: FinishTrigger) -> Result<FinishOutcome, SessionError> {
        {
            let state = lock(&self.inner.state);
            if let SessionPhase::Finished(result) = &state.phase {
                return Ok(FinishOutcome::AlreadyFinished(result.clone()));
            }
            state.ensure_writable()?;
        }

        let state = Arc::clone(&self.inner.state);
        let outcome = self
            .inner
            .finalizer
            .finish(trigger, &self.inner.sync, move || lock(&state).stager.staged())
            .await;

        match outcome {
            Ok(FinishOutcome::Submitted(result)) => {
                self.complete(result.clone());
                Ok(FinishOutcome::Submitted(result))
            }
            Ok(other) => Ok(other),
            Err(err) => {
                let message = err.to_string();
                lock(&self.inner.state).last_error = Some(message.clone());
                self.inner.emit(SessionEvent::FinishFailed { message });
                Err(err.into())
            }
        }
    }

    fn complete(&self, result: SubmitResult) {
        {
            let mut state = lock(&self.inner.state);
            state.attempt.set_status(AttemptStatus::Completed);
            state.phase = SessionPhase::Finished(result.clone());
            state.stager.clear_all();
            state.countdown.stop();
            state.last_error = None;
        }
        self.inner.stop_background();
        self.inner.emit(SessionEvent::Finished(result));
    }

    fn close(&self, status: AttemptStatus) {
        {
            let mut state = lock(&self.inner.state);
            if !state.phase.is_active() {
                return;
            }
            state.attempt.set_status(status);
            state.phase = SessionPhase::Closed(status);
            state.countdown.stop();
        }
        warn!(attempt = %self.inner.attempt_id, status = %status, "attempt closed by the server");
        self.inner.stop_background();
        self.inner.emit(SessionEvent::Closed(status));
    }

    // ─── proctoring ───────────────────────────────────────────────────────────

    /// Forward a browser signal to the proctoring monitor.
    ///
    /// Practice sessions allow everything.
    pub fn handle_signal(&self, signal: &BrowserSignal) -> Verdict {
        let Some(monitor) = &self.inner.monitor else {
            return Verdict::allow();
        };
        let verdict = monitor.handle(signal);
        if let Some(warning) = &verdict.warning {
            self.inner.emit(SessionEvent::Warning(warning.clone()));
        }
        verdict
    }

    pub fn dismiss_warning(&self) {
        if let Some(monitor) = &self.inner.monitor {
            monitor.dismiss_warning();
        }
    }

    #[must_use]
    pub fn violations(&self) -> Option<ViolationLog> {
        self.inner.monitor.as_ref().map(ProctoringMonitor::violations)
    }

    // ─── observation ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn current_question(&self) -> Option<QuestionData> {
        lock(&self.inner.state).sequencer.current().cloned()
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        lock(&self.inner.state).countdown.remaining()
    }

    #[must_use]
    pub fn staged(&self) -> Vec<StagedAnswer> {
        lock(&self.inner.state).stager.staged()
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.inner.sync.status()
    }

    #[must_use]
    pub fn subscribe_sync(&self) -> watch::Receiver<SyncStatus> {
        self.inner.sync.subscribe()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn result(&self) -> Option<SubmitResult> {
        match &lock(&self.inner.state).phase {
            SessionPhase::Finished(result) => Some(result.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let monitor = self.inner.monitor.as_ref();
        let violations = monitor.map(ProctoringMonitor::count);
        let warning = monitor.and_then(ProctoringMonitor::current_warning);
        let sync = self.inner.sync.status();
        let state = lock(&self.inner.state);
        SessionSnapshot {
            attempt_id: self.inner.attempt_id,
            mode: self.inner.mode,
            phase: state.phase.clone(),
            status: state.attempt.status(),
            remaining_seconds: state.countdown.remaining(),
            current_index: state.sequencer.current_index(),
            current: state.sequencer.current().cloned(),
            navigation: state.attempt.nav_in_presentation_order(),
            progress: state.attempt.progress(),
            sync,
            staged: state.stager.len(),
            violations,
            warning,
            last_error: state.last_error.clone(),
        }
    }

    /// Stop the countdown, pending writes and proctoring without submitting.
    pub fn shutdown(&self) {
        lock(&self.inner.state).countdown.stop();
        self.inner.stop_background();
        debug!(attempt = %self.inner.attempt_id, "session shut down");
    }
}

impl std::fmt::Debug for AssessmentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssessmentSession")
            .field("attempt", &self.inner.attempt_id)
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}
