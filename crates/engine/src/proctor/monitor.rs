use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use exam_core::Clock;
use exam_core::model::{ViolationKind, ViolationLog};
use tracing::{debug, info, warn};

use super::platform::{ListenerSet, ProctorPlatform};
use super::signal::{BrowserSignal, KeyChord};
use crate::timer::Timer;

/// Modal warning shown to the learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProctorWarning {
    pub kind: ViolationKind,
    /// Violation total at the time of the warning.
    pub count: u32,
    pub message: String,
}

/// What the host should do with a signal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verdict {
    pub prevent_default: bool,
    /// New violation total, when this signal counted as one.
    pub violation: Option<u32>,
    pub warning: Option<ProctorWarning>,
    pub refullscreen_after: Option<Duration>,
    /// Ask the browser for its native leave-page confirmation.
    pub confirm_unload: bool,
}

impl Verdict {
    #[must_use]
    pub fn allow() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    log: ViolationLog,
    active: bool,
    warning: Option<ProctorWarning>,
}

struct MonitorInner {
    platform: Arc<dyn ProctorPlatform>,
    clock: Clock,
    fullscreen_retry: Duration,
    state: Mutex<MonitorState>,
    retry: Mutex<Option<Timer>>,
    listeners: Mutex<Option<ListenerSet>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts lockdown violations and decides how each browser signal is handled.
///
/// Cloning shares the same counter.
#[derive(Clone)]
pub struct ProctoringMonitor {
    inner: Arc<MonitorInner>,
}

impl ProctoringMonitor {
    /// Register every listener on `platform` and start monitoring.
    #[must_use]
    pub fn attach(platform: Arc<dyn ProctorPlatform>, clock: Clock, fullscreen_retry: Duration) -> Self {
        let listeners = ListenerSet::register_all(Arc::clone(&platform));
        debug!(listeners = listeners.len(), "proctoring listeners registered");
        platform.request_fullscreen();
        Self {
            inner: Arc::new(MonitorInner {
                platform,
                clock,
                fullscreen_retry,
                state: Mutex::new(MonitorState {
                    active: true,
                    ..MonitorState::default()
                }),
                retry: Mutex::new(None),
                listeners: Mutex::new(Some(listeners)),
            }),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        lock(&self.inner.state).active
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        lock(&self.inner.state).log.count()
    }

    #[must_use]
    pub fn violations(&self) -> ViolationLog {
        lock(&self.inner.state).log.clone()
    }

    #[must_use]
    pub fn current_warning(&self) -> Option<ProctorWarning> {
        lock(&self.inner.state).warning.clone()
    }

    pub fn dismiss_warning(&self) {
        lock(&self.inner.state).warning = None;
    }

    /// Whether a fullscreen re-request is waiting to fire.
    #[must_use]
    pub fn refullscreen_pending(&self) -> bool {
        lock(&self.inner.retry)
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Classify one browser signal, record it and report what to do.
    pub fn handle(&self, signal: &BrowserSignal) -> Verdict {
        if !self.is_active() {
            return Verdict::allow();
        }
        match signal {
            BrowserSignal::Clipboard(action) => self.block(action.violation(), None, None),
            BrowserSignal::ContextMenu => self.block(ViolationKind::ContextMenu, None, None),
            BrowserSignal::VisibilityChange { hidden: true } => {
                self.count_only(ViolationKind::DocumentHidden, true)
            }
            BrowserSignal::VisibilityChange { hidden: false } => Verdict::allow(),
            BrowserSignal::Blur => self.count_only(ViolationKind::WindowBlur, false),
            BrowserSignal::FullscreenChange { active: false } => self.fullscreen_exited(),
            BrowserSignal::FullscreenChange { active: true } => {
                *lock(&self.inner.retry) = None;
                Verdict::allow()
            }
            BrowserSignal::KeyDown(chord) => self.key_down(chord),
            BrowserSignal::BeforeUnload => Verdict {
                confirm_unload: true,
                ..Verdict::allow()
            },
        }
    }

    /// Stop counting and remove every listener. Idempotent.
    pub fn deactivate(&self) {
        let was_active = {
            let mut state = lock(&self.inner.state);
            std::mem::replace(&mut state.active, false)
        };
        *lock(&self.inner.retry) = None;
        drop(lock(&self.inner.listeners).take());
        if was_active {
            info!(violations = self.count(), "proctoring stopped");
        }
    }

    fn key_down(&self, chord: &KeyChord) -> Verdict {
        match chord.restriction() {
            Some(restriction) => self.block(
                ViolationKind::RestrictedKey,
                Some(&chord.to_string()),
                restriction.warns().then(|| restriction.describe()),
            ),
            None => Verdict::allow(),
        }
    }

    fn block(&self, kind: ViolationKind, detail: Option<&str>, headline: Option<&str>) -> Verdict {
        let mut verdict = self.record(kind, detail, headline);
        verdict.prevent_default = true;
        verdict
    }

    fn count_only(&self, kind: ViolationKind, warn_user: bool) -> Verdict {
        self.record(kind, None, warn_user.then(|| kind.reason()))
    }

    fn fullscreen_exited(&self) -> Verdict {
        let mut verdict = self.record(
            ViolationKind::FullscreenExit,
            None,
            Some(ViolationKind::FullscreenExit.reason()),
        );
        let delay = self.inner.fullscreen_retry;
        let weak = Arc::downgrade(&self.inner);
        *lock(&self.inner.retry) = Some(Timer::after(delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if lock(&inner.state).active {
                debug!("re-requesting fullscreen");
                inner.platform.request_fullscreen();
            }
        }));
        verdict.refullscreen_after = Some(delay);
        verdict
    }

    /// Count one violation; `headline` names it in the warning dialog, if any.
    fn record(&self, kind: ViolationKind, detail: Option<&str>, headline: Option<&str>) -> Verdict {
        let now = self.inner.clock.now();
        let (count, warning) = {
            let mut state = lock(&self.inner.state);
            let count = state.log.record(kind, detail, now);
            let warning = headline.map(|headline| ProctorWarning {
                kind,
                count,
                message: format!("Violation detected: {headline}. Total violations: {count}."),
            });
            if let Some(warning) = &warning {
                state.warning = Some(warning.clone());
            }
            (count, warning)
        };
        warn!(kind = ?kind, count, detail = detail.unwrap_or(""), "proctoring violation");
        if let Some(warning) = &warning {
            self.inner.platform.show_warning(warning);
        }
        Verdict {
            violation: Some(count),
            warning,
            ..Verdict::allow()
        }
    }
}

impl fmt::Debug for ProctoringMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("ProctoringMonitor")
            .field("active", &state.active)
            .field("count", &state.log.count())
            .finish_non_exhaustive()
    }
}
