//! Drives one timed assessment attempt from load to submission.
//!
//! The pieces, leaves first:
//! - [`QuestionSequencer`]: stable shuffled order of questions and options.
//! - [`AnswerStager`]: the learner's current, not yet persisted, choices.
//! - [`SyncScheduler`]: debounced answer writes and the sync-status signal.
//! - [`CountdownController`]: remaining time between server resyncs.
//! - [`FinalizationCoordinator`]: flush-then-submit, at most once.
//! - [`ProctoringMonitor`]: lockdown-only violation counter.
//!
//! [`AssessmentSession`] wires them together.

#![forbid(unsafe_code)]

pub mod config;
pub mod countdown;
pub mod error;
pub mod finalize;
pub mod proctor;
pub mod sequencer;
pub mod session;
pub mod stager;
pub mod sync;
pub mod timer;

pub use exam_core::Clock;

pub use config::EngineConfig;
pub use countdown::{CountdownController, Tick};
pub use error::{ConfigError, FinalizeError, SessionError};
pub use finalize::{FinalizationCoordinator, FinishOutcome, FinishTrigger};
pub use proctor::{
    BrowserSignal, ClipboardAction, KeyChord, ListenerId, ProctorPlatform, ProctorWarning,
    ProctoringMonitor, Restriction, SignalKind, Verdict,
};
pub use sequencer::{Arrival, NavTicket, QuestionSequencer, Visit};
pub use session::{
    AssessmentSession, NavigationOutcome, SessionBuilder, SessionEvent, SessionMode, SessionPhase,
    SessionSnapshot,
};
pub use stager::{AnswerStager, IgnoredReason, Selection, SelectionGate};
pub use sync::{AckSink, QuestionSync, SyncScheduler, SyncStatus, WriteOutcome};
pub use timer::Timer;
