//! Lockdown proctoring.
//!
//! The monitor only counts and warns. It owns no session state and never
//! blocks answer capture; the host forwards browser signals to
//! [`ProctoringMonitor::handle`] and applies the returned [`Verdict`].

mod monitor;
mod platform;
mod signal;

pub use monitor::{ProctorWarning, ProctoringMonitor, Verdict};
pub use platform::{ListenerId, ProctorPlatform};
pub use signal::{BrowserSignal, ClipboardAction, KeyChord, Restriction, SignalKind};
