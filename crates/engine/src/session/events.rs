use exam_core::model::{AttemptStatus, SubmitResult};

use crate::proctor::ProctorWarning;

/// Whether the session runs with proctoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Practice,
    Lockdown,
}

/// Lifecycle of a loaded session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    /// Answering is open.
    Active,
    /// Opened on an attempt that was already terminal; browse only.
    Review,
    /// Submitted by this session.
    Finished(SubmitResult),
    /// The server reported a terminal status mid-session.
    Closed(AttemptStatus),
}

impl SessionPhase {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Notifications for the presentation layer.
///
/// Sent on a broadcast channel; a lagging receiver only misses events, it
/// never slows the session down.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    NavigationFailed { no: u32, message: String },
    Warning(ProctorWarning),
    Expired,
    Finished(SubmitResult),
    FinishFailed { message: String },
    Closed(AttemptStatus),
}
