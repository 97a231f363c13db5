use exam_core::model::{
    AttemptId, AttemptStatus, NavigationItem, Progress, QuestionData,
};

use super::events::{SessionMode, SessionPhase};
use crate::proctor::ProctorWarning;
use crate::sync::SyncStatus;

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    Shown(QuestionData),
    /// The fetch finished after the learner had already moved on; the
    /// question was cached but not displayed.
    Superseded,
    /// The fetch revealed that the attempt is over.
    Terminal(AttemptStatus),
}

/// Point-in-time view of everything the presentation layer renders.
///
/// Plain data: no formatting, no localization.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub attempt_id: AttemptId,
    pub mode: SessionMode,
    pub phase: SessionPhase,
    pub status: AttemptStatus,
    pub remaining_seconds: u64,
    pub current_index: Option<usize>,
    pub current: Option<QuestionData>,
    /// Navigation grid in presentation order.
    pub navigation: Vec<NavigationItem>,
    pub progress: Progress,
    pub sync: SyncStatus,
    pub staged: usize,
    /// `None` outside lockdown.
    pub violations: Option<u32>,
    pub warning: Option<ProctorWarning>,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn total(&self) -> usize {
        self.navigation.len()
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.current_index == Some(0)
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.current_index
            .is_some_and(|index| index + 1 == self.navigation.len())
    }
}
