use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::model::ModelError;
use crate::model::ids::{AttemptId, QuestionId};

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

/// Server-reported lifecycle state of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    /// Submitted by the learner (or by the client on expiry).
    Completed,
    /// Closed by the server because the time budget ran out.
    Expired,
    /// Closed by the server for any other reason.
    Abandoned,
}

impl AttemptStatus {
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::InProgress)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_in_progress()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_progress" | "ongoing" | "started" => Ok(Self::InProgress),
            "completed" | "submitted" | "finished" => Ok(Self::Completed),
            "expired" | "timeout" | "timed_out" => Ok(Self::Expired),
            "abandoned" | "cancelled" | "canceled" => Ok(Self::Abandoned),
            other => Err(ModelError::UnknownStatus(other.to_owned())),
        }
    }
}

//
// ─── NAVIGATION ───────────────────────────────────────────────────────────────
//

/// Answered/total counter shown next to the navigation grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub done: u32,
    pub total: u32,
}

/// One cell of the navigation grid.
///
/// `original_no` is the canonical, 1-based position the server knows the
/// question by. `presentation_index` is the 0-based slot the learner sees
/// after shuffling and never leaves the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationItem {
    pub question_id: QuestionId,
    pub done: bool,
    pub marked: bool,
    pub original_no: u32,
    pub presentation_index: usize,
}

//
// ─── ATTEMPT ──────────────────────────────────────────────────────────────────
//

/// Client-side view of one attempt.
///
/// Once the status turns terminal the attempt is frozen: navigation flags and
/// progress no longer change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    status: AttemptStatus,
    remaining_seconds: u64,
    total: u32,
    nav: Vec<NavigationItem>,
}

impl Attempt {
    /// Build an attempt from the server's summary.
    ///
    /// `entries` are `(question_id, done, marked)` in canonical order; their
    /// canonical number is their 1-based position. Presentation indexes start
    /// out equal to canonical order until a sequencer reorders them.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::DuplicateQuestion` if a question id repeats.
    pub fn new(
        id: AttemptId,
        status: AttemptStatus,
        remaining_seconds: u64,
        total: Option<u32>,
        entries: impl IntoIterator<Item = (QuestionId, bool, bool)>,
    ) -> Result<Self, ModelError> {
        let mut seen = HashSet::new();
        let mut nav = Vec::new();
        for (index, (question_id, done, marked)) in entries.into_iter().enumerate() {
            if !seen.insert(question_id) {
                return Err(ModelError::DuplicateQuestion {
                    question: question_id,
                });
            }
            nav.push(NavigationItem {
                question_id,
                done,
                marked,
                original_no: u32::try_from(index + 1).unwrap_or(u32::MAX),
                presentation_index: index,
            });
        }

        let listed = u32::try_from(nav.len()).unwrap_or(u32::MAX);
        Ok(Self {
            id,
            status,
            remaining_seconds,
            total: total.unwrap_or(listed).max(listed),
            nav,
        })
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.status.is_terminal()
    }

    /// Remaining seconds as reported by the most recent server snapshot.
    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nav.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nav.is_empty()
    }

    /// Navigation grid in canonical order.
    #[must_use]
    pub fn nav(&self) -> &[NavigationItem] {
        &self.nav
    }

    /// Navigation grid sorted by presentation index.
    #[must_use]
    pub fn nav_in_presentation_order(&self) -> Vec<NavigationItem> {
        let mut items = self.nav.clone();
        items.sort_by_key(|item| item.presentation_index);
        items
    }

    #[must_use]
    pub fn item(&self, question_id: QuestionId) -> Option<&NavigationItem> {
        self.nav.iter().find(|item| item.question_id == question_id)
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        let done = self.nav.iter().filter(|item| item.done).count();
        Progress {
            done: u32::try_from(done).unwrap_or(u32::MAX),
            total: self.total,
        }
    }

    /// Record the latest server snapshot of remaining time.
    pub fn set_remaining_seconds(&mut self, seconds: u64) {
        if !self.is_frozen() {
            self.remaining_seconds = seconds;
        }
    }

    /// Move the attempt to a new status. Terminal statuses are sticky.
    pub fn set_status(&mut self, status: AttemptStatus) {
        if !self.is_frozen() {
            self.status = status;
        }
    }

    /// Apply a presentation order: `order[i]` is the canonical number shown at
    /// slot `i`.
    pub fn apply_presentation(&mut self, order: &[u32]) {
        for (index, original_no) in order.iter().enumerate() {
            if let Some(item) = self
                .nav
                .iter_mut()
                .find(|item| item.original_no == *original_no)
            {
                item.presentation_index = index;
            }
        }
    }

    /// Flag a question as answered on the server. Returns `true` if it changed.
    pub fn mark_done(&mut self, question_id: QuestionId) -> bool {
        if self.is_frozen() {
            return false;
        }
        match self.nav.iter_mut().find(|item| item.question_id == question_id) {
            Some(item) if !item.done => {
                item.done = true;
                true
            }
            _ => false,
        }
    }

    /// Set the review flag of a question. Returns the previous value.
    pub fn set_marked(&mut self, question_id: QuestionId, marked: bool) -> Option<bool> {
        if self.is_frozen() {
            return None;
        }
        let item = self
            .nav
            .iter_mut()
            .find(|item| item.question_id == question_id)?;
        Some(std::mem::replace(&mut item.marked, marked))
    }
}
