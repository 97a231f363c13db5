use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of a detected proctoring violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Copy,
    Cut,
    Paste,
    ContextMenu,
    DocumentHidden,
    WindowBlur,
    FullscreenExit,
    RestrictedKey,
}

impl ViolationKind {
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Copy => "copy is not allowed",
            Self::Cut => "cut is not allowed",
            Self::Paste => "paste is not allowed",
            Self::ContextMenu => "context menu is not allowed",
            Self::DocumentHidden => "left the exam tab",
            Self::WindowBlur => "exam window lost focus",
            Self::FullscreenExit => "exited fullscreen",
            Self::RestrictedKey => "restricted key combination",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Running tally of violations for one lockdown attempt.
///
/// The count only ever grows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViolationLog {
    count: u32,
    last_reason: Option<String>,
    last_at: Option<DateTime<Utc>>,
    by_kind: BTreeMap<ViolationKind, u32>,
}

impl ViolationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one violation and return the new total.
    pub fn record(
        &mut self,
        kind: ViolationKind,
        detail: Option<&str>,
        at: DateTime<Utc>,
    ) -> u32 {
        self.count = self.count.saturating_add(1);
        let reason = match detail {
            Some(detail) => format!("{}: {detail}", kind.reason()),
            None => kind.reason().to_owned(),
        };
        self.last_reason = Some(reason);
        self.last_at = Some(at);
        let slot = self.by_kind.entry(kind).or_insert(0);
        *slot = slot.saturating_add(1);
        self.count
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn last_reason(&self) -> Option<&str> {
        self.last_reason.as_deref()
    }

    #[must_use]
    pub fn last_at(&self) -> Option<DateTime<Utc>> {
        self.last_at
    }

    #[must_use]
    pub fn count_of(&self, kind: ViolationKind) -> u32 {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn record_counts_and_remembers_last_reason() {
        let mut log = ViolationLog::new();
        assert_eq!(log.record(ViolationKind::Copy, None, fixed_now()), 1);
        assert_eq!(
            log.record(ViolationKind::RestrictedKey, Some("Ctrl+U"), fixed_now()),
            2
        );
        assert_eq!(log.count(), 2);
        assert_eq!(
            log.last_reason(),
            Some("restricted key combination: Ctrl+U")
        );
        assert_eq!(log.count_of(ViolationKind::Copy), 1);
        assert_eq!(log.count_of(ViolationKind::Paste), 0);
        assert_eq!(log.last_at(), Some(fixed_now()));
    }
}
