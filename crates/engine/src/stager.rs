use std::collections::HashMap;

use exam_core::model::{OptionId, QuestionId, StagedAnswer};

/// Conditions under which a selection may be staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionGate {
    pub in_progress: bool,
    pub read_only: bool,
    pub finalizing: bool,
}

impl SelectionGate {
    #[must_use]
    pub fn open() -> Self {
        Self {
            in_progress: true,
            read_only: false,
            finalizing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    NotInProgress,
    ReadOnly,
    Finalizing,
}

/// Result of [`AnswerStager::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Staged {
        answer: StagedAnswer,
        previous: Option<OptionId>,
    },
    Ignored(IgnoredReason),
}

impl Selection {
    #[must_use]
    pub fn is_staged(&self) -> bool {
        matches!(self, Self::Staged { .. })
    }
}

/// The learner's latest choice per question, independent of what the server
/// has acknowledged.
#[derive(Debug, Default)]
pub struct AnswerStager {
    staged: HashMap<QuestionId, OptionId>,
}

impl AnswerStager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `answer` if the gate allows it, replacing any earlier choice for
    /// the same question.
    pub fn select(&mut self, gate: SelectionGate, answer: StagedAnswer) -> Selection {
        if gate.read_only {
            return Selection::Ignored(IgnoredReason::ReadOnly);
        }
        if !gate.in_progress {
            return Selection::Ignored(IgnoredReason::NotInProgress);
        }
        if gate.finalizing {
            return Selection::Ignored(IgnoredReason::Finalizing);
        }
        let previous = self.staged.insert(answer.question_id, answer.option_id);
        Selection::Staged { answer, previous }
    }

    #[must_use]
    pub fn get(&self, question: QuestionId) -> Option<OptionId> {
        self.staged.get(&question).copied()
    }

    /// Drop the staged value only if it is exactly what was acknowledged.
    /// A newer choice made while the write was in flight stays staged.
    pub fn clear_if_matches(&mut self, answer: StagedAnswer) -> bool {
        if self.staged.get(&answer.question_id) == Some(&answer.option_id) {
            self.staged.remove(&answer.question_id);
            true
        } else {
            false
        }
    }

    /// Called once the attempt has been submitted.
    pub fn clear_all(&mut self) {
        self.staged.clear();
    }

    /// Every staged answer, ordered by question id.
    #[must_use]
    pub fn staged(&self) -> Vec<StagedAnswer> {
        let mut answers: Vec<_> = self
            .staged
            .iter()
            .map(|(question, option)| StagedAnswer::new(*question, *option))
            .collect();
        answers.sort_by_key(|answer| answer.question_id);
        answers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(q: u64, o: u64) -> StagedAnswer {
        StagedAnswer::new(QuestionId::new(q), OptionId::new(o))
    }

    #[test]
    fn reselect_overwrites() {
        let mut stager = AnswerStager::new();
        stager.select(SelectionGate::open(), answer(1, 10));
        let second = stager.select(SelectionGate::open(), answer(1, 11));
        assert_eq!(
            second,
            Selection::Staged {
                answer: answer(1, 11),
                previous: Some(OptionId::new(10))
            }
        );
        assert_eq!(stager.get(QuestionId::new(1)), Some(OptionId::new(11)));
        assert_eq!(stager.len(), 1);
    }

    #[test]
    fn closed_gate_is_a_no_op() {
        let mut stager = AnswerStager::new();
        let review = SelectionGate {
            read_only: true,
            ..SelectionGate::open()
        };
        let finished = SelectionGate {
            in_progress: false,
            ..SelectionGate::open()
        };
        assert_eq!(
            stager.select(review, answer(1, 10)),
            Selection::Ignored(IgnoredReason::ReadOnly)
        );
        assert_eq!(
            stager.select(finished, answer(1, 10)),
            Selection::Ignored(IgnoredReason::NotInProgress)
        );
        assert!(stager.is_empty());
    }

    #[test]
    fn ack_of_older_value_keeps_newer_choice() {
        let mut stager = AnswerStager::new();
        stager.select(SelectionGate::open(), answer(1, 10));
        stager.select(SelectionGate::open(), answer(1, 11));
        assert!(!stager.clear_if_matches(answer(1, 10)));
        assert_eq!(stager.get(QuestionId::new(1)), Some(OptionId::new(11)));
        assert!(stager.clear_if_matches(answer(1, 11)));
        assert!(stager.is_empty());
    }

    #[test]
    fn staged_is_sorted() {
        let mut stager = AnswerStager::new();
        stager.select(SelectionGate::open(), answer(3, 30));
        stager.select(SelectionGate::open(), answer(1, 10));
        let ids: Vec<_> = stager.staged().iter().map(|a| a.question_id.value()).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
