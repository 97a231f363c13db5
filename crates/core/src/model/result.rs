use serde::{Deserialize, Serialize};

/// Per-question tallies returned after submission.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total_questions: u32,
    pub correct: u32,
    pub wrong: u32,
    pub unanswered: u32,
    /// Percentage in `0.0..=100.0`.
    pub accuracy: f64,
}

impl ResultSummary {
    #[must_use]
    pub fn answered(&self) -> u32 {
        self.correct.saturating_add(self.wrong)
    }
}

/// Graded outcome of a submitted attempt. Scoring happens server-side; the
/// client only displays this.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubmitResult {
    pub summary: ResultSummary,
    pub total_score: f64,
    pub is_passed: bool,
    pub passing_score: f64,
    pub has_answer_key: bool,
}
