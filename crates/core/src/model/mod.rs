mod answer;
mod attempt;
mod ids;
mod question;
mod result;
mod violation;

use thiserror::Error;

pub use answer::StagedAnswer;
pub use attempt::{Attempt, AttemptStatus, NavigationItem, Progress};
pub use ids::{AttemptId, OptionId, ParseIdError, QuestionId};
pub use question::{OptionData, QuestionData, option_label};
pub use result::{ResultSummary, SubmitResult};
pub use violation::{ViolationKind, ViolationLog};

/// Validation failures raised while building domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    #[error("question {question} has no options")]
    EmptyOptions { question: QuestionId },

    #[error("question {question} lists option {option} more than once")]
    DuplicateOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("question {question} appears more than once in the navigation grid")]
    DuplicateQuestion { question: QuestionId },

    #[error("unknown attempt status: {0}")]
    UnknownStatus(String),

    #[error("question number must start at 1")]
    InvalidQuestionNo,
}
