use serde::{Deserialize, Serialize};

use crate::model::ids::{OptionId, QuestionId};

/// The user's current, not necessarily persisted, choice for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagedAnswer {
    pub question_id: QuestionId,
    pub option_id: OptionId,
}

impl StagedAnswer {
    #[must_use]
    pub const fn new(question_id: QuestionId, option_id: OptionId) -> Self {
        Self {
            question_id,
            option_id,
        }
    }
}
