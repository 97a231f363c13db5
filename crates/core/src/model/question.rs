use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::ModelError;
use crate::model::attempt::AttemptStatus;
use crate::model::ids::{OptionId, QuestionId};

/// Letter label for the option shown at `index`: A..Z, then AA, AB, ...
#[must_use]
pub fn option_label(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(char::from(b'A' + u8::try_from(rem).unwrap_or(0)));
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

/// One answer choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionData {
    pub id: OptionId,
    pub label: String,
    pub text: String,
    pub image_url: Option<String>,
    /// Only present when the server reveals the answer key.
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
}

/// A question as fetched for one attempt, including the server's snapshot of
/// the attempt state at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionData {
    id: QuestionId,
    no: u32,
    prompt: String,
    image_url: Option<String>,
    options: Vec<OptionData>,
    status: AttemptStatus,
    selected_option_id: Option<OptionId>,
    is_marked: bool,
    remaining_seconds: u64,
    explanation: Option<String>,
}

impl QuestionData {
    /// Validate and assemble a question.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidQuestionNo` for `no == 0`,
    /// `ModelError::EmptyOptions` when there is nothing to choose from and
    /// `ModelError::DuplicateOption` when an option id repeats.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuestionId,
        no: u32,
        prompt: impl Into<String>,
        image_url: Option<String>,
        options: Vec<OptionData>,
        status: AttemptStatus,
        selected_option_id: Option<OptionId>,
        is_marked: bool,
        remaining_seconds: u64,
        explanation: Option<String>,
    ) -> Result<Self, ModelError> {
        if no == 0 {
            return Err(ModelError::InvalidQuestionNo);
        }
        if options.is_empty() {
            return Err(ModelError::EmptyOptions { question: id });
        }
        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if !seen.insert(option.id) {
                return Err(ModelError::DuplicateOption {
                    question: id,
                    option: option.id,
                });
            }
        }

        Ok(Self {
            id,
            no,
            prompt: prompt.into(),
            image_url,
            options,
            status,
            selected_option_id,
            is_marked,
            remaining_seconds,
            explanation,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    /// Canonical 1-based number.
    #[must_use]
    pub fn no(&self) -> u32 {
        self.no
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> &[OptionData] {
        &self.options
    }

    /// Mutable access for reordering. Call [`Self::relabel_options`] afterwards.
    pub fn options_mut(&mut self) -> &mut [OptionData] {
        &mut self.options
    }

    #[must_use]
    pub fn option(&self, id: OptionId) -> Option<&OptionData> {
        self.options.iter().find(|option| option.id == id)
    }

    #[must_use]
    pub fn option_by_label(&self, label: &str) -> Option<&OptionData> {
        self.options
            .iter()
            .find(|option| option.label.eq_ignore_ascii_case(label.trim()))
    }

    #[must_use]
    pub fn has_option(&self, id: OptionId) -> bool {
        self.option(id).is_some()
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn selected_option_id(&self) -> Option<OptionId> {
        self.selected_option_id
    }

    #[must_use]
    pub fn is_marked(&self) -> bool {
        self.is_marked
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Label of the currently selected option, if any.
    #[must_use]
    pub fn selected_label(&self) -> Option<&str> {
        self.selected_option_id
            .and_then(|id| self.option(id))
            .map(|option| option.label.as_str())
    }

    /// Reassign labels A, B, C… following the current option order.
    pub fn relabel_options(&mut self) {
        for (index, option) in self.options.iter_mut().enumerate() {
            option.label = option_label(index);
        }
    }

    pub fn set_selected_option(&mut self, option_id: Option<OptionId>) {
        self.selected_option_id = option_id;
    }

    pub fn set_marked(&mut self, marked: bool) {
        self.is_marked = marked;
    }
}
