use async_trait::async_trait;
use exam_core::model::{Attempt, AttemptId, OptionId, QuestionData, QuestionId, SubmitResult};

use crate::error::ApiError;

/// Contract of the remote Assessment API.
///
/// Grading, persistence and violation policy all live behind this trait; the
/// engine only reads snapshots and sends writes.
#[async_trait]
pub trait AssessmentApi: Send + Sync {
    /// Fetch status, remaining time, progress and the navigation grid.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the attempt cannot be loaded.
    async fn attempt_summary(&self, attempt: AttemptId) -> Result<Attempt, ApiError>;

    /// Fetch a question by its canonical 1-based number.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport, status or decoding failures.
    async fn question(&self, attempt: AttemptId, no: u32) -> Result<QuestionData, ApiError>;

    /// Persist the selected option for a question.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the write was not acknowledged.
    async fn answer(
        &self,
        attempt: AttemptId,
        question: QuestionId,
        option: OptionId,
    ) -> Result<(), ApiError>;

    /// Toggle the server-side review flag of a question.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the toggle was not acknowledged.
    async fn mark(&self, attempt: AttemptId, question: QuestionId) -> Result<(), ApiError>;

    /// Close the attempt and return its graded result.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the attempt could not be submitted.
    async fn submit(&self, attempt: AttemptId) -> Result<SubmitResult, ApiError>;
}
