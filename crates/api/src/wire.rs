//! JSON shapes exchanged with the backend and their mapping to the domain.

use exam_core::model::{
    Attempt, AttemptId, AttemptStatus, OptionData, OptionId, QuestionData, QuestionId,
    SubmitResult,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Responses may arrive bare or wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

/// `done` is recomputed from the grid, so only `total` is read.
#[derive(Debug, Deserialize)]
pub(crate) struct ProgressDto {
    pub total: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavDto {
    pub question_id: u64,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub marked: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttemptSummaryDto {
    pub status: String,
    #[serde(default)]
    pub remaining_seconds: i64,
    #[serde(default)]
    pub progress: Option<ProgressDto>,
    #[serde(default)]
    pub nav: Vec<NavDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OptionDto {
    pub id: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionDto {
    pub question_id: u64,
    pub no: u32,
    pub question: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub options: Vec<OptionDto>,
    pub status: String,
    #[serde(default)]
    pub selected_option_id: Option<u64>,
    #[serde(default)]
    pub is_marked: bool,
    #[serde(default)]
    pub remaining_seconds: i64,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerRequest {
    pub question_id: u64,
    pub option_id: u64,
}

pub(crate) type SubmitDto = SubmitResult;

fn clamp_seconds(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

pub(crate) fn map_attempt(id: AttemptId, dto: AttemptSummaryDto) -> Result<Attempt, ApiError> {
    let status: AttemptStatus = dto.status.parse()?;
    let entries = dto
        .nav
        .into_iter()
        .map(|item| (QuestionId::new(item.question_id), item.done, item.marked));
    Ok(Attempt::new(
        id,
        status,
        clamp_seconds(dto.remaining_seconds),
        dto.progress.map(|p| p.total),
        entries,
    )?)
}

pub(crate) fn map_question(dto: QuestionDto) -> Result<QuestionData, ApiError> {
    let status: AttemptStatus = dto.status.parse()?;
    let options = dto
        .options
        .into_iter()
        .map(|option| OptionData {
            id: OptionId::new(option.id),
            label: option.label,
            text: option.text,
            image_url: option.image_url,
            is_correct: option.is_correct,
            score: option.score,
        })
        .collect();

    Ok(QuestionData::new(
        QuestionId::new(dto.question_id),
        dto.no,
        dto.question,
        dto.image_url,
        options,
        status,
        dto.selected_option_id.map(OptionId::new),
        dto.is_marked,
        clamp_seconds(dto.remaining_seconds),
        dto.explanation,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_accepts_wrapped_and_bare() {
        let wrapped: Envelope<NavDto> =
            serde_json::from_str(r#"{"data": {"question_id": 4, "done": true}}"#).unwrap();
        let bare: Envelope<NavDto> = serde_json::from_str(r#"{"question_id": 5}"#).unwrap();
        assert_eq!(wrapped.into_inner().question_id, 4);
        let bare = bare.into_inner();
        assert_eq!(bare.question_id, 5);
        assert!(!bare.done);
    }

    #[test]
    fn negative_remaining_time_clamps_to_zero() {
        let dto: AttemptSummaryDto = serde_json::from_str(
            r#"{"status": "in_progress", "remaining_seconds": -4, "nav": [{"question_id": 1}]}"#,
        )
        .unwrap();
        let attempt = map_attempt(AttemptId::new(1), dto).unwrap();
        assert_eq!(attempt.remaining_seconds(), 0);
        assert_eq!(attempt.progress().total, 1);
    }

    #[test]
    fn unknown_status_is_a_model_error() {
        let dto: AttemptSummaryDto =
            serde_json::from_str(r#"{"status": "paused", "nav": []}"#).unwrap();
        let err = map_attempt(AttemptId::new(1), dto).unwrap_err();
        assert!(matches!(err, ApiError::Model(_)));
    }

    #[test]
    fn question_maps_options_and_selection() {
        let dto: QuestionDto = serde_json::from_str(
            r#"{
                "question_id": 11, "no": 2, "question": "Capital of France?",
                "options": [
                    {"id": 1, "label": "A", "text": "Paris"},
                    {"id": 2, "label": "B", "text": "Rome"}
                ],
                "status": "in_progress", "selected_option_id": 2,
                "is_marked": true, "remaining_seconds": 90
            }"#,
        )
        .unwrap();
        let question = map_question(dto).unwrap();
        assert_eq!(question.no(), 2);
        assert_eq!(question.selected_label(), Some("B"));
        assert!(question.is_marked());
        assert_eq!(question.remaining_seconds(), 90);
    }
}
