//! Shared error types for the session engine.

use std::path::PathBuf;

use assessment_api::ApiError;
use exam_core::model::{AttemptStatus, OptionId, QuestionId};
use thiserror::Error;

/// Errors emitted while loading engine configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Errors emitted by the finalization coordinator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FinalizeError {
    #[error("submit failed: {0}")]
    Submit(#[from] ApiError),
}

/// Errors emitted by an assessment session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("attempt could not be loaded: {0}")]
    Load(#[source] ApiError),
    #[error("attempt has no questions")]
    Empty,
    #[error("question {no} could not be loaded: {source}")]
    Navigation {
        no: u32,
        #[source]
        source: ApiError,
    },
    #[error("presentation index {index} is out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("question {0} is not part of this attempt")]
    UnknownQuestion(QuestionId),
    #[error("option {option} does not belong to question {question}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },
    #[error("question {question} has no option labelled {label}")]
    UnknownLabel { question: QuestionId, label: String },
    #[error("attempt is open read-only")]
    ReadOnly,
    #[error("attempt is no longer in progress ({0})")]
    Terminal(AttemptStatus),
    #[error("sync failed: {0}")]
    Sync(#[source] ApiError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
