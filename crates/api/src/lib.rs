//! Client side of the Assessment API.
//!
//! [`AssessmentApi`] is the contract the session engine talks to. Two
//! implementations ship here: [`HttpAssessmentApi`] for a real backend and
//! [`InMemoryAssessment`] for tests and offline runs.

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod http;
pub mod memory;
mod wire;

pub use client::AssessmentApi;
pub use error::ApiError;
pub use http::{ApiConfig, AuthContext, HttpAssessmentApi};
pub use memory::{ApiCall, FakeOption, InMemoryAssessment};
