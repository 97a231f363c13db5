use std::env;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{Attempt, AttemptId, OptionId, QuestionData, QuestionId, SubmitResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use crate::client::AssessmentApi;
use crate::error::ApiError;
use crate::wire::{
    AnswerRequest, AttemptSummaryDto, Envelope, QuestionDto, SubmitDto, map_attempt, map_question,
};

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Where the backend lives and how long a single call may take.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl ApiConfig {
    /// Parse a base url. A trailing slash is added so relative joins keep the
    /// base path.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the url does not parse.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let mut raw = base_url.trim().to_owned();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(Self {
            base_url: Url::parse(&raw)?,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `EXAM_API_BASE_URL` and `EXAM_API_TIMEOUT_SECS`, falling back to a
    /// local development backend.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the configured url does not parse.
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = env::var("EXAM_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let timeout = env::var("EXAM_API_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);
        Ok(Self::new(&base_url)?.with_timeout(timeout))
    }
}

/// Credentials for the current learner, handed to the client explicitly.
#[derive(Clone, Default)]
pub struct AuthContext {
    bearer_token: Option<String>,
}

impl AuthContext {
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            bearer_token: (!token.trim().is_empty()).then_some(token),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Reads `EXAM_API_TOKEN` if set.
    #[must_use]
    pub fn from_env() -> Self {
        env::var("EXAM_API_TOKEN").map_or_else(|_| Self::anonymous(), Self::bearer)
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// `AssessmentApi` over HTTP/JSON.
#[derive(Clone, Debug)]
pub struct HttpAssessmentApi {
    client: Client,
    config: ApiConfig,
    auth: AuthContext,
}

impl HttpAssessmentApi {
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: ApiConfig, auth: AuthContext) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            auth,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.config.base_url.join(path)?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .auth
            .apply(request)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Http(err)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized),
        _ => {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            Err(ApiError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.text().await.map_err(transport_error)?;
    serde_json::from_str::<Envelope<T>>(&body)
        .map(Envelope::into_inner)
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl AssessmentApi for HttpAssessmentApi {
    #[instrument(skip_all, fields(attempt = %attempt))]
    async fn attempt_summary(&self, attempt: AttemptId) -> Result<Attempt, ApiError> {
        let url = self.url(&format!("attempts/{attempt}"))?;
        let response = self.send(self.client.get(url)).await?;
        let dto: AttemptSummaryDto = decode(response).await?;
        map_attempt(attempt, dto)
    }

    #[instrument(skip_all, fields(attempt = %attempt, no = no))]
    async fn question(&self, attempt: AttemptId, no: u32) -> Result<QuestionData, ApiError> {
        let url = self.url(&format!("attempts/{attempt}/questions/{no}"))?;
        let response = self.send(self.client.get(url)).await?;
        let dto: QuestionDto = decode(response).await?;
        map_question(dto)
    }

    #[instrument(skip_all, fields(attempt = %attempt, question = %question, option = %option))]
    async fn answer(
        &self,
        attempt: AttemptId,
        question: QuestionId,
        option: OptionId,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("attempts/{attempt}/answers"))?;
        let body = AnswerRequest {
            question_id: question.value(),
            option_id: option.value(),
        };
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(attempt = %attempt, question = %question))]
    async fn mark(&self, attempt: AttemptId, question: QuestionId) -> Result<(), ApiError> {
        let url = self.url(&format!("attempts/{attempt}/questions/{question}/mark"))?;
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(attempt = %attempt))]
    async fn submit(&self, attempt: AttemptId) -> Result<SubmitResult, ApiError> {
        let url = self.url(&format!("attempts/{attempt}/submit"))?;
        let response = self.send(self.client.post(url)).await?;
        decode::<SubmitDto>(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = ApiConfig::new("https://exam.example.com/api/v1").unwrap();
        assert_eq!(
            config.base_url.join("attempts/3").unwrap().as_str(),
            "https://exam.example.com/api/v1/attempts/3"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            ApiConfig::new("not a url"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn auth_debug_masks_token() {
        let auth = AuthContext::bearer("secret-token");
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn blank_token_is_anonymous() {
        let auth = AuthContext::bearer("   ");
        assert!(auth.bearer_token.is_none());
    }
}
