use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::config::ApiConfig;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// How the server answered a logout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    LoggedOut,
    /// 403: the server already considers the session over
    AlreadyUnauthorized,
    Rejected(u16),
}

impl LogoutOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => LogoutOutcome::LoggedOut,
            StatusCode::FORBIDDEN => LogoutOutcome::AlreadyUnauthorized,
            other => LogoutOutcome::Rejected(other.as_u16()),
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            LogoutOutcome::LoggedOut | LogoutOutcome::AlreadyUnauthorized
        )
    }
}

/// The REST service as seen by the session core.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn logout_user(&self, user_id: &str) -> Result<LogoutOutcome, ApiError>;
}

#[derive(Serialize)]
struct LogoutRequest<'a> {
    user_id: &'a str,
}

/// `reqwest` implementation of [`SessionApi`].
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSessionApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self::with_client(config.base_url.clone(), client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn logout_user(&self, user_id: &str) -> Result<LogoutOutcome, ApiError> {
        let url = format!("{}/api/LogoutUser", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LogoutRequest { user_id })
            .send()
            .await?;

        let outcome = LogoutOutcome::from_status(response.status());
        tracing::debug!(user_id, status = response.status().as_u16(), ?outcome, "Logout request answered");
        Ok(outcome)
    }
}
