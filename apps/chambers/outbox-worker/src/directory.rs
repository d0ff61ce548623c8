//! HTTP-backed identity and entity collaborators.
//!
//! The worker has no direct access to the identity provider or the
//! matters database; it talks to the backend's internal API. Responses
//! are small and uncached, the outbox poll cadence keeps the call rate
//! low.

use async_trait::async_trait;
use domain_notifications::error::{NotificationError, NotificationResult};
use domain_notifications::store::{Directory, UserInfo};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Configuration for the internal directory API.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
}

impl DirectoryConfig {
    pub fn from_env() -> Result<Self, NotificationError> {
        let base_url = std::env::var("DIRECTORY_URL")
            .map_err(|_| NotificationError::Config("DIRECTORY_URL not set".to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: std::env::var("DIRECTORY_AUTH_TOKEN").ok(),
        })
    }
}

pub struct HttpDirectory {
    config: DirectoryConfig,
    client: Client,
}

impl HttpDirectory {
    pub fn new(config: DirectoryConfig) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Config(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> NotificationResult<Option<T>> {
        let mut request = self
            .client
            .get(format!("{}{path}", self.config.base_url));
        if let Some(token) = self.config.auth_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(NotificationError::Internal(format!(
                "directory API returned {} for {path}",
                response.status()
            )));
        }
        Ok(Some(response.json().await?))
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminsResponse {
    uids: Vec<String>,
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn get_user(&self, uid: &str) -> NotificationResult<Option<UserInfo>> {
        debug!(%uid, "Looking up user in directory");
        let user: Option<UserResponse> = self.get_json(&format!("/internal/users/{uid}")).await?;
        Ok(user.map(|u| UserInfo {
            email: u.email,
            display_name: u.display_name,
        }))
    }

    async fn org_admins(&self, org_id: &str) -> NotificationResult<Vec<String>> {
        let admins: Option<AdminsResponse> = self
            .get_json(&format!("/internal/orgs/{org_id}/admins"))
            .await?;
        Ok(admins.map(|a| a.uids).unwrap_or_default())
    }
}
