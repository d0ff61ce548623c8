//! Resend email provider implementation.

use super::{EmailMessage, EmailProvider, SentEmail};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Resend API configuration.
#[derive(Debug, Clone)]
pub struct ResendConfig {
    /// Resend API key.
    pub api_key: String,
    /// Sender email address.
    pub from_email: String,
    /// Sender name.
    pub from_name: String,
    /// Resend API base URL (defaults to production).
    pub api_url: String,
}

impl ResendConfig {
    /// Create a new Resend configuration.
    pub fn new(api_key: String, from_email: String, from_name: String) -> Self {
        Self {
            api_key,
            from_email,
            from_name,
            api_url: "https://api.resend.com".to_string(),
        }
    }
}

/// Resend email provider.
pub struct ResendProvider {
    config: ResendConfig,
    client: Client,
}

impl ResendProvider {
    /// Create a new Resend provider.
    pub fn new(config: ResendConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

// Resend API request/response structures

#[derive(Debug, Serialize)]
struct ResendRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    html: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResendError {
    message: String,
}

#[async_trait]
impl EmailProvider for ResendProvider {
    async fn send(&self, email: &EmailMessage) -> NotificationResult<SentEmail> {
        let request = ResendRequest {
            from: format!("{} <{}>", self.config.from_name, self.config.from_email),
            to: vec![email.to_email.clone()],
            subject: email.subject.clone(),
            html: email.html_body.clone(),
            text: email.text_body.clone(),
        };

        debug!(
            to = %email.to_email,
            subject = %email.subject,
            idempotency_key = ?email.idempotency_key,
            "Sending email via Resend"
        );

        let mut builder = self
            .client
            .post(format!("{}/emails", self.config.api_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(key) = email.idempotency_key.as_deref() {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            let body: ResendResponse = response.json().await?;
            info!(
                to = %email.to_email,
                message_id = %body.id,
                "Email sent successfully via Resend"
            );
            return Ok(SentEmail {
                message_id: Some(body.id),
                accepted: true,
            });
        }

        let error_body = response.text().await.unwrap_or_default();
        let error_message = serde_json::from_str::<ResendError>(&error_body)
            .map(|e| e.message)
            .unwrap_or(error_body);

        // 429 and 5xx are worth retrying; other 4xx means the request
        // itself is bad and will never succeed.
        if status.is_server_error() || status.as_u16() == 429 {
            warn!(
                to = %email.to_email,
                status = %status,
                error = %error_message,
                "Resend transient failure"
            );
            Err(NotificationError::Provider(format!(
                "Resend error ({status}): {error_message}"
            )))
        } else {
            error!(
                to = %email.to_email,
                status = %status,
                error = %error_message,
                "Resend rejected the message"
            );
            Err(NotificationError::ProviderRejected(format!(
                "Resend error ({status}): {error_message}"
            )))
        }
    }

    fn name(&self) -> &'static str {
        "Resend"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        // Resend doesn't have a dedicated health endpoint,
        // so we check if the API key format is valid
        if self.config.api_key.starts_with("re_") {
            Ok(true)
        } else {
            Err(NotificationError::Config(
                "Invalid Resend API key format".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resend_config_new() {
        let config = ResendConfig::new(
            "re_test_key".to_string(),
            "notifications@example.com".to_string(),
            "Chambers".to_string(),
        );

        assert_eq!(config.api_key, "re_test_key");
        assert_eq!(config.from_email, "notifications@example.com");
        assert_eq!(config.from_name, "Chambers");
        assert_eq!(config.api_url, "https://api.resend.com");
    }

    #[tokio::test]
    async fn test_health_check_rejects_bad_key() {
        let provider = ResendProvider::new(ResendConfig::new(
            "bogus".to_string(),
            "notifications@example.com".to_string(),
            "Chambers".to_string(),
        ));
        assert!(provider.health_check().await.is_err());
    }
}
