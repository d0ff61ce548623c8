//! No-op email provider.
//!
//! Used when no email credentials are configured: the pipeline keeps
//! working end to end (records, jobs, status transitions) but nothing
//! leaves the building. Every send is logged and reported accepted.

use super::{EmailMessage, EmailProvider, SentEmail};
use crate::error::NotificationResult;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Default)]
pub struct NoopProvider;

impl NoopProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailProvider for NoopProvider {
    async fn send(&self, email: &EmailMessage) -> NotificationResult<SentEmail> {
        info!(
            to = %email.to_email,
            subject = %email.subject,
            "Email sending disabled, dropping message"
        );
        Ok(SentEmail {
            message_id: None,
            accepted: true,
        })
    }

    fn name(&self) -> &'static str {
        "Noop"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(true)
    }
}
