//! Outbox processor: drains durable email jobs and dispatches them.
//!
//! Each tick reclaims stale locks, polls for due jobs, claims each one
//! with a conditional update and dispatches it. A job failure never
//! aborts the tick; every job is isolated. Transient failures go back to
//! the queue with exponential backoff, permanent ones are dead-lettered
//! on the spot.

use crate::error::{NotificationError, NotificationResult};
use crate::metrics::OutboxMetrics;
use crate::models::{
    backoff_delay, normalize_email, Channel, JobError, NotificationRecord, NotificationStatus,
    OutboxJob,
};
use crate::providers::{EmailMessage, EmailProvider};
use crate::store::{Directory, NotificationStore};
use crate::templates::{EmailTemplateData, TemplateRenderer};
use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::RngExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Configuration for the outbox processor.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// How often to poll for due jobs.
    pub poll_interval: Duration,
    /// Maximum jobs drained per tick.
    pub batch_size: u64,
    /// Age after which a processing lock is considered abandoned.
    pub lock_timeout: Duration,
    /// Base URL prepended to deep links in emails.
    pub app_base_url: String,
    /// Display name for the product in email copy.
    pub app_name: String,
    /// Unique id of this processor instance, used as lock owner.
    pub instance_id: String,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();

        Self {
            poll_interval: Duration::from_secs(
                env_u64("OUTBOX_POLL_INTERVAL_SECS").unwrap_or(60),
            ),
            batch_size: env_u64("OUTBOX_BATCH_SIZE").unwrap_or(50),
            lock_timeout: Duration::from_secs(env_u64("OUTBOX_LOCK_TIMEOUT_SECS").unwrap_or(600)),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "https://app.chambers.example".to_string()),
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Chambers".to_string()),
            instance_id: format!("outbox-{suffix}"),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// The outbox processor.
pub struct OutboxProcessor<S: NotificationStore> {
    store: Arc<S>,
    directory: Arc<dyn Directory>,
    provider: Arc<dyn EmailProvider>,
    templates: Arc<TemplateRenderer>,
    config: OutboxConfig,
    metrics: OutboxMetrics,
}

impl<S: NotificationStore> OutboxProcessor<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn Directory>,
        provider: Arc<dyn EmailProvider>,
        templates: Arc<TemplateRenderer>,
        config: OutboxConfig,
    ) -> Self {
        let metrics = OutboxMetrics::new(config.instance_id.clone());
        Self {
            store,
            directory,
            provider,
            templates,
            config,
            metrics,
        }
    }

    /// Run the polling loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> NotificationResult<()> {
        info!(
            instance_id = %self.config.instance_id,
            provider = %self.provider.name(),
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Starting outbox processor"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(instance_id = %self.config.instance_id, "Outbox processor shutting down");
                        return Ok(());
                    }
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One poll cycle. Never returns an error; failures are logged and
    /// retried on the next tick.
    pub async fn tick(&self) {
        let started = Instant::now();

        let stale_cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.lock_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(600));
        match self.store.reclaim_stale_jobs(stale_cutoff).await {
            Ok(reclaimed) => {
                if reclaimed > 0 {
                    warn!(reclaimed, "Reclaimed stale outbox locks");
                }
                self.metrics.stale_reclaimed(reclaimed);
            }
            Err(error) => error!(%error, "Failed to reclaim stale jobs"),
        }

        let due = match self.store.due_jobs(Utc::now(), self.config.batch_size).await {
            Ok(due) => due,
            Err(error) => {
                error!(%error, "Failed to poll due jobs");
                return;
            }
        };
        self.metrics.due_backlog(due.len());
        if due.is_empty() {
            self.metrics.tick(started.elapsed());
            return;
        }
        debug!(count = due.len(), "Processing due outbox jobs");

        for job in due {
            let job_id = job.id.clone();
            if let Err(error) = self.process_job(&job_id).await {
                error!(%job_id, %error, "Outbox job processing failed");
            }
        }

        self.metrics.tick(started.elapsed());
    }

    /// Claim and dispatch one job.
    #[instrument(skip(self), fields(instance_id = %self.config.instance_id))]
    async fn process_job(&self, job_id: &str) -> NotificationResult<()> {
        let Some(job) = self
            .store
            .claim_job(job_id, &self.config.instance_id, Utc::now())
            .await?
        else {
            // Another instance won the claim, or the job moved on.
            debug!(%job_id, "Job no longer claimable");
            return Ok(());
        };
        self.metrics.job_claimed();

        let started = Instant::now();
        match self.dispatch(&job).await {
            Ok(Dispatched::Sent) => {
                self.metrics.job_sent(started.elapsed());
                Ok(())
            }
            Ok(Dispatched::Suppressed) => {
                self.metrics.job_suppressed();
                Ok(())
            }
            Ok(Dispatched::AlreadyDone) => Ok(()),
            Err(error) => self.handle_failure(&job, error).await,
        }
    }

    /// Send the email for a claimed job.
    async fn dispatch(&self, job: &OutboxJob) -> NotificationResult<Dispatched> {
        let record = self
            .store
            .get_notification(&job.org_id, &job.event_id, &job.recipient_uid, Channel::Email)
            .await?
            .ok_or_else(|| {
                NotificationError::NotFound(format!(
                    "no email notification for job {}",
                    job.id
                ))
            })?;

        // A job re-claimed after a crash may point at a record that
        // already reached a terminal state; finish without re-sending.
        if matches!(
            record.status,
            NotificationStatus::Sent | NotificationStatus::Suppressed
        ) {
            debug!(job_id = %job.id, status = %record.status, "Notification already settled");
            self.store.complete_job(&job.id).await?;
            return Ok(Dispatched::AlreadyDone);
        }

        let user = self
            .directory
            .get_user(&job.recipient_uid)
            .await?
            .unwrap_or_default();
        let Some(email) = user.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return Err(NotificationError::NoEmailOnFile(job.recipient_uid.clone()));
        };

        let normalized = normalize_email(email);
        if self.store.is_suppressed(&job.org_id, &normalized).await? {
            info!(job_id = %job.id, "Recipient suppressed, skipping send");
            self.store
                .set_notification_status(record.id, NotificationStatus::Suppressed, None)
                .await?;
            self.store.complete_job(&job.id).await?;
            return Ok(Dispatched::Suppressed);
        }

        let rendered = self.templates.render(&self.template_data(&record, &user))?;
        let sent = self
            .provider
            .send(&EmailMessage {
                to_email: normalized,
                to_name: user.display_name.unwrap_or_default(),
                subject: rendered.subject,
                html_body: rendered.html,
                text_body: rendered.text,
                idempotency_key: Some(job.id.clone()),
            })
            .await?;

        info!(
            job_id = %job.id,
            message_id = ?sent.message_id,
            provider = %self.provider.name(),
            "Email dispatched"
        );
        self.store
            .set_notification_status(record.id, NotificationStatus::Sent, None)
            .await?;
        self.store.complete_job(&job.id).await?;
        Ok(Dispatched::Sent)
    }

    /// Route a dispatch failure: back off, or dead-letter.
    async fn handle_failure(
        &self,
        job: &OutboxJob,
        error: NotificationError,
    ) -> NotificationResult<()> {
        let attempts = job.attempts + 1;
        let job_error = JobError::new(None, error.to_string());

        // Keep the record's surface in sync with the job so the
        // recipient-facing status never claims a send that failed.
        let record_id = NotificationRecord::deterministic_id(
            &job.org_id,
            &job.event_id,
            &job.recipient_uid,
            Channel::Email,
        );
        self.store
            .set_notification_status(
                record_id,
                NotificationStatus::Failed,
                Some(error.to_string()),
            )
            .await?;

        if error.is_transient() && !job.exhausted(attempts) {
            let next = Utc::now() + backoff_delay(attempts);
            warn!(
                job_id = %job.id,
                attempts,
                next_attempt_at = %next,
                %error,
                "Transient failure, scheduling retry"
            );
            self.store
                .release_job(&job.id, attempts, next, job_error)
                .await?;
            self.metrics.job_retried();
        } else {
            let reason = if error.is_transient() {
                "exhausted"
            } else {
                "permanent"
            };
            error!(
                job_id = %job.id,
                attempts,
                reason,
                %error,
                "Dead-lettering outbox job"
            );
            self.store.bury_job(&job.id, attempts, job_error).await?;
            self.metrics.job_dead(reason);
        }
        Ok(())
    }

    fn template_data(
        &self,
        record: &NotificationRecord,
        user: &crate::store::UserInfo,
    ) -> EmailTemplateData {
        EmailTemplateData {
            recipient_name: user.display_name.clone().unwrap_or_default(),
            title: record.title.clone(),
            body: record.body_preview.clone(),
            deep_link_url: format!("{}{}", self.config.app_base_url, record.deep_link),
            org_name: self.config.app_name.clone(),
        }
    }
}

enum Dispatched {
    Sent,
    Suppressed,
    AlreadyDone,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::{outbox_job_id, JobStatus, DEFAULT_MAX_ATTEMPTS};
    use crate::store::{MockDirectory, UserInfo, WriteBatch};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        // Errors to return before succeeding
        failures: Vec<NotificationError>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok() -> Self {
            Self {
                failures: vec![],
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(failures: Vec<NotificationError>) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmailProvider for ScriptedProvider {
        async fn send(
            &self,
            _email: &EmailMessage,
        ) -> NotificationResult<crate::providers::SentEmail> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures.len() {
                return Err(match &self.failures[call] {
                    NotificationError::Provider(m) => NotificationError::Provider(m.clone()),
                    NotificationError::ProviderRejected(m) => {
                        NotificationError::ProviderRejected(m.clone())
                    }
                    other => NotificationError::Internal(other.to_string()),
                });
            }
            Ok(crate::providers::SentEmail {
                message_id: Some("msg_1".to_string()),
                accepted: true,
            })
        }

        fn name(&self) -> &'static str {
            "Scripted"
        }

        async fn health_check(&self) -> NotificationResult<bool> {
            Ok(true)
        }
    }

    fn directory_with_email() -> MockDirectory {
        let mut directory = MockDirectory::new();
        directory.expect_get_user().returning(|_| {
            Ok(Some(UserInfo {
                email: Some("User@Example.com".to_string()),
                display_name: Some("Alex".to_string()),
            }))
        });
        directory
    }

    fn test_config() -> OutboxConfig {
        OutboxConfig {
            poll_interval: Duration::from_millis(10),
            batch_size: 50,
            lock_timeout: Duration::from_secs(600),
            app_base_url: "https://app.example.com".to_string(),
            app_name: "Chambers".to_string(),
            instance_id: "outbox-test".to_string(),
        }
    }

    async fn seed(store: &InMemoryStore) -> String {
        let record = NotificationRecord {
            id: NotificationRecord::deterministic_id("o", "e", "u", Channel::Email),
            org_id: "o".into(),
            recipient_uid: "u".into(),
            event_id: "e".into(),
            channel: Channel::Email,
            status: NotificationStatus::Pending,
            category: crate::events::Category::Task,
            title: "Task assigned to you".into(),
            body_preview: "A task was assigned to you".into(),
            deep_link: "/tasks/t1".into(),
            template_id: Some("notification".into()),
            template_version: Some(1),
            read_at: None,
            sent_at: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let job = OutboxJob::new("o", "e", "u");
        let id = job.id.clone();
        store
            .write_batch(WriteBatch {
                notifications: vec![record],
                jobs: vec![job],
            })
            .await
            .unwrap();
        id
    }

    fn processor(
        store: Arc<InMemoryStore>,
        directory: MockDirectory,
        provider: Arc<ScriptedProvider>,
    ) -> OutboxProcessor<InMemoryStore> {
        OutboxProcessor::new(
            store,
            Arc::new(directory),
            provider,
            Arc::new(TemplateRenderer::new().unwrap()),
            test_config(),
        )
    }

    #[tokio::test]
    async fn test_successful_dispatch_settles_job_and_record() {
        let store = Arc::new(InMemoryStore::new());
        let job_id = seed(&store).await;
        let provider = Arc::new(ScriptedProvider::ok());
        let processor = processor(Arc::clone(&store), directory_with_email(), Arc::clone(&provider));

        processor.tick().await;

        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Sent);
        let record = store
            .get_notification("o", "e", "u", Channel::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, NotificationStatus::Sent);
        assert!(record.sent_at.is_some());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_backs_off_then_succeeds() {
        let store = Arc::new(InMemoryStore::new());
        let job_id = seed(&store).await;
        let provider = Arc::new(ScriptedProvider::failing(vec![NotificationError::Provider(
            "timeout".into(),
        )]));
        let processor = processor(Arc::clone(&store), directory_with_email(), Arc::clone(&provider));

        processor.tick().await;
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.next_attempt_at > Utc::now());
        assert!(job.last_error.is_some());

        // Not due yet, so a tick in between must not touch it
        processor.tick().await;
        assert_eq!(provider.call_count(), 1);

        store.make_jobs_due().await;
        processor.tick().await;
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Sent);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_dead_letters_immediately() {
        let store = Arc::new(InMemoryStore::new());
        let job_id = seed(&store).await;
        let provider = Arc::new(ScriptedProvider::failing(vec![
            NotificationError::ProviderRejected("invalid recipient".into()),
        ]));
        let processor = processor(Arc::clone(&store), directory_with_email(), Arc::clone(&provider));

        processor.tick().await;

        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.attempts, 1);
        let record = store
            .get_notification("o", "e", "u", Channel::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, NotificationStatus::Failed);
        assert!(record.error_message.is_some());
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let store = Arc::new(InMemoryStore::new());
        let job_id = seed(&store).await;
        let failures = (0..DEFAULT_MAX_ATTEMPTS)
            .map(|_| NotificationError::Provider("timeout".into()))
            .collect();
        let provider = Arc::new(ScriptedProvider::failing(failures));
        let processor = processor(Arc::clone(&store), directory_with_email(), Arc::clone(&provider));

        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            store.make_jobs_due().await;
            processor.tick().await;
        }

        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(job.last_error.is_some());

        // Dead jobs stay dead
        store.make_jobs_due().await;
        processor.tick().await;
        assert_eq!(provider.call_count(), DEFAULT_MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_suppressed_recipient_never_reaches_provider() {
        let store = Arc::new(InMemoryStore::new());
        let job_id = seed(&store).await;
        store.add_suppression("o", "user@example.com").await;
        let provider = Arc::new(ScriptedProvider::ok());
        let processor = processor(Arc::clone(&store), directory_with_email(), Arc::clone(&provider));

        processor.tick().await;

        assert_eq!(provider.call_count(), 0);
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Sent);
        let record = store
            .get_notification("o", "e", "u", Channel::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, NotificationStatus::Suppressed);
    }

    #[tokio::test]
    async fn test_missing_email_is_permanent() {
        let store = Arc::new(InMemoryStore::new());
        let job_id = seed(&store).await;
        let mut directory = MockDirectory::new();
        directory
            .expect_get_user()
            .returning(|_| Ok(Some(UserInfo::default())));
        let provider = Arc::new(ScriptedProvider::ok());
        let processor = processor(Arc::clone(&store), directory, Arc::clone(&provider));

        processor.tick().await;

        assert_eq!(provider.call_count(), 0);
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dead);
    }

    #[tokio::test]
    async fn test_settled_record_completes_without_resend() {
        let store = Arc::new(InMemoryStore::new());
        let job_id = seed(&store).await;
        let record_id = NotificationRecord::deterministic_id("o", "e", "u", Channel::Email);
        store
            .set_notification_status(record_id, NotificationStatus::Sent, None)
            .await
            .unwrap();
        let provider = Arc::new(ScriptedProvider::ok());
        let processor = processor(Arc::clone(&store), directory_with_email(), Arc::clone(&provider));

        processor.tick().await;

        assert_eq!(provider.call_count(), 0);
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Sent);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let store = Arc::new(InMemoryStore::new());
        let job_id = seed(&store).await;

        let now = Utc::now();
        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            let job_id = job_id.clone();
            handles.push(tokio::spawn(async move {
                store.claim_job(&job_id, &format!("w{i}"), now).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_job_id_matches_idempotency_key_shape() {
        assert_eq!(outbox_job_id("o", "e", "u"), "notif_email:o:e:u");
    }
}
