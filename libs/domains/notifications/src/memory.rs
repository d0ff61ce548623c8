//! In-memory store implementation.
//!
//! Drop-in substitute for the Postgres store in tests and local tooling.
//! The claim transition runs under a single write lock, which gives the
//! same only-one-claimant-wins contract as the database's conditional
//! update.

use crate::error::NotificationResult;
use crate::events::Category;
use crate::models::{
    Channel, JobError, JobStatus, NotificationPreference, NotificationRecord, NotificationStatus,
    OutboxJob,
};
use crate::store::{NotificationFilter, NotificationStore, WriteBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    notifications: HashMap<Uuid, NotificationRecord>,
    jobs: HashMap<String, OutboxJob>,
    preferences: HashMap<(String, String, Category), NotificationPreference>,
    suppressions: HashSet<(String, String)>,
}

/// In-memory [`NotificationStore`].
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a suppression entry (tests and local tooling).
    pub async fn add_suppression(&self, org_id: &str, normalized_email: &str) {
        let mut inner = self.inner.write().await;
        inner
            .suppressions
            .insert((org_id.to_string(), normalized_email.to_string()));
    }

    /// Make every non-terminal job due now, collapsing backoff waits so
    /// tests can drive repeated attempts without sleeping.
    pub async fn make_jobs_due(&self) {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        for job in inner.jobs.values_mut() {
            if !job.status.is_terminal() {
                job.next_attempt_at = now;
            }
        }
    }

    /// Snapshot of all notification records (tests).
    pub async fn all_notifications(&self) -> Vec<NotificationRecord> {
        self.inner
            .read()
            .await
            .notifications
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of all outbox jobs (tests).
    pub async fn all_jobs(&self) -> Vec<OutboxJob> {
        self.inner.read().await.jobs.values().cloned().collect()
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn write_batch(&self, batch: WriteBatch) -> NotificationResult<()> {
        let mut inner = self.inner.write().await;
        for record in batch.notifications {
            inner.notifications.entry(record.id).or_insert(record);
        }
        for job in batch.jobs {
            inner.jobs.entry(job.id.clone()).or_insert(job);
        }
        Ok(())
    }

    async fn get_notification(
        &self,
        org_id: &str,
        event_id: &str,
        recipient_uid: &str,
        channel: Channel,
    ) -> NotificationResult<Option<NotificationRecord>> {
        let id = NotificationRecord::deterministic_id(org_id, event_id, recipient_uid, channel);
        Ok(self.inner.read().await.notifications.get(&id).cloned())
    }

    async fn set_notification_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> NotificationResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.notifications.get_mut(&id) {
            record.status = status;
            record.error_message = error_message;
            record.updated_at = now;
            match status {
                NotificationStatus::Sent => record.sent_at = Some(now),
                NotificationStatus::Read => record.read_at = Some(now),
                _ => {}
            }
        }
        Ok(())
    }

    async fn list_notifications(
        &self,
        org_id: &str,
        recipient_uid: &str,
        filter: NotificationFilter,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<NotificationRecord> = inner
            .notifications
            .values()
            .filter(|r| r.org_id == org_id && r.recipient_uid == recipient_uid)
            .filter(|r| filter.channel.is_none_or(|c| r.channel == c))
            .filter(|r| filter.category.is_none_or(|c| r.category == c))
            .filter(|r| filter.read.is_none_or(|read| r.read_at.is_some() == read))
            .cloned()
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            records.truncate(filter.limit as usize);
        }
        Ok(records)
    }

    async fn mark_read(
        &self,
        org_id: &str,
        recipient_uid: &str,
        id: Uuid,
    ) -> NotificationResult<bool> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        match inner.notifications.get_mut(&id) {
            Some(record) if record.org_id == org_id && record.recipient_uid == recipient_uid => {
                record.status = NotificationStatus::Read;
                record.read_at = Some(now);
                record.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, org_id: &str, recipient_uid: &str) -> NotificationResult<u64> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for record in inner.notifications.values_mut() {
            if record.org_id == org_id
                && record.recipient_uid == recipient_uid
                && record.channel == Channel::InApp
                && record.read_at.is_none()
            {
                record.status = NotificationStatus::Read;
                record.read_at = Some(now);
                record.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn unread_count(&self, org_id: &str, recipient_uid: &str) -> NotificationResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .notifications
            .values()
            .filter(|r| {
                r.org_id == org_id
                    && r.recipient_uid == recipient_uid
                    && r.channel == Channel::InApp
                    && r.read_at.is_none()
            })
            .count() as u64)
    }

    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> NotificationResult<Vec<OutboxJob>> {
        let inner = self.inner.read().await;
        let mut due: Vec<OutboxJob> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_attempt_at.cmp(&b.next_attempt_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn get_job(&self, job_id: &str) -> NotificationResult<Option<OutboxJob>> {
        Ok(self.inner.read().await.jobs.get(job_id).cloned())
    }

    async fn claim_job(
        &self,
        job_id: &str,
        owner: &str,
        now: DateTime<Utc>,
    ) -> NotificationResult<Option<OutboxJob>> {
        let mut inner = self.inner.write().await;
        let Some(job) = inner.jobs.get_mut(job_id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Pending || job.next_attempt_at > now {
            return Ok(None);
        }
        job.status = JobStatus::Processing;
        job.locked_at = Some(now);
        job.lock_owner = Some(owner.to_string());
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete_job(&self, job_id: &str) -> NotificationResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.status = JobStatus::Sent;
            job.locked_at = None;
            job.lock_owner = None;
            job.updated_at = now;
        }
        Ok(())
    }

    async fn release_job(
        &self,
        job_id: &str,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: JobError,
    ) -> NotificationResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.status = JobStatus::Pending;
            job.attempts = attempts;
            job.next_attempt_at = next_attempt_at;
            job.last_error = Some(error);
            job.locked_at = None;
            job.lock_owner = None;
            job.updated_at = now;
        }
        Ok(())
    }

    async fn bury_job(
        &self,
        job_id: &str,
        attempts: u32,
        error: JobError,
    ) -> NotificationResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.status = JobStatus::Dead;
            job.attempts = attempts;
            job.last_error = Some(error);
            job.locked_at = None;
            job.lock_owner = None;
            job.updated_at = now;
        }
        Ok(())
    }

    async fn reclaim_stale_jobs(&self, older_than: DateTime<Utc>) -> NotificationResult<u64> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let mut reclaimed = 0;
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Processing
                && job.locked_at.is_some_and(|at| at < older_than)
            {
                job.status = JobStatus::Pending;
                job.locked_at = None;
                job.lock_owner = None;
                job.updated_at = now;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn get_preference(
        &self,
        org_id: &str,
        uid: &str,
        category: Category,
    ) -> NotificationResult<Option<NotificationPreference>> {
        let key = (org_id.to_string(), uid.to_string(), category);
        Ok(self.inner.read().await.preferences.get(&key).cloned())
    }

    async fn list_preferences(
        &self,
        org_id: &str,
        uid: &str,
    ) -> NotificationResult<Vec<NotificationPreference>> {
        let inner = self.inner.read().await;
        Ok(inner
            .preferences
            .values()
            .filter(|p| p.org_id == org_id && p.uid == uid)
            .cloned()
            .collect())
    }

    async fn upsert_preference(&self, pref: NotificationPreference) -> NotificationResult<()> {
        let key = (pref.org_id.clone(), pref.uid.clone(), pref.category);
        self.inner.write().await.preferences.insert(key, pref);
        Ok(())
    }

    async fn is_suppressed(
        &self,
        org_id: &str,
        normalized_email: &str,
    ) -> NotificationResult<bool> {
        let key = (org_id.to_string(), normalized_email.to_string());
        Ok(self.inner.read().await.suppressions.contains(&key))
    }
}
