//! Storage and collaborator seams for the notification pipeline.
//!
//! Everything external is behind a trait so components take explicitly
//! constructed handles (no global client singletons) and tests can
//! substitute the in-memory store or mocks.

use crate::error::NotificationResult;
use crate::events::Category;
use crate::models::{
    Channel, JobError, NotificationPreference, NotificationRecord, NotificationStatus, OutboxJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filter for listing a recipient's notifications.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub channel: Option<Channel>,
    pub category: Option<Category>,
    /// `Some(true)` = read only, `Some(false)` = unread only.
    pub read: Option<bool>,
    pub limit: u64,
}

/// All writes produced by one pipeline run for one event.
///
/// The store must apply the whole batch atomically so a crash mid-write
/// cannot leave a partial fan-out. Both notifications and jobs carry
/// deterministic ids; applying the batch twice must be a no-op.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub notifications: Vec<NotificationRecord>,
    pub jobs: Vec<OutboxJob>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.jobs.is_empty()
    }
}

/// Persistence for notification records, outbox jobs, preferences and
/// suppressions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Apply a batch atomically; idempotent for already-present ids.
    async fn write_batch(&self, batch: WriteBatch) -> NotificationResult<()>;

    /// Look up one notification by its (event, recipient, channel) tuple.
    async fn get_notification(
        &self,
        org_id: &str,
        event_id: &str,
        recipient_uid: &str,
        channel: Channel,
    ) -> NotificationResult<Option<NotificationRecord>>;

    /// Transition a notification's status. `Sent` stamps `sent_at`; `Read`
    /// stamps `read_at`; an error message is recorded verbatim.
    async fn set_notification_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> NotificationResult<()>;

    async fn list_notifications(
        &self,
        org_id: &str,
        recipient_uid: &str,
        filter: NotificationFilter,
    ) -> NotificationResult<Vec<NotificationRecord>>;

    /// Mark one in-app notification read; false if no such record belongs
    /// to the recipient.
    async fn mark_read(
        &self,
        org_id: &str,
        recipient_uid: &str,
        id: Uuid,
    ) -> NotificationResult<bool>;

    /// Mark all of the recipient's unread in-app notifications read;
    /// returns the number updated.
    async fn mark_all_read(&self, org_id: &str, recipient_uid: &str) -> NotificationResult<u64>;

    async fn unread_count(&self, org_id: &str, recipient_uid: &str) -> NotificationResult<u64>;

    /// Pending jobs due at or before `now`, oldest first, capped at `limit`.
    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> NotificationResult<Vec<OutboxJob>>;

    async fn get_job(&self, job_id: &str) -> NotificationResult<Option<OutboxJob>>;

    /// Atomically claim a job: transition `pending` → `processing` only if
    /// the job is still pending and due, stamping the lock fields. Returns
    /// the claimed job, or `None` if another processor won the race.
    ///
    /// This is the one place in the pipeline that requires true mutual
    /// exclusion; implementations must use a single atomic
    /// read-modify-write (conditional update), never a read followed by a
    /// separate write.
    async fn claim_job(
        &self,
        job_id: &str,
        owner: &str,
        now: DateTime<Utc>,
    ) -> NotificationResult<Option<OutboxJob>>;

    /// Terminal success: job → `sent`, lock cleared.
    async fn complete_job(&self, job_id: &str) -> NotificationResult<()>;

    /// Transient failure: job back to `pending` with the new attempt count,
    /// the next due time, the error recorded, and the lock cleared.
    async fn release_job(
        &self,
        job_id: &str,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: JobError,
    ) -> NotificationResult<()>;

    /// Exhausted or permanent failure: job → `dead` with the error
    /// preserved for manual triage.
    async fn bury_job(&self, job_id: &str, attempts: u32, error: JobError)
        -> NotificationResult<()>;

    /// Return `processing` jobs whose lock is older than `older_than` to
    /// `pending`; returns the number reclaimed.
    async fn reclaim_stale_jobs(&self, older_than: DateTime<Utc>) -> NotificationResult<u64>;

    async fn get_preference(
        &self,
        org_id: &str,
        uid: &str,
        category: Category,
    ) -> NotificationResult<Option<NotificationPreference>>;

    async fn list_preferences(
        &self,
        org_id: &str,
        uid: &str,
    ) -> NotificationResult<Vec<NotificationPreference>>;

    async fn upsert_preference(&self, pref: NotificationPreference) -> NotificationResult<()>;

    /// Pure existence check on (org, normalized address).
    async fn is_suppressed(&self, org_id: &str, normalized_email: &str)
        -> NotificationResult<bool>;
}

// ============================================================================
// External collaborators (business entities, identity, permissions)
// ============================================================================

/// Outcome of an entity-access check.
#[derive(Debug, Clone)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl AccessDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Entity-access predicate owned by the case/entity collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityAccess: Send + Sync {
    async fn can_access(
        &self,
        org_id: &str,
        entity_id: &str,
        uid: &str,
    ) -> NotificationResult<AccessDecision>;
}

/// Identity and membership lookups owned by the identity provider.
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_user(&self, uid: &str) -> NotificationResult<Option<UserInfo>>;

    /// Uids of the org's admin/owner members.
    async fn org_admins(&self, org_id: &str) -> NotificationResult<Vec<String>>;
}

/// Denormalized matter context consumed by recipient resolution and
/// title/body formatting.
#[derive(Debug, Clone, Default)]
pub struct MatterInfo {
    pub created_by: String,
    pub participants: Vec<String>,
    pub title: Option<String>,
    pub client_name: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatterDirectory: Send + Sync {
    async fn get_matter(
        &self,
        org_id: &str,
        matter_id: &str,
    ) -> NotificationResult<Option<MatterInfo>>;
}
