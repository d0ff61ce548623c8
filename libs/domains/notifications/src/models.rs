//! Data models for the notifications domain.

use crate::events::Category;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Notification Records
// ============================================================================

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "in_app",
            Channel::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_app" => Some(Channel::InApp),
            "email" => Some(Channel::Email),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a notification record.
///
/// In-app records move pending→read via a user action; email records move
/// pending→sent/failed/suppressed via the outbox processor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Suppressed,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Suppressed => "suppressed",
            NotificationStatus::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NotificationStatus::Pending),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            "suppressed" => Some(NotificationStatus::Suppressed),
            "read" => Some(NotificationStatus::Read),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification per (event, recipient, channel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub org_id: String,
    pub recipient_uid: String,
    pub event_id: String,
    pub channel: Channel,
    pub status: NotificationStatus,
    pub category: Category,
    pub title: String,
    pub body_preview: String,
    pub deep_link: String,
    pub template_id: Option<String>,
    pub template_version: Option<i32>,
    pub read_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Deterministic record id over (org, event, recipient, channel).
    ///
    /// A replayed trigger re-derives the same id, so the writer's batch
    /// upsert cannot produce duplicate records.
    pub fn deterministic_id(
        org_id: &str,
        event_id: &str,
        recipient_uid: &str,
        channel: Channel,
    ) -> Uuid {
        let key = format!("notif:{org_id}:{event_id}:{recipient_uid}:{}", channel);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }
}

// ============================================================================
// Preferences
// ============================================================================

/// Per-channel toggles for one category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelPreferences {
    pub in_app: bool,
    pub email: bool,
}

/// System default: both channels on.
impl Default for ChannelPreferences {
    fn default() -> Self {
        Self {
            in_app: true,
            email: true,
        }
    }
}

/// Stored preference row, keyed by (org, uid, category).
///
/// Absence of a row means system defaults apply. Created/updated only by
/// explicit user action; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub org_id: String,
    pub uid: String,
    pub category: Category,
    pub in_app: bool,
    pub email: bool,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    pub fn channels(&self) -> ChannelPreferences {
        ChannelPreferences {
            in_app: self.in_app,
            email: self.email,
        }
    }
}

// ============================================================================
// Outbox Jobs
// ============================================================================

/// Status of an outbox job. `Sent` and `Dead` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Sent => "sent",
            JobStatus::Failed => "failed",
            JobStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "sent" => Some(JobStatus::Sent),
            "failed" => Some(JobStatus::Failed),
            "dead" => Some(JobStatus::Dead),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Sent | JobStatus::Dead)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last error recorded on a job, preserved for triage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub code: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl JobError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Default retry budget for dispatch jobs.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Derive the deterministic idempotency key for an email dispatch job.
///
/// Re-running the writer for the same event/recipient re-derives the same
/// id, so a repeat write is a no-op rather than a duplicate job.
pub fn outbox_job_id(org_id: &str, event_id: &str, recipient_uid: &str) -> String {
    format!("notif_email:{org_id}:{event_id}:{recipient_uid}")
}

/// A durable email dispatch job, drained by the outbox processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxJob {
    /// Deterministic idempotency key, see [`outbox_job_id`].
    pub id: String,
    pub org_id: String,
    pub event_id: String,
    pub recipient_uid: String,
    pub job_type: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_owner: Option<String>,
    pub last_error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The only job type currently dispatched through the outbox.
pub const JOB_TYPE_NOTIFICATION_DISPATCH: &str = "notification_dispatch";

impl OutboxJob {
    /// Create a pending job due immediately.
    pub fn new(org_id: &str, event_id: &str, recipient_uid: &str) -> Self {
        let now = Utc::now();
        Self {
            id: outbox_job_id(org_id, event_id, recipient_uid),
            org_id: org_id.to_string(),
            event_id: event_id.to_string(),
            recipient_uid: recipient_uid.to_string(),
            job_type: JOB_TYPE_NOTIFICATION_DISPATCH.to_string(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            next_attempt_at: now,
            locked_at: None,
            lock_owner: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the retry budget is exhausted.
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Retry backoff: 60s doubling per attempt, capped at one hour.
///
/// Monotonically non-decreasing in the attempt count; the exact constants
/// are an operational choice, not a contract.
pub fn backoff_delay(attempts: u32) -> Duration {
    const BASE_SECS: i64 = 60;
    const MAX_SECS: i64 = 3_600;

    let exp = attempts.saturating_sub(1).min(10);
    let secs = BASE_SECS.saturating_mul(1_i64 << exp).min(MAX_SECS);
    Duration::seconds(secs)
}

// ============================================================================
// Suppressions
// ============================================================================

/// A no-send entry; presence alone means "do not mail this address".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionRecord {
    pub org_id: String,
    /// Stored normalized, see [`normalize_email`].
    pub email: String,
    /// bounce / complaint / manual opt-out.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Normalize an address for suppression lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_job_id_format() {
        assert_eq!(
            outbox_job_id("org_1", "evt_9", "u_2"),
            "notif_email:org_1:evt_9:u_2"
        );
    }

    #[test]
    fn test_job_id_is_deterministic() {
        let a = OutboxJob::new("o", "e", "u");
        let b = OutboxJob::new("o", "e", "u");
        assert_eq!(a.id, b.id);
        assert_eq!(a.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(a.status, JobStatus::Pending);
    }

    #[test]
    fn test_notification_id_is_deterministic_per_channel() {
        let in_app = NotificationRecord::deterministic_id("o", "e", "u", Channel::InApp);
        let email = NotificationRecord::deterministic_id("o", "e", "u", Channel::Email);
        assert_ne!(in_app, email);
        assert_eq!(
            in_app,
            NotificationRecord::deterministic_id("o", "e", "u", Channel::InApp)
        );
    }

    #[test]
    fn test_backoff_is_non_decreasing_and_capped() {
        let mut previous = Duration::zero();
        for attempts in 1..=12 {
            let delay = backoff_delay(attempts);
            assert!(delay >= previous, "backoff decreased at attempt {attempts}");
            previous = delay;
        }
        assert_eq!(backoff_delay(1), Duration::seconds(60));
        assert_eq!(backoff_delay(2), Duration::seconds(120));
        assert_eq!(backoff_delay(12), Duration::seconds(3_600));
    }

    #[test]
    fn test_terminal_job_states() {
        assert!(JobStatus::Sent.is_terminal());
        assert!(JobStatus::Dead.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Sent,
            JobStatus::Failed,
            JobStatus::Dead,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
            NotificationStatus::Suppressed,
            NotificationStatus::Read,
        ] {
            assert_eq!(NotificationStatus::parse(status.as_str()), Some(status));
        }
    }
}
