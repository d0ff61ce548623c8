//! Sea-ORM entities backing the notifications domain.
//!
//! Enum-like fields (channel, statuses, category) are stored as short
//! strings; `parse` failures on read surface as store errors rather than
//! panics.

use crate::error::NotificationError;
use crate::events::Category;
use crate::models::{
    Channel, JobStatus, NotificationPreference, NotificationRecord, NotificationStatus, OutboxJob,
    SuppressionRecord,
};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

fn parse_column<T>(
    parsed: Option<T>,
    column: &str,
    raw: &str,
) -> Result<T, NotificationError> {
    parsed.ok_or_else(|| {
        NotificationError::Store(format!("invalid {column} value in row: {raw:?}"))
    })
}

// ============================================================================
// notifications
// ============================================================================

pub mod notifications {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "notifications")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub org_id: String,
        pub recipient_uid: String,
        pub event_id: String,
        pub channel: String,
        pub status: String,
        pub category: String,
        pub title: String,
        #[sea_orm(column_type = "Text")]
        pub body_preview: String,
        pub deep_link: String,
        pub template_id: Option<String>,
        pub template_version: Option<i32>,
        pub read_at: Option<DateTimeWithTimeZone>,
        pub sent_at: Option<DateTimeWithTimeZone>,
        pub error_message: Option<String>,
        pub created_at: DateTimeWithTimeZone,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TryFrom<Model> for NotificationRecord {
        type Error = NotificationError;

        fn try_from(model: Model) -> Result<Self, Self::Error> {
            Ok(Self {
                id: model.id,
                channel: parse_column(Channel::parse(&model.channel), "channel", &model.channel)?,
                status: parse_column(
                    NotificationStatus::parse(&model.status),
                    "status",
                    &model.status,
                )?,
                category: parse_column(
                    Category::parse(&model.category),
                    "category",
                    &model.category,
                )?,
                org_id: model.org_id,
                recipient_uid: model.recipient_uid,
                event_id: model.event_id,
                title: model.title,
                body_preview: model.body_preview,
                deep_link: model.deep_link,
                template_id: model.template_id,
                template_version: model.template_version,
                read_at: model.read_at.map(Into::into),
                sent_at: model.sent_at.map(Into::into),
                error_message: model.error_message,
                created_at: model.created_at.into(),
                updated_at: model.updated_at.into(),
            })
        }
    }

    impl From<NotificationRecord> for ActiveModel {
        fn from(record: NotificationRecord) -> Self {
            ActiveModel {
                id: Set(record.id),
                org_id: Set(record.org_id),
                recipient_uid: Set(record.recipient_uid),
                event_id: Set(record.event_id),
                channel: Set(record.channel.as_str().to_string()),
                status: Set(record.status.as_str().to_string()),
                category: Set(record.category.as_str().to_string()),
                title: Set(record.title),
                body_preview: Set(record.body_preview),
                deep_link: Set(record.deep_link),
                template_id: Set(record.template_id),
                template_version: Set(record.template_version),
                read_at: Set(record.read_at.map(Into::into)),
                sent_at: Set(record.sent_at.map(Into::into)),
                error_message: Set(record.error_message),
                created_at: Set(record.created_at.into()),
                updated_at: Set(record.updated_at.into()),
            }
        }
    }
}

// ============================================================================
// outbox_jobs
// ============================================================================

pub mod outbox_jobs {
    use super::*;
    use crate::models::JobError;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "outbox_jobs")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub org_id: String,
        pub event_id: String,
        pub recipient_uid: String,
        pub job_type: String,
        pub status: String,
        pub attempts: i32,
        pub max_attempts: i32,
        pub next_attempt_at: DateTimeWithTimeZone,
        pub locked_at: Option<DateTimeWithTimeZone>,
        pub lock_owner: Option<String>,
        pub last_error: Option<Json>,
        pub created_at: DateTimeWithTimeZone,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TryFrom<Model> for OutboxJob {
        type Error = NotificationError;

        fn try_from(model: Model) -> Result<Self, Self::Error> {
            let last_error = model
                .last_error
                .map(serde_json::from_value::<JobError>)
                .transpose()
                .map_err(|e| {
                    NotificationError::Store(format!("invalid last_error value in row: {e}"))
                })?;

            Ok(Self {
                status: parse_column(JobStatus::parse(&model.status), "status", &model.status)?,
                id: model.id,
                org_id: model.org_id,
                event_id: model.event_id,
                recipient_uid: model.recipient_uid,
                job_type: model.job_type,
                attempts: model.attempts as u32,
                max_attempts: model.max_attempts as u32,
                next_attempt_at: model.next_attempt_at.into(),
                locked_at: model.locked_at.map(Into::into),
                lock_owner: model.lock_owner,
                last_error,
                created_at: model.created_at.into(),
                updated_at: model.updated_at.into(),
            })
        }
    }

    impl From<OutboxJob> for ActiveModel {
        fn from(job: OutboxJob) -> Self {
            ActiveModel {
                id: Set(job.id),
                org_id: Set(job.org_id),
                event_id: Set(job.event_id),
                recipient_uid: Set(job.recipient_uid),
                job_type: Set(job.job_type),
                status: Set(job.status.as_str().to_string()),
                attempts: Set(job.attempts as i32),
                max_attempts: Set(job.max_attempts as i32),
                next_attempt_at: Set(job.next_attempt_at.into()),
                locked_at: Set(job.locked_at.map(Into::into)),
                lock_owner: Set(job.lock_owner),
                last_error: Set(job
                    .last_error
                    .as_ref()
                    .and_then(|e| serde_json::to_value(e).ok())),
                created_at: Set(job.created_at.into()),
                updated_at: Set(job.updated_at.into()),
            }
        }
    }
}

// ============================================================================
// notification_preferences
// ============================================================================

pub mod notification_preferences {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "notification_preferences")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub org_id: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub uid: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub category: String,
        pub in_app: bool,
        pub email: bool,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TryFrom<Model> for NotificationPreference {
        type Error = NotificationError;

        fn try_from(model: Model) -> Result<Self, Self::Error> {
            Ok(Self {
                category: parse_column(
                    Category::parse(&model.category),
                    "category",
                    &model.category,
                )?,
                org_id: model.org_id,
                uid: model.uid,
                in_app: model.in_app,
                email: model.email,
                updated_at: model.updated_at.into(),
            })
        }
    }

    impl From<NotificationPreference> for ActiveModel {
        fn from(pref: NotificationPreference) -> Self {
            ActiveModel {
                org_id: Set(pref.org_id),
                uid: Set(pref.uid),
                category: Set(pref.category.as_str().to_string()),
                in_app: Set(pref.in_app),
                email: Set(pref.email),
                updated_at: Set(pref.updated_at.into()),
            }
        }
    }
}

// ============================================================================
// email_suppressions
// ============================================================================

pub mod email_suppressions {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "email_suppressions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub org_id: String,
        /// Normalized (trimmed, lowercased) address.
        #[sea_orm(primary_key, auto_increment = false)]
        pub email: String,
        pub reason: Option<String>,
        pub created_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl From<Model> for SuppressionRecord {
        fn from(model: Model) -> Self {
            Self {
                org_id: model.org_id,
                email: model.email,
                reason: model.reason,
                created_at: model.created_at.into(),
            }
        }
    }

    impl From<SuppressionRecord> for ActiveModel {
        fn from(record: SuppressionRecord) -> Self {
            ActiveModel {
                org_id: Set(record.org_id),
                email: Set(record.email),
                reason: Set(record.reason),
                created_at: Set(record.created_at.into()),
            }
        }
    }
}
