//! Postgres-backed [`NotificationStore`] on Sea-ORM.
//!
//! The claim transition is a single conditional `UPDATE ... WHERE status =
//! 'pending' AND next_attempt_at <= now`; a zero row count means another
//! processor won the race. Batch writes run in one transaction with
//! `ON CONFLICT DO NOTHING`, which is what makes replayed fan-outs no-ops.

use crate::entity::{email_suppressions, notification_preferences, notifications, outbox_jobs};
use crate::error::NotificationResult;
use crate::events::Category;
use crate::models::{
    Channel, JobError, JobStatus, NotificationPreference, NotificationRecord, NotificationStatus,
    OutboxJob,
};
use crate::store::{NotificationFilter, NotificationStore, WriteBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

pub struct PgNotificationStore {
    db: DatabaseConnection,
}

impl PgNotificationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn write_batch(&self, batch: WriteBatch) -> NotificationResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;

        if !batch.notifications.is_empty() {
            notifications::Entity::insert_many(
                batch
                    .notifications
                    .into_iter()
                    .map(notifications::ActiveModel::from),
            )
            .on_conflict(
                OnConflict::column(notifications::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        }

        if !batch.jobs.is_empty() {
            outbox_jobs::Entity::insert_many(
                batch.jobs.into_iter().map(outbox_jobs::ActiveModel::from),
            )
            .on_conflict(
                OnConflict::column(outbox_jobs::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        }

        txn.commit().await?;
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
        let model = notifications::Entity::find_by_id(id).one(&self.db).await?;
        model.map(NotificationRecord::try_from).transpose()
    }

    async fn set_notification_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> NotificationResult<()> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        let mut update = notifications::Entity::update_many()
            .col_expr(
                notifications::Column::Status,
                Expr::value(status.as_str()),
            )
            .col_expr(
                notifications::Column::ErrorMessage,
                Expr::value(error_message),
            )
            .col_expr(notifications::Column::UpdatedAt, Expr::value(now));

        match status {
            NotificationStatus::Sent => {
                update = update.col_expr(notifications::Column::SentAt, Expr::value(Some(now)));
            }
            NotificationStatus::Read => {
                update = update.col_expr(notifications::Column::ReadAt, Expr::value(Some(now)));
            }
            _ => {}
        }

        update
            .filter(notifications::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        org_id: &str,
        recipient_uid: &str,
        filter: NotificationFilter,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        let mut query = notifications::Entity::find()
            .filter(notifications::Column::OrgId.eq(org_id))
            .filter(notifications::Column::RecipientUid.eq(recipient_uid));

        if let Some(channel) = filter.channel {
            query = query.filter(notifications::Column::Channel.eq(channel.as_str()));
        }
        if let Some(category) = filter.category {
            query = query.filter(notifications::Column::Category.eq(category.as_str()));
        }
        if let Some(read) = filter.read {
            query = if read {
                query.filter(notifications::Column::ReadAt.is_not_null())
            } else {
                query.filter(notifications::Column::ReadAt.is_null())
            };
        }

        query = query.order_by_desc(notifications::Column::CreatedAt);
        if filter.limit > 0 {
            query = query.limit(filter.limit);
        }

        let models = query.all(&self.db).await?;
        models
            .into_iter()
            .map(NotificationRecord::try_from)
            .collect()
    }

    async fn mark_read(
        &self,
        org_id: &str,
        recipient_uid: &str,
        id: Uuid,
    ) -> NotificationResult<bool> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        let result = notifications::Entity::update_many()
            .col_expr(
                notifications::Column::Status,
                Expr::value(NotificationStatus::Read.as_str()),
            )
            .col_expr(notifications::Column::ReadAt, Expr::value(Some(now)))
            .col_expr(notifications::Column::UpdatedAt, Expr::value(now))
            .filter(notifications::Column::Id.eq(id))
            .filter(notifications::Column::OrgId.eq(org_id))
            .filter(notifications::Column::RecipientUid.eq(recipient_uid))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn mark_all_read(&self, org_id: &str, recipient_uid: &str) -> NotificationResult<u64> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        let result = notifications::Entity::update_many()
            .col_expr(
                notifications::Column::Status,
                Expr::value(NotificationStatus::Read.as_str()),
            )
            .col_expr(notifications::Column::ReadAt, Expr::value(Some(now)))
            .col_expr(notifications::Column::UpdatedAt, Expr::value(now))
            .filter(notifications::Column::OrgId.eq(org_id))
            .filter(notifications::Column::RecipientUid.eq(recipient_uid))
            .filter(notifications::Column::Channel.eq(Channel::InApp.as_str()))
            .filter(notifications::Column::ReadAt.is_null())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn unread_count(&self, org_id: &str, recipient_uid: &str) -> NotificationResult<u64> {
        let count = notifications::Entity::find()
            .filter(notifications::Column::OrgId.eq(org_id))
            .filter(notifications::Column::RecipientUid.eq(recipient_uid))
            .filter(notifications::Column::Channel.eq(Channel::InApp.as_str()))
            .filter(notifications::Column::ReadAt.is_null())
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> NotificationResult<Vec<OutboxJob>> {
        let now_tz: sea_orm::prelude::DateTimeWithTimeZone = now.into();

        let models = outbox_jobs::Entity::find()
            .filter(outbox_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(outbox_jobs::Column::NextAttemptAt.lte(now_tz))
            .order_by_asc(outbox_jobs::Column::NextAttemptAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        models.into_iter().map(OutboxJob::try_from).collect()
    }

    async fn get_job(&self, job_id: &str) -> NotificationResult<Option<OutboxJob>> {
        let model = outbox_jobs::Entity::find_by_id(job_id.to_string())
            .one(&self.db)
            .await?;
        model.map(OutboxJob::try_from).transpose()
    }

    async fn claim_job(
        &self,
        job_id: &str,
        owner: &str,
        now: DateTime<Utc>,
    ) -> NotificationResult<Option<OutboxJob>> {
        let now_tz: sea_orm::prelude::DateTimeWithTimeZone = now.into();

        let result = outbox_jobs::Entity::update_many()
            .col_expr(
                outbox_jobs::Column::Status,
                Expr::value(JobStatus::Processing.as_str()),
            )
            .col_expr(outbox_jobs::Column::LockedAt, Expr::value(Some(now_tz)))
            .col_expr(
                outbox_jobs::Column::LockOwner,
                Expr::value(Some(owner.to_string())),
            )
            .col_expr(outbox_jobs::Column::UpdatedAt, Expr::value(now_tz))
            .filter(outbox_jobs::Column::Id.eq(job_id))
            .filter(outbox_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(outbox_jobs::Column::NextAttemptAt.lte(now_tz))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.get_job(job_id).await
    }

    async fn complete_job(&self, job_id: &str) -> NotificationResult<()> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        outbox_jobs::Entity::update_many()
            .col_expr(
                outbox_jobs::Column::Status,
                Expr::value(JobStatus::Sent.as_str()),
            )
            .col_expr(
                outbox_jobs::Column::LockedAt,
                Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
            )
            .col_expr(
                outbox_jobs::Column::LockOwner,
                Expr::value(Option::<String>::None),
            )
            .col_expr(outbox_jobs::Column::UpdatedAt, Expr::value(now))
            .filter(outbox_jobs::Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn release_job(
        &self,
        job_id: &str,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: JobError,
    ) -> NotificationResult<()> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let due: sea_orm::prelude::DateTimeWithTimeZone = next_attempt_at.into();
        let error_json = serde_json::to_value(&error)?;

        outbox_jobs::Entity::update_many()
            .col_expr(
                outbox_jobs::Column::Status,
                Expr::value(JobStatus::Pending.as_str()),
            )
            .col_expr(outbox_jobs::Column::Attempts, Expr::value(attempts as i32))
            .col_expr(outbox_jobs::Column::NextAttemptAt, Expr::value(due))
            .col_expr(outbox_jobs::Column::LastError, Expr::value(Some(error_json)))
            .col_expr(
                outbox_jobs::Column::LockedAt,
                Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
            )
            .col_expr(
                outbox_jobs::Column::LockOwner,
                Expr::value(Option::<String>::None),
            )
            .col_expr(outbox_jobs::Column::UpdatedAt, Expr::value(now))
            .filter(outbox_jobs::Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn bury_job(
        &self,
        job_id: &str,
        attempts: u32,
        error: JobError,
    ) -> NotificationResult<()> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let error_json = serde_json::to_value(&error)?;

        outbox_jobs::Entity::update_many()
            .col_expr(
                outbox_jobs::Column::Status,
                Expr::value(JobStatus::Dead.as_str()),
            )
            .col_expr(outbox_jobs::Column::Attempts, Expr::value(attempts as i32))
            .col_expr(outbox_jobs::Column::LastError, Expr::value(Some(error_json)))
            .col_expr(
                outbox_jobs::Column::LockedAt,
                Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
            )
            .col_expr(
                outbox_jobs::Column::LockOwner,
                Expr::value(Option::<String>::None),
            )
            .col_expr(outbox_jobs::Column::UpdatedAt, Expr::value(now))
            .filter(outbox_jobs::Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn reclaim_stale_jobs(&self, older_than: DateTime<Utc>) -> NotificationResult<u64> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let cutoff: sea_orm::prelude::DateTimeWithTimeZone = older_than.into();

        let result = outbox_jobs::Entity::update_many()
            .col_expr(
                outbox_jobs::Column::Status,
                Expr::value(JobStatus::Pending.as_str()),
            )
            .col_expr(
                outbox_jobs::Column::LockedAt,
                Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
            )
            .col_expr(
                outbox_jobs::Column::LockOwner,
                Expr::value(Option::<String>::None),
            )
            .col_expr(outbox_jobs::Column::UpdatedAt, Expr::value(now))
            .filter(outbox_jobs::Column::Status.eq(JobStatus::Processing.as_str()))
            .filter(outbox_jobs::Column::LockedAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn get_preference(
        &self,
        org_id: &str,
        uid: &str,
        category: Category,
    ) -> NotificationResult<Option<NotificationPreference>> {
        let model = notification_preferences::Entity::find_by_id((
            org_id.to_string(),
            uid.to_string(),
            category.as_str().to_string(),
        ))
        .one(&self.db)
        .await?;
        model.map(NotificationPreference::try_from).transpose()
    }

    async fn list_preferences(
        &self,
        org_id: &str,
        uid: &str,
    ) -> NotificationResult<Vec<NotificationPreference>> {
        let models = notification_preferences::Entity::find()
            .filter(notification_preferences::Column::OrgId.eq(org_id))
            .filter(notification_preferences::Column::Uid.eq(uid))
            .all(&self.db)
            .await?;
        models
            .into_iter()
            .map(NotificationPreference::try_from)
            .collect()
    }

    async fn upsert_preference(&self, pref: NotificationPreference) -> NotificationResult<()> {
        let active: notification_preferences::ActiveModel = pref.into();

        notification_preferences::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    notification_preferences::Column::OrgId,
                    notification_preferences::Column::Uid,
                    notification_preferences::Column::Category,
                ])
                .update_columns([
                    notification_preferences::Column::InApp,
                    notification_preferences::Column::Email,
                    notification_preferences::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn is_suppressed(
        &self,
        org_id: &str,
        normalized_email: &str,
    ) -> NotificationResult<bool> {
        let count = email_suppressions::Entity::find()
            .filter(email_suppressions::Column::OrgId.eq(org_id))
            .filter(email_suppressions::Column::Email.eq(normalized_email))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }
}

impl std::fmt::Debug for PgNotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgNotificationStore").finish_non_exhaustive()
    }
}
