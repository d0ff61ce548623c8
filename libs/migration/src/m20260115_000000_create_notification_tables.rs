use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create the notifications table
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(pk_uuid(Notifications::Id))
                    .col(
                        ColumnDef::new(Notifications::OrgId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::RecipientUid)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::EventId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::Channel)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Notifications::Category)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::Title)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(text(Notifications::BodyPreview))
                    .col(
                        ColumnDef::new(Notifications::DeepLink)
                            .string_len(512)
                            .not_null(),
                    )
                    .col(string_len_null(Notifications::TemplateId, 64))
                    .col(ColumnDef::new(Notifications::TemplateVersion).integer().null())
                    .col(timestamp_with_time_zone_null(Notifications::ReadAt))
                    .col(timestamp_with_time_zone_null(Notifications::SentAt))
                    .col(text_null(Notifications::ErrorMessage))
                    .col(
                        timestamp_with_time_zone(Notifications::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Notifications::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Create the outbox_jobs table
        manager
            .create_table(
                Table::create()
                    .table(OutboxJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboxJobs::Id)
                            .string_len(512)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OutboxJobs::OrgId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(OutboxJobs::EventId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::RecipientUid)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::JobType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(OutboxJobs::LockedAt))
                    .col(string_len_null(OutboxJobs::LockOwner, 128))
                    .col(ColumnDef::new(OutboxJobs::LastError).json_binary().null())
                    .col(
                        timestamp_with_time_zone(OutboxJobs::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(OutboxJobs::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Create the notification_preferences table
        manager
            .create_table(
                Table::create()
                    .table(NotificationPreferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotificationPreferences::OrgId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::Uid)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::Category)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::InApp)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::Email)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        timestamp_with_time_zone(NotificationPreferences::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(NotificationPreferences::OrgId)
                            .col(NotificationPreferences::Uid)
                            .col(NotificationPreferences::Category),
                    )
                    .to_owned(),
            )
            .await?;

        // Create the email_suppressions table
        manager
            .create_table(
                Table::create()
                    .table(EmailSuppressions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailSuppressions::OrgId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailSuppressions::Email)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(string_len_null(EmailSuppressions::Reason, 32))
                    .col(
                        timestamp_with_time_zone(EmailSuppressions::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(EmailSuppressions::OrgId)
                            .col(EmailSuppressions::Email),
                    )
                    .to_owned(),
            )
            .await?;

        // Create indexes
        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_recipient")
                    .table(Notifications::Table)
                    .col(Notifications::OrgId)
                    .col(Notifications::RecipientUid)
                    .col(Notifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_unread")
                    .table(Notifications::Table)
                    .col(Notifications::OrgId)
                    .col(Notifications::RecipientUid)
                    .col(Notifications::ReadAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_event")
                    .table(Notifications::Table)
                    .col(Notifications::EventId)
                    .to_owned(),
            )
            .await?;

        // The poller's hot path: pending jobs ordered by due time
        manager
            .create_index(
                Index::create()
                    .name("idx_outbox_jobs_due")
                    .table(OutboxJobs::Table)
                    .col(OutboxJobs::Status)
                    .col(OutboxJobs::NextAttemptAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_outbox_jobs_locked_at")
                    .table(OutboxJobs::Table)
                    .col(OutboxJobs::LockedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailSuppressions::Table).to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(NotificationPreferences::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(OutboxJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    OrgId,
    RecipientUid,
    EventId,
    Channel,
    Status,
    Category,
    Title,
    BodyPreview,
    DeepLink,
    TemplateId,
    TemplateVersion,
    ReadAt,
    SentAt,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OutboxJobs {
    Table,
    Id,
    OrgId,
    EventId,
    RecipientUid,
    JobType,
    Status,
    Attempts,
    MaxAttempts,
    NextAttemptAt,
    LockedAt,
    LockOwner,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum NotificationPreferences {
    Table,
    OrgId,
    Uid,
    Category,
    InApp,
    Email,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EmailSuppressions {
    Table,
    OrgId,
    Email,
    Reason,
    CreatedAt,
}
