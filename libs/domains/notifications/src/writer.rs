//! Notification writing: turn the final recipient set into durable rows.
//!
//! One atomic batch per event. In-app records are immediately visible;
//! email records get a companion outbox job with a deterministic id, so
//! the whole write can be replayed without duplicating anything.

use crate::content::NotificationContent;
use crate::error::NotificationResult;
use crate::events::{Category, DomainEvent};
use crate::models::{
    Channel, NotificationRecord, NotificationStatus, OutboxJob,
};
use crate::preferences::PreferenceResolver;
use crate::store::{NotificationStore, WriteBatch};
use crate::templates::DEFAULT_EMAIL_TEMPLATE;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Longest body preview stored on a record; full copy is rendered at
/// send time.
const BODY_PREVIEW_MAX: usize = 160;

pub struct NotificationWriter<S: NotificationStore> {
    store: Arc<S>,
    preferences: PreferenceResolver<S>,
}

impl<S: NotificationStore> NotificationWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        let preferences = PreferenceResolver::new(Arc::clone(&store));
        Self { store, preferences }
    }

    /// Write notifications and outbox jobs for the final recipient set.
    ///
    /// Recipients whose preferences disable both channels produce
    /// nothing; an event whose entire set opted out writes nothing at
    /// all.
    #[instrument(skip_all, fields(event_id = %event.event_id, recipients = recipients.len()))]
    pub async fn write(
        &self,
        event: &DomainEvent,
        recipients: &BTreeSet<String>,
        content: &NotificationContent,
        deep_link: &str,
    ) -> NotificationResult<WriteBatch> {
        let category = Category::from_event_type(&event.event_type);
        let now = Utc::now();
        let mut batch = WriteBatch::default();

        for uid in recipients {
            let channels = self
                .preferences
                .channels_for(&event.org_id, uid, category)
                .await;

            if channels.in_app {
                batch.notifications.push(self.record(
                    event, uid, Channel::InApp, category, content, deep_link, now,
                ));
            }
            if channels.email {
                batch.notifications.push(self.record(
                    event, uid, Channel::Email, category, content, deep_link, now,
                ));
                batch
                    .jobs
                    .push(OutboxJob::new(&event.org_id, &event.event_id, uid));
            }
            if !channels.in_app && !channels.email {
                debug!(%uid, %category, "recipient muted both channels");
            }
        }

        if batch.is_empty() {
            debug!("nothing to write for event");
            return Ok(batch);
        }

        self.store.write_batch(batch.clone()).await?;
        info!(
            notifications = batch.notifications.len(),
            jobs = batch.jobs.len(),
            "wrote notification batch"
        );
        Ok(batch)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        event: &DomainEvent,
        uid: &str,
        channel: Channel,
        category: Category,
        content: &NotificationContent,
        deep_link: &str,
        now: chrono::DateTime<Utc>,
    ) -> NotificationRecord {
        let (template_id, template_version) = match channel {
            Channel::Email => (
                Some(DEFAULT_EMAIL_TEMPLATE.id.to_string()),
                Some(DEFAULT_EMAIL_TEMPLATE.version),
            ),
            Channel::InApp => (None, None),
        };

        NotificationRecord {
            id: NotificationRecord::deterministic_id(&event.org_id, &event.event_id, uid, channel),
            org_id: event.org_id.clone(),
            recipient_uid: uid.to_string(),
            event_id: event.event_id.clone(),
            channel,
            status: NotificationStatus::Pending,
            category,
            title: content.title.clone(),
            body_preview: truncate_preview(&content.body),
            deep_link: deep_link.to_string(),
            template_id,
            template_version,
            read_at: None,
            sent_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn truncate_preview(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_MAX {
        return body.to_string();
    }
    let cut: String = body.chars().take(BODY_PREVIEW_MAX - 1).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Actor;
    use crate::memory::InMemoryStore;
    use crate::models::{outbox_job_id, JobStatus, NotificationPreference};
    use serde_json::json;

    fn event() -> DomainEvent {
        DomainEvent {
            event_id: "evt_1".into(),
            org_id: "org_1".into(),
            event_type: "task.assigned".into(),
            entity_type: "task".into(),
            entity_id: "t_1".into(),
            matter_id: Some("m_1".into()),
            actor: Actor {
                actor_type: "user".into(),
                actor_id: "u_actor".into(),
            },
            timestamp: Utc::now(),
            payload: json!({ "assigneeId": "u_1" }),
        }
    }

    fn content() -> NotificationContent {
        NotificationContent {
            title: "Task assigned to you".into(),
            body: "Dana assigned you the task \"File motion\"".into(),
        }
    }

    fn recipients(uids: &[&str]) -> BTreeSet<String> {
        uids.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_writes_both_channels_and_job_by_default() {
        let store = Arc::new(InMemoryStore::new());
        let writer = NotificationWriter::new(Arc::clone(&store));

        let batch = writer
            .write(&event(), &recipients(&["u_1"]), &content(), "/tasks/t_1")
            .await
            .unwrap();

        assert_eq!(batch.notifications.len(), 2);
        assert_eq!(batch.jobs.len(), 1);
        assert_eq!(batch.jobs[0].id, outbox_job_id("org_1", "evt_1", "u_1"));
        assert_eq!(batch.jobs[0].status, JobStatus::Pending);
        assert_eq!(store.all_notifications().await.len(), 2);
    }

    #[tokio::test]
    async fn test_email_opt_out_skips_job() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_preference(NotificationPreference {
                org_id: "org_1".into(),
                uid: "u_1".into(),
                category: Category::Task,
                in_app: true,
                email: false,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        let writer = NotificationWriter::new(Arc::clone(&store));

        let batch = writer
            .write(&event(), &recipients(&["u_1"]), &content(), "/tasks/t_1")
            .await
            .unwrap();

        assert_eq!(batch.notifications.len(), 1);
        assert_eq!(batch.notifications[0].channel, Channel::InApp);
        assert!(batch.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_fully_muted_set_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_preference(NotificationPreference {
                org_id: "org_1".into(),
                uid: "u_1".into(),
                category: Category::Task,
                in_app: false,
                email: false,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        let writer = NotificationWriter::new(Arc::clone(&store));

        let batch = writer
            .write(&event(), &recipients(&["u_1"]), &content(), "/tasks/t_1")
            .await
            .unwrap();

        assert!(batch.is_empty());
        assert!(store.all_notifications().await.is_empty());
        assert!(store.all_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let writer = NotificationWriter::new(Arc::clone(&store));

        writer
            .write(&event(), &recipients(&["u_1"]), &content(), "/tasks/t_1")
            .await
            .unwrap();
        writer
            .write(&event(), &recipients(&["u_1"]), &content(), "/tasks/t_1")
            .await
            .unwrap();

        assert_eq!(store.all_notifications().await.len(), 2);
        assert_eq!(store.all_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_email_record_carries_template() {
        let store = Arc::new(InMemoryStore::new());
        let writer = NotificationWriter::new(Arc::clone(&store));

        let batch = writer
            .write(&event(), &recipients(&["u_1"]), &content(), "/tasks/t_1")
            .await
            .unwrap();

        let email = batch
            .notifications
            .iter()
            .find(|n| n.channel == Channel::Email)
            .unwrap();
        assert!(email.template_id.is_some());
        let in_app = batch
            .notifications
            .iter()
            .find(|n| n.channel == Channel::InApp)
            .unwrap();
        assert!(in_app.template_id.is_none());
    }

    #[test]
    fn test_truncate_preview() {
        let long = "x".repeat(400);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), BODY_PREVIEW_MAX);
        assert!(preview.ends_with('…'));
        assert_eq!(truncate_preview("short"), "short");
    }
}
