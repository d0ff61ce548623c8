//! Event listener: entry point of the notification pipeline.
//!
//! Runs the stages in order for each appended domain event:
//! route check, recipient resolution, access filtering, preference
//! gating and the atomic batch write.
//!
//! ```text
//! event appended
//!   └─> is_routed? ──no──> drop
//!         │yes
//!   resolve candidates ─> access filter ─> build content ─> write batch
//! ```

use crate::access::AccessFilter;
use crate::content::{build_content, deep_link, EventContext};
use crate::error::NotificationResult;
use crate::events::{is_routed, DomainEvent};
use crate::recipients::RecipientResolver;
use crate::store::{Directory, EntityAccess, MatterDirectory, NotificationStore, WriteBatch};
use crate::writer::NotificationWriter;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Something that reacts to appended domain events.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn on_appended(&self, event: &DomainEvent) -> NotificationResult<()>;
}

/// The notification pipeline's event subscriber.
pub struct EventListener<S: NotificationStore> {
    directory: Arc<dyn Directory>,
    matters: Arc<dyn MatterDirectory>,
    recipients: RecipientResolver,
    access: AccessFilter,
    writer: NotificationWriter<S>,
}

impl<S: NotificationStore> EventListener<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn Directory>,
        matters: Arc<dyn MatterDirectory>,
        entity_access: Arc<dyn EntityAccess>,
    ) -> Self {
        Self {
            recipients: RecipientResolver::new(Arc::clone(&directory), Arc::clone(&matters)),
            access: AccessFilter::new(entity_access),
            writer: NotificationWriter::new(store),
            directory,
            matters,
        }
    }

    /// Run the full pipeline for one event, returning what was written.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, event_type = %event.event_type, org_id = %event.org_id))]
    pub async fn handle(&self, event: &DomainEvent) -> NotificationResult<WriteBatch> {
        if !is_routed(&event.event_type) {
            debug!("Event type not routed, ignoring");
            return Ok(WriteBatch::default());
        }

        let candidates = self.recipients.resolve(event).await?;
        if candidates.is_empty() {
            debug!("No candidates for event");
            return Ok(WriteBatch::default());
        }

        let recipients = self.access.filter(event, candidates).await?;
        if recipients.is_empty() {
            debug!("All candidates filtered by access checks");
            return Ok(WriteBatch::default());
        }

        let context = EventContext::gather(event, &self.directory, &self.matters).await;
        let content = build_content(event, &context);
        let link = deep_link(event);

        self.writer.write(event, &recipients, &content, &link).await
    }
}

#[async_trait]
impl<S: NotificationStore> EventSubscriber for EventListener<S> {
    async fn on_appended(&self, event: &DomainEvent) -> NotificationResult<()> {
        self.handle(event).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Actor;
    use crate::memory::InMemoryStore;
    use crate::store::{AccessDecision, MatterInfo, MockDirectory, MockEntityAccess, MockMatterDirectory, UserInfo};
    use chrono::Utc;
    use serde_json::json;

    fn event(event_type: &str) -> DomainEvent {
        DomainEvent {
            event_id: "evt_1".into(),
            org_id: "org_1".into(),
            event_type: event_type.into(),
            entity_type: "task".into(),
            entity_id: "t_1".into(),
            matter_id: Some("m_1".into()),
            actor: Actor {
                actor_type: "user".into(),
                actor_id: "u_actor".into(),
            },
            timestamp: Utc::now(),
            payload: json!({ "assigneeId": "u_1", "title": "File motion" }),
        }
    }

    fn listener(
        store: Arc<InMemoryStore>,
        allowed: &'static [&'static str],
    ) -> EventListener<InMemoryStore> {
        let mut directory = MockDirectory::new();
        directory.expect_org_admins().returning(|_| Ok(vec![]));
        directory.expect_get_user().returning(|_| {
            Ok(Some(UserInfo {
                email: Some("a@example.com".into()),
                display_name: Some("Dana".into()),
            }))
        });
        let mut matters = MockMatterDirectory::new();
        matters.expect_get_matter().returning(|_, _| {
            Ok(Some(MatterInfo {
                created_by: "u_creator".into(),
                participants: vec!["u_1".into()],
                title: Some("Smith v. Jones".into()),
                client_name: Some("Smith".into()),
            }))
        });
        let mut access = MockEntityAccess::new();
        access.expect_can_access().returning(move |_, _, uid| {
            if allowed.contains(&uid) {
                Ok(AccessDecision::allow())
            } else {
                Ok(AccessDecision::deny("no access"))
            }
        });

        EventListener::new(store, Arc::new(directory), Arc::new(matters), Arc::new(access))
    }

    #[tokio::test]
    async fn test_unrouted_event_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let listener = listener(Arc::clone(&store), &["u_1", "u_creator"]);

        let batch = listener.handle(&event("audit.log_rotated")).await.unwrap();
        assert!(batch.is_empty());
        assert!(store.all_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_full_pipeline_writes_for_allowed_recipients() {
        let store = Arc::new(InMemoryStore::new());
        let listener = listener(Arc::clone(&store), &["u_1", "u_creator"]);

        let batch = listener.handle(&event("task.assigned")).await.unwrap();

        // Two recipients, two channels each
        assert_eq!(batch.notifications.len(), 4);
        assert_eq!(batch.jobs.len(), 2);
        let titles: Vec<&str> = batch.notifications.iter().map(|n| n.title.as_str()).collect();
        assert!(titles.iter().all(|t| *t == "Task assigned to you"));
    }

    #[tokio::test]
    async fn test_access_filter_blocks_outsiders() {
        let store = Arc::new(InMemoryStore::new());
        // Only the assignee can see the matter
        let listener = listener(Arc::clone(&store), &["u_1"]);

        let batch = listener.handle(&event("task.assigned")).await.unwrap();

        let recipients: std::collections::BTreeSet<&str> = batch
            .notifications
            .iter()
            .map(|n| n.recipient_uid.as_str())
            .collect();
        assert_eq!(recipients, ["u_1"].into_iter().collect());
    }

    #[tokio::test]
    async fn test_everyone_filtered_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let listener = listener(Arc::clone(&store), &[]);

        let batch = listener.handle(&event("task.assigned")).await.unwrap();
        assert!(batch.is_empty());
        assert!(store.all_jobs().await.is_empty());
    }
}
