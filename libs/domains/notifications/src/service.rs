//! Recipient-facing notification API.
//!
//! Every operation is scoped to the calling user; a caller can only
//! read and mutate their own notifications and preferences.

use crate::error::{NotificationError, NotificationResult};
use crate::events::Category;
use crate::models::{NotificationPreference, NotificationRecord};
use crate::preferences::PreferenceResolver;
use crate::store::{NotificationFilter, NotificationStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Partial preference update; `None` leaves a channel unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferenceUpdate {
    pub in_app: Option<bool>,
    pub email: Option<bool>,
}

pub struct NotificationService<S: NotificationStore> {
    store: Arc<S>,
    preferences: PreferenceResolver<S>,
}

impl<S: NotificationStore> NotificationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        let preferences = PreferenceResolver::new(Arc::clone(&store));
        Self { store, preferences }
    }

    /// List the caller's notifications, newest first.
    #[instrument(skip(self, filter))]
    pub async fn list_notifications(
        &self,
        org_id: &str,
        uid: &str,
        filter: NotificationFilter,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        self.store.list_notifications(org_id, uid, filter).await
    }

    /// Mark one of the caller's notifications read.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, org_id: &str, uid: &str, id: Uuid) -> NotificationResult<()> {
        let updated = self.store.mark_read(org_id, uid, id).await?;
        if !updated {
            return Err(NotificationError::NotFound(format!(
                "notification {id} not found for user"
            )));
        }
        Ok(())
    }

    /// Mark all of the caller's unread in-app notifications read.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, org_id: &str, uid: &str) -> NotificationResult<u64> {
        let updated = self.store.mark_all_read(org_id, uid).await?;
        info!(updated, "Marked all notifications read");
        Ok(updated)
    }

    /// The caller's unread in-app count (badge counter).
    #[instrument(skip(self))]
    pub async fn unread_count(&self, org_id: &str, uid: &str) -> NotificationResult<u64> {
        self.store.unread_count(org_id, uid).await
    }

    /// Effective per-category preferences, defaults merged in.
    #[instrument(skip(self))]
    pub async fn get_preferences(
        &self,
        org_id: &str,
        uid: &str,
    ) -> NotificationResult<Vec<NotificationPreference>> {
        self.preferences.effective_preferences(org_id, uid).await
    }

    /// Apply a partial update to one category's preference.
    #[instrument(skip(self, update))]
    pub async fn update_preference(
        &self,
        org_id: &str,
        uid: &str,
        category: Category,
        update: PreferenceUpdate,
    ) -> NotificationResult<NotificationPreference> {
        let current = self
            .store
            .get_preference(org_id, uid, category)
            .await?
            .unwrap_or(NotificationPreference {
                org_id: org_id.to_string(),
                uid: uid.to_string(),
                category,
                in_app: true,
                email: true,
                updated_at: Utc::now(),
            });

        let pref = NotificationPreference {
            in_app: update.in_app.unwrap_or(current.in_app),
            email: update.email.unwrap_or(current.email),
            updated_at: Utc::now(),
            ..current
        };

        self.store.upsert_preference(pref.clone()).await?;
        info!(%category, in_app = pref.in_app, email = pref.email, "Updated notification preference");
        Ok(pref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::{Channel, NotificationStatus, OutboxJob};
    use crate::store::WriteBatch;

    fn record(org: &str, event: &str, uid: &str, channel: Channel) -> NotificationRecord {
        let now = Utc::now();
        NotificationRecord {
            id: NotificationRecord::deterministic_id(org, event, uid, channel),
            org_id: org.to_string(),
            recipient_uid: uid.to_string(),
            event_id: event.to_string(),
            channel,
            status: NotificationStatus::Pending,
            category: Category::Task,
            title: "Task assigned".into(),
            body_preview: "preview".into(),
            deep_link: "/tasks/t1".into(),
            template_id: None,
            template_version: None,
            read_at: None,
            sent_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .write_batch(WriteBatch {
                notifications: vec![
                    record("o", "e1", "u", Channel::InApp),
                    record("o", "e2", "u", Channel::InApp),
                    record("o", "e1", "other", Channel::InApp),
                ],
                jobs: vec![OutboxJob::new("o", "e1", "u")],
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_caller() {
        let service = NotificationService::new(seeded_store().await);

        let mine = service
            .list_notifications("o", "u", NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|n| n.recipient_uid == "u"));
    }

    #[tokio::test]
    async fn test_mark_read_rejects_foreign_notification() {
        let service = NotificationService::new(seeded_store().await);
        let foreign_id = NotificationRecord::deterministic_id("o", "e1", "other", Channel::InApp);

        let result = service.mark_read("o", "u", foreign_id).await;
        assert!(matches!(result, Err(NotificationError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unread_count_and_mark_all_read() {
        let store = seeded_store().await;
        let service = NotificationService::new(Arc::clone(&store));

        assert_eq!(service.unread_count("o", "u").await.unwrap(), 2);
        assert_eq!(service.mark_all_read("o", "u").await.unwrap(), 2);
        assert_eq!(service.unread_count("o", "u").await.unwrap(), 0);
        // Other users untouched
        assert_eq!(service.unread_count("o", "other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partial_preference_update() {
        let service = NotificationService::new(Arc::new(InMemoryStore::new()));

        let pref = service
            .update_preference(
                "o",
                "u",
                Category::Invoice,
                PreferenceUpdate {
                    email: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(pref.in_app);
        assert!(!pref.email);

        // Second partial update keeps the earlier change
        let pref = service
            .update_preference(
                "o",
                "u",
                Category::Invoice,
                PreferenceUpdate {
                    in_app: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!pref.in_app);
        assert!(!pref.email);
    }

    #[tokio::test]
    async fn test_get_preferences_includes_defaults() {
        let service = NotificationService::new(Arc::new(InMemoryStore::new()));
        let prefs = service.get_preferences("o", "u").await.unwrap();
        assert_eq!(prefs.len(), Category::ALL.len());
        assert!(prefs.iter().all(|p| p.in_app && p.email));
    }
}
