//! Preference resolution for fan-out.
//!
//! No stored row means system defaults (all channels on). A store error
//! also resolves to defaults: missing a notification is worse than
//! sending one the user asked to mute.

use crate::error::NotificationResult;
use crate::events::Category;
use crate::models::{ChannelPreferences, NotificationPreference};
use crate::store::NotificationStore;
use std::sync::Arc;
use tracing::warn;

pub struct PreferenceResolver<S: NotificationStore> {
    store: Arc<S>,
}

impl<S: NotificationStore> PreferenceResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Effective channel toggles for one recipient and category.
    pub async fn channels_for(
        &self,
        org_id: &str,
        uid: &str,
        category: Category,
    ) -> ChannelPreferences {
        match self.store.get_preference(org_id, uid, category).await {
            Ok(Some(pref)) => pref.channels(),
            Ok(None) => ChannelPreferences::default(),
            Err(error) => {
                warn!(%uid, %category, %error, "preference lookup failed, using defaults");
                ChannelPreferences::default()
            }
        }
    }

    /// Stored preference rows merged over defaults for every category, in
    /// [`Category::ALL`] order.
    pub async fn effective_preferences(
        &self,
        org_id: &str,
        uid: &str,
    ) -> NotificationResult<Vec<NotificationPreference>> {
        let stored = self.store.list_preferences(org_id, uid).await?;

        Ok(Category::ALL
            .into_iter()
            .map(|category| {
                stored
                    .iter()
                    .find(|p| p.category == category)
                    .cloned()
                    .unwrap_or_else(|| NotificationPreference {
                        org_id: org_id.to_string(),
                        uid: uid.to_string(),
                        category,
                        in_app: true,
                        email: true,
                        updated_at: chrono::Utc::now(),
                    })
            })
            .collect())
    }
}
