//! Recipient resolution: who should hear about an event.
//!
//! Candidates come from three sources, merged into one de-duplicated set:
//! direct payload references (assignee, creator), the parent matter's
//! team (creator + participants), and org admins/owners for org-activity
//! events. The actor is always removed; nobody is notified about their
//! own action.

use crate::error::NotificationResult;
use crate::events::{is_org_activity, DomainEvent, USER_JOINED_EVENT_TYPE};
use crate::store::{Directory, MatterDirectory, MatterInfo};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{instrument, warn};

pub struct RecipientResolver {
    directory: Arc<dyn Directory>,
    matters: Arc<dyn MatterDirectory>,
}

impl RecipientResolver {
    pub fn new(directory: Arc<dyn Directory>, matters: Arc<dyn MatterDirectory>) -> Self {
        Self { directory, matters }
    }

    /// Resolve the candidate recipient set for an event.
    ///
    /// Collaborator lookups that fail are logged and skipped; a partial
    /// candidate set beats dropping the event on the floor.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, event_type = %event.event_type))]
    pub async fn resolve(&self, event: &DomainEvent) -> NotificationResult<BTreeSet<String>> {
        let mut candidates = BTreeSet::new();

        for key in ["assigneeId", "createdBy", "uploadedBy"] {
            if let Some(uid) = event.payload_str(key) {
                candidates.insert(uid.to_string());
            }
        }

        if let Some(matter_id) = event.matter_id.as_deref() {
            match self.matter_team(&event.org_id, matter_id).await {
                Ok(team) => candidates.extend(team),
                Err(error) => {
                    warn!(%matter_id, %error, "matter lookup failed, skipping matter team");
                }
            }
        }

        if is_org_activity(&event.event_type) || event.event_type == USER_JOINED_EVENT_TYPE {
            match self.directory.org_admins(&event.org_id).await {
                Ok(admins) => candidates.extend(admins),
                Err(error) => {
                    warn!(%error, "admin lookup failed, skipping admin fan-out");
                }
            }
        }

        candidates.remove(&event.actor.actor_id);
        Ok(candidates)
    }

    async fn matter_team(
        &self,
        org_id: &str,
        matter_id: &str,
    ) -> NotificationResult<BTreeSet<String>> {
        let Some(MatterInfo {
            created_by,
            participants,
            ..
        }) = self.matters.get_matter(org_id, matter_id).await?
        else {
            warn!(%matter_id, "event references unknown matter");
            return Ok(BTreeSet::new());
        };

        let mut team: BTreeSet<String> = participants.into_iter().collect();
        team.insert(created_by);
        Ok(team)
    }
}
