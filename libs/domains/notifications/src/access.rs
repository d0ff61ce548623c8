//! Access filtering: privacy boundary between candidates and recipients.
//!
//! Membership in the candidate set says nothing about authorization; a
//! candidate who cannot access the event's parent matter must not learn
//! the event exists. Fail closed: an errored check drops the candidate.

use crate::error::NotificationResult;
use crate::events::DomainEvent;
use crate::store::EntityAccess;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct AccessFilter {
    entity_access: Arc<dyn EntityAccess>,
}

impl AccessFilter {
    pub fn new(entity_access: Arc<dyn EntityAccess>) -> Self {
        Self { entity_access }
    }

    /// Keep only candidates allowed to see the event's parent matter.
    ///
    /// Events without a parent matter (client.created, invoice events not
    /// tied to a matter, user.joined) carry no access scope and pass
    /// through unchanged.
    #[instrument(skip(self, event, candidates), fields(event_id = %event.event_id))]
    pub async fn filter(
        &self,
        event: &DomainEvent,
        candidates: BTreeSet<String>,
    ) -> NotificationResult<BTreeSet<String>> {
        let Some(matter_id) = event.matter_id.as_deref() else {
            return Ok(candidates);
        };

        let checks = candidates.into_iter().map(|uid| {
            let entity_access = Arc::clone(&self.entity_access);
            let org_id = event.org_id.clone();
            let matter_id = matter_id.to_string();
            async move {
                match entity_access.can_access(&org_id, &matter_id, &uid).await {
                    Ok(decision) if decision.allowed => Some(uid),
                    Ok(decision) => {
                        debug!(%uid, reason = ?decision.reason, "candidate filtered by access check");
                        None
                    }
                    Err(error) => {
                        warn!(%uid, %error, "access check failed, dropping candidate");
                        None
                    }
                }
            }
        });

        Ok(join_all(checks).await.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::events::Actor;
    use crate::store::{AccessDecision, MockEntityAccess};
    use chrono::Utc;

    fn event(matter_id: Option<&str>) -> DomainEvent {
        DomainEvent {
            event_id: "evt_1".into(),
            org_id: "org_1".into(),
            event_type: "task.assigned".into(),
            entity_type: "task".into(),
            entity_id: "t_1".into(),
            matter_id: matter_id.map(Into::into),
            actor: Actor {
                actor_type: "user".into(),
                actor_id: "u_actor".into(),
            },
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    fn candidates(uids: &[&str]) -> BTreeSet<String> {
        uids.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_no_matter_passes_through() {
        let mut access = MockEntityAccess::new();
        access.expect_can_access().never();

        let filter = AccessFilter::new(Arc::new(access));
        let kept = filter
            .filter(&event(None), candidates(&["u_1", "u_2"]))
            .await
            .unwrap();

        assert_eq!(kept, candidates(&["u_1", "u_2"]));
    }

    #[tokio::test]
    async fn test_denied_candidates_are_dropped() {
        let mut access = MockEntityAccess::new();
        access.expect_can_access().returning(|_, _, uid| {
            if uid == "u_allowed" {
                Ok(AccessDecision::allow())
            } else {
                Ok(AccessDecision::deny("not on private matter"))
            }
        });

        let filter = AccessFilter::new(Arc::new(access));
        let kept = filter
            .filter(&event(Some("m_1")), candidates(&["u_allowed", "u_other"]))
            .await
            .unwrap();

        assert_eq!(kept, candidates(&["u_allowed"]));
    }

    #[tokio::test]
    async fn test_errored_check_fails_closed() {
        let mut access = MockEntityAccess::new();
        access.expect_can_access().returning(|_, _, uid| {
            if uid == "u_flaky" {
                Err(NotificationError::Internal("permission service down".into()))
            } else {
                Ok(AccessDecision::allow())
            }
        });

        let filter = AccessFilter::new(Arc::new(access));
        let kept = filter
            .filter(&event(Some("m_1")), candidates(&["u_flaky", "u_ok"]))
            .await
            .unwrap();

        assert_eq!(kept, candidates(&["u_ok"]));
    }
}
