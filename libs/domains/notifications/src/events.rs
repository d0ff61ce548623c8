//! Domain events consumed by the notification pipeline.
//!
//! Events are appended by the business-entity collaborators (matters, tasks,
//! documents, invoices, clients) and are immutable; this pipeline only reads
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who performed the mutation that produced an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// "user" or "system".
    pub actor_type: String,
    pub actor_id: String,
}

/// An immutable record describing a single business-state change.
///
/// Field names follow the emitters' wire format (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub event_id: String,
    pub org_id: String,
    /// Dotted verb, e.g. `task.assigned`.
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    /// Link to a parent matter used for access scoping.
    #[serde(default)]
    pub matter_id: Option<String>,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    /// Event-specific fields such as `assigneeId`, `title`, `changes`.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DomainEvent {
    /// Read a string field out of the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Notification category, derived from the event type prefix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Matter,
    Task,
    Document,
    Invoice,
    Client,
    Comment,
    Team,
    General,
}

impl Category {
    /// Derive the category from a dotted event type.
    ///
    /// `invoice.*` and `payment.*` share the invoice category; membership
    /// events (`user.*`) map to team.
    pub fn from_event_type(event_type: &str) -> Self {
        let prefix = event_type.split('.').next().unwrap_or("");
        match prefix {
            "matter" => Category::Matter,
            "task" => Category::Task,
            "document" => Category::Document,
            "invoice" | "payment" => Category::Invoice,
            "client" => Category::Client,
            "comment" => Category::Comment,
            "user" => Category::Team,
            _ => Category::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Matter => "matter",
            Category::Task => "task",
            Category::Document => "document",
            Category::Invoice => "invoice",
            Category::Client => "client",
            Category::Comment => "comment",
            Category::Team => "team",
            Category::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matter" => Some(Category::Matter),
            "task" => Some(Category::Task),
            "document" => Some(Category::Document),
            "invoice" => Some(Category::Invoice),
            "client" => Some(Category::Client),
            "comment" => Some(Category::Comment),
            "team" => Some(Category::Team),
            "general" => Some(Category::General),
            _ => None,
        }
    }

    /// All categories a user can hold preferences for.
    pub const ALL: [Category; 8] = [
        Category::Matter,
        Category::Task,
        Category::Document,
        Category::Invoice,
        Category::Client,
        Category::Comment,
        Category::Team,
        Category::General,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Org-activity event types that additionally fan out to org admins/owners.
pub const ORG_ACTIVITY_EVENT_TYPES: &[&str] = &[
    "matter.created",
    "matter.updated",
    "matter.closed",
    "task.created",
    "task.assigned",
    "task.completed",
    "document.uploaded",
    "invoice.created",
    "invoice.paid",
    "payment.received",
    "client.created",
    "comment.added",
];

/// Event type for a user joining the org; also fans out to admins/owners.
pub const USER_JOINED_EVENT_TYPE: &str = "user.joined";

/// Check whether an event type is routed through the pipeline at all.
///
/// Events outside this list (internal bookkeeping, audit noise) are ignored
/// deliberately.
pub fn is_routed(event_type: &str) -> bool {
    event_type == USER_JOINED_EVENT_TYPE || is_org_activity(event_type)
}

/// Check whether an event type qualifies for the admin/owner fan-out rule.
pub fn is_org_activity(event_type: &str) -> bool {
    ORG_ACTIVITY_EVENT_TYPES.contains(&event_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_from_event_type() {
        assert_eq!(Category::from_event_type("task.assigned"), Category::Task);
        assert_eq!(
            Category::from_event_type("invoice.created"),
            Category::Invoice
        );
        assert_eq!(
            Category::from_event_type("payment.received"),
            Category::Invoice
        );
        assert_eq!(Category::from_event_type("user.joined"), Category::Team);
        assert_eq!(
            Category::from_event_type("something.else"),
            Category::General
        );
    }

    #[test]
    fn test_category_roundtrip() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
        assert_eq!(Category::parse("nope"), None);
    }

    #[test]
    fn test_routed_allow_list() {
        assert!(is_routed("task.assigned"));
        assert!(is_routed("user.joined"));
        assert!(!is_routed("audit.log_rotated"));
        assert!(!is_org_activity("user.joined"));
    }

    #[test]
    fn test_event_wire_format_is_camel_case() {
        let event: DomainEvent = serde_json::from_value(json!({
            "eventId": "evt_1",
            "orgId": "org_1",
            "eventType": "task.assigned",
            "entityType": "task",
            "entityId": "t_1",
            "matterId": "m_1",
            "actor": { "actorType": "user", "actorId": "u_1" },
            "timestamp": "2026-08-29T10:00:00Z",
            "payload": { "assigneeId": "u_2" }
        }))
        .unwrap();

        assert_eq!(event.org_id, "org_1");
        assert_eq!(event.matter_id.as_deref(), Some("m_1"));
        assert_eq!(event.payload_str("assigneeId"), Some("u_2"));
        assert_eq!(event.payload_str("missing"), None);
    }
}
