//! Title, body and deep-link construction for notifications.
//!
//! Content is derived once per event and shared by every recipient; it
//! must therefore never embed recipient-specific data.

use crate::events::DomainEvent;
use crate::store::{Directory, MatterDirectory};
use std::sync::Arc;
use tracing::warn;

/// Best-effort display context gathered from the collaborators.
///
/// Any lookup can fail or come back empty; content falls back to neutral
/// wording rather than blocking the pipeline.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub actor_name: Option<String>,
    pub matter_title: Option<String>,
    pub client_name: Option<String>,
}

impl EventContext {
    /// Gather actor and matter display data for an event.
    pub async fn gather(
        event: &DomainEvent,
        directory: &Arc<dyn Directory>,
        matters: &Arc<dyn MatterDirectory>,
    ) -> Self {
        let mut context = EventContext::default();

        match directory.get_user(&event.actor.actor_id).await {
            Ok(Some(user)) => context.actor_name = user.display_name,
            Ok(None) => {}
            Err(error) => warn!(%error, "actor lookup failed, using neutral wording"),
        }

        if let Some(matter_id) = event.matter_id.as_deref() {
            match matters.get_matter(&event.org_id, matter_id).await {
                Ok(Some(matter)) => {
                    context.matter_title = matter.title;
                    context.client_name = matter.client_name;
                }
                Ok(None) => {}
                Err(error) => warn!(%error, "matter lookup failed, using neutral wording"),
            }
        }

        context
    }
}

/// Rendered notification copy, shared across recipients and channels.
#[derive(Debug, Clone)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

/// Build title and body for an event.
pub fn build_content(event: &DomainEvent, context: &EventContext) -> NotificationContent {
    let actor = context.actor_name.as_deref().unwrap_or("Someone");
    let matter = context.matter_title.as_deref();
    let subject = event
        .payload_str("title")
        .or(matter)
        .unwrap_or("an item you follow");

    let (title, body) = match event.event_type.as_str() {
        "matter.created" => (
            "New matter opened".to_string(),
            format!("{actor} opened the matter \"{subject}\""),
        ),
        "matter.updated" => (
            "Matter updated".to_string(),
            format!("{actor} updated the matter \"{subject}\""),
        ),
        "matter.closed" => (
            "Matter closed".to_string(),
            format!("{actor} closed the matter \"{subject}\""),
        ),
        "task.created" => (
            "New task".to_string(),
            format!("{actor} created the task \"{subject}\""),
        ),
        "task.assigned" => (
            "Task assigned to you".to_string(),
            format!("{actor} assigned you the task \"{subject}\""),
        ),
        "task.completed" => (
            "Task completed".to_string(),
            format!("{actor} completed the task \"{subject}\""),
        ),
        "document.uploaded" => (
            "Document uploaded".to_string(),
            format!("{actor} uploaded a document to \"{subject}\""),
        ),
        "invoice.created" => (
            "Invoice created".to_string(),
            format!("{actor} created an invoice for \"{subject}\""),
        ),
        "invoice.paid" => (
            "Invoice paid".to_string(),
            format!("An invoice for \"{subject}\" was paid"),
        ),
        "payment.received" => (
            "Payment received".to_string(),
            format!("A payment was received for \"{subject}\""),
        ),
        "client.created" => {
            let client = context
                .client_name
                .as_deref()
                .or_else(|| event.payload_str("name"))
                .unwrap_or("a new client");
            (
                "New client".to_string(),
                format!("{actor} added {client}"),
            )
        }
        "comment.added" => (
            "New comment".to_string(),
            format!("{actor} commented on \"{subject}\""),
        ),
        "user.joined" => (
            "New team member".to_string(),
            format!("{actor} joined your organization"),
        ),
        _ => (
            "Update".to_string(),
            format!("{actor} made a change to \"{subject}\""),
        ),
    };

    NotificationContent { title, body }
}

/// In-app route for an event's subject entity.
///
/// Unknown entity types land on the home screen rather than a broken
/// route.
pub fn deep_link(event: &DomainEvent) -> String {
    let id = &event.entity_id;
    match event.entity_type.as_str() {
        "matter" => format!("/matters/{id}"),
        "task" => match event.matter_id.as_deref() {
            Some(m) => format!("/tasks/{id}?matter={m}"),
            None => format!("/tasks/{id}"),
        },
        "document" => match event.matter_id.as_deref() {
            Some(m) => format!("/documents/{id}?matter={m}"),
            None => format!("/documents/{id}"),
        },
        "invoice" | "payment" => format!("/invoices/{id}"),
        "client" => format!("/clients/{id}"),
        "comment" => match event.matter_id.as_deref() {
            Some(m) => format!("/matters/{m}"),
            None => "/".to_string(),
        },
        _ => "/".to_string(),
    }
}
