//! Notifications Domain
//!
//! Event-driven notification pipeline for the practice-management
//! backend: in-app notifications plus a durable email outbox.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Domain Event   │  ← Appended by matters, tasks, documents, ...
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  EventListener  │  ← Route check, recipients, access, preferences
//! └────────┬────────┘
//!          │ one atomic batch
//! ┌────────▼────────┐
//! │NotificationStore│  ← Notification rows + outbox jobs
//! └────────┬────────┘
//!          │ polled
//! ┌────────▼────────┐
//! │ OutboxProcessor │  ← Claim, render, send, retry / dead-letter
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ Email Provider  │  ← Resend, or noop when unconfigured
//! └─────────────────┘
//! ```
//!
//! Every notification and job id is derived deterministically from
//! (org, event, recipient), so replaying an event or retrying a write
//! is always a no-op rather than a duplicate.

pub mod access;
pub mod content;
pub mod entity;
pub mod error;
pub mod events;
pub mod listener;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod outbox;
pub mod postgres;
pub mod preferences;
pub mod providers;
pub mod recipients;
pub mod service;
pub mod store;
pub mod templates;
pub mod writer;

// Re-export commonly used types
pub use error::{ErrorCategory, NotificationError, NotificationResult};
pub use events::{Category, DomainEvent};
pub use listener::{EventListener, EventSubscriber};
pub use memory::InMemoryStore;
pub use models::{
    Channel, JobStatus, NotificationPreference, NotificationRecord, NotificationStatus, OutboxJob,
};
pub use outbox::{OutboxConfig, OutboxProcessor};
pub use postgres::PgNotificationStore;
pub use providers::{EmailProvider, NoopProvider, ResendConfig, ResendProvider};
pub use service::NotificationService;
pub use store::NotificationStore;
pub use templates::TemplateRenderer;
