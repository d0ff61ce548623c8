//! Outbox Worker Service - Entry Point
//!
//! Background worker that drains the notification outbox and sends
//! emails.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    chambers_outbox_worker::run().await
}
