//! Metrics for the outbox processor.
//!
//! Counter and histogram names are stable; dashboards key on them.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Outbox processor metrics helper
#[derive(Clone)]
pub struct OutboxMetrics {
    /// Processor instance id for labeling
    instance_id: String,
}

impl OutboxMetrics {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
        }
    }

    /// Record a job being claimed
    pub fn job_claimed(&self) {
        counter!(
            "outbox_jobs_claimed_total",
            "instance" => self.instance_id.clone()
        )
        .increment(1);
    }

    /// Record a successful dispatch
    pub fn job_sent(&self, duration: Duration) {
        counter!(
            "outbox_jobs_processed_total",
            "instance" => self.instance_id.clone(),
            "status" => "sent"
        )
        .increment(1);

        histogram!(
            "outbox_job_duration_seconds",
            "instance" => self.instance_id.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a transient failure scheduled for retry
    pub fn job_retried(&self) {
        counter!(
            "outbox_jobs_retried_total",
            "instance" => self.instance_id.clone()
        )
        .increment(1);
    }

    /// Record a job dead-lettered
    pub fn job_dead(&self, reason: &str) {
        counter!(
            "outbox_jobs_dead_total",
            "instance" => self.instance_id.clone(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    /// Record a suppressed recipient
    pub fn job_suppressed(&self) {
        counter!(
            "outbox_jobs_suppressed_total",
            "instance" => self.instance_id.clone()
        )
        .increment(1);
    }

    /// Record stale locks returned to the queue
    pub fn stale_reclaimed(&self, count: u64) {
        if count > 0 {
            counter!(
                "outbox_stale_jobs_reclaimed_total",
                "instance" => self.instance_id.clone()
            )
            .increment(count);
        }
    }

    /// Update the due-backlog gauge from one poll
    pub fn due_backlog(&self, depth: usize) {
        gauge!(
            "outbox_due_jobs",
            "instance" => self.instance_id.clone()
        )
        .set(depth as f64);
    }

    /// Record one full poll cycle
    pub fn tick(&self, duration: Duration) {
        histogram!(
            "outbox_tick_duration_seconds",
            "instance" => self.instance_id.clone()
        )
        .record(duration.as_secs_f64());
    }
}
