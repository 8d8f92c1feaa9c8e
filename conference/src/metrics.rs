//! Business metrics for the conference services.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `conference.registrations.total{operation, outcome}` - Register and
//!   unregister calls by result
//! - `conference.transaction.conflicts.total` - Conflicted seat transactions
//!   (each retry counts once)
//! - `conference.triggers.enqueued.total{trigger}` - Triggers handed to the
//!   queue
//! - `conference.triggers.failed.total{trigger}` - Triggers that could not be
//!   enqueued or encoded
//! - `conference.worker.tasks.total{outcome}` - Tasks processed by the worker
//!   (recorded by `conference-runtime`)
//!
//! No exporter is installed here; binaries choose one.

use metrics::describe_counter;

/// Register all metric descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_metrics() {
    describe_counter!(
        "conference.registrations.total",
        "Registration and unregistration calls by operation and outcome"
    );
    describe_counter!(
        "conference.transaction.conflicts.total",
        "Seat transactions that hit an optimistic concurrency conflict"
    );
    describe_counter!(
        "conference.triggers.enqueued.total",
        "Triggers enqueued for asynchronous processing"
    );
    describe_counter!(
        "conference.triggers.failed.total",
        "Triggers dropped because they could not be enqueued"
    );
    describe_counter!(
        "conference.worker.tasks.total",
        "Tasks processed by the trigger worker by outcome"
    );

    tracing::info!("Conference metrics registered");
}

/// Record the result of a register or unregister call.
pub fn record_registration(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "conference.registrations.total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one conflicted transaction attempt.
pub fn record_transaction_conflict() {
    metrics::counter!("conference.transaction.conflicts.total").increment(1);
}

/// Record an enqueued trigger.
pub fn record_trigger_enqueued(trigger: &'static str) {
    metrics::counter!("conference.triggers.enqueued.total", "trigger" => trigger).increment(1);
}

/// Record a dropped trigger.
pub fn record_trigger_failed(trigger: &'static str) {
    metrics::counter!("conference.triggers.failed.total", "trigger" => trigger).increment(1);
}
