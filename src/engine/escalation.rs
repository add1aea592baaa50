use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::delivery::DeliveryStatus;
use crate::state::AppState;

/// Queues a delivery for background auto-assign. Best effort: a full queue is
/// logged and dropped, never surfaced to the creation path.
pub fn enqueue_escalation(state: &AppState, delivery_id: Uuid) {
    match state.escalation_tx.try_send(delivery_id) {
        Ok(()) => {
            state.metrics.escalations_in_queue.inc();
        }
        Err(err) => {
            warn!(delivery_id = %delivery_id, error = %err, "escalation queue rejected delivery");
        }
    }
}

/// Drains the escalation queue, auto-assigning HIGH/URGENT deliveries that
/// are still waiting. Deliveries cancelled (or already assigned) between
/// enqueue and pickup of the job are skipped, which is what makes a queued
/// escalation cancellable.
pub async fn run_escalation_worker(state: Arc<AppState>, mut escalation_rx: mpsc::Receiver<Uuid>) {
    info!("escalation worker started");

    while let Some(delivery_id) = escalation_rx.recv().await {
        state.metrics.escalations_in_queue.dec();

        match state.store.get_delivery(delivery_id) {
            Some(delivery) if delivery.status == DeliveryStatus::Pending => {}
            Some(delivery) => {
                info!(
                    delivery_id = %delivery_id,
                    status = %delivery.status,
                    "skipping escalation, delivery no longer pending"
                );
                continue;
            }
            None => {
                warn!(delivery_id = %delivery_id, "skipping escalation, delivery vanished");
                continue;
            }
        }

        let start = Instant::now();
        let outcome = state.coordinator.auto_assign(delivery_id);
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(outcome) if outcome.assigned_driver_id.is_some() => {
                state
                    .metrics
                    .assignment_latency_seconds
                    .with_label_values(&["success"])
                    .observe(elapsed);
                state.metrics.assignments_total.with_label_values(&["success"]).inc();
                info!(
                    delivery_id = %delivery_id,
                    score = outcome.score,
                    "escalated delivery auto-assigned"
                );
            }
            Ok(outcome) => {
                state
                    .metrics
                    .assignment_latency_seconds
                    .with_label_values(&["unmatched"])
                    .observe(elapsed);
                state.metrics.assignments_total.with_label_values(&["unmatched"]).inc();
                warn!(
                    delivery_id = %delivery_id,
                    reason = %outcome.reason,
                    "escalated delivery left pending"
                );
            }
            Err(err) => {
                state
                    .metrics
                    .assignment_latency_seconds
                    .with_label_values(&["error"])
                    .observe(elapsed);
                state.metrics.assignments_total.with_label_values(&["error"]).inc();
                error!(delivery_id = %delivery_id, error = %err, "escalation attempt failed");
            }
        }
    }

    warn!("escalation worker stopped: queue channel closed");
}
