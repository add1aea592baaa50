use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::coordinator::{AssignmentOutcome, NewDelivery, TransitionMetadata};
use crate::engine::escalation::enqueue_escalation;
use crate::error::DispatchError;
use crate::models::assignment::DeliveryAssignment;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::driver::GeoPoint;
use crate::models::tracking::{TrackingEvent, TrackingEventType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery))
        .route("/deliveries/:id", get(get_delivery).put(update_delivery_status))
        .route("/deliveries/:id/assign", post(assign_driver))
        .route("/deliveries/:id/auto-assign", post(auto_assign))
        .route("/deliveries/:id/tracking", get(tracking_events))
        .route("/deliveries/:id/events", post(append_event))
        .route("/assignments/:id/respond", post(respond_assignment))
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateDeliveryRequest {
    pub status: DeliveryStatus,
    pub failure_reason: Option<String>,
    pub location: Option<GeoPoint>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct AppendEventRequest {
    pub event_type: TrackingEventType,
    pub description: String,
    pub notes: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub accepted: bool,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDelivery>,
) -> Result<Json<Delivery>, DispatchError> {
    let delivery = state.coordinator.create_delivery(payload)?;

    // Best-effort background attempt; its failure never fails creation.
    if delivery.priority.triggers_escalation() {
        enqueue_escalation(&state, delivery.id);
    }

    Ok(Json(delivery))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, DispatchError> {
    let delivery = state
        .store
        .get_delivery(id)
        .ok_or_else(|| DispatchError::NotFound(format!("delivery {id} not found")))?;
    Ok(Json(delivery))
}

async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDeliveryRequest>,
) -> Result<Json<Delivery>, DispatchError> {
    let delivery = state.coordinator.advance_status(
        id,
        payload.status,
        TransitionMetadata {
            location: payload.location,
            notes: payload.notes,
            failure_reason: payload.failure_reason,
        },
    )?;
    Ok(Json(delivery))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<DeliveryAssignment>, DispatchError> {
    let commit = state.coordinator.manual_assign(id, payload.driver_id)?;
    Ok(Json(commit.assignment))
}

async fn auto_assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentOutcome>, DispatchError> {
    let outcome = state.coordinator.auto_assign(id)?;
    Ok(Json(outcome))
}

async fn tracking_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TrackingEvent>>, DispatchError> {
    if state.store.get_delivery(id).is_none() {
        return Err(DispatchError::NotFound(format!("delivery {id} not found")));
    }
    Ok(Json(state.tracking.list_by_delivery(id)))
}

/// Free-form waypoint note on the timeline. Status-implying event types must
/// go through the status update endpoint instead.
async fn append_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppendEventRequest>,
) -> Result<Json<TrackingEvent>, DispatchError> {
    if state.store.get_delivery(id).is_none() {
        return Err(DispatchError::NotFound(format!("delivery {id} not found")));
    }
    if payload.event_type.implies_status_change() {
        return Err(DispatchError::Validation(format!(
            "event type {:?} implies a status change",
            payload.event_type
        )));
    }

    let event = state.tracking.append(
        id,
        payload.event_type,
        payload.location,
        payload.description,
        payload.notes,
    );
    state.metrics.tracking_events_total.inc();
    Ok(Json(event))
}

async fn respond_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<DeliveryAssignment>, DispatchError> {
    let assignment = state.coordinator.respond_assignment(id, payload.accepted)?;
    Ok(Json(assignment))
}
