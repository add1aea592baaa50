use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::matching::{CandidateDriver, find_candidates};
use crate::error::DispatchError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleType};
use crate::realtime::location_update_now;
use crate::realtime::messages::DriverStatusUpdate;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/nearby", get(nearby_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", patch(update_driver_location))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub full_name: String,
    pub phone: String,
    pub vehicle_type: VehicleType,
    pub rating: Option<f64>,
    pub commission_rate: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub max_distance_km: Option<f64>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, DispatchError> {
    if payload.full_name.trim().is_empty() {
        return Err(DispatchError::Validation("full_name cannot be empty".to_string()));
    }

    let mut driver = Driver::new(payload.full_name, payload.phone, payload.vehicle_type);
    if let Some(rating) = payload.rating {
        driver.rating = rating.clamp(0.0, 5.0);
    }
    if let Some(rate) = payload.commission_rate {
        if !(0.0..=1.0).contains(&rate) {
            return Err(DispatchError::Validation(
                "commission_rate must be within [0, 1]".to_string(),
            ));
        }
        driver.commission_rate = rate;
    }

    state.store.insert_driver(driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.store.list_drivers())
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, DispatchError> {
    let driver = state
        .store
        .get_driver(id)
        .ok_or_else(|| DispatchError::NotFound(format!("driver {id} not found")))?;
    Ok(Json(driver))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, DispatchError> {
    let driver = state.store.with_driver(id, |driver| {
        driver.status = payload.status;
        driver.updated_at = Utc::now();
        Ok(driver.clone())
    })?;

    state.broadcaster.publish_driver_status(DriverStatusUpdate {
        driver_id: id,
        status: driver.status,
        location: driver.location,
        timestamp: Utc::now(),
    });

    Ok(Json(driver))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, DispatchError> {
    let position = GeoPoint { lat: payload.lat, lng: payload.lng };
    if !position.is_valid() {
        return Err(DispatchError::Validation(format!(
            "coordinates out of range: ({}, {})",
            payload.lat, payload.lng
        )));
    }

    let driver = state.store.with_driver(id, |driver| {
        driver.location = Some(position);
        driver.location_updated_at = Some(Utc::now());
        driver.updated_at = Utc::now();
        Ok(driver.clone())
    })?;

    let update = location_update_now(
        id,
        payload.lat,
        payload.lng,
        payload.heading,
        payload.speed,
        payload.accuracy,
    );
    let serving = state.store.active_delivery_of(id);
    state.broadcaster.publish_location(update, serving).await;

    Ok(Json(driver))
}

async fn nearby_drivers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<CandidateDriver>>, DispatchError> {
    let candidates = find_candidates(
        &state.store,
        query.lat,
        query.lng,
        query.max_distance_km.unwrap_or(10.0),
    )?;
    Ok(Json(candidates))
}
