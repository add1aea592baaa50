use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::time::timeout;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::coordinator::TransitionMetadata;
use crate::models::delivery::DeliveryStatus;
use crate::models::driver::{DriverStatus, GeoPoint};
use crate::realtime::location_update_now;
use crate::realtime::messages::{ClientEvent, ClientLocation, Role, ServerEvent};
use crate::realtime::messages::DriverStatusUpdate;
use crate::state::AppState;

/// Connection identity. Authentication happens upstream; the gateway passes
/// the verified identity through these parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WsQuery {
    pub user_id: Uuid,
    pub role: Role,
    pub driver_id: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: WsQuery) {
    let (mut sink, mut stream) = socket.split();
    let events_rx = state.broadcaster.connect(query.user_id, query.role, query.driver_id);
    state.metrics.connected_clients.inc();
    info!(user_id = %query.user_id, role = ?query.role, "websocket client connected");

    let mut events = UnboundedReceiverStream::new(events_rx);
    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize realtime event");
                    continue;
                }
            };

            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let idle_timeout = state.ws_idle_timeout;
    let recv_task = tokio::spawn(async move {
        loop {
            let frame = match timeout(idle_timeout, stream.next()).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(_))) | Ok(None) => break,
                Err(_) => {
                    debug!(user_id = %query.user_id, "websocket idle timeout, dropping connection");
                    break;
                }
            };

            match frame {
                Message::Text(text) => handle_client_frame(&recv_state, query, text.as_str()).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.broadcaster.disconnect(query.user_id).await;
    state.metrics.connected_clients.dec();
    info!(user_id = %query.user_id, "websocket client disconnected");
}

async fn handle_client_frame(state: &Arc<AppState>, query: WsQuery, raw: &str) {
    let event: ClientEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(err) => {
            state.broadcaster.send_to_user(
                query.user_id,
                ServerEvent::Error { message: format!("malformed frame: {err}") },
            );
            return;
        }
    };

    match event {
        ClientEvent::Ping => {
            state
                .broadcaster
                .send_to_user(query.user_id, ServerEvent::Pong { timestamp: Utc::now() });
        }
        ClientEvent::Subscribe { delivery_id } => {
            state.broadcaster.subscribe_to_delivery(query.user_id, delivery_id);
            state.broadcaster.send_to_user(
                query.user_id,
                ServerEvent::SubscribeAck { success: true, delivery_id },
            );
        }
        ClientEvent::Unsubscribe { delivery_id } => {
            state.broadcaster.unsubscribe_from_delivery(query.user_id, delivery_id);
            state.broadcaster.send_to_user(
                query.user_id,
                ServerEvent::UnsubscribeAck { success: true, delivery_id },
            );
        }
        ClientEvent::LocationUpdate(location) => {
            handle_location_push(state, query, location).await;
        }
        ClientEvent::DeliveryStatusUpdate { delivery_id, status, location, message } => {
            handle_delivery_status_push(state, query, delivery_id, status, location, message);
        }
        ClientEvent::DriverStatusUpdate { status, location } => {
            handle_driver_status_push(state, query, status, location);
        }
    }
}

async fn handle_location_push(state: &Arc<AppState>, query: WsQuery, location: ClientLocation) {
    let Some(driver_id) = driver_identity(state, query) else {
        return;
    };

    let position = GeoPoint { lat: location.lat, lng: location.lng };
    if !position.is_valid() {
        state.broadcaster.send_to_user(
            query.user_id,
            ServerEvent::Error { message: "Invalid location data".to_string() },
        );
        return;
    }

    let stored = state.store.with_driver(driver_id, |driver| {
        driver.location = Some(position);
        driver.location_updated_at = Some(Utc::now());
        driver.updated_at = Utc::now();
        Ok(())
    });
    if let Err(err) = stored {
        state
            .broadcaster
            .send_to_user(query.user_id, ServerEvent::Error { message: err.to_string() });
        return;
    }

    let update = location_update_now(
        driver_id,
        location.lat,
        location.lng,
        location.heading,
        location.speed,
        location.accuracy,
    );
    let serving = state.store.active_delivery_of(driver_id);
    state.broadcaster.publish_location(update, serving).await;

    state.broadcaster.send_to_user(
        query.user_id,
        ServerEvent::LocationAck { success: true, timestamp: Utc::now() },
    );
}

fn handle_delivery_status_push(
    state: &Arc<AppState>,
    query: WsQuery,
    delivery_id: Uuid,
    status: DeliveryStatus,
    location: Option<GeoPoint>,
    message: Option<String>,
) {
    if driver_identity(state, query).is_none() {
        return;
    }

    let metadata = TransitionMetadata { location, notes: message, failure_reason: None };
    if let Err(err) = state.coordinator.advance_status(delivery_id, status, metadata) {
        state
            .broadcaster
            .send_to_user(query.user_id, ServerEvent::Error { message: err.to_string() });
    }
}

fn handle_driver_status_push(
    state: &Arc<AppState>,
    query: WsQuery,
    status: DriverStatus,
    location: Option<GeoPoint>,
) {
    let Some(driver_id) = driver_identity(state, query) else {
        return;
    };

    let updated = state.store.with_driver(driver_id, |driver| {
        driver.status = status;
        if let Some(position) = location {
            driver.location = Some(position);
            driver.location_updated_at = Some(Utc::now());
        }
        driver.updated_at = Utc::now();
        Ok(driver.clone())
    });

    match updated {
        Ok(driver) => {
            state.broadcaster.publish_driver_status(DriverStatusUpdate {
                driver_id,
                status: driver.status,
                location: driver.location,
                timestamp: Utc::now(),
            });
        }
        Err(err) => {
            state
                .broadcaster
                .send_to_user(query.user_id, ServerEvent::Error { message: err.to_string() });
        }
    }
}

/// Driver-only frames are ignored unless the connection carries a driver
/// identity; the client gets told why.
fn driver_identity(state: &Arc<AppState>, query: WsQuery) -> Option<Uuid> {
    match (query.role, query.driver_id) {
        (Role::Driver, Some(driver_id)) => Some(driver_id),
        _ => {
            state.broadcaster.send_to_user(
                query.user_id,
                ServerEvent::Error { message: "driver identity required".to_string() },
            );
            None
        }
    }
}
