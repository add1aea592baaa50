use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::delivery::DeliveryStatus;
use crate::models::driver::{DriverStatus, GeoPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    Customer,
    Admin,
    Partner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatusUpdate {
    pub delivery_id: Uuid,
    pub status: DeliveryStatus,
    pub driver_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverStatusUpdate {
    pub driver_id: Uuid,
    pub status: DriverStatus,
    pub location: Option<GeoPoint>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub delivery_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Frames pushed to connected clients, tagged by event name.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "location:update")]
    LocationUpdate(LocationUpdate),
    #[serde(rename = "delivery:status:update")]
    DeliveryStatus(DeliveryStatusUpdate),
    #[serde(rename = "driver:status:update")]
    DriverStatus(DriverStatusUpdate),
    #[serde(rename = "notification")]
    Notification(Notification),
    #[serde(rename = "location:update:ack")]
    LocationAck { success: bool, timestamp: DateTime<Utc> },
    #[serde(rename = "delivery:subscribe:ack")]
    SubscribeAck { success: bool, delivery_id: Uuid },
    #[serde(rename = "delivery:unsubscribe:ack")]
    UnsubscribeAck { success: bool, delivery_id: Uuid },
    #[serde(rename = "pong")]
    Pong { timestamp: DateTime<Utc> },
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientLocation {
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
}

/// Frames accepted from connected clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "location:update")]
    LocationUpdate(ClientLocation),
    #[serde(rename = "delivery:status:update")]
    DeliveryStatusUpdate {
        delivery_id: Uuid,
        status: DeliveryStatus,
        location: Option<GeoPoint>,
        message: Option<String>,
    },
    #[serde(rename = "driver:status:update")]
    DriverStatusUpdate {
        status: DriverStatus,
        location: Option<GeoPoint>,
    },
    #[serde(rename = "delivery:subscribe")]
    Subscribe { delivery_id: Uuid },
    #[serde(rename = "delivery:unsubscribe")]
    Unsubscribe { delivery_id: Uuid },
    #[serde(rename = "ping")]
    Ping,
}
