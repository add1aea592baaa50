use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl DeliveryPriority {
    pub fn triggers_escalation(&self) -> bool {
        matches!(self, DeliveryPriority::High | DeliveryPriority::Urgent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
    Returned,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Assigned => "ASSIGNED",
            DeliveryStatus::PickedUp => "PICKED_UP",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Cancelled => "CANCELLED",
            DeliveryStatus::Returned => "RETURNED",
        };
        f.write_str(name)
    }
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::Failed
                | DeliveryStatus::Cancelled
                | DeliveryStatus::Returned
        )
    }

    /// A delivery in one of these states counts toward its driver's load.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Assigned | DeliveryStatus::PickedUp | DeliveryStatus::InTransit
        )
    }

    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Pending, Cancelled)
                | (Assigned, PickedUp)
                | (Assigned, Cancelled)
                | (PickedUp, InTransit)
                | (InTransit, Delivered)
                | (InTransit, Failed)
                | (Delivered, Returned)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: String,
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub status: DeliveryStatus,
    pub priority: DeliveryPriority,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub pickup_contact: Contact,
    pub dropoff_contact: Contact,
    pub delivery_fee: f64,
    pub driver_commission: Option<f64>,
    pub items_count: u32,
    pub estimated_distance_km: f64,
    pub estimated_duration_mins: f64,
    pub estimated_pickup_at: DateTime<Utc>,
    pub estimated_delivery_at: DateTime<Utc>,
    pub actual_pickup_at: Option<DateTime<Utc>>,
    pub actual_delivery_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
