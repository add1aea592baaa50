use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::delivery::DeliveryStatus;
use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingEventType {
    OrderPlaced,
    DriverAssigned,
    DriverEnRoute,
    ArrivedAtRestaurant,
    OrderPickedUp,
    EnRouteToCustomer,
    ArrivedAtDestination,
    Delivered,
    DeliveryFailed,
    Cancelled,
    Returned,
}

impl TrackingEventType {
    /// Fixed status-to-event table. Pending has no event of its own: the
    /// ORDER_PLACED event is written at creation, not via a transition.
    pub fn from_status(status: DeliveryStatus) -> Option<Self> {
        match status {
            DeliveryStatus::Assigned => Some(TrackingEventType::DriverAssigned),
            DeliveryStatus::PickedUp => Some(TrackingEventType::OrderPickedUp),
            DeliveryStatus::InTransit => Some(TrackingEventType::EnRouteToCustomer),
            DeliveryStatus::Delivered => Some(TrackingEventType::Delivered),
            DeliveryStatus::Failed => Some(TrackingEventType::DeliveryFailed),
            DeliveryStatus::Cancelled => Some(TrackingEventType::Cancelled),
            DeliveryStatus::Returned => Some(TrackingEventType::Returned),
            DeliveryStatus::Pending => None,
        }
    }

    /// Event types that mirror a status transition (or creation) may only be
    /// appended by the coordinator; informational appends must use the
    /// waypoint types.
    pub fn implies_status_change(&self) -> bool {
        !matches!(
            self,
            TrackingEventType::DriverEnRoute
                | TrackingEventType::ArrivedAtRestaurant
                | TrackingEventType::ArrivedAtDestination
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub event_type: TrackingEventType,
    pub timestamp: DateTime<Utc>,
    pub position: Option<GeoPoint>,
    pub description: String,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_table_is_total_over_non_pending() {
        let cases = [
            (DeliveryStatus::Assigned, TrackingEventType::DriverAssigned),
            (DeliveryStatus::PickedUp, TrackingEventType::OrderPickedUp),
            (DeliveryStatus::InTransit, TrackingEventType::EnRouteToCustomer),
            (DeliveryStatus::Delivered, TrackingEventType::Delivered),
            (DeliveryStatus::Failed, TrackingEventType::DeliveryFailed),
            (DeliveryStatus::Cancelled, TrackingEventType::Cancelled),
            (DeliveryStatus::Returned, TrackingEventType::Returned),
        ];
        for (status, event_type) in cases {
            assert_eq!(TrackingEventType::from_status(status), Some(event_type));
        }
        assert_eq!(TrackingEventType::from_status(DeliveryStatus::Pending), None);
    }

    #[test]
    fn waypoint_events_are_informational() {
        assert!(!TrackingEventType::DriverEnRoute.implies_status_change());
        assert!(!TrackingEventType::ArrivedAtRestaurant.implies_status_change());
        assert!(!TrackingEventType::ArrivedAtDestination.implies_status_change());
        assert!(TrackingEventType::OrderPlaced.implies_status_change());
        assert!(TrackingEventType::DriverAssigned.implies_status_change());
        assert!(TrackingEventType::Delivered.implies_status_change());
    }
}
