use chrono::{Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::driver::GeoPoint;
use crate::models::tracking::{TrackingEvent, TrackingEventType};

/// Append-only, per-delivery event log. There is no update or delete; the
/// only reads are ordered listings.
pub struct TrackingEventLog {
    events: DashMap<Uuid, Vec<TrackingEvent>>,
}

impl TrackingEventLog {
    pub fn new() -> Self {
        Self { events: DashMap::new() }
    }

    /// Appends with a server-assigned timestamp. If the clock has not moved
    /// past the previous event the timestamp is bumped one millisecond past
    /// it, keeping per-delivery order strict.
    pub fn append(
        &self,
        delivery_id: Uuid,
        event_type: TrackingEventType,
        position: Option<GeoPoint>,
        description: String,
        notes: Option<String>,
    ) -> TrackingEvent {
        let mut log = self.events.entry(delivery_id).or_default();

        let mut timestamp = Utc::now();
        if let Some(last) = log.last() {
            if timestamp <= last.timestamp {
                timestamp = last.timestamp + Duration::milliseconds(1);
            }
        }

        let event = TrackingEvent {
            id: Uuid::new_v4(),
            delivery_id,
            event_type,
            timestamp,
            position,
            description,
            notes,
        };
        log.push(event.clone());
        event
    }

    /// Events for one delivery, oldest first.
    pub fn list_by_delivery(&self, delivery_id: Uuid) -> Vec<TrackingEvent> {
        self.events
            .get(&delivery_id)
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn count_for(&self, delivery_id: Uuid) -> usize {
        self.events.get(&delivery_id).map(|log| log.len()).unwrap_or(0)
    }
}

impl Default for TrackingEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_come_back_in_append_order_with_increasing_timestamps() {
        let log = TrackingEventLog::new();
        let delivery_id = Uuid::new_v4();

        log.append(delivery_id, TrackingEventType::OrderPlaced, None, "placed".to_string(), None);
        log.append(delivery_id, TrackingEventType::DriverAssigned, None, "assigned".to_string(), None);
        log.append(delivery_id, TrackingEventType::OrderPickedUp, None, "picked up".to_string(), None);

        let events = log.list_by_delivery(delivery_id);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, TrackingEventType::OrderPlaced);
        assert_eq!(events[2].event_type, TrackingEventType::OrderPickedUp);
        assert!(events.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
    }

    #[test]
    fn logs_are_isolated_per_delivery() {
        let log = TrackingEventLog::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        log.append(a, TrackingEventType::OrderPlaced, None, "placed".to_string(), None);
        log.append(b, TrackingEventType::OrderPlaced, None, "placed".to_string(), None);
        log.append(b, TrackingEventType::Cancelled, None, "cancelled".to_string(), None);

        assert_eq!(log.count_for(a), 1);
        assert_eq!(log.count_for(b), 2);
        assert!(log.list_by_delivery(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn rapid_appends_never_share_a_timestamp() {
        let log = TrackingEventLog::new();
        let delivery_id = Uuid::new_v4();
        for _ in 0..50 {
            log.append(delivery_id, TrackingEventType::OrderPlaced, None, "note".to_string(), None);
        }
        let events = log.list_by_delivery(delivery_id);
        assert!(events.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
    }
}
