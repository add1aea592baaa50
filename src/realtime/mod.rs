pub mod location;
pub mod messages;
pub mod registry;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::realtime::location::LocationStore;
use crate::realtime::messages::{
    DeliveryStatusUpdate, DriverStatusUpdate, LocationUpdate, Notification, Role, ServerEvent,
};
use crate::realtime::registry::{ConnectionRegistry, Room};

/// Pushes location and status changes to subscribed connections. Fan-out
/// targets per event kind are fixed; callers cannot widen them.
pub struct Broadcaster {
    registry: ConnectionRegistry,
    locations: Arc<dyn LocationStore>,
}

impl Broadcaster {
    pub fn new(locations: Arc<dyn LocationStore>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            locations,
        }
    }

    pub fn connect(
        &self,
        user_id: Uuid,
        role: Role,
        driver_id: Option<Uuid>,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        debug!(%user_id, ?role, "realtime client connected");
        self.registry.register(user_id, role, driver_id)
    }

    /// Removes the connection from the directory and every room. A driver's
    /// cached position is evicted; durable driver rows are untouched.
    pub async fn disconnect(&self, user_id: Uuid) {
        if let Some(driver_id) = self.registry.unregister(user_id) {
            self.locations.remove(driver_id).await;
        }
        debug!(%user_id, "realtime client disconnected");
    }

    pub fn subscribe_to_delivery(&self, user_id: Uuid, delivery_id: Uuid) {
        self.registry.join(user_id, Room::Delivery(delivery_id));
    }

    pub fn unsubscribe_from_delivery(&self, user_id: Uuid, delivery_id: Uuid) {
        self.registry.leave(user_id, Room::Delivery(delivery_id));
    }

    /// Caches the position and fans it out to admins plus the room of the
    /// delivery the driver currently serves, if any.
    pub async fn publish_location(&self, update: LocationUpdate, serving_delivery: Option<Uuid>) {
        self.locations.set(update.clone()).await;

        let event = ServerEvent::LocationUpdate(update);
        self.registry.send_to_room(Room::Admins, &event);
        if let Some(delivery_id) = serving_delivery {
            self.registry.send_to_room(Room::Delivery(delivery_id), &event);
        }
    }

    pub fn publish_delivery_status(&self, update: DeliveryStatusUpdate) {
        let delivery_id = update.delivery_id;
        let driver_id = update.driver_id;
        let event = ServerEvent::DeliveryStatus(update);
        self.registry.send_to_room(Room::Delivery(delivery_id), &event);
        self.registry.send_to_room(Room::Admins, &event);
        if let Some(driver_id) = driver_id {
            self.registry.send_to_room(Room::Driver(driver_id), &event);
        }
    }

    pub fn publish_driver_status(&self, update: DriverStatusUpdate) {
        let event = ServerEvent::DriverStatus(update);
        self.registry.send_to_room(Room::Admins, &event);
        self.registry.send_to_room(Room::Role(Role::Partner), &event);
    }

    /// Targeted notification, mirrored to admins for monitoring.
    pub fn notify(&self, notification: Notification) {
        let recipient = notification.recipient_id;
        let event = ServerEvent::Notification(notification);
        self.registry.send_to_user(recipient, &event);
        self.registry.send_to_room(Room::Admins, &event);
    }

    pub fn send_to_user(&self, user_id: Uuid, event: ServerEvent) {
        self.registry.send_to_user(user_id, &event);
    }

    pub async fn driver_location(&self, driver_id: Uuid) -> Option<LocationUpdate> {
        self.locations.get(driver_id).await
    }

    pub fn connected_count(&self) -> usize {
        self.registry.connected_count()
    }
}

pub fn location_update_now(
    driver_id: Uuid,
    lat: f64,
    lng: f64,
    heading: Option<f64>,
    speed: Option<f64>,
    accuracy: Option<f64>,
) -> LocationUpdate {
    LocationUpdate {
        driver_id,
        lat,
        lng,
        heading,
        speed,
        accuracy,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::delivery::DeliveryStatus;
    use crate::realtime::location::InMemoryLocationStore;

    fn broadcaster() -> Broadcaster {
        Broadcaster::new(Arc::new(InMemoryLocationStore::new()))
    }

    fn location(driver_id: Uuid) -> LocationUpdate {
        location_update_now(driver_id, 10.01, 106.01, Some(90.0), Some(28.0), None)
    }

    #[tokio::test]
    async fn location_updates_reach_admins_and_delivery_room_only() {
        let b = broadcaster();
        let driver_id = Uuid::new_v4();
        let delivery_id = Uuid::new_v4();

        let mut admin_rx = b.connect(Uuid::new_v4(), Role::Admin, None);
        let subscriber = Uuid::new_v4();
        let mut subscriber_rx = b.connect(subscriber, Role::Customer, None);
        b.subscribe_to_delivery(subscriber, delivery_id);
        let mut bystander_rx = b.connect(Uuid::new_v4(), Role::Customer, None);

        b.publish_location(location(driver_id), Some(delivery_id)).await;

        assert!(matches!(admin_rx.try_recv(), Ok(ServerEvent::LocationUpdate(_))));
        assert!(matches!(subscriber_rx.try_recv(), Ok(ServerEvent::LocationUpdate(_))));
        assert!(bystander_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delivery_status_reaches_room_admins_and_driver() {
        let b = broadcaster();
        let delivery_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();

        let mut admin_rx = b.connect(Uuid::new_v4(), Role::Admin, None);
        let mut driver_rx = b.connect(Uuid::new_v4(), Role::Driver, Some(driver_id));
        let subscriber = Uuid::new_v4();
        let mut subscriber_rx = b.connect(subscriber, Role::Customer, None);
        b.subscribe_to_delivery(subscriber, delivery_id);

        b.publish_delivery_status(DeliveryStatusUpdate {
            delivery_id,
            status: DeliveryStatus::PickedUp,
            driver_id: Some(driver_id),
            location: None,
            message: None,
            timestamp: Utc::now(),
        });

        for rx in [&mut admin_rx, &mut driver_rx, &mut subscriber_rx] {
            assert!(matches!(rx.try_recv(), Ok(ServerEvent::DeliveryStatus(_))));
        }
    }

    #[tokio::test]
    async fn driver_status_reaches_admins_and_partners() {
        let b = broadcaster();
        let mut admin_rx = b.connect(Uuid::new_v4(), Role::Admin, None);
        let mut partner_rx = b.connect(Uuid::new_v4(), Role::Partner, None);
        let mut customer_rx = b.connect(Uuid::new_v4(), Role::Customer, None);

        b.publish_driver_status(DriverStatusUpdate {
            driver_id: Uuid::new_v4(),
            status: crate::models::driver::DriverStatus::Available,
            location: None,
            timestamp: Utc::now(),
        });

        assert!(matches!(admin_rx.try_recv(), Ok(ServerEvent::DriverStatus(_))));
        assert!(matches!(partner_rx.try_recv(), Ok(ServerEvent::DriverStatus(_))));
        assert!(customer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notifications_mirror_to_admins() {
        let b = broadcaster();
        let recipient = Uuid::new_v4();
        let mut recipient_rx = b.connect(recipient, Role::Customer, None);
        let mut admin_rx = b.connect(Uuid::new_v4(), Role::Admin, None);

        b.notify(Notification {
            recipient_id: recipient,
            title: "Driver assigned".to_string(),
            message: "Your order is on its way".to_string(),
            delivery_id: None,
            timestamp: Utc::now(),
        });

        assert!(matches!(recipient_rx.try_recv(), Ok(ServerEvent::Notification(_))));
        assert!(matches!(admin_rx.try_recv(), Ok(ServerEvent::Notification(_))));
    }

    #[tokio::test]
    async fn driver_disconnect_evicts_cached_location() {
        let b = broadcaster();
        let user = Uuid::new_v4();
        let driver_id = Uuid::new_v4();
        let _rx = b.connect(user, Role::Driver, Some(driver_id));

        b.publish_location(location(driver_id), None).await;
        assert!(b.driver_location(driver_id).await.is_some());

        b.disconnect(user).await;
        assert!(b.driver_location(driver_id).await.is_none());
        assert_eq!(b.connected_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_is_immediate_and_leaves_others_attached() {
        let b = broadcaster();
        let delivery_id = Uuid::new_v4();
        let leaver = Uuid::new_v4();
        let stayer = Uuid::new_v4();
        let mut leaver_rx = b.connect(leaver, Role::Customer, None);
        let mut stayer_rx = b.connect(stayer, Role::Customer, None);
        b.subscribe_to_delivery(leaver, delivery_id);
        b.subscribe_to_delivery(stayer, delivery_id);

        b.unsubscribe_from_delivery(leaver, delivery_id);
        b.publish_delivery_status(DeliveryStatusUpdate {
            delivery_id,
            status: DeliveryStatus::InTransit,
            driver_id: None,
            location: None,
            message: None,
            timestamp: Utc::now(),
        });

        assert!(leaver_rx.try_recv().is_err());
        assert!(matches!(stayer_rx.try_recv(), Ok(ServerEvent::DeliveryStatus(_))));
    }
}
