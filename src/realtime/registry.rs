use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::realtime::messages::{Role, ServerEvent};

/// Broadcast targets. Every connection lands in its user room and role room
/// on registration; delivery rooms are joined by subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    User(Uuid),
    Role(Role),
    Driver(Uuid),
    Delivery(Uuid),
    Admins,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{id}"),
            Room::Role(Role::Driver) => write!(f, "role:driver"),
            Room::Role(Role::Customer) => write!(f, "role:customer"),
            Room::Role(Role::Admin) => write!(f, "role:admin"),
            Room::Role(Role::Partner) => write!(f, "role:partner"),
            Room::Driver(id) => write!(f, "driver:{id}"),
            Room::Delivery(id) => write!(f, "delivery:{id}"),
            Room::Admins => write!(f, "admins"),
        }
    }
}

struct Connection {
    role: Role,
    driver_id: Option<Uuid>,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Live-connection directory plus room membership, keyed by user id. A second
/// registration for the same user replaces the first.
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Connection>,
    rooms: DashMap<Room, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        user_id: Uuid,
        role: Role,
        driver_id: Option<Uuid>,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if self.connections.insert(user_id, Connection { role, driver_id, sender }).is_some() {
            self.leave_all(user_id);
        }

        self.join(user_id, Room::User(user_id));
        self.join(user_id, Room::Role(role));
        if role == Role::Admin {
            self.join(user_id, Room::Admins);
        }
        if let Some(driver_id) = driver_id {
            self.join(user_id, Room::Driver(driver_id));
        }

        receiver
    }

    /// Drops the connection and its room memberships. Returns the driver id
    /// the connection was registered with, if any.
    pub fn unregister(&self, user_id: Uuid) -> Option<Uuid> {
        let removed = self.connections.remove(&user_id);
        self.leave_all(user_id);
        removed.and_then(|(_, connection)| connection.driver_id)
    }

    pub fn join(&self, user_id: Uuid, room: Room) {
        self.rooms.entry(room).or_default().insert(user_id);
    }

    pub fn leave(&self, user_id: Uuid, room: Room) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&user_id);
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
    }

    fn leave_all(&self, user_id: Uuid) {
        for mut entry in self.rooms.iter_mut() {
            entry.value_mut().remove(&user_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }

    /// Fire-and-forget fan-out; send failures mean the receiving task is
    /// already gone and are ignored.
    pub fn send_to_room(&self, room: Room, event: &ServerEvent) {
        let members: Vec<Uuid> = match self.rooms.get(&room) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };
        for user_id in members {
            if let Some(connection) = self.connections.get(&user_id) {
                let _ = connection.sender.send(event.clone());
            }
        }
    }

    pub fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) {
        if let Some(connection) = self.connections.get(&user_id) {
            let _ = connection.sender.send(event.clone());
        }
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.connections.contains_key(&user_id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn pong() -> ServerEvent {
        ServerEvent::Pong { timestamp: Utc::now() }
    }

    #[test]
    fn registration_joins_identity_rooms() {
        let registry = ConnectionRegistry::new();
        let admin = Uuid::new_v4();
        let mut rx = registry.register(admin, Role::Admin, None);

        registry.send_to_room(Room::Admins, &pong());
        assert!(rx.try_recv().is_ok());

        registry.send_to_room(Room::User(admin), &pong());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn driver_registration_joins_driver_room() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let driver_id = Uuid::new_v4();
        let mut rx = registry.register(user, Role::Driver, Some(driver_id));

        registry.send_to_room(Room::Driver(driver_id), &pong());
        assert!(rx.try_recv().is_ok());

        registry.send_to_room(Room::Admins, &pong());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unregister_removes_from_every_room() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let delivery = Uuid::new_v4();
        let mut rx = registry.register(user, Role::Customer, None);
        registry.join(user, Room::Delivery(delivery));

        let driver_id = registry.unregister(user);
        assert_eq!(driver_id, None);
        registry.send_to_room(Room::Delivery(delivery), &pong());
        registry.send_to_room(Room::User(user), &pong());
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.connected_count(), 0);
    }

    #[test]
    fn joining_a_room_twice_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let delivery = Uuid::new_v4();
        let mut rx = registry.register(user, Role::Customer, None);

        registry.join(user, Room::Delivery(delivery));
        registry.join(user, Room::Delivery(delivery));
        registry.send_to_room(Room::Delivery(delivery), &pong());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "one membership, one frame");
    }

    #[test]
    fn room_names_render_like_the_wire_protocol() {
        let id = Uuid::nil();
        assert_eq!(Room::User(id).to_string(), format!("user:{id}"));
        assert_eq!(Room::Role(Role::Partner).to_string(), "role:partner");
        assert_eq!(Room::Admins.to_string(), "admins");
    }
}
