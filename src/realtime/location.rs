use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::realtime::messages::LocationUpdate;

/// Last-known driver positions. The contract is deliberately small so a
/// shared cache can stand in for the in-memory map when the broadcaster runs
/// on more than one instance.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn get(&self, driver_id: Uuid) -> Option<LocationUpdate>;
    async fn set(&self, update: LocationUpdate);
    async fn remove(&self, driver_id: Uuid);
    async fn snapshot(&self) -> Vec<LocationUpdate>;
}

#[derive(Default)]
pub struct InMemoryLocationStore {
    inner: DashMap<Uuid, LocationUpdate>,
}

impl InMemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocationStore for InMemoryLocationStore {
    async fn get(&self, driver_id: Uuid) -> Option<LocationUpdate> {
        self.inner.get(&driver_id).map(|entry| entry.value().clone())
    }

    async fn set(&self, update: LocationUpdate) {
        self.inner.insert(update.driver_id, update);
    }

    async fn remove(&self, driver_id: Uuid) {
        self.inner.remove(&driver_id);
    }

    async fn snapshot(&self) -> Vec<LocationUpdate> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }
}
