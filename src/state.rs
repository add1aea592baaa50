use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::coordinator::AssignmentCoordinator;
use crate::observability::metrics::Metrics;
use crate::realtime::Broadcaster;
use crate::realtime::location::InMemoryLocationStore;
use crate::store::DispatchStore;
use crate::tracking::TrackingEventLog;

pub struct AppState {
    pub store: Arc<DispatchStore>,
    pub tracking: Arc<TrackingEventLog>,
    pub broadcaster: Arc<Broadcaster>,
    pub coordinator: Arc<AssignmentCoordinator>,
    pub escalation_tx: mpsc::Sender<Uuid>,
    pub metrics: Metrics,
    pub ws_idle_timeout: StdDuration,
}

impl AppState {
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<Uuid>) {
        let store = Arc::new(DispatchStore::new());
        let tracking = Arc::new(TrackingEventLog::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::new(InMemoryLocationStore::new())));
        let coordinator = Arc::new(AssignmentCoordinator::new(
            store.clone(),
            tracking.clone(),
            broadcaster.clone(),
            Duration::seconds(config.assignment_ttl_secs as i64),
            config.search_radius_km,
        ));

        let (escalation_tx, escalation_rx) = mpsc::channel(config.escalation_queue_size);

        (
            Self {
                store,
                tracking,
                broadcaster,
                coordinator,
                escalation_tx,
                metrics: Metrics::new(),
                ws_idle_timeout: StdDuration::from_secs(config.ws_idle_timeout_secs),
            },
            escalation_rx,
        )
    }
}
