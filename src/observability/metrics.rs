use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub escalations_in_queue: IntGauge,
    pub connected_clients: IntGauge,
    pub tracking_events_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of assignment attempts in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let escalations_in_queue =
            IntGauge::new("escalations_in_queue", "Deliveries waiting for background auto-assign")
                .expect("valid escalations_in_queue metric");

        let connected_clients =
            IntGauge::new("connected_clients", "Live realtime connections")
                .expect("valid connected_clients metric");

        let tracking_events_total =
            IntCounter::new("tracking_events_total", "Tracking events appended")
                .expect("valid tracking_events_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(escalations_in_queue.clone()))
            .expect("register escalations_in_queue");
        registry
            .register(Box::new(connected_clients.clone()))
            .expect("register connected_clients");
        registry
            .register(Box::new(tracking_events_total.clone()))
            .expect("register tracking_events_total");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            escalations_in_queue,
            connected_clients,
            tracking_events_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
