use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub notification_queue_depth: IntGauge,
    pub dead_letters_total: IntCounter,
    pub driver_search_attempts: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Status transitions by machine and outcome"),
            &["machine", "outcome"],
        )
        .expect("valid transitions_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "notifications_total",
                "Notification deliveries by channel and outcome",
            ),
            &["channel", "outcome"],
        )
        .expect("valid notifications_total metric");

        let notification_queue_depth = IntGauge::new(
            "notification_queue_depth",
            "Notify commands waiting for a worker",
        )
        .expect("valid notification_queue_depth metric");

        let dead_letters_total =
            IntCounter::new("dead_letters_total", "Notifications given up on")
                .expect("valid dead_letters_total metric");

        let driver_search_attempts = Histogram::with_opts(
            HistogramOpts::new(
                "driver_search_attempts",
                "Store queries per nearby-driver search",
            )
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0]),
        )
        .expect("valid driver_search_attempts metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(notification_queue_depth.clone()))
            .expect("register notification_queue_depth");
        registry
            .register(Box::new(dead_letters_total.clone()))
            .expect("register dead_letters_total");
        registry
            .register(Box::new(driver_search_attempts.clone()))
            .expect("register driver_search_attempts");

        Self {
            registry,
            transitions_total,
            notifications_total,
            notification_queue_depth,
            dead_letters_total,
            driver_search_attempts,
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
