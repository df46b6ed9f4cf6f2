use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub trips_created_total: IntCounter,
    pub trip_transitions_total: IntCounterVec,
    pub events_in_queue: IntGauge,
    pub notifications_total: IntCounterVec,
    pub ledger_entries_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let trips_created_total =
            IntCounter::new("trips_created_total", "Total trips booked")
                .expect("valid trips_created_total metric");

        let trip_transitions_total = IntCounterVec::new(
            Opts::new(
                "trip_transitions_total",
                "Trip lifecycle actions by action and outcome",
            ),
            &["action", "outcome"],
        )
        .expect("valid trip_transitions_total metric");

        let events_in_queue = IntGauge::new(
            "events_in_queue",
            "Trip events waiting for the notifier",
        )
        .expect("valid events_in_queue metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notifications created by kind"),
            &["kind"],
        )
        .expect("valid notifications_total metric");

        let ledger_entries_total = IntCounterVec::new(
            Opts::new("ledger_entries_total", "Commission ledger entries by kind"),
            &["kind"],
        )
        .expect("valid ledger_entries_total metric");

        registry
            .register(Box::new(trips_created_total.clone()))
            .expect("register trips_created_total");
        registry
            .register(Box::new(trip_transitions_total.clone()))
            .expect("register trip_transitions_total");
        registry
            .register(Box::new(events_in_queue.clone()))
            .expect("register events_in_queue");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(ledger_entries_total.clone()))
            .expect("register ledger_entries_total");

        Self {
            registry,
            trips_created_total,
            trip_transitions_total,
            events_in_queue,
            notifications_total,
            ledger_entries_total,
        }
    }

    pub fn record_transition(&self, action: &str, ok: bool) {
        let outcome = if ok { "success" } else { "rejected" };
        self.trip_transitions_total
            .with_label_values(&[action, outcome])
            .inc();
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
