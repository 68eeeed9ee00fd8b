use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub orders_in_queue: IntGauge,
    pub candidate_selection_seconds: HistogramVec,
    pub offers_total: IntCounterVec,
    pub route_estimates_total: IntCounterVec,
    pub connected_drivers: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Acceptance attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let orders_in_queue = IntGauge::new("orders_in_queue", "Orders waiting for dispatch")
            .expect("valid orders_in_queue metric");

        let candidate_selection_seconds = HistogramVec::new(
            HistogramOpts::new(
                "candidate_selection_seconds",
                "Time to rank drivers and record offers for one order",
            ),
            &["outcome"],
        )
        .expect("valid candidate_selection_seconds metric");

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Order offers pushed to drivers by delivery outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let route_estimates_total = IntCounterVec::new(
            Opts::new("route_estimates_total", "Candidate route estimates by source"),
            &["source"],
        )
        .expect("valid route_estimates_total metric");

        let connected_drivers = IntGauge::new("connected_drivers", "Drivers with a live channel")
            .expect("valid connected_drivers metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(candidate_selection_seconds.clone()))
            .expect("register candidate_selection_seconds");
        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(route_estimates_total.clone()))
            .expect("register route_estimates_total");
        registry
            .register(Box::new(connected_drivers.clone()))
            .expect("register connected_drivers");

        Self {
            registry,
            assignments_total,
            orders_in_queue,
            candidate_selection_seconds,
            offers_total,
            route_estimates_total,
            connected_drivers,
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
