use prometheus::{
    Encoder, Gauge, HistogramVec, IntCounterVec, Registry, TextEncoder,
};

/// Registers and exposes every metric family this gateway reports.
/// Cloning is cheap: every field is an `Arc`-backed prometheus handle.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub request_latency_seconds: HistogramVec,
    pub tokens_total: IntCounterVec,
    pub kv_requests_total: IntCounterVec,
    pub kv_latency_seconds: HistogramVec,
    pub extraction_requests_total: IntCounterVec,
    pub extraction_cache_hits_total: IntCounterVec,
    pub extraction_validation_failures_total: IntCounterVec,
    pub extraction_repair_outcomes_total: IntCounterVec,
    pub kv_enabled: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_requests_total", "Total served requests"),
            &["route", "model_id", "cached", "status_code"],
        )
        .unwrap();

        let request_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("gateway_request_latency_seconds", "End-to-end request latency"),
            &["route", "model_id", "cached", "status_code"],
        )
        .unwrap();

        let tokens_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_tokens_total", "Prompt/completion token counts"),
            &["direction", "model_id"],
        )
        .unwrap();

        let kv_requests_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_kv_requests_total", "KV tier hits/misses"),
            &["model_id", "kind", "outcome"],
        )
        .unwrap();

        let kv_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("gateway_kv_latency_seconds", "KV GET latency"),
            &["model_id", "kind"],
        )
        .unwrap();

        let extraction_requests_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_extraction_requests_total", "Extraction requests"),
            &["schema_id", "model_id"],
        )
        .unwrap();

        let extraction_cache_hits_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_extraction_cache_hits_total", "Extraction cache hits"),
            &["schema_id", "model_id", "layer"],
        )
        .unwrap();

        let extraction_validation_failures_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_extraction_validation_failures_total", "Extraction validation failures by stage"),
            &["schema_id", "model_id", "stage"],
        )
        .unwrap();

        let extraction_repair_outcomes_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_extraction_repair_outcomes_total", "Extraction repair attempt outcomes"),
            &["schema_id", "model_id", "outcome"],
        )
        .unwrap();

        let kv_enabled = Gauge::new("gateway_kv_enabled", "Whether the KV cache tier is enabled").unwrap();

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(request_latency_seconds.clone()),
            Box::new(tokens_total.clone()),
            Box::new(kv_requests_total.clone()),
            Box::new(kv_latency_seconds.clone()),
            Box::new(extraction_requests_total.clone()),
            Box::new(extraction_cache_hits_total.clone()),
            Box::new(extraction_validation_failures_total.clone()),
            Box::new(extraction_repair_outcomes_total.clone()),
            Box::new(kv_enabled.clone()),
        ] {
            registry.register(collector).expect("metric registration cannot fail on a fresh registry");
        }

        Self {
            registry,
            requests_total,
            request_latency_seconds,
            tokens_total,
            kv_requests_total,
            kv_latency_seconds,
            extraction_requests_total,
            extraction_cache_hits_total,
            extraction_validation_failures_total,
            extraction_repair_outcomes_total,
            kv_enabled,
        }
    }

    pub fn set_kv_enabled(&self, enabled: bool) {
        self.kv_enabled.set(if enabled { 1.0 } else { 0.0 });
    }

    /// Renders the Prometheus text exposition format for `GET /metrics`.
    pub fn encode(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf).expect("prometheus text encoding cannot fail");
        String::from_utf8(buf).expect("prometheus output is always valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
