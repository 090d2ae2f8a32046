/// Metrics Module - Prometheus Instrumentation
///
/// Exposes the aggregator's own health as Prometheus series: how many records were queued
/// downstream, how many were throttled (and why), and how many frontend/ajax records were
/// dropped (and why). Aggregate request counts themselves live in
/// `crate::store::AggregationStore`, not here — these are operational metrics about the
/// processor, not the telemetry data it's aggregating.
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use lazy_static::lazy_static;

lazy_static! {
    /// Global Prometheus registry for this process.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Records successfully handed to the outbound queue.
    /// Labels: stream, kind (r, j, e, f, a)
    pub static ref QUEUED_INSERTS: IntCounterVec = IntCounterVec::new(
        Opts::new("logjam_queued_inserts_total", "Records forwarded downstream by stream and kind"),
        &["stream", "kind"]
    ).unwrap();

    /// Backend requests held back by the throttling chain.
    /// Labels: stream, verdict (max_inserts_per_second, hard_limit_storage_size, soft_limit_storage_size)
    pub static ref THROTTLED_INSERTS: IntCounterVec = IntCounterVec::new(
        Opts::new("logjam_throttled_inserts_total", "Backend requests throttled by stream and verdict"),
        &["stream", "verdict"]
    ).unwrap();

    /// Frontend/ajax records not folded into the aggregates.
    /// Labels: stream, reason (outlier, nav_timing, illegal, corrupted, invalid)
    pub static ref FRONTEND_DROPS: IntCounterVec = IntCounterVec::new(
        Opts::new("logjam_frontend_drops_total", "Frontend/ajax records dropped by stream and reason"),
        &["stream", "reason"]
    ).unwrap();
}

/// Registers every metric above with [`REGISTRY`]. Call once at process startup.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    REGISTRY.register(Box::new(QUEUED_INSERTS.clone()))?;
    REGISTRY.register(Box::new(THROTTLED_INSERTS.clone()))?;
    REGISTRY.register(Box::new(FRONTEND_DROPS.clone()))?;
    Ok(())
}

/// Renders the registry in Prometheus text-exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).expect("prometheus encoding is infallible for well-formed metrics");
    String::from_utf8(buffer).expect("prometheus text encoder always emits valid utf-8")
}

pub fn record_queued_insert(stream: &str, kind: &str) {
    QUEUED_INSERTS.with_label_values(&[stream, kind]).inc();
}

pub fn record_throttled_insert(stream: &str, verdict: &str) {
    THROTTLED_INSERTS.with_label_values(&[stream, verdict]).inc();
}

pub fn record_frontend_drop(stream: &str, reason: &str) {
    FRONTEND_DROPS.with_label_values(&[stream, reason]).inc();
}
