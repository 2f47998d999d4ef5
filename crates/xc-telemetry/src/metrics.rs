//! Prometheus metrics for Cross-Channel nodes.
//!
//! All metrics follow the naming convention: `xc_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // DISPATCHER METRICS
    // =========================================================================

    /// Inbound messages by kind
    pub static ref MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("xc_dispatcher_messages_received_total", "Messages handed to the dispatcher"),
        &["kind"]
    ).expect("metric creation failed");

    /// Messages that were decoded or dispatched unsuccessfully
    pub static ref MESSAGES_DROPPED: CounterVec = CounterVec::new(
        Opts::new("xc_dispatcher_messages_dropped_total", "Messages dropped without effect"),
        &["kind", "reason"]  // reason: decode/unhandled/error
    ).expect("metric creation failed");

    /// Dispatch duration
    pub static ref DISPATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "xc_dispatcher_dispatch_duration_seconds",
            "Time spent handling one inbound message"
        ).buckets(exponential_buckets(0.0001, 2.0, 14).unwrap())
    ).expect("metric creation failed");

    /// Collaborator calls that hit the timeout
    pub static ref COLLABORATOR_TIMEOUTS: CounterVec = CounterVec::new(
        Opts::new("xc_dispatcher_collaborator_timeouts_total", "Collaborator calls that timed out"),
        &["collaborator"]
    ).expect("metric creation failed");

    // =========================================================================
    // WAL METRICS
    // =========================================================================

    /// State changes written to the log
    pub static ref STATE_CHANGES_LOGGED: CounterVec = CounterVec::new(
        Opts::new("xc_wal_state_changes_logged_total", "State changes persisted and applied"),
        &["kind"]
    ).expect("metric creation failed");

    /// Events persisted alongside state changes
    pub static ref EVENTS_PERSISTED: Counter = Counter::new(
        "xc_wal_events_persisted_total",
        "Events produced by applied state changes"
    ).expect("metric creation failed");

    // =========================================================================
    // SWAP METRICS
    // =========================================================================

    /// Swap rows entering each status
    pub static ref SWAP_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new("xc_swap_status_transitions_total", "Swap rows moved into a status"),
        &["status"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Dispatcher
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(MESSAGES_DROPPED.clone()),
        Box::new(DISPATCH_DURATION.clone()),
        Box::new(COLLABORATOR_TIMEOUTS.clone()),
        // WAL
        Box::new(STATE_CHANGES_LOGGED.clone()),
        Box::new(EVENTS_PERSISTED.clone()),
        // Swap
        Box::new(SWAP_TRANSITIONS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
