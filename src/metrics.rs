//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Persistence Metrics
    pub static ref REMOTE_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moodfeed_remote_calls_total", "Total number of persistence calls"),
        &["operation", "table", "outcome"]
    ).expect("metric can be created");
    pub static ref REMOTE_CALL_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "moodfeed_remote_call_duration_seconds",
            "Persistence call duration in seconds"
        ).buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation", "table"]
    ).expect("metric can be created");

    // Feed Metrics
    pub static ref FEED_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moodfeed_feed_fetches_total", "Total number of feed fetches"),
        &["feed", "outcome"]
    ).expect("metric can be created");
    pub static ref FEED_ITEMS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("moodfeed_feed_items", "Number of items in the last applied feed"),
        &["feed"]
    ).expect("metric can be created");

    // Engagement Metrics
    pub static ref TOGGLES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moodfeed_toggles_total", "Total number of like/follow toggles"),
        &["kind", "outcome"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moodfeed_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moodfeed_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");

    // Media Metrics
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounter = IntCounter::new(
        "moodfeed_media_uploads_total",
        "Total number of media uploads"
    ).expect("metric can be created");
    pub static ref MEDIA_BYTES_UPLOADED: Counter = Counter::new(
        "moodfeed_media_bytes_uploaded_total",
        "Total bytes of media uploaded"
    ).expect("metric can be created");
    pub static ref PLAYBACK_SWITCHES_TOTAL: IntCounter = IntCounter::new(
        "moodfeed_playback_switches_total",
        "Times playback moved from one item to another"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moodfeed_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(REMOTE_CALLS_TOTAL.clone()))
        .expect("REMOTE_CALLS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REMOTE_CALL_DURATION_SECONDS.clone()))
        .expect("REMOTE_CALL_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(FEED_FETCHES_TOTAL.clone()))
        .expect("FEED_FETCHES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FEED_ITEMS.clone()))
        .expect("FEED_ITEMS can be registered");
    REGISTRY
        .register(Box::new(TOGGLES_TOTAL.clone()))
        .expect("TOGGLES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MEDIA_UPLOADS_TOTAL.clone()))
        .expect("MEDIA_UPLOADS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MEDIA_BYTES_UPLOADED.clone()))
        .expect("MEDIA_BYTES_UPLOADED can be registered");
    REGISTRY
        .register(Box::new(PLAYBACK_SWITCHES_TOTAL.clone()))
        .expect("PLAYBACK_SWITCHES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Render all registered metrics in Prometheus text format.
pub fn render() -> Result<String, crate::error::AppError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::error::AppError::Internal(e.into()))?;
    String::from_utf8(buffer).map_err(|e| crate::error::AppError::Internal(e.into()))
}
