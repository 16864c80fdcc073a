//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Upstream API metrics
    pub static ref UPSTREAM_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bookstash_upstream_requests_total", "Total number of upstream API requests"),
        &["endpoint", "status"]
    ).expect("metric can be created");
    pub static ref UPSTREAM_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "bookstash_upstream_request_duration_seconds",
            "Upstream API request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["endpoint"]
    ).expect("metric can be created");

    // Retrieval engine metrics
    pub static ref FETCH_RUNS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bookstash_fetch_runs_total", "Total number of bookmark retrieval runs"),
        &["tier", "outcome"]
    ).expect("metric can be created");
    pub static ref PAGES_FETCHED_TOTAL: IntCounter = IntCounter::new(
        "bookstash_pages_fetched_total",
        "Total number of bookmark pages fetched from upstream"
    ).expect("metric can be created");
    pub static ref BOOKMARKS_FETCHED_TOTAL: IntCounter = IntCounter::new(
        "bookstash_bookmarks_fetched_total",
        "Total number of bookmark items fetched from upstream"
    ).expect("metric can be created");

    // Billing metrics
    pub static ref PAYMENTS_CREDITED_TOTAL: IntCounter = IntCounter::new(
        "bookstash_payments_credited_total",
        "Total number of payment events credited to a quota"
    ).expect("metric can be created");
    pub static ref PAYMENTS_DUPLICATE_TOTAL: IntCounter = IntCounter::new(
        "bookstash_payments_duplicate_total",
        "Total number of payment events skipped as already processed"
    ).expect("metric can be created");

    // Error metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bookstash_errors_total", "Total number of errors surfaced to callers"),
        &["type"]
    ).expect("metric can be created");
}

/// Register all instruments with the global registry.
///
/// Must be called exactly once at startup, before the server begins
/// accepting requests.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(UPSTREAM_REQUESTS_TOTAL.clone()))
        .expect("UPSTREAM_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(UPSTREAM_REQUEST_DURATION_SECONDS.clone()))
        .expect("UPSTREAM_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(FETCH_RUNS_TOTAL.clone()))
        .expect("FETCH_RUNS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PAGES_FETCHED_TOTAL.clone()))
        .expect("PAGES_FETCHED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(BOOKMARKS_FETCHED_TOTAL.clone()))
        .expect("BOOKMARKS_FETCHED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PAYMENTS_CREDITED_TOTAL.clone()))
        .expect("PAYMENTS_CREDITED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PAYMENTS_DUPLICATE_TOTAL.clone()))
        .expect("PAYMENTS_DUPLICATE_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");
}
