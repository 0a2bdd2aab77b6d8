//! Prometheus metrics for the sync pipeline.

use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, Histogram, IntCounter, IntCounterVec, IntGauge, Registry,
};

const PREFIX: &str = "annosync";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SYNC_PASSES: IntCounter = IntCounter::with_opts(opts!(
        format!("{}_passes_total", PREFIX),
        "Number of sync passes run"
    ))
    .unwrap();
    pub static ref PASS_DURATION: Histogram = Histogram::with_opts(histogram_opts!(
        format!("{}_pass_duration_seconds", PREFIX),
        "Wall-clock duration of a sync pass",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    ))
    .unwrap();
    pub static ref JOBS_DEQUEUED: IntCounterVec = IntCounterVec::new(
        opts!(
            format!("{}_jobs_dequeued_total", PREFIX),
            "Jobs claimed from the queue, by priority band"
        ),
        &["priority"]
    )
    .unwrap();
    pub static ref JOBS_RESOLVED: IntCounterVec = IntCounterVec::new(
        opts!(
            format!("{}_jobs_resolved_total", PREFIX),
            "Reconciliation outcomes, by kind"
        ),
        &["outcome"]
    )
    .unwrap();
    pub static ref JOBS_MALFORMED: IntCounter = IntCounter::with_opts(opts!(
        format!("{}_jobs_malformed_total", PREFIX),
        "Jobs whose payload failed to decode"
    ))
    .unwrap();
    pub static ref INDEX_WRITE_FAILURES: IntCounter = IntCounter::with_opts(opts!(
        format!("{}_index_write_failures_total", PREFIX),
        "Documents the search index refused to write"
    ))
    .unwrap();
    pub static ref QUEUE_PENDING: IntGauge = IntGauge::with_opts(opts!(
        format!("{}_queue_pending_jobs", PREFIX),
        "Jobs physically present in the queue after the last pass"
    ))
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY
        .register(Box::new(SYNC_PASSES.clone()))
        .expect("Failed to register sync passes metric");
    REGISTRY
        .register(Box::new(PASS_DURATION.clone()))
        .expect("Failed to register pass duration metric");
    REGISTRY
        .register(Box::new(JOBS_DEQUEUED.clone()))
        .expect("Failed to register jobs dequeued metric");
    REGISTRY
        .register(Box::new(JOBS_RESOLVED.clone()))
        .expect("Failed to register jobs resolved metric");
    REGISTRY
        .register(Box::new(JOBS_MALFORMED.clone()))
        .expect("Failed to register malformed jobs metric");
    REGISTRY
        .register(Box::new(INDEX_WRITE_FAILURES.clone()))
        .expect("Failed to register index write failures metric");
    REGISTRY
        .register(Box::new(QUEUE_PENDING.clone()))
        .expect("Failed to register queue pending metric");
}
