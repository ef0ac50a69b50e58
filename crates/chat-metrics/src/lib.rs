//! Prometheus metrics for the chat service
//!
//! - Routing and live delivery
//! - Durable queue publish/consume
//! - Message store writes
//! - Notification dispatcher

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

// ============================================================================
// Hub Metrics
// ============================================================================

/// Live WebSocket connections currently registered
pub static ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "chat_active_connections",
        "Number of connections currently registered in the hub"
    ))
    .expect("Failed to register ACTIVE_CONNECTIONS metric")
});

/// Total private messages accepted for routing
pub static MESSAGES_ROUTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "chat_messages_routed_total",
        "Total number of private messages accepted by the hub"
    ))
    .expect("Failed to register MESSAGES_ROUTED_TOTAL metric")
});

/// Outcome of the live delivery attempt (delivered, offline, evicted, stale)
pub static LIVE_DELIVERY_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "chat_live_delivery_total",
            "Live delivery attempts by outcome"
        ),
        &["outcome"]
    )
    .expect("Failed to register LIVE_DELIVERY_TOTAL metric")
});

/// Inbound frames that could not be decoded
pub static MALFORMED_FRAMES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "chat_malformed_frames_total",
        "Inbound WebSocket frames dropped as malformed"
    ))
    .expect("Failed to register MALFORMED_FRAMES_TOTAL metric")
});

// ============================================================================
// Durable Queue Metrics
// ============================================================================

pub static PUBLISH_SUCCESS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "chat_publish_success_total",
        "Messages handed to the durable queue"
    ))
    .expect("Failed to register PUBLISH_SUCCESS_TOTAL metric")
});

/// Publish failures. The hub never retries, so this is the only signal of a
/// durability gap.
pub static PUBLISH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "chat_publish_failures_total",
        "Messages that failed to reach the durable queue"
    ))
    .expect("Failed to register PUBLISH_FAILURES_TOTAL metric")
});

pub static PUBLISH_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "chat_publish_latency_seconds",
        "Durable queue publish latency in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register PUBLISH_LATENCY metric")
});

// ============================================================================
// Persistence Consumer Metrics
// ============================================================================

pub static MESSAGES_PERSISTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "chat_messages_persisted_total",
        "Messages written to the message store"
    ))
    .expect("Failed to register MESSAGES_PERSISTED_TOTAL metric")
});

pub static PERSIST_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "chat_persist_failures_total",
        "Message store writes that failed"
    ))
    .expect("Failed to register PERSIST_FAILURES_TOTAL metric")
});

pub static DECODE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "chat_queue_decode_failures_total",
        "Queue entries dropped because they could not be decoded"
    ))
    .expect("Failed to register DECODE_FAILURES_TOTAL metric")
});

// ============================================================================
// Dispatcher Metrics
// ============================================================================

pub static TASKS_EXECUTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "chat_dispatcher_tasks_executed_total",
            "Background tasks executed by dispatcher"
        ),
        &["dispatcher"]
    )
    .expect("Failed to register TASKS_EXECUTED_TOTAL metric")
});

pub static TASKS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "chat_dispatcher_tasks_dropped_total",
            "Background tasks dropped because the queue stayed full"
        ),
        &["dispatcher"]
    )
    .expect("Failed to register TASKS_DROPPED_TOTAL metric")
});

// ============================================================================
// Metrics Collection
// ============================================================================

/// Gather all registered metrics and encode as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
