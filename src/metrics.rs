//! Prometheus metrics collection for rhythmd.
//!
//! Metrics live in process-wide statics and are registered once by [`init`].
//! Every `record_*`/`set_*` helper is a no-op until then, so library code and
//! tests can call them freely.
//!
//! - `rhythmd_packets_total{packet}` - inbound packets handled by type
//! - `rhythmd_packet_duration_seconds{packet}` - handler latency
//! - `rhythmd_broadcast_fanout` - recipients per multi-session send

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Frames successfully written to clients.
pub static PACKETS_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Frames that could not be written, by failure kind.
pub static SEND_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Cache writes that failed and were swallowed, by operation.
pub static CACHE_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Sessions created by successful logins.
pub static SESSIONS_CREATED: OnceLock<IntCounter> = OnceLock::new();

/// Login attempts refused, by reason.
pub static LOGIN_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Packets refused by the flood limiter.
pub static RATE_LIMITED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Currently connected users.
pub static CONNECTED_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Rooms currently open.
pub static ACTIVE_ROOMS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Packet handling
// ========================================================================

/// Inbound packets handled, by type.
pub static PACKET_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Handler latency, by packet type.
pub static PACKET_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Handler errors, by packet type and error code.
pub static PACKET_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Recipients per multi-session send.
pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before metrics are served.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(
                            error = %e,
                            concat!("Failed to register metric ", stringify!($metric))
                        );
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        concat!("Failed to create metric ", stringify!($metric))
                    );
                }
            }
        };
    }

    register!(
        PACKETS_SENT,
        IntCounter::new("rhythmd_packets_sent_total", "Frames written to clients")
    );
    register!(
        SEND_FAILURES,
        IntCounterVec::new(
            Opts::new("rhythmd_send_failures_total", "Frames that could not be written"),
            &["kind"]
        )
    );
    register!(
        CACHE_ERRORS,
        IntCounterVec::new(
            Opts::new("rhythmd_cache_errors_total", "Failed cache writes"),
            &["op"]
        )
    );
    register!(
        SESSIONS_CREATED,
        IntCounter::new(
            "rhythmd_sessions_created_total",
            "Sessions created by successful logins"
        )
    );
    register!(
        LOGIN_FAILURES,
        IntCounterVec::new(
            Opts::new("rhythmd_login_failures_total", "Refused login attempts"),
            &["reason"]
        )
    );
    register!(
        RATE_LIMITED,
        IntCounter::new(
            "rhythmd_rate_limited_total",
            "Packets refused by the flood limiter"
        )
    );
    register!(
        CONNECTED_USERS,
        IntGauge::new("rhythmd_connected_users", "Currently connected users")
    );
    register!(
        ACTIVE_ROOMS,
        IntGauge::new("rhythmd_active_rooms", "Rooms currently open")
    );

    register!(
        PACKET_COUNTER,
        IntCounterVec::new(
            Opts::new("rhythmd_packets_total", "Inbound packets handled by type"),
            &["packet"]
        )
    );
    register!(
        PACKET_LATENCY,
        HistogramVec::new(
            HistogramOpts::new("rhythmd_packet_duration_seconds", "Packet handler latency by type")
                .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            &["packet"]
        )
    );
    register!(
        PACKET_ERRORS,
        IntCounterVec::new(
            Opts::new("rhythmd_packet_errors_total", "Packet handler errors by type"),
            &["packet", "error"]
        )
    );
    register!(
        BROADCAST_FANOUT,
        Histogram::with_opts(
            HistogramOpts::new("rhythmd_broadcast_fanout", "Recipients per multi-session send")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 50.0, 100.0, 500.0, 1000.0])
        )
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Update helpers
// ============================================================================

#[inline]
pub fn record_packet_sent() {
    if let Some(c) = PACKETS_SENT.get() {
        c.inc();
    }
}

#[inline]
pub fn record_send_failure(kind: &str) {
    if let Some(c) = SEND_FAILURES.get() {
        c.with_label_values(&[kind]).inc();
    }
}

#[inline]
pub fn record_cache_error(op: &str) {
    if let Some(c) = CACHE_ERRORS.get() {
        c.with_label_values(&[op]).inc();
    }
}

#[inline]
pub fn record_session_created() {
    if let Some(c) = SESSIONS_CREATED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_login_failure(reason: &str) {
    if let Some(c) = LOGIN_FAILURES.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn record_rate_limited() {
    if let Some(c) = RATE_LIMITED.get() {
        c.inc();
    }
}

#[inline]
pub fn set_connected_users(count: usize) {
    if let Some(g) = CONNECTED_USERS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

#[inline]
pub fn set_active_rooms(count: usize) {
    if let Some(g) = ACTIVE_ROOMS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

/// Record one handled packet with its latency.
#[inline]
pub fn record_packet(packet: &str, duration_secs: f64) {
    if let Some(c) = PACKET_COUNTER.get() {
        c.with_label_values(&[packet]).inc();
    }
    if let Some(h) = PACKET_LATENCY.get() {
        h.with_label_values(&[packet]).observe(duration_secs);
    }
}

#[inline]
pub fn record_packet_error(packet: &str, error: &str) {
    if let Some(c) = PACKET_ERRORS.get() {
        c.with_label_values(&[packet, error]).inc();
    }
}

/// Record how many sessions one multi-session send targeted.
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(recipients as f64);
    }
}
