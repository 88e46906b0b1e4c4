//! Prometheus metrics for the FTPS security core, enabled by the
//! `prometheus` feature.

use crate::session::Channel;
use lazy_static::lazy_static;
use prometheus::{opts, register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec, IntGauge};

lazy_static! {
    static ref TLS_HANDSHAKES_TOTAL: IntCounterVec =
        register_int_counter_vec!("ftps_handshakes_total", "Total number of TLS handshakes attempted.", &["channel", "result"]).unwrap();
    static ref TLS_SESSIONS_ACTIVE: IntGauge = register_int_gauge!(opts!("ftps_sessions_active", "Number of sessions currently secured with TLS.")).unwrap();
    static ref TLS_SESSION_REUSE_FAILURES: IntCounter =
        register_int_counter!(opts!("ftps_session_reuse_failures_total", "Data handshakes that failed to reuse the control session.")).unwrap();
    static ref TLS_TICKET_KEY_ROTATIONS: IntCounter =
        register_int_counter!(opts!("ftps_ticket_key_rotations_total", "Number of session ticket key rotations performed.")).unwrap();
    static ref OCSP_CACHE_RESULTS: IntCounterVec = register_int_counter_vec!("ftps_ocsp_cache_total", "OCSP cache lookups by outcome.", &["outcome"]).unwrap();
    static ref CCC_TOTAL: IntCounter = register_int_counter!(opts!("ftps_ccc_total", "Number of successful CCC (clear command channel) downgrades.")).unwrap();
}

fn channel_label(channel: Channel) -> &'static str {
    match channel {
        Channel::Ctrl => "ctrl",
        Channel::Data => "data",
    }
}

/// Records the outcome of a handshake attempt.
pub fn observe_handshake(channel: Channel, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    TLS_HANDSHAKES_TOTAL.with_label_values(&[channel_label(channel), result]).inc();
}

/// Increments the active-secured-session gauge.
pub fn inc_active_sessions() {
    TLS_SESSIONS_ACTIVE.inc();
}

/// Decrements the active-secured-session gauge.
pub fn dec_active_sessions() {
    TLS_SESSIONS_ACTIVE.dec();
}

/// Records a data-channel session-reuse-from-control failure.
pub fn inc_session_reuse_failure() {
    TLS_SESSION_REUSE_FAILURES.inc();
}

/// Records a session ticket key ring rotation.
pub fn inc_ticket_rotation() {
    TLS_TICKET_KEY_ROTATIONS.inc();
}

/// Records an OCSP cache lookup outcome (`"hit"`, `"stale"`, `"miss"`).
pub fn observe_ocsp_cache(outcome: &str) {
    OCSP_CACHE_RESULTS.with_label_values(&[outcome]).inc();
}

/// Records a successful CCC.
pub fn inc_ccc() {
    CCC_TOTAL.inc();
}
