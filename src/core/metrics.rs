// src/core/metrics.rs

//! Defines and registers Prometheus metrics for proxy monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_gauge_vec,
};

lazy_static! {
    // --- Proxy-wide Gauges ---
    /// The number of players currently holding a session on the proxy.
    pub static ref CONNECTED_PLAYERS: Gauge =
        register_gauge!("mcrelay_connected_players", "Number of currently connected players.").unwrap();
    /// Players on each backend's roster, labeled by server name.
    pub static ref SERVER_PLAYERS: GaugeVec =
        register_gauge_vec!("mcrelay_server_players", "Number of players attached to each backend server.", &["server"]).unwrap();

    // --- Proxy-wide Counters ---
    /// The total number of client connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("mcrelay_connections_received_total", "Total number of client connections received.").unwrap();
    /// The total number of completed backend switches.
    pub static ref SERVER_SWITCHES_TOTAL: Counter =
        register_counter!("mcrelay_server_switches_total", "Total number of completed backend switches.").unwrap();
    /// Packets relayed by the pumps, labeled by direction (`upstream` / `downstream`).
    pub static ref PACKETS_FORWARDED_TOTAL: CounterVec =
        register_counter_vec!("mcrelay_packets_forwarded_total", "Total number of packets relayed, labeled by direction.", &["direction"]).unwrap();
    /// Session teardowns, labeled by kind (`end_of_stream`, `kicked`, `failure`, `quit`).
    pub static ref SESSION_TEARDOWNS_TOTAL: CounterVec =
        register_counter_vec!("mcrelay_session_teardowns_total", "Total number of session teardowns, labeled by kind.", &["kind"]).unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
