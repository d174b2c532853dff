// SPDX-License-Identifier: MIT

//! Prometheus metrics for connection pool monitoring.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

/// Gauges, counters and histograms updated by the connection pool.
///
/// Optional: pass an instance through
/// [`Options::pool_metrics`](crate::Options) to have the pool keep them
/// current alongside its own [`PoolStats`](crate::PoolStats) counters.
#[derive(Clone, Debug)]
pub struct PoolMetrics {
    /// Connections currently checked out.
    pub active_connections: IntGauge,
    /// Connections idle in the pool.
    pub idle_connections: IntGauge,
    /// Connections dialed, labeled by status ("success" or "error").
    pub connections_created: IntCounterVec,
    /// Time spent acquiring a connection, labeled by outcome
    /// ("reused" or "created").
    pub acquire_duration: HistogramVec,
    /// Connection-level errors, labeled by error type
    /// ("timeout", "broken", "creation_failed").
    pub connection_errors: IntCounterVec,
}

impl PoolMetrics {
    /// Creates the metrics and registers them with `registry`.
    ///
    /// # Arguments
    /// * `prefix` - Prefix for metric names (e.g. "myapp")
    /// * `registry` - Prometheus registry to register with
    pub fn new(prefix: &str, registry: &Registry) -> Result<Self, prometheus::Error> {
        let active_connections = IntGauge::with_opts(Opts::new(
            format!("{prefix}_skyhash_active_connections"),
            "Number of checked-out connections to the server",
        ))?;

        let idle_connections = IntGauge::with_opts(Opts::new(
            format!("{prefix}_skyhash_idle_connections"),
            "Number of idle connections to the server",
        ))?;

        let connections_created = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_skyhash_connections_created_total"),
                "Total number of connections dialed",
            ),
            &["status"],
        )?;

        let acquire_duration = HistogramVec::new(
            HistogramOpts::new(
                format!("{prefix}_skyhash_connection_acquire_duration_seconds"),
                "Time spent acquiring a connection from the pool",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["outcome"],
        )?;

        let connection_errors = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_skyhash_connection_errors_total"),
                "Total number of connection-level errors",
            ),
            &["error_type"],
        )?;

        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(idle_connections.clone()))?;
        registry.register(Box::new(connections_created.clone()))?;
        registry.register(Box::new(acquire_duration.clone()))?;
        registry.register(Box::new(connection_errors.clone()))?;

        Ok(PoolMetrics {
            active_connections,
            idle_connections,
            connections_created,
            acquire_duration,
            connection_errors,
        })
    }
}
