//! Band model shared across pgscale crates.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on raw latency samples retained per band.
pub const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Replace NaN and ±Infinity with `0.0`.
///
/// Every float stored in a `BandMetrics` or analysis record goes through
/// this, so serialization and downstream arithmetic never see a
/// non-finite value.
#[inline]
pub fn finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// One concurrency level: a worker count paired with a connection count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalingBand {
    pub workers: u32,
    pub connections: u32,
}

impl ScalingBand {
    pub fn new(workers: u32, connections: u32) -> Self {
        Self {
            workers,
            connections,
        }
    }
}

impl fmt::Display for ScalingBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}w/{}c", self.workers, self.connections)
    }
}

/// Per-type query counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCounts {
    pub select: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
    pub other: u64,
}

impl QueryCounts {
    pub fn total(&self) -> u64 {
        self.select + self.insert + self.update + self.delete + self.other
    }

    /// Counter-wise difference, saturating at zero.
    pub fn saturating_sub(&self, base: &QueryCounts) -> QueryCounts {
        QueryCounts {
            select: self.select.saturating_sub(base.select),
            insert: self.insert.saturating_sub(base.insert),
            update: self.update.saturating_sub(base.update),
            delete: self.delete.saturating_sub(base.delete),
            other: self.other.saturating_sub(base.other),
        }
    }
}

/// Throughput rates over the measurement window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    /// Committed transactions per second.
    pub total_tps: f64,
    /// Queries per second.
    pub total_qps: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
    pub variance_ms: f64,
    pub coefficient_of_variation: f64,
    pub confidence_interval_95: ConfidenceInterval,
    /// Number of latency observations the distribution was computed from.
    pub sample_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// Errors as a percentage of attempted transactions.
    pub error_rate: f64,
    pub total_errors: u64,
    /// Error counts by type tag.
    pub breakdown: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Efficiency {
    pub tps_per_worker: f64,
    pub tps_per_connection: f64,
    /// Percentage of worker time spent inside a transaction.
    pub worker_efficiency: f64,
    /// Percentage of connection time spent inside a transaction.
    pub connection_utilization: f64,
}

/// Server-side statistics reported by the workload, if it collects any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub cache_hit_ratio: f64,
    pub active_connections: u32,
    pub deadlocks: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub temp_bytes: u64,
}

/// Point-in-time reading taken by the in-band sampler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalSample {
    /// Milliseconds since measurement started.
    pub elapsed_ms: u64,
    pub tps: f64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
}

/// Normalized statistics for one executed band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMetrics {
    /// Sequential, starting at 1 within a run.
    pub band_id: u32,
    pub band: ScalingBand,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub duration: Duration,
    pub committed: u64,
    pub aborted: u64,
    pub queries: QueryCounts,
    pub throughput: Throughput,
    pub latency: LatencyStats,
    pub errors: ErrorStats,
    pub efficiency: Efficiency,
    /// Fraction of sampled intervals that met the health bar.
    pub health_score: f64,
    pub samples: Vec<IntervalSample>,
    pub database: Option<DatabaseStats>,
    /// Raw per-transaction latencies (ns), at most `MAX_LATENCY_SAMPLES`.
    pub latency_samples_ns: Vec<u64>,
}

impl BandMetrics {
    pub fn workers(&self) -> u32 {
        self.band.workers
    }

    pub fn connections(&self) -> u32 {
        self.band.connections
    }

    pub fn tps(&self) -> f64 {
        self.throughput.total_tps
    }

    pub fn avg_latency_ms(&self) -> f64 {
        self.latency.avg_ms
    }

    pub fn p95_latency_ms(&self) -> f64 {
        self.latency.p95_ms
    }

    pub fn error_rate(&self) -> f64 {
        self.errors.error_rate
    }

    /// True when every float in the record is finite.
    pub fn is_finite(&self) -> bool {
        let l = &self.latency;
        let e = &self.efficiency;
        let floats = [
            self.throughput.total_tps,
            self.throughput.total_qps,
            l.avg_ms,
            l.p50_ms,
            l.p95_ms,
            l.p99_ms,
            l.min_ms,
            l.max_ms,
            l.std_dev_ms,
            l.variance_ms,
            l.coefficient_of_variation,
            l.confidence_interval_95.lower,
            l.confidence_interval_95.upper,
            self.errors.error_rate,
            e.tps_per_worker,
            e.tps_per_connection,
            e.worker_efficiency,
            e.connection_utilization,
            self.health_score,
        ];
        floats.iter().all(|v| v.is_finite())
            && self.samples.iter().all(|s| {
                s.tps.is_finite() && s.error_rate.is_finite() && s.avg_latency_ms.is_finite()
            })
            && self
                .database
                .is_none_or(|d| d.cache_hit_ratio.is_finite())
    }
}
