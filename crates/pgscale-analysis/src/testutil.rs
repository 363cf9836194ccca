//! Band fixtures for analysis tests.

use std::time::Duration;

use pgscale_core::{BandMetrics, Efficiency, ErrorStats, LatencyStats, ScalingBand, Throughput};

pub fn band(id: u32, workers: u32, connections: u32, tps: f64) -> BandMetrics {
    band_with_latency(id, workers, connections, tps, 10.0, 20.0)
}

pub fn band_with_latency(
    id: u32,
    workers: u32,
    connections: u32,
    tps: f64,
    avg_ms: f64,
    p95_ms: f64,
) -> BandMetrics {
    BandMetrics {
        band_id: id,
        band: ScalingBand::new(workers, connections),
        started_at_ms: 0,
        ended_at_ms: 10_000,
        duration: Duration::from_secs(10),
        committed: (tps * 10.0) as u64,
        aborted: 0,
        queries: Default::default(),
        throughput: Throughput {
            total_tps: tps,
            total_qps: tps * 3.0,
        },
        latency: LatencyStats {
            avg_ms,
            p50_ms: avg_ms,
            p95_ms,
            p99_ms: p95_ms,
            min_ms: avg_ms / 2.0,
            max_ms: p95_ms * 2.0,
            ..Default::default()
        },
        errors: ErrorStats::default(),
        efficiency: Efficiency {
            tps_per_worker: if workers > 0 { tps / workers as f64 } else { 0.0 },
            tps_per_connection: if connections > 0 { tps / connections as f64 } else { 0.0 },
            ..Default::default()
        },
        health_score: 1.0,
        samples: Vec::new(),
        database: None,
        latency_samples_ns: Vec::new(),
    }
}

/// Bands with the given TPS values at 10, 20, 30, ... workers and
/// twice as many connections.
pub fn series(tps: &[f64]) -> Vec<BandMetrics> {
    tps.iter()
        .enumerate()
        .map(|(i, t)| {
            let w = (i as u32 + 1) * 10;
            band(i as u32 + 1, w, w * 2, *t)
        })
        .collect()
}
