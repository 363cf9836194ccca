//! Band metrics calculator: raw window counts to a `BandMetrics` record.
//!
//! Pure: no I/O, no clock reads. Calling it twice on the same input
//! yields identical output.

use std::time::Duration;

use pgscale_core::{
    finite, BandMetrics, ConfidenceInterval, DatabaseStats, Efficiency, ErrorStats,
    IntervalSample, LatencyStats, ScalingBand, Throughput, MAX_LATENCY_SAMPLES,
};

use crate::sink::RawBandCounts;
use crate::stats::{mean, percentile, ratio, variance};

/// z for a two-sided 95% interval.
const Z_95: f64 = 1.96;

/// Everything about a band the raw counts do not carry.
#[derive(Debug, Clone)]
pub struct BandContext {
    pub band_id: u32,
    pub band: ScalingBand,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    /// Length of the measurement window.
    pub duration: Duration,
    pub samples: Vec<IntervalSample>,
    pub database: Option<DatabaseStats>,
    pub health_max_error_rate: f64,
    pub health_max_latency_ms: f64,
}

/// Build the normalized statistics record for one band.
pub fn calculate_band_metrics(raw: &RawBandCounts, ctx: &BandContext) -> BandMetrics {
    let secs = ctx.duration.as_secs_f64();
    let (tps, qps) = if secs > 0.0 {
        (
            finite(raw.committed as f64 / secs),
            finite(raw.queries.total() as f64 / secs),
        )
    } else {
        (0.0, 0.0)
    };

    let attempted = raw.committed + raw.aborted;
    let error_rate = if attempted > 0 {
        finite(raw.errors as f64 / attempted as f64 * 100.0)
    } else {
        0.0
    };

    let latency = latency_stats(&raw.latencies_ns);
    let efficiency = efficiency(tps, latency.avg_ms, ctx.band);

    let samples: Vec<IntervalSample> = ctx
        .samples
        .iter()
        .map(|s| IntervalSample {
            elapsed_ms: s.elapsed_ms,
            tps: finite(s.tps),
            error_rate: finite(s.error_rate),
            avg_latency_ms: finite(s.avg_latency_ms),
        })
        .collect();

    let database = ctx.database.map(|d| DatabaseStats {
        cache_hit_ratio: finite(d.cache_hit_ratio),
        ..d
    });

    BandMetrics {
        band_id: ctx.band_id,
        band: ctx.band,
        started_at_ms: ctx.started_at_ms,
        ended_at_ms: ctx.ended_at_ms,
        duration: ctx.duration,
        committed: raw.committed,
        aborted: raw.aborted,
        queries: raw.queries,
        throughput: Throughput {
            total_tps: tps,
            total_qps: qps,
        },
        latency,
        errors: ErrorStats {
            error_rate,
            total_errors: raw.errors,
            breakdown: raw.error_breakdown.clone(),
        },
        efficiency,
        health_score: health_score(
            &samples,
            ctx.health_max_error_rate,
            ctx.health_max_latency_ms,
        ),
        samples,
        database,
        latency_samples_ns: bounded_sample(&raw.latencies_ns, MAX_LATENCY_SAMPLES),
    }
}

/// Fraction of samples at or under both the error-rate and latency bar.
/// A band without samples scores 1.0.
pub fn health_score(samples: &[IntervalSample], max_error_rate: f64, max_latency_ms: f64) -> f64 {
    if samples.is_empty() {
        return 1.0;
    }
    let healthy = samples
        .iter()
        .filter(|s| s.error_rate <= max_error_rate && s.avg_latency_ms <= max_latency_ms)
        .count();
    finite(healthy as f64 / samples.len() as f64)
}

fn latency_stats(latencies_ns: &[u64]) -> LatencyStats {
    if latencies_ns.is_empty() {
        return LatencyStats::default();
    }

    let mut sorted: Vec<f64> = latencies_ns.iter().map(|ns| *ns as f64 / 1_000_000.0).collect();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let avg = mean(&sorted);
    let var = variance(&sorted);
    let sd = finite(var.sqrt());
    let margin = if sorted.len() > 1 { finite(Z_95 * sd / n.sqrt()) } else { 0.0 };

    LatencyStats {
        avg_ms: avg,
        p50_ms: percentile(&sorted, 0.50),
        p95_ms: percentile(&sorted, 0.95),
        p99_ms: percentile(&sorted, 0.99),
        min_ms: finite(sorted[0]),
        max_ms: finite(sorted[sorted.len() - 1]),
        std_dev_ms: sd,
        variance_ms: var,
        coefficient_of_variation: ratio(sd, avg),
        confidence_interval_95: ConfidenceInterval {
            lower: finite(avg - margin),
            upper: finite(avg + margin),
        },
        sample_count: sorted.len() as u64,
    }
}

/// Little's law: TPS × mean service time is the average number of
/// transactions in flight; divided by the pool size it is the busy share.
fn efficiency(tps: f64, avg_latency_ms: f64, band: ScalingBand) -> Efficiency {
    let in_flight = tps * avg_latency_ms / 1000.0;
    let busy = |pool: u32| finite(ratio(in_flight, pool as f64) * 100.0).min(100.0);

    Efficiency {
        tps_per_worker: ratio(tps, band.workers as f64),
        tps_per_connection: ratio(tps, band.connections as f64),
        worker_efficiency: busy(band.workers),
        connection_utilization: busy(band.connections),
    }
}

/// Evenly strided subset of at most `cap` entries, in recording order.
fn bounded_sample(values: &[u64], cap: usize) -> Vec<u64> {
    if values.len() <= cap {
        return values.to_vec();
    }
    (0..cap).map(|i| values[i * values.len() / cap]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgscale_core::QueryCounts;
    use std::collections::BTreeMap;

    fn ctx(workers: u32, connections: u32, secs: u64) -> BandContext {
        BandContext {
            band_id: 1,
            band: ScalingBand::new(workers, connections),
            started_at_ms: 1_000,
            ended_at_ms: 1_000 + secs * 1000,
            duration: Duration::from_secs(secs),
            samples: Vec::new(),
            database: None,
            health_max_error_rate: 1.0,
            health_max_latency_ms: 100.0,
        }
    }

    fn raw_with_latencies_ms(ms: &[u64]) -> RawBandCounts {
        RawBandCounts {
            committed: ms.len() as u64,
            latencies_ns: ms.iter().map(|m| m * 1_000_000).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn tps_and_error_rate() {
        let raw = RawBandCounts {
            committed: 1000,
            aborted: 0,
            queries: QueryCounts {
                select: 3000,
                update: 2000,
                ..Default::default()
            },
            ..Default::default()
        };
        let m = calculate_band_metrics(&raw, &ctx(10, 5, 10));
        assert_eq!(m.tps(), 100.0);
        assert_eq!(m.throughput.total_qps, 500.0);
        assert_eq!(m.error_rate(), 0.0);
        assert_eq!(m.efficiency.tps_per_worker, 10.0);
        assert_eq!(m.efficiency.tps_per_connection, 20.0);
    }

    #[test]
    fn error_rate_is_percentage_of_attempts() {
        let mut breakdown = BTreeMap::new();
        breakdown.insert("deadlock".to_string(), 5);
        let raw = RawBandCounts {
            committed: 90,
            aborted: 10,
            errors: 5,
            error_breakdown: breakdown,
            ..Default::default()
        };
        let m = calculate_band_metrics(&raw, &ctx(1, 1, 1));
        assert_eq!(m.error_rate(), 5.0);
        assert_eq!(m.errors.breakdown.get("deadlock"), Some(&5));
    }

    #[test]
    fn latency_distribution() {
        let raw = raw_with_latencies_ms(&[50, 10, 40, 20, 30]);
        let m = calculate_band_metrics(&raw, &ctx(1, 1, 1));
        let l = m.latency;
        assert_eq!(l.p50_ms, 30.0);
        assert_eq!(l.avg_ms, 30.0);
        assert_eq!(l.min_ms, 10.0);
        assert_eq!(l.max_ms, 50.0);
        assert!((l.std_dev_ms - 14.14).abs() < 0.01);
        assert_eq!(l.variance_ms, 200.0);
        assert!(l.confidence_interval_95.lower < l.avg_ms);
        assert!(l.confidence_interval_95.upper > l.avg_ms);
        assert_eq!(l.sample_count, 5);
    }

    #[test]
    fn zero_duration_and_empty_latencies() {
        let raw = RawBandCounts {
            committed: 10,
            ..Default::default()
        };
        let m = calculate_band_metrics(&raw, &ctx(4, 4, 0));
        assert_eq!(m.tps(), 0.0);
        assert_eq!(m.throughput.total_qps, 0.0);
        assert_eq!(m.latency, LatencyStats::default());
        assert!(m.is_finite());
    }

    #[test]
    fn zero_pool_sizes_stay_finite() {
        let raw = raw_with_latencies_ms(&[5, 5]);
        let m = calculate_band_metrics(&raw, &ctx(0, 0, 1));
        assert_eq!(m.efficiency.tps_per_worker, 0.0);
        assert!(m.is_finite());
    }

    #[test]
    fn efficiency_follows_littles_law() {
        // 100 tps at 40ms → 4 in flight; 8 workers → 50% busy.
        let raw = RawBandCounts {
            committed: 100,
            latencies_ns: vec![40_000_000; 100],
            ..Default::default()
        };
        let m = calculate_band_metrics(&raw, &ctx(8, 4, 1));
        assert!((m.efficiency.worker_efficiency - 50.0).abs() < 1e-9);
        assert!((m.efficiency.connection_utilization - 100.0).abs() < 1e-9);
    }

    #[test]
    fn calculator_is_pure() {
        let raw = raw_with_latencies_ms(&[3, 9, 1, 7, 7, 2]);
        let c = ctx(3, 2, 2);
        assert_eq!(calculate_band_metrics(&raw, &c), calculate_band_metrics(&raw, &c));
    }

    #[test]
    fn latency_sample_is_bounded() {
        let raw = RawBandCounts {
            committed: 25_000,
            latencies_ns: (0..25_000).collect(),
            ..Default::default()
        };
        let m = calculate_band_metrics(&raw, &ctx(1, 1, 1));
        assert_eq!(m.latency_samples_ns.len(), MAX_LATENCY_SAMPLES);
        assert_eq!(m.latency.sample_count, 25_000);
        assert_eq!(m.latency_samples_ns[0], 0);
    }

    #[test]
    fn health_score_counts_good_intervals() {
        let good = IntervalSample {
            elapsed_ms: 1000,
            tps: 50.0,
            error_rate: 0.0,
            avg_latency_ms: 10.0,
        };
        let slow = IntervalSample {
            avg_latency_ms: 500.0,
            ..good
        };
        let failing = IntervalSample {
            error_rate: 20.0,
            ..good
        };
        assert_eq!(health_score(&[], 1.0, 100.0), 1.0);
        assert_eq!(health_score(&[good, slow, failing, good], 1.0, 100.0), 0.5);
    }

    #[test]
    fn non_finite_inputs_are_sanitized() {
        let mut c = ctx(1, 1, 1);
        c.samples.push(IntervalSample {
            elapsed_ms: 0,
            tps: f64::NAN,
            error_rate: f64::INFINITY,
            avg_latency_ms: 1.0,
        });
        c.database = Some(DatabaseStats {
            cache_hit_ratio: f64::NAN,
            ..Default::default()
        });
        let m = calculate_band_metrics(&RawBandCounts::default(), &c);
        assert!(m.is_finite());
        assert_eq!(m.samples[0].tps, 0.0);
    }
}
