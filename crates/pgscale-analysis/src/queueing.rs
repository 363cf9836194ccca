//! Queueing-theory estimates per band (M/M/c).
//!
//! Each band is modeled with `c = connections` servers and arrival rate
//! `λ = TPS`. The per-server service rate `μ` comes from a reference
//! band, the one with the lowest positive mean latency, so that
//! `ρ = λ / (c·μ)` is not derived from the band's own throughput.

use serde::{Deserialize, Serialize};

use pgscale_core::{finite, BandMetrics};
use pgscale_metrics::stats::ratio;

/// Utilization above which a band is queue-bound.
const QUEUE_UTILIZATION: f64 = 0.8;
/// Observed/predicted latency ratio above which a band is IO-bound.
const IO_LATENCY_FACTOR: f64 = 3.0;
/// Error rate (%) above which a band is contention-bound.
const CONTENTION_ERROR_RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bottleneck {
    Queue,
    Io,
    Contention,
    Cpu,
}

impl Bottleneck {
    pub fn label(self) -> &'static str {
        match self {
            Bottleneck::Queue => "queue",
            Bottleneck::Io => "io",
            Bottleneck::Contention => "contention",
            Bottleneck::Cpu => "cpu",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueingEstimate {
    pub band_id: u32,
    pub servers: u32,
    /// λ, transactions per second.
    pub arrival_rate: f64,
    /// μ per server, transactions per second.
    pub service_rate: f64,
    /// ρ = λ / (c·μ).
    pub utilization: f64,
    /// Erlang-C probability that an arrival has to wait.
    pub wait_probability: f64,
    pub predicted_wait_ms: f64,
    /// Predicted wait plus mean service time.
    pub predicted_response_ms: f64,
    pub observed_latency_ms: f64,
    /// False when ρ ≥ 1; the predicted wait is then reported as 0.
    pub stable: bool,
    pub bottleneck: Bottleneck,
}

/// Per-server service rate from the lowest-latency band, or 0 when no
/// band has latency data.
pub fn reference_service_rate(bands: &[BandMetrics]) -> f64 {
    bands
        .iter()
        .map(|b| b.avg_latency_ms())
        .filter(|ms| *ms > 0.0)
        .min_by(f64::total_cmp)
        .map(|ms| ratio(1000.0, ms))
        .unwrap_or(0.0)
}

pub fn estimate(bands: &[BandMetrics]) -> Vec<QueueingEstimate> {
    let mu = reference_service_rate(bands);
    bands.iter().map(|b| estimate_band(b, mu)).collect()
}

fn estimate_band(band: &BandMetrics, mu: f64) -> QueueingEstimate {
    let servers = band.connections();
    let lambda = band.tps();
    let capacity = servers as f64 * mu;
    let utilization = ratio(lambda, capacity);
    let stable = capacity > 0.0 && utilization < 1.0;

    let (wait_probability, predicted_wait_ms) = if stable {
        let offered = ratio(lambda, mu);
        let pw = erlang_c(servers, offered);
        (pw, finite(ratio(pw, capacity - lambda) * 1000.0))
    } else {
        (if capacity > 0.0 { 1.0 } else { 0.0 }, 0.0)
    };
    let service_ms = ratio(1000.0, mu);
    let predicted_response_ms = finite(predicted_wait_ms + service_ms);
    let observed = band.avg_latency_ms();

    let bottleneck = if utilization > QUEUE_UTILIZATION {
        Bottleneck::Queue
    } else if predicted_response_ms > 0.0 && observed > IO_LATENCY_FACTOR * predicted_response_ms {
        Bottleneck::Io
    } else if band.error_rate() > CONTENTION_ERROR_RATE {
        Bottleneck::Contention
    } else {
        Bottleneck::Cpu
    };

    QueueingEstimate {
        band_id: band.band_id,
        servers,
        arrival_rate: lambda,
        service_rate: mu,
        utilization,
        wait_probability,
        predicted_wait_ms,
        predicted_response_ms,
        observed_latency_ms: observed,
        stable,
        bottleneck,
    }
}

/// Erlang-C waiting probability for `servers` servers and offered load
/// `a = λ/μ` (requires `a < servers`). Uses the Erlang-B recurrence,
/// which stays stable for large server counts.
fn erlang_c(servers: u32, a: f64) -> f64 {
    if servers == 0 || a <= 0.0 {
        return 0.0;
    }
    let mut b = 1.0;
    for k in 1..=servers {
        b = a * b / (k as f64 + a * b);
    }
    let c = servers as f64;
    finite(c * b / (c - a * (1.0 - b))).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::band_with_latency;

    #[test]
    fn erlang_c_known_values() {
        // Single server: P(wait) = ρ.
        assert!((erlang_c(1, 0.5) - 0.5).abs() < 1e-12);
        // c = 2, a = 1 → C = 1/3.
        assert!((erlang_c(2, 1.0) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(erlang_c(0, 1.0), 0.0);
        // Large pools must not overflow.
        let pw = erlang_c(500, 450.0);
        assert!(pw.is_finite() && (0.0..=1.0).contains(&pw));
    }

    #[test]
    fn utilization_uses_reference_band() {
        // Reference: 10ms service → μ = 100/s per connection.
        let bands = vec![
            band_with_latency(1, 2, 2, 50.0, 10.0, 12.0),
            band_with_latency(2, 8, 8, 700.0, 11.0, 15.0),
        ];
        let est = estimate(&bands);
        assert!((est[0].service_rate - 100.0).abs() < 1e-9);
        assert!((est[0].utilization - 0.25).abs() < 1e-9);
        assert!((est[1].utilization - 0.875).abs() < 1e-9);
        assert_eq!(est[0].bottleneck, Bottleneck::Cpu);
        assert_eq!(est[1].bottleneck, Bottleneck::Queue);
        assert!(est.iter().all(|e| e.stable));
        // Utilization is not pinned at 1.0 for every band.
        assert!(est[0].utilization < est[1].utilization);
    }

    #[test]
    fn saturated_band_is_unstable() {
        let bands = vec![
            band_with_latency(1, 1, 1, 50.0, 10.0, 12.0),
            band_with_latency(2, 4, 4, 600.0, 30.0, 60.0),
        ];
        let est = estimate(&bands);
        assert!(!est[1].stable);
        assert_eq!(est[1].predicted_wait_ms, 0.0);
        assert_eq!(est[1].bottleneck, Bottleneck::Queue);
    }

    #[test]
    fn io_and_contention_classification() {
        let mut slow = band_with_latency(2, 4, 4, 20.0, 80.0, 100.0);
        slow.errors.error_rate = 5.0;
        let mut noisy = band_with_latency(3, 4, 4, 20.0, 12.0, 15.0);
        noisy.errors.error_rate = 5.0;
        let bands = vec![band_with_latency(1, 1, 1, 10.0, 10.0, 12.0), slow, noisy];
        let est = estimate(&bands);
        assert_eq!(est[1].bottleneck, Bottleneck::Io);
        assert_eq!(est[2].bottleneck, Bottleneck::Contention);
    }

    #[test]
    fn no_latency_data() {
        let bands = vec![band_with_latency(1, 1, 1, 10.0, 0.0, 0.0)];
        let est = estimate(&bands);
        assert_eq!(est[0].service_rate, 0.0);
        assert_eq!(est[0].utilization, 0.0);
        assert!(!est[0].stable);
        assert_eq!(est[0].bottleneck, Bottleneck::Cpu);
    }
}
