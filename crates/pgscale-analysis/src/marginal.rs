//! Marginal gains (first differences) and inflection points (second
//! differences) across consecutive bands.

use serde::{Deserialize, Serialize};

use pgscale_core::{finite, BandMetrics};
use pgscale_metrics::stats::ratio;

/// |Δ²TPS| above which a band is an inflection point.
const TPS_THRESHOLD: f64 = 1.0;
const TPS_MEDIUM: f64 = 5.0;
const TPS_HIGH: f64 = 10.0;
/// |Δ²latency| (ms) above which a band is an inflection point.
const LATENCY_THRESHOLD_MS: f64 = 5.0;
const LATENCY_HIGH_MS: f64 = 20.0;

/// Change between two consecutive bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalGain {
    pub from_band: u32,
    pub to_band: u32,
    pub delta_workers: i64,
    pub delta_connections: i64,
    pub delta_tps: f64,
    /// ΔTPS / Δworkers, 0 when the worker count did not change.
    pub tps_per_worker: f64,
    /// ΔTPS / Δconnections, 0 when the connection count did not change.
    pub tps_per_connection: f64,
    /// Change in TPS-per-worker.
    pub delta_efficiency: f64,
    /// Change in mean latency (ms).
    pub delta_latency_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflectionKind {
    Acceleration,
    Deceleration,
    LatencySpike,
    LatencyImprovement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflectionPoint {
    /// Band at which the behavior changes.
    pub band_id: u32,
    pub workers: u32,
    pub connections: u32,
    pub kind: InflectionKind,
    /// The second difference that triggered detection.
    pub magnitude: f64,
    pub significance: Significance,
}

pub fn marginal_gains(bands: &[BandMetrics]) -> Vec<MarginalGain> {
    bands
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (&pair[0], &pair[1]);
            let dw = cur.workers() as i64 - prev.workers() as i64;
            let dc = cur.connections() as i64 - prev.connections() as i64;
            let dtps = finite(cur.tps() - prev.tps());

            MarginalGain {
                from_band: prev.band_id,
                to_band: cur.band_id,
                delta_workers: dw,
                delta_connections: dc,
                delta_tps: dtps,
                tps_per_worker: ratio(dtps, dw as f64),
                tps_per_connection: ratio(dtps, dc as f64),
                delta_efficiency: finite(
                    cur.efficiency.tps_per_worker - prev.efficiency.tps_per_worker,
                ),
                delta_latency_ms: finite(cur.avg_latency_ms() - prev.avg_latency_ms()),
            }
        })
        .collect()
}

/// Second differences of the gain series. The change between gain
/// `i-1` and gain `i` is attributed to the band the two gains share.
pub fn inflection_points(bands: &[BandMetrics], gains: &[MarginalGain]) -> Vec<InflectionPoint> {
    let mut points = Vec::new();

    for pair in gains.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        let Some(band) = bands.iter().find(|b| b.band_id == after.from_band) else {
            continue;
        };

        let d2_tps = finite(after.delta_tps - before.delta_tps);
        if d2_tps.abs() > TPS_THRESHOLD {
            let significance = if d2_tps.abs() > TPS_HIGH {
                Significance::High
            } else if d2_tps.abs() > TPS_MEDIUM {
                Significance::Medium
            } else {
                Significance::Low
            };
            points.push(InflectionPoint {
                band_id: band.band_id,
                workers: band.workers(),
                connections: band.connections(),
                kind: if d2_tps > 0.0 {
                    InflectionKind::Acceleration
                } else {
                    InflectionKind::Deceleration
                },
                magnitude: d2_tps,
                significance,
            });
        }

        let d2_latency = finite(after.delta_latency_ms - before.delta_latency_ms);
        if d2_latency.abs() > LATENCY_THRESHOLD_MS {
            points.push(InflectionPoint {
                band_id: band.band_id,
                workers: band.workers(),
                connections: band.connections(),
                kind: if d2_latency > 0.0 {
                    InflectionKind::LatencySpike
                } else {
                    InflectionKind::LatencyImprovement
                },
                magnitude: d2_latency,
                significance: if d2_latency.abs() > LATENCY_HIGH_MS {
                    Significance::High
                } else {
                    Significance::Medium
                },
            });
        }
    }

    points
}
