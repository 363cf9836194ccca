//! Optimal operating point selection.
//!
//! Picks the sweet spot, the diminishing-returns point, the overload
//! point, and an overall recommended configuration from raw band results.

use serde::{Deserialize, Serialize};

use pgscale_core::{finite, BandMetrics};
use pgscale_metrics::stats::ratio;

/// Marginal TPS per added connection below which returns are diminishing.
const DIMINISHING_GAIN: f64 = 20.0;
/// Share of peak TPS the most efficient band must reach to be chosen.
const PEAK_SHARE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandRef {
    pub band_id: u32,
    pub workers: u32,
    pub connections: u32,
    pub tps: f64,
    pub p95_latency_ms: f64,
}

impl From<&BandMetrics> for BandRef {
    fn from(b: &BandMetrics) -> Self {
        Self {
            band_id: b.band_id,
            workers: b.workers(),
            connections: b.connections(),
            tps: b.tps(),
            p95_latency_ms: b.p95_latency_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoints {
    pub sweet_spot: Option<BandRef>,
    pub diminishing_returns: Option<BandRef>,
    pub overload: Option<BandRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalConfig {
    pub band_id: u32,
    pub workers: u32,
    pub connections: u32,
    pub tps: f64,
    pub tps_per_worker: f64,
    pub p95_latency_ms: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub points: OperatingPoints,
    pub optimal: Option<OptimalConfig>,
    /// Most important first.
    pub recommendations: Vec<String>,
}

pub fn select(bands: &[BandMetrics]) -> Selection {
    let points = OperatingPoints {
        sweet_spot: sweet_spot(bands).map(BandRef::from),
        diminishing_returns: diminishing_returns(bands).map(BandRef::from),
        overload: overload(bands).map(BandRef::from),
    };
    let optimal = optimal_config(bands);
    let recommendations = rank(&points, optimal.as_ref());
    Selection {
        points,
        optimal,
        recommendations,
    }
}

/// Throughput per worker discounted by tail latency.
pub fn sweet_spot_score(band: &BandMetrics) -> f64 {
    let per_worker = ratio(band.tps(), band.workers() as f64);
    finite(per_worker / (1.0 + band.p95_latency_ms() / 100.0))
}

pub fn sweet_spot(bands: &[BandMetrics]) -> Option<&BandMetrics> {
    first_max_by(bands, sweet_spot_score)
}

/// First band from the third onward whose marginal gain per added
/// connection (per worker if connections did not move) drops below 20.
pub fn diminishing_returns(bands: &[BandMetrics]) -> Option<&BandMetrics> {
    (2..bands.len()).map(|i| (&bands[i - 1], &bands[i])).find_map(|(prev, cur)| {
        let dtps = cur.tps() - prev.tps();
        let dc = cur.connections() as f64 - prev.connections() as f64;
        let dw = cur.workers() as f64 - prev.workers() as f64;
        let gain = if dc != 0.0 {
            ratio(dtps, dc)
        } else if dw != 0.0 {
            ratio(dtps, dw)
        } else {
            return None;
        };
        (gain < DIMINISHING_GAIN).then_some(cur)
    })
}

/// First band whose TPS is lower than the band before it.
pub fn overload(bands: &[BandMetrics]) -> Option<&BandMetrics> {
    bands
        .windows(2)
        .find(|pair| pair[1].tps() < pair[0].tps())
        .map(|pair| &pair[1])
}

pub fn optimal_config(bands: &[BandMetrics]) -> Option<OptimalConfig> {
    let efficient = first_max_by(bands, |b| b.efficiency.tps_per_worker)?;
    let peak = first_max_by(bands, BandMetrics::tps)?;
    let share = ratio(efficient.tps(), peak.tps());

    let (chosen, reasoning) = if efficient.band_id == peak.band_id {
        (
            peak,
            format!(
                "band {} ({}) is both the most efficient and the highest-throughput band at {:.1} TPS",
                peak.band_id,
                peak.band,
                peak.tps()
            ),
        )
    } else if share >= PEAK_SHARE {
        (
            efficient,
            format!(
                "band {} ({}) delivers {:.1} TPS per worker and reaches {:.0}% of peak throughput ({:.1} TPS at band {})",
                efficient.band_id,
                efficient.band,
                efficient.efficiency.tps_per_worker,
                share * 100.0,
                peak.tps(),
                peak.band_id
            ),
        )
    } else {
        (
            peak,
            format!(
                "band {} ({}) reaches peak throughput of {:.1} TPS; the most efficient band {} only reaches {:.0}% of it",
                peak.band_id,
                peak.band,
                peak.tps(),
                efficient.band_id,
                share * 100.0
            ),
        )
    };

    Some(OptimalConfig {
        band_id: chosen.band_id,
        workers: chosen.workers(),
        connections: chosen.connections(),
        tps: chosen.tps(),
        tps_per_worker: chosen.efficiency.tps_per_worker,
        p95_latency_ms: chosen.p95_latency_ms(),
        reasoning,
    })
}

fn rank(points: &OperatingPoints, optimal: Option<&OptimalConfig>) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(o) = optimal {
        out.push(format!(
            "Run at {} workers / {} connections: {}",
            o.workers, o.connections, o.reasoning
        ));
    }
    if let Some(s) = &points.sweet_spot
        && optimal.is_none_or(|o| o.band_id != s.band_id)
    {
        out.push(format!(
            "Best throughput/latency balance at {} workers / {} connections ({:.1} TPS, p95 {:.1}ms)",
            s.workers, s.connections, s.tps, s.p95_latency_ms
        ));
    }
    if let Some(d) = &points.diminishing_returns {
        out.push(format!(
            "Marginal gains fall below {DIMINISHING_GAIN:.0} TPS per added connection at {} workers / {} connections; more concurrency is unlikely to pay off",
            d.workers, d.connections
        ));
    }
    if let Some(o) = &points.overload {
        out.push(format!(
            "Throughput drops at {} workers / {} connections ({:.1} TPS); the system is overloaded past this point",
            o.workers, o.connections, o.tps
        ));
    }
    out
}

/// Maximum by key, keeping the earliest band on ties.
fn first_max_by(
    bands: &[BandMetrics],
    key: impl Fn(&BandMetrics) -> f64,
) -> Option<&BandMetrics> {
    bands
        .iter()
        .reduce(|best, b| if key(b) > key(best) { b } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{band_with_latency, series};

    #[test]
    fn sweet_spot_balances_latency() {
        let bands = vec![
            // 10 tps/worker, p95 100 → 5.0
            band_with_latency(1, 10, 10, 100.0, 50.0, 100.0),
            // 8 tps/worker, p95 0 → 8.0
            band_with_latency(2, 20, 20, 160.0, 1.0, 0.0),
            // 9 tps/worker, p95 300 → 2.25
            band_with_latency(3, 30, 30, 270.0, 100.0, 300.0),
        ];
        assert_eq!(sweet_spot(&bands).unwrap().band_id, 2);
    }

    #[test]
    fn diminishing_point_starts_at_third_band() {
        // Connections step by 20: gains of 4.5 then 0.25 per connection.
        let bands = series(&[100.0, 190.0, 195.0]);
        assert_eq!(diminishing_returns(&bands).unwrap().band_id, 3);

        // Steep growth throughout: 100 TPS per connection.
        let steep = series(&[1000.0, 3000.0, 5000.0]);
        assert!(diminishing_returns(&steep).is_none());
    }

    #[test]
    fn overload_is_first_drop() {
        let bands = series(&[100.0, 200.0, 180.0, 150.0]);
        assert_eq!(overload(&bands).unwrap().band_id, 3);
        assert!(overload(&series(&[1.0, 2.0, 3.0])).is_none());
    }

    #[test]
    fn efficient_band_chosen_near_peak() {
        // tps/worker: 9.0, 4.5, 3.33; band 1 is 90% of peak.
        let bands = series(&[90.0, 90.0, 100.0]);
        let o = optimal_config(&bands).unwrap();
        assert_eq!(o.band_id, 1);
        assert!(o.reasoning.contains("90% of peak"));
    }

    #[test]
    fn peak_band_chosen_when_efficient_band_is_weak() {
        // Band 1 is only 50% of peak.
        let bands = series(&[100.0, 150.0, 200.0]);
        let o = optimal_config(&bands).unwrap();
        assert_eq!(o.band_id, 3);
        assert!(o.reasoning.contains("peak throughput"));
    }

    #[test]
    fn selection_ranks_optimal_first() {
        let bands = series(&[100.0, 190.0, 195.0, 150.0]);
        let s = select(&bands);
        assert!(s.recommendations[0].starts_with("Run at"));
        assert_eq!(s.points.overload.as_ref().unwrap().band_id, 4);
        assert!(s.recommendations.iter().any(|r| r.contains("overloaded")));
    }

    #[test]
    fn empty_input() {
        let s = select(&[]);
        assert!(s.optimal.is_none());
        assert!(s.recommendations.is_empty());
    }
}
