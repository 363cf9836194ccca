//! Performance-region classification.
//!
//! Each triple of consecutive bands `(i-1, i, i+1)` is classified from
//! the growth on either side of band `i`. The label applies to band `i`;
//! the last band inherits the label of the final triple. Adjacent bands
//! with the same label merge into one region.

use serde::{Deserialize, Serialize};

use pgscale_core::BandMetrics;
use pgscale_metrics::stats::{mean, ratio};

/// Relative growth below which a side counts as flat.
const FLAT_GROWTH: f64 = 0.02;
/// Forward slope must keep this share of the backward slope to count
/// as consistent growth.
const SLOWDOWN: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    LinearScaling,
    DiminishingReturns,
    Saturation,
    Degradation,
    Transitional,
}

impl RegionKind {
    pub fn label(self) -> &'static str {
        match self {
            RegionKind::LinearScaling => "linear_scaling",
            RegionKind::DiminishingReturns => "diminishing_returns",
            RegionKind::Saturation => "saturation",
            RegionKind::Degradation => "degradation",
            RegionKind::Transitional => "transitional",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRegion {
    pub kind: RegionKind,
    pub start_band: u32,
    pub end_band: u32,
    pub band_count: usize,
    pub avg_tps: f64,
}

/// Label for the band in the middle of `(prev, cur, next)`.
pub fn classify_triple(prev: &BandMetrics, cur: &BandMetrics, next: &BandMetrics) -> RegionKind {
    let growth_in = ratio(cur.tps() - prev.tps(), prev.tps());
    let growth_out = ratio(next.tps() - cur.tps(), cur.tps());

    if growth_in.abs() < FLAT_GROWTH && growth_out.abs() < FLAT_GROWTH {
        return RegionKind::Saturation;
    }
    if growth_out < 0.0 {
        return RegionKind::Degradation;
    }

    let slope_in = slope(prev, cur);
    let slope_out = slope(cur, next);
    if slope_in > 0.0 && slope_out < slope_in * SLOWDOWN {
        RegionKind::DiminishingReturns
    } else if slope_in > 0.0 && slope_out > 0.0 && slope_out <= slope_in / SLOWDOWN {
        RegionKind::LinearScaling
    } else {
        RegionKind::Transitional
    }
}

/// ΔTPS per added worker, or raw ΔTPS when the worker count is unchanged.
fn slope(a: &BandMetrics, b: &BandMetrics) -> f64 {
    let dtps = b.tps() - a.tps();
    let dw = b.workers() as f64 - a.workers() as f64;
    if dw > 0.0 { ratio(dtps, dw) } else { dtps }
}

pub fn classify(bands: &[BandMetrics]) -> Vec<PerformanceRegion> {
    if bands.len() < 3 {
        return Vec::new();
    }

    let mut labels: Vec<(&BandMetrics, RegionKind)> = bands
        .windows(3)
        .map(|t| (&t[1], classify_triple(&t[0], &t[1], &t[2])))
        .collect();
    if let Some(&(_, last_kind)) = labels.last() {
        labels.push((&bands[bands.len() - 1], last_kind));
    }

    let mut regions: Vec<PerformanceRegion> = Vec::new();
    let mut members: Vec<f64> = Vec::new();
    for (band, kind) in labels {
        match regions.last_mut() {
            Some(region) if region.kind == kind => {
                region.end_band = band.band_id;
                region.band_count += 1;
            }
            _ => {
                close(&mut regions, &mut members);
                regions.push(PerformanceRegion {
                    kind,
                    start_band: band.band_id,
                    end_band: band.band_id,
                    band_count: 1,
                    avg_tps: 0.0,
                });
            }
        }
        members.push(band.tps());
    }
    close(&mut regions, &mut members);
    regions
}

fn close(regions: &mut [PerformanceRegion], members: &mut Vec<f64>) {
    if let Some(region) = regions.last_mut() {
        region.avg_tps = mean(members);
    }
    members.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::series;

    #[test]
    fn diminishing_returns_after_sharp_growth() {
        // Growth 90% then 2.6%.
        let regions = classify(&series(&[100.0, 190.0, 195.0]));
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!(r.kind, RegionKind::DiminishingReturns);
        assert_eq!((r.start_band, r.end_band), (2, 3));
        assert_eq!(r.band_count, 2);
        assert_eq!(r.avg_tps, 192.5);
    }

    #[test]
    fn steady_growth_is_linear() {
        let regions = classify(&series(&[100.0, 200.0, 300.0, 400.0]));
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, RegionKind::LinearScaling);
        assert_eq!((regions[0].start_band, regions[0].end_band), (2, 4));
    }

    #[test]
    fn flat_is_saturation_and_drop_is_degradation() {
        let bands = series(&[500.0, 505.0, 509.0, 400.0]);
        let regions = classify(&bands);
        assert_eq!(regions[0].kind, RegionKind::Saturation);
        assert_eq!(regions[0].start_band, 2);
        assert_eq!(regions[1].kind, RegionKind::Degradation);
        assert_eq!((regions[1].start_band, regions[1].end_band), (3, 4));
    }

    #[test]
    fn accelerating_growth_is_transitional() {
        let bands = series(&[100.0, 110.0, 300.0]);
        assert_eq!(classify(&bands)[0].kind, RegionKind::Transitional);
    }

    #[test]
    fn regions_are_contiguous() {
        let bands = series(&[100.0, 200.0, 300.0, 320.0, 325.0, 326.0, 250.0, 240.0]);
        let regions = classify(&bands);
        for pair in regions.windows(2) {
            assert_eq!(pair[1].start_band, pair[0].end_band + 1);
            assert_ne!(pair[0].kind, pair[1].kind);
        }
        assert_eq!(regions.first().unwrap().start_band, 2);
        assert_eq!(regions.last().unwrap().end_band, 8);
    }

    #[test]
    fn zero_baseline_does_not_divide() {
        let regions = classify(&series(&[0.0, 0.0, 0.0]));
        assert_eq!(regions[0].kind, RegionKind::Saturation);
    }
}
