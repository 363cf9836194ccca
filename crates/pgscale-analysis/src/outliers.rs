//! Z-score outlier detection over per-band metric series.

use serde::{Deserialize, Serialize};

use pgscale_core::BandMetrics;
use pgscale_metrics::stats::{mean, z_scores};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierSeverity {
    Mild,
    Moderate,
    Extreme,
}

impl OutlierSeverity {
    fn from_z(z: f64) -> Option<Self> {
        let z = z.abs();
        if z > 3.0 {
            Some(Self::Extreme)
        } else if z > 2.5 {
            Some(Self::Moderate)
        } else if z > 2.0 {
            Some(Self::Mild)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    pub band_id: u32,
    /// Series name: "tps", "avg_latency_ms", "p95_latency_ms", "error_rate".
    pub metric: String,
    pub value: f64,
    pub series_mean: f64,
    pub z_score: f64,
    pub severity: OutlierSeverity,
}

type Series = (&'static str, fn(&BandMetrics) -> f64);

const SERIES: [Series; 4] = [
    ("tps", BandMetrics::tps),
    ("avg_latency_ms", BandMetrics::avg_latency_ms),
    ("p95_latency_ms", BandMetrics::p95_latency_ms),
    ("error_rate", BandMetrics::error_rate),
];

pub fn detect(bands: &[BandMetrics]) -> Vec<Outlier> {
    let mut outliers = Vec::new();
    if bands.len() < 3 {
        return outliers;
    }

    for (name, extract) in SERIES {
        let values: Vec<f64> = bands.iter().map(extract).collect();
        let m = mean(&values);
        for ((band, value), z) in bands.iter().zip(&values).zip(z_scores(&values)) {
            if let Some(severity) = OutlierSeverity::from_z(z) {
                outliers.push(Outlier {
                    band_id: band.band_id,
                    metric: name.to_string(),
                    value: *value,
                    series_mean: m,
                    z_score: z,
                    severity,
                });
            }
        }
    }
    outliers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::series;

    #[test]
    fn spike_is_flagged() {
        let mut tps = vec![100.0; 11];
        tps[6] = 400.0;
        let bands = series(&tps);
        let found = detect(&bands);
        assert_eq!(found.len(), 1);
        let o = &found[0];
        assert_eq!(o.band_id, 7);
        assert_eq!(o.metric, "tps");
        // z = sqrt(n - 1) for a single spike in an otherwise constant series.
        assert!((o.z_score - 10f64.sqrt()).abs() < 1e-9);
        assert_eq!(o.severity, OutlierSeverity::Extreme);
    }

    #[test]
    fn severity_tiers() {
        assert_eq!(OutlierSeverity::from_z(2.1), Some(OutlierSeverity::Mild));
        assert_eq!(OutlierSeverity::from_z(-2.7), Some(OutlierSeverity::Moderate));
        assert_eq!(OutlierSeverity::from_z(3.5), Some(OutlierSeverity::Extreme));
        assert_eq!(OutlierSeverity::from_z(1.9), None);
    }

    #[test]
    fn smooth_series_has_none() {
        assert!(detect(&series(&[100.0, 110.0, 120.0, 130.0, 140.0])).is_empty());
        assert!(detect(&series(&[100.0, 5000.0])).is_empty());
    }
}
