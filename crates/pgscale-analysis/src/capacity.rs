//! Cumulative capacity: area under the TPS curve, band index on x.

use serde::{Deserialize, Serialize};

use pgscale_core::{finite, BandMetrics};
use pgscale_metrics::stats::ratio;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeCapacity {
    /// Trapezoidal integral of TPS over band index.
    pub total_area: f64,
    /// `total_area` per unit of x (the mean height of the curve).
    pub average_capacity: f64,
    pub peak_capacity: f64,
    /// `average_capacity / peak_capacity`.
    pub capacity_efficiency: f64,
}

pub fn cumulative_capacity(bands: &[BandMetrics]) -> CumulativeCapacity {
    if bands.len() < 2 {
        return CumulativeCapacity::default();
    }
    let total_area: f64 = bands
        .windows(2)
        .map(|pair| (pair[0].tps() + pair[1].tps()) / 2.0)
        .sum();
    let total_area = finite(total_area);
    let average_capacity = ratio(total_area, (bands.len() - 1) as f64);
    let peak_capacity = bands.iter().map(|b| b.tps()).fold(0.0, f64::max);

    CumulativeCapacity {
        total_area,
        average_capacity,
        peak_capacity,
        capacity_efficiency: ratio(average_capacity, peak_capacity),
    }
}
