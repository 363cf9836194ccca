//! Analysis report: runs every analysis over a completed band list.

use serde::{Deserialize, Serialize};
use tracing::debug;

use pgscale_core::{BandMetrics, BenchError, BenchResult};

use crate::capacity::{cumulative_capacity, CumulativeCapacity};
use crate::marginal::{
    inflection_points, marginal_gains, InflectionKind, InflectionPoint, MarginalGain, Significance,
};
use crate::outliers::{self, Outlier};
use crate::queueing::{self, QueueingEstimate};
use crate::regions::{self, PerformanceRegion, RegionKind};
use crate::regression::{fit_all, RegressionFit};

/// Fewest bands any analysis is attempted on.
pub const MIN_BANDS: usize = 2;

/// Utilization above which a recommendation is emitted.
const HIGH_UTILIZATION: f64 = 0.8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub band_count: usize,
    pub marginal_gains: Vec<MarginalGain>,
    pub inflection_points: Vec<InflectionPoint>,
    /// Best-fit model by R².
    pub regression: Option<RegressionFit>,
    pub candidate_fits: Vec<RegressionFit>,
    pub capacity: CumulativeCapacity,
    pub queueing: Vec<QueueingEstimate>,
    pub outliers: Vec<Outlier>,
    pub regions: Vec<PerformanceRegion>,
    pub recommendations: Vec<String>,
}

impl AnalysisReport {
    pub fn is_empty(&self) -> bool {
        self.band_count == 0
    }

    /// True when no float anywhere in the report is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        let gains = self.marginal_gains.iter().all(|g| {
            [
                g.delta_tps,
                g.tps_per_worker,
                g.tps_per_connection,
                g.delta_efficiency,
                g.delta_latency_ms,
            ]
            .iter()
            .all(|v| v.is_finite())
        });
        let inflections = self.inflection_points.iter().all(|p| p.magnitude.is_finite());
        let fits = self
            .regression
            .iter()
            .chain(&self.candidate_fits)
            .all(|f| {
                [f.a, f.b, f.r_squared, f.rmse].iter().all(|v| v.is_finite())
                    && f.predictions.iter().all(|p| {
                        p.actual.is_finite() && p.predicted.is_finite() && p.residual.is_finite()
                    })
            });
        let c = &self.capacity;
        let capacity = [
            c.total_area,
            c.average_capacity,
            c.peak_capacity,
            c.capacity_efficiency,
        ]
        .iter()
        .all(|v| v.is_finite());
        let queueing = self.queueing.iter().all(|q| {
            [
                q.arrival_rate,
                q.service_rate,
                q.utilization,
                q.wait_probability,
                q.predicted_wait_ms,
                q.predicted_response_ms,
                q.observed_latency_ms,
            ]
            .iter()
            .all(|v| v.is_finite())
        });
        let outliers = self
            .outliers
            .iter()
            .all(|o| o.value.is_finite() && o.series_mean.is_finite() && o.z_score.is_finite());
        let regions = self.regions.iter().all(|r| r.avg_tps.is_finite());

        gains && inflections && fits && capacity && queueing && outliers && regions
    }
}

/// Analyze an ordered band list. Fewer than `MIN_BANDS` bands is an
/// `InsufficientData` error; sub-analyses that need three bands return
/// empty results for two.
pub fn analyze(bands: &[BandMetrics]) -> BenchResult<AnalysisReport> {
    if bands.len() < MIN_BANDS {
        return Err(BenchError::InsufficientData {
            needed: MIN_BANDS,
            got: bands.len(),
        });
    }

    let gains = marginal_gains(bands);
    let inflections = inflection_points(bands, &gains);
    let candidate_fits = fit_all(bands);
    let regression = candidate_fits
        .iter()
        .cloned()
        .reduce(|best, fit| if fit.r_squared > best.r_squared { fit } else { best });

    let mut report = AnalysisReport {
        band_count: bands.len(),
        marginal_gains: gains,
        inflection_points: inflections,
        regression,
        candidate_fits,
        capacity: cumulative_capacity(bands),
        queueing: queueing::estimate(bands),
        outliers: outliers::detect(bands),
        regions: regions::classify(bands),
        recommendations: Vec::new(),
    };
    report.recommendations = recommendations(&report, bands);

    debug!(
        bands = report.band_count,
        inflections = report.inflection_points.len(),
        regions = report.regions.len(),
        outliers = report.outliers.len(),
        model = report.regression.as_ref().map(|f| f.model.label()),
        "analysis complete"
    );
    Ok(report)
}

fn recommendations(report: &AnalysisReport, bands: &[BandMetrics]) -> Vec<String> {
    let mut out = Vec::new();

    for p in report
        .inflection_points
        .iter()
        .filter(|p| p.significance == Significance::High)
    {
        let at = format!(
            "band {} ({} workers / {} connections)",
            p.band_id, p.workers, p.connections
        );
        out.push(match p.kind {
            InflectionKind::Deceleration => format!(
                "Throughput growth decelerates sharply at {at}; each added worker beyond it buys less"
            ),
            InflectionKind::Acceleration => format!(
                "Throughput growth accelerates at {at}; the range above it is worth exploring in finer steps"
            ),
            InflectionKind::LatencySpike => format!(
                "Latency jumps at {at} ({:+.1}ms); check lock contention and IO wait",
                p.magnitude
            ),
            InflectionKind::LatencyImprovement => format!(
                "Latency improves at {at} ({:+.1}ms); warm caches or connection reuse may be taking effect",
                p.magnitude
            ),
        });
    }

    if let Some(q) = report
        .queueing
        .iter()
        .find(|q| q.utilization > HIGH_UTILIZATION)
    {
        let band = bands.iter().find(|b| b.band_id == q.band_id);
        out.push(format!(
            "Band {} runs at {:.0}% estimated utilization ({} bottleneck); keep concurrency below {}",
            q.band_id,
            q.utilization * 100.0,
            q.bottleneck.label(),
            band.map(|b| b.band.to_string()).unwrap_or_default()
        ));
    }

    let last_band = bands.last().map(|b| b.band_id);
    for r in &report.regions {
        match r.kind {
            RegionKind::Degradation => out.push(format!(
                "Throughput degrades from band {} to band {}; reduce concurrency below the start of this region",
                r.start_band, r.end_band
            )),
            RegionKind::LinearScaling if Some(r.end_band) == last_band => out.push(format!(
                "Throughput still scales linearly at band {}; the system may sustain more concurrency than tested",
                r.end_band
            )),
            RegionKind::LinearScaling => out.push(format!(
                "Linear scaling from band {} to band {}",
                r.start_band, r.end_band
            )),
            _ => {}
        }
    }

    if out.is_empty() {
        out.push(
            "No significant scaling anomalies detected; throughput behaves consistently across the tested range"
                .to_string(),
        );
    }
    out
}
