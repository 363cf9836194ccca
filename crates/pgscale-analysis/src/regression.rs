//! Least-squares fits of throughput against worker count.
//!
//! Three candidate models are fitted and the one with the highest R²
//! (measured on the original TPS scale) is selected:
//!
//! ```text
//! linear       TPS = a·w + b
//! logarithmic  TPS = a·ln(w) + b
//! exponential  TPS = a·e^(b·w)     (fitted as ln TPS = ln a + b·w)
//! ```

use serde::{Deserialize, Serialize};

use pgscale_core::{finite, BandMetrics};
use pgscale_metrics::stats::{mean, ratio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionModel {
    Linear,
    Logarithmic,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub band_id: u32,
    pub workers: u32,
    pub actual: f64,
    pub predicted: f64,
    pub residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub model: RegressionModel,
    pub a: f64,
    pub b: f64,
    pub r_squared: f64,
    pub rmse: f64,
    pub predictions: Vec<Prediction>,
}

impl RegressionModel {
    pub fn predict(self, a: f64, b: f64, workers: f64) -> f64 {
        let y = match self {
            RegressionModel::Linear => a * workers + b,
            RegressionModel::Logarithmic => {
                if workers > 0.0 {
                    a * workers.ln() + b
                } else {
                    b
                }
            }
            RegressionModel::Exponential => a * (b * workers).exp(),
        };
        finite(y)
    }

    pub fn label(self) -> &'static str {
        match self {
            RegressionModel::Linear => "linear",
            RegressionModel::Logarithmic => "logarithmic",
            RegressionModel::Exponential => "exponential",
        }
    }
}

/// Fit every applicable model.
pub fn fit_all(bands: &[BandMetrics]) -> Vec<RegressionFit> {
    if bands.len() < 2 {
        return Vec::new();
    }
    let xs: Vec<f64> = bands.iter().map(|b| b.workers() as f64).collect();
    let ys: Vec<f64> = bands.iter().map(|b| b.tps()).collect();

    let mut fits = Vec::with_capacity(3);

    let (a, b) = least_squares(&xs, &ys);
    fits.push(evaluate(RegressionModel::Linear, a, b, bands));

    if xs.iter().all(|x| *x > 0.0) {
        let ln_x: Vec<f64> = xs.iter().map(|x| x.ln()).collect();
        let (a, b) = least_squares(&ln_x, &ys);
        fits.push(evaluate(RegressionModel::Logarithmic, a, b, bands));
    }

    if ys.iter().all(|y| *y > 0.0) {
        let ln_y: Vec<f64> = ys.iter().map(|y| y.ln()).collect();
        let (slope, intercept) = least_squares(&xs, &ln_y);
        fits.push(evaluate(
            RegressionModel::Exponential,
            finite(intercept.exp()),
            slope,
            bands,
        ));
    }

    fits
}

/// The candidate with the highest R². Ties keep the simpler model.
pub fn fit_best(bands: &[BandMetrics]) -> Option<RegressionFit> {
    fit_all(bands)
        .into_iter()
        .reduce(|best, fit| if fit.r_squared > best.r_squared { fit } else { best })
}

/// Ordinary least squares `y = slope·x + intercept`. A degenerate x
/// range gives a flat line through the mean.
fn least_squares(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let mx = mean(xs);
    let my = mean(ys);
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let slope = ratio(sxy, sxx);
    (slope, finite(my - slope * mx))
}

fn evaluate(model: RegressionModel, a: f64, b: f64, bands: &[BandMetrics]) -> RegressionFit {
    let predictions: Vec<Prediction> = bands
        .iter()
        .map(|band| {
            let actual = band.tps();
            let predicted = model.predict(a, b, band.workers() as f64);
            Prediction {
                band_id: band.band_id,
                workers: band.workers(),
                actual,
                predicted,
                residual: finite(actual - predicted),
            }
        })
        .collect();

    let actual: Vec<f64> = predictions.iter().map(|p| p.actual).collect();
    let my = mean(&actual);
    let ss_res: f64 = predictions.iter().map(|p| p.residual.powi(2)).sum();
    let ss_tot: f64 = actual.iter().map(|y| (y - my).powi(2)).sum();

    let r_squared = if ss_tot > 0.0 {
        finite(1.0 - ss_res / ss_tot)
    } else if ss_res < 1e-9 {
        1.0
    } else {
        0.0
    };

    RegressionFit {
        model,
        a: finite(a),
        b: finite(b),
        r_squared,
        rmse: finite((ss_res / predictions.len() as f64).sqrt()),
        predictions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::band;

    fn bands_from(points: &[(u32, f64)]) -> Vec<BandMetrics> {
        points
            .iter()
            .enumerate()
            .map(|(i, (w, tps))| band(i as u32 + 1, *w, *w, *tps))
            .collect()
    }

    #[test]
    fn linear_data_selects_linear() {
        let bands = bands_from(&[(1, 15.0), (2, 25.0), (3, 35.0), (4, 45.0)]);
        let fit = fit_best(&bands).unwrap();
        assert_eq!(fit.model, RegressionModel::Linear);
        assert!((fit.a - 10.0).abs() < 1e-9);
        assert!((fit.b - 5.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!(fit.rmse < 1e-9);
        assert_eq!(fit.predictions.len(), 4);
    }

    #[test]
    fn logarithmic_data_selects_logarithmic() {
        let bands: Vec<BandMetrics> = [1u32, 2, 4, 8, 16]
            .iter()
            .enumerate()
            .map(|(i, w)| band(i as u32 + 1, *w, *w, 100.0 * (*w as f64).ln() + 50.0))
            .collect();
        let fit = fit_best(&bands).unwrap();
        assert_eq!(fit.model, RegressionModel::Logarithmic);
        assert!((fit.a - 100.0).abs() < 1e-6);
    }

    #[test]
    fn exponential_data_selects_exponential() {
        let bands: Vec<BandMetrics> = (1u32..=5)
            .map(|w| band(w, w, w, 3.0 * (0.7 * w as f64).exp()))
            .collect();
        let fit = fit_best(&bands).unwrap();
        assert_eq!(fit.model, RegressionModel::Exponential);
        assert!((fit.a - 3.0).abs() < 1e-6);
        assert!((fit.b - 0.7).abs() < 1e-6);
    }

    #[test]
    fn zero_tps_skips_exponential() {
        let bands = bands_from(&[(1, 0.0), (2, 10.0), (3, 20.0)]);
        let fits = fit_all(&bands);
        assert!(fits.iter().all(|f| f.model != RegressionModel::Exponential));
    }

    #[test]
    fn constant_workers_stay_finite() {
        let bands = bands_from(&[(4, 100.0), (4, 120.0), (4, 110.0)]);
        for fit in fit_all(&bands) {
            assert!(fit.a.is_finite() && fit.b.is_finite());
            assert!(fit.r_squared.is_finite() && fit.rmse.is_finite());
        }
    }

    #[test]
    fn too_few_bands() {
        assert!(fit_best(&bands_from(&[(1, 10.0)])).is_none());
    }
}
