//! pgscale-analysis: statistics over a completed band sequence.
//!
//! # Pipeline
//!
//! ```text
//! bands ──┬── marginal::marginal_gains ──► marginal::inflection_points
//!         ├── regression::fit_best
//!         ├── capacity::cumulative_capacity
//!         ├── queueing::estimate
//!         ├── outliers::detect
//!         └── regions::classify
//!                    │
//!                    ▼
//!             AnalysisReport (+ recommendations)
//!
//! bands ──► optimal::select ──► OperatingPoints + OptimalConfig
//! ```
//!
//! Every float in every output is finite.

pub mod capacity;
pub mod marginal;
pub mod optimal;
pub mod outliers;
pub mod queueing;
pub mod regions;
pub mod regression;
pub mod report;

#[cfg(test)]
pub(crate) mod testutil;

pub use capacity::CumulativeCapacity;
pub use marginal::{InflectionKind, InflectionPoint, MarginalGain, Significance};
pub use optimal::{select, BandRef, OperatingPoints, OptimalConfig, Selection};
pub use outliers::{Outlier, OutlierSeverity};
pub use queueing::{Bottleneck, QueueingEstimate};
pub use regions::{PerformanceRegion, RegionKind};
pub use regression::{Prediction, RegressionFit, RegressionModel};
pub use report::{analyze, AnalysisReport, MIN_BANDS};
