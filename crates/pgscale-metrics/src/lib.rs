//! pgscale-metrics: per-band measurement for the scaling engine.
//!
//! Worker tasks write into a shared `MetricsSink`; the band executor
//! reads cumulative counter snapshots from it and, once all workers have
//! stopped, turns the measured delta into a `BandMetrics` record.
//!
//! # Architecture
//!
//! ```text
//! MetricsSink
//!   ├── record_commit() / record_abort() / record_query()  ← workers
//!   ├── record_latency() / record_error()                  ← workers
//!   ├── counters() → CounterSnapshot (baseline)
//!   └── window_since(baseline) → RawBandCounts
//!
//! calculate_band_metrics(RawBandCounts, BandContext) → BandMetrics
//! ```

pub mod band;
pub mod sink;
pub mod stats;

pub use band::{calculate_band_metrics, health_score, BandContext};
pub use sink::{CounterSnapshot, MetricsSink, QueryKind, RawBandCounts};
