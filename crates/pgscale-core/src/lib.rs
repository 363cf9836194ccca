//! pgscale-core: shared types for the progressive scaling engine.
//!
//! Holds the band model (`ScalingBand`, `BandMetrics`), the finite-value
//! sanitizer every stored float passes through, the `BenchError`
//! taxonomy, and the TOML run configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::{parse_duration, BenchConfig};
pub use error::{BenchError, BenchResult};
pub use types::*;
