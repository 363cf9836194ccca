//! Error types for the scaling engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type BenchResult<T> = Result<T, BenchError>;

/// Errors that can occur while planning, running, or analyzing a
/// progressive scaling run.
///
/// Numerical degeneracies (empty samples, zero durations) are never
/// reported through this type; they normalize to `0.0`.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid strategy, bounds, steps, durations, or config file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The workload failed or the band deadline fired during warmup or
    /// measurement. Aborts the whole run.
    #[error("band {band_id} failed: {reason}")]
    BandExecution { band_id: u32, reason: String },

    /// Cooperative cancellation. Not a failure; the engine finalizes
    /// over the bands that completed.
    #[error("run cancelled")]
    Cancelled,

    /// Analysis was requested over too few bands.
    #[error("insufficient data: need at least {needed} bands, got {got}")]
    InsufficientData { needed: usize, got: usize },
}

impl BenchError {
    /// Shorthand for a `Configuration` error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error represents cancellation rather than failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
