//! Scaling strategies: ordered `(workers, connections)` band sequences.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use pgscale_core::{BenchError, BenchResult, ScalingBand};

/// How the band sequence walks the worker and connection ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingStrategy {
    /// Cross product of two arithmetic progressions.
    Linear,
    /// Workers step arithmetically; connections sit at the same
    /// fractional position of their own range.
    Balanced,
    /// Connections follow workers 1:1, clamped to the connection bounds.
    Synchronized,
    /// Both dimensions double from their minima until neither moves.
    Exponential,
    /// Cross product of Fibonacci multiples of each minimum.
    Fibonacci,
}

impl ScalingStrategy {
    pub fn name(self) -> &'static str {
        match self {
            ScalingStrategy::Linear => "linear",
            ScalingStrategy::Balanced => "balanced",
            ScalingStrategy::Synchronized => "synchronized",
            ScalingStrategy::Exponential => "exponential",
            ScalingStrategy::Fibonacci => "fibonacci",
        }
    }
}

impl fmt::Display for ScalingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalingStrategy {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "balanced" => Ok(Self::Balanced),
            "synchronized" => Ok(Self::Synchronized),
            "exponential" => Ok(Self::Exponential),
            "fibonacci" => Ok(Self::Fibonacci),
            other => Err(BenchError::config(format!(
                "unknown scaling strategy {other:?} (expected linear, balanced, synchronized, exponential, or fibonacci)"
            ))),
        }
    }
}

/// Bounds and step controls for sequence generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceParams {
    pub min_workers: u32,
    pub max_workers: u32,
    pub min_connections: u32,
    pub max_connections: u32,
    pub worker_step: Option<u32>,
    pub connection_step: Option<u32>,
    /// Target band count per dimension. Used when a step is not given.
    pub bands: Option<u32>,
}

impl SequenceParams {
    pub fn new(
        min_workers: u32,
        max_workers: u32,
        min_connections: u32,
        max_connections: u32,
    ) -> Self {
        Self {
            min_workers,
            max_workers,
            min_connections,
            max_connections,
            worker_step: None,
            connection_step: None,
            bands: None,
        }
    }

    pub fn with_steps(mut self, worker_step: u32, connection_step: u32) -> Self {
        self.worker_step = Some(worker_step);
        self.connection_step = Some(connection_step);
        self
    }

    pub fn with_bands(mut self, bands: u32) -> Self {
        self.bands = Some(bands);
        self
    }

    fn validate(&self) -> BenchResult<()> {
        if self.min_workers == 0 || self.min_connections == 0 {
            return Err(BenchError::config(
                "min_workers and min_connections must be at least 1",
            ));
        }
        if self.min_workers > self.max_workers {
            return Err(BenchError::config(format!(
                "min_workers ({}) exceeds max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        if self.min_connections > self.max_connections {
            return Err(BenchError::config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.worker_step == Some(0) || self.connection_step == Some(0) {
            return Err(BenchError::config("step sizes must be at least 1"));
        }
        if self.bands == Some(0) {
            return Err(BenchError::config("target band count must be at least 1"));
        }
        Ok(())
    }

    fn worker_step(&self) -> u32 {
        resolve_step(self.worker_step, self.bands, self.min_workers, self.max_workers)
    }

    fn connection_step(&self) -> u32 {
        resolve_step(
            self.connection_step,
            self.bands,
            self.min_connections,
            self.max_connections,
        )
    }
}

fn resolve_step(explicit: Option<u32>, bands: Option<u32>, min: u32, max: u32) -> u32 {
    match (explicit, bands) {
        (Some(step), _) => step,
        (None, Some(n)) if n > 1 => ((max - min) / (n - 1)).max(1),
        (None, Some(_)) => (max - min).max(1),
        (None, None) => 1,
    }
}

/// Produce the ordered band sequence for `strategy`.
///
/// Fails with `Configuration` on invalid bounds or steps, or if the
/// strategy yields no bands.
pub fn generate(
    strategy: ScalingStrategy,
    params: &SequenceParams,
) -> BenchResult<Vec<ScalingBand>> {
    params.validate()?;

    let bands = match strategy {
        ScalingStrategy::Linear => {
            let workers = progression(params.min_workers, params.max_workers, params.worker_step());
            let connections = progression(
                params.min_connections,
                params.max_connections,
                params.connection_step(),
            );
            cross(&workers, &connections)
        }
        ScalingStrategy::Balanced => {
            let (lo, hi) = (params.min_connections, params.max_connections);
            progression(params.min_workers, params.max_workers, params.worker_step())
                .into_iter()
                .map(|w| {
                    let fraction = if params.max_workers == params.min_workers {
                        1.0
                    } else {
                        f64::from(w - params.min_workers)
                            / f64::from(params.max_workers - params.min_workers)
                    };
                    let c = lo + (fraction * f64::from(hi - lo)).round() as u32;
                    ScalingBand::new(w, c.clamp(lo, hi))
                })
                .collect()
        }
        ScalingStrategy::Synchronized => {
            let (lo, hi) = (params.min_connections, params.max_connections);
            progression(params.min_workers, params.max_workers, params.worker_step())
                .into_iter()
                .map(|w| ScalingBand::new(w, w.clamp(lo, hi)))
                .collect()
        }
        ScalingStrategy::Exponential => doubling(params),
        ScalingStrategy::Fibonacci => cross(
            &fibonacci(params.min_workers, params.max_workers),
            &fibonacci(params.min_connections, params.max_connections),
        ),
    };

    if bands.is_empty() {
        return Err(BenchError::config(format!(
            "{strategy} strategy produced no bands"
        )));
    }
    Ok(bands)
}

/// `min, min+step, ...` up to and always including `max`.
fn progression(min: u32, max: u32, step: u32) -> Vec<u32> {
    let mut values = vec![min];
    let mut v = min;
    while v < max {
        v = v.saturating_add(step).min(max);
        values.push(v);
    }
    values
}

/// Fibonacci multiples (1, 2, 3, 5, 8, ...) of `min` below `max`, then `max`.
fn fibonacci(min: u32, max: u32) -> Vec<u32> {
    let mut values = Vec::new();
    let (mut a, mut b) = (1u32, 2u32);
    loop {
        let v = min.saturating_mul(a);
        if v >= max {
            break;
        }
        values.push(v);
        (a, b) = (b, a.saturating_add(b));
    }
    values.push(max);
    values
}

fn doubling(params: &SequenceParams) -> Vec<ScalingBand> {
    let mut bands = Vec::new();
    let (mut w, mut c) = (params.min_workers, params.min_connections);
    loop {
        bands.push(ScalingBand::new(w, c));
        let next_w = w.saturating_mul(2).min(params.max_workers);
        let next_c = c.saturating_mul(2).min(params.max_connections);
        if next_w == w && next_c == c {
            break;
        }
        (w, c) = (next_w, next_c);
    }
    bands
}

/// Workers outer, connections inner.
fn cross(workers: &[u32], connections: &[u32]) -> Vec<ScalingBand> {
    workers
        .iter()
        .flat_map(|&w| connections.iter().map(move |&c| ScalingBand::new(w, c)))
        .collect()
}
