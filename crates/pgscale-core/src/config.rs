//! pgscale.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub run: RunConfig,
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub early_termination: EarlyTerminationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Workload name, recorded in the result.
    pub workload: String,
    /// Connection string handed to the workload. Opaque to the engine.
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    pub strategy: String,
    pub min_workers: u32,
    pub max_workers: u32,
    pub min_connections: u32,
    pub max_connections: u32,
    pub worker_step: Option<u32>,
    pub connection_step: Option<u32>,
    /// Target band count; derives the steps when set.
    pub bands: Option<u32>,
    #[serde(default = "default_warmup")]
    pub warmup: String,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default = "default_cooldown")]
    pub cooldown: String,
    #[serde(default = "default_grace")]
    pub grace: String,
    #[serde(default = "default_sample_interval")]
    pub sample_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyTerminationConfig {
    pub enabled: bool,
    /// Rolling average error rate (%) that stops the run.
    pub max_error_rate: f64,
    /// Minimum band health score (0-1).
    pub min_health_score: f64,
    /// Largest tolerated throughput drop vs. the previous band (0-1).
    pub max_throughput_drop: f64,
    /// Number of trailing bands in the rolling error average.
    pub window: usize,
    /// Per-interval error rate (%) at or below which a sample is healthy.
    pub health_max_error_rate: f64,
    /// Per-interval mean latency at or below which a sample is healthy.
    pub health_max_latency_ms: f64,
}

impl Default for EarlyTerminationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_error_rate: 10.0,
            min_health_score: 0.5,
            max_throughput_drop: 0.5,
            window: 3,
            health_max_error_rate: 1.0,
            health_max_latency_ms: 100.0,
        }
    }
}

fn default_warmup() -> String {
    "5s".to_string()
}

fn default_duration() -> String {
    "30s".to_string()
}

fn default_cooldown() -> String {
    "5s".to_string()
}

fn default_grace() -> String {
    "5s".to_string()
}

fn default_sample_interval() -> String {
    "1s".to_string()
}

impl BenchConfig {
    pub fn from_file(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BenchError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> BenchResult<Self> {
        toml::from_str(content).map_err(|e| BenchError::config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> BenchResult<String> {
        toml::to_string_pretty(self).map_err(|e| BenchError::config(e.to_string()))
    }

    /// A small linear sweep suitable as a starting point.
    pub fn scaffold(workload: &str, target: &str) -> Self {
        BenchConfig {
            run: RunConfig {
                workload: workload.to_string(),
                target: target.to_string(),
            },
            scaling: ScalingConfig {
                strategy: "linear".to_string(),
                min_workers: 2,
                max_workers: 16,
                min_connections: 4,
                max_connections: 4,
                worker_step: Some(2),
                connection_step: Some(4),
                bands: None,
                warmup: default_warmup(),
                duration: default_duration(),
                cooldown: default_cooldown(),
                grace: default_grace(),
                sample_interval: default_sample_interval(),
            },
            early_termination: EarlyTerminationConfig::default(),
        }
    }
}

/// Parse a duration string like "250ms", "30s", "5m" or a bare number of
/// seconds.
pub fn parse_duration(s: &str) -> BenchResult<Duration> {
    let s = s.trim();
    let invalid = || BenchError::config(format!("invalid duration: {s:?}"));

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.trim().parse::<u64>().map_err(|_| invalid())?;
        mins.checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}
