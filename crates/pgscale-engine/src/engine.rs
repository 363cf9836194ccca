//! Scaling engine: runs the band sequence and finalizes the result.
//!
//! Bands run strictly one after another. The completed-band list is
//! owned by the engine and only appended to by the run loop; `results()`
//! and `progress()` hand out snapshots and are safe to call from other
//! tasks while `run` is in progress.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use pgscale_analysis::{analyze, select, AnalysisReport, OperatingPoints, OptimalConfig};
use pgscale_core::config::EarlyTerminationConfig;
use pgscale_core::{parse_duration, BandMetrics, BenchConfig, BenchError, BenchResult, ScalingBand};

use crate::executor::{BandExecutor, ExecutorSettings};
use crate::sequence::{generate, ScalingStrategy, SequenceParams};
use crate::termination::EarlyTermination;
use crate::workload::{signalled, Workload};

/// Fully resolved run settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub strategy: ScalingStrategy,
    pub sequence: SequenceParams,
    pub target: String,
    pub warmup: Duration,
    pub measurement: Duration,
    /// Pause between bands. Skipped after the last band.
    pub cooldown: Duration,
    pub grace: Duration,
    pub sample_interval: Duration,
    pub early_termination: EarlyTerminationConfig,
}

impl EngineConfig {
    pub fn from_bench_config(config: &BenchConfig) -> BenchResult<Self> {
        let s = &config.scaling;
        Ok(Self {
            strategy: s.strategy.parse()?,
            sequence: SequenceParams {
                min_workers: s.min_workers,
                max_workers: s.max_workers,
                min_connections: s.min_connections,
                max_connections: s.max_connections,
                worker_step: s.worker_step,
                connection_step: s.connection_step,
                bands: s.bands,
            },
            target: config.run.target.clone(),
            warmup: parse_duration(&s.warmup)?,
            measurement: parse_duration(&s.duration)?,
            cooldown: parse_duration(&s.cooldown)?,
            grace: parse_duration(&s.grace)?,
            sample_interval: parse_duration(&s.sample_interval)?,
            early_termination: config.early_termination.clone(),
        })
    }

    /// Wall time for `bands` bands including grace and cooldowns, or
    /// `None` if it overflows.
    pub fn run_budget(&self, bands: usize) -> Option<Duration> {
        let bands = u32::try_from(bands).ok()?;
        let per_band = self.executor_settings().band_budget()?;
        per_band
            .checked_mul(bands)?
            .checked_add(self.cooldown.checked_mul(bands.saturating_sub(1))?)
    }

    fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            warmup: self.warmup,
            measurement: self.measurement,
            grace: self.grace,
            sample_interval: self.sample_interval,
            health_max_error_rate: self.early_termination.health_max_error_rate,
            health_max_latency_ms: self.early_termination.health_max_latency_ms,
        }
    }
}

/// Longest run the engine accepts.
pub const MAX_RUN_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Why the band loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Cancelled,
    EarlyTerminated(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// 1-based id of the band running now; 0 before the first band.
    pub current_band: u32,
    pub total_bands: u32,
    pub completed_bands: u32,
    pub estimated_remaining: Duration,
}

/// Outcome of one scaling run. Built once, at the end of `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingResult {
    pub test_start_ms: u64,
    pub test_end_ms: u64,
    pub total_duration: Duration,
    pub workload_name: String,
    pub strategy_name: String,
    pub bands: Vec<BandMetrics>,
    /// Empty when fewer than two bands completed.
    pub analysis: AnalysisReport,
    pub analysis_error: Option<String>,
    pub optimal_config: Option<OptimalConfig>,
    pub operating_points: OperatingPoints,
    /// Selector recommendations first, then the analysis recommendations.
    pub recommendations: Vec<String>,
    pub stop_reason: StopReason,
}

pub struct ScalingEngine {
    config: EngineConfig,
    plan: Vec<ScalingBand>,
    bands: Arc<RwLock<Vec<BandMetrics>>>,
    progress: Arc<RwLock<Progress>>,
}

impl ScalingEngine {
    /// Validate the configuration and generate the band plan.
    pub fn new(config: EngineConfig) -> BenchResult<Self> {
        let plan = generate(config.strategy, &config.sequence)?;
        match config.run_budget(plan.len()) {
            Some(budget) if budget <= MAX_RUN_DURATION => {}
            _ => {
                return Err(BenchError::config(format!(
                    "{} bands exceed the maximum run duration of {}s",
                    plan.len(),
                    MAX_RUN_DURATION.as_secs()
                )));
            }
        }
        Ok(Self {
            config,
            plan,
            bands: Arc::new(RwLock::new(Vec::new())),
            progress: Arc::new(RwLock::new(Progress::default())),
        })
    }

    pub fn from_bench_config(config: &BenchConfig) -> BenchResult<Self> {
        Self::new(EngineConfig::from_bench_config(config)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan(&self) -> &[ScalingBand] {
        &self.plan
    }

    /// Snapshot of the bands completed so far.
    pub async fn results(&self) -> Vec<BandMetrics> {
        self.bands.read().await.clone()
    }

    pub async fn progress(&self) -> Progress {
        self.progress.read().await.clone()
    }

    /// Estimated wall time for the bands from `next` (0-based) onward.
    pub fn estimate_remaining(&self, next: usize) -> Duration {
        let remaining = self.plan.len().saturating_sub(next) as u32;
        let per_band = self.config.warmup.saturating_add(self.config.measurement);
        per_band
            .saturating_mul(remaining)
            .saturating_add(self.config.cooldown.saturating_mul(remaining.saturating_sub(1)))
    }

    /// Drive every band in the plan, then analyze.
    ///
    /// Cancellation through `shutdown` (between bands or mid-band) and
    /// early termination both finalize over the bands completed so far. A
    /// band failure aborts the run with `BandExecution`; the bands that
    /// completed before it stay available through `results()`.
    pub async fn run<W: Workload>(
        &self,
        workload: Arc<W>,
        mut shutdown: watch::Receiver<bool>,
    ) -> BenchResult<ScalingResult> {
        let test_start_ms = epoch_millis();
        let started = Instant::now();
        let total = self.plan.len();
        let workload_name = workload.name().to_string();

        self.bands.write().await.clear();
        *self.progress.write().await = Progress {
            current_band: 0,
            total_bands: total as u32,
            completed_bands: 0,
            estimated_remaining: self.estimate_remaining(0),
        };

        info!(
            workload = %workload_name,
            strategy = %self.config.strategy,
            bands = total,
            "scaling run started"
        );

        let policy = EarlyTermination::new(self.config.early_termination.clone());
        let mut executor = BandExecutor::new(
            workload,
            &self.config.target,
            self.config.executor_settings(),
        );
        let mut stop_reason = StopReason::Completed;

        for (index, band) in self.plan.iter().enumerate() {
            if *shutdown.borrow() {
                info!(completed = index, "cancelled between bands");
                stop_reason = StopReason::Cancelled;
                break;
            }

            let band_id = index as u32 + 1;
            self.progress.write().await.current_band = band_id;

            match executor.execute(band_id, *band, &mut shutdown).await {
                Ok(metrics) => {
                    info!(
                        band = band_id,
                        workers = band.workers,
                        connections = band.connections,
                        tps = metrics.tps(),
                        p95_ms = metrics.p95_latency_ms(),
                        error_rate = metrics.error_rate(),
                        "band completed"
                    );
                    self.bands.write().await.push(metrics);
                    let mut progress = self.progress.write().await;
                    progress.completed_bands = band_id;
                    progress.estimated_remaining = self.estimate_remaining(index + 1);
                }
                Err(BenchError::Cancelled) => {
                    warn!(band = band_id, "cancelled mid-band, discarding partial band");
                    stop_reason = StopReason::Cancelled;
                    break;
                }
                Err(e) => {
                    error!(band = band_id, error = %e, "band failed, aborting run");
                    return Err(e);
                }
            }

            if policy.enabled() {
                let snapshot = self.bands.read().await;
                if let Some(reason) = policy.evaluate(&snapshot) {
                    warn!(band = band_id, %reason, "early termination");
                    stop_reason = StopReason::EarlyTerminated(reason);
                    break;
                }
            }

            if index + 1 < total && !self.config.cooldown.is_zero() {
                debug!(
                    band = band_id,
                    cooldown_ms = self.config.cooldown.as_millis() as u64,
                    "cooling down"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.config.cooldown) => {}
                    _ = signalled(&mut shutdown) => {
                        info!(completed = band_id, "cancelled during cooldown");
                        stop_reason = StopReason::Cancelled;
                        break;
                    }
                }
            }
        }

        Ok(self
            .finalize(workload_name, test_start_ms, started, stop_reason)
            .await)
    }

    async fn finalize(
        &self,
        workload_name: String,
        test_start_ms: u64,
        started: Instant,
        stop_reason: StopReason,
    ) -> ScalingResult {
        let bands = self.results().await;
        {
            let mut progress = self.progress.write().await;
            progress.current_band = 0;
            progress.estimated_remaining = Duration::ZERO;
        }

        let (analysis, analysis_error) = match analyze(&bands) {
            Ok(report) => (report, None),
            Err(e) => {
                warn!(bands = bands.len(), error = %e, "analysis skipped");
                (AnalysisReport::default(), Some(e.to_string()))
            }
        };
        let selection = select(&bands);

        let mut recommendations = selection.recommendations;
        recommendations.extend(analysis.recommendations.iter().cloned());

        info!(
            bands = bands.len(),
            stop_reason = ?stop_reason,
            optimal = ?selection.optimal.as_ref().map(|o| o.band_id),
            "scaling run finished"
        );

        ScalingResult {
            test_start_ms,
            test_end_ms: epoch_millis(),
            total_duration: started.elapsed(),
            workload_name,
            strategy_name: self.config.strategy.to_string(),
            bands,
            analysis,
            analysis_error,
            optimal_config: selection.optimal,
            operating_points: selection.points,
            recommendations,
            stop_reason,
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: &str) -> BenchConfig {
        let mut config = BenchConfig::scaffold("unit", "");
        config.scaling.strategy = strategy.to_string();
        config.scaling.max_workers = 8;
        config
    }

    #[test]
    fn config_conversion() {
        let engine = ScalingEngine::from_bench_config(&config("linear")).unwrap();
        let c = engine.config();
        assert_eq!(c.strategy, ScalingStrategy::Linear);
        assert_eq!(c.warmup, Duration::from_secs(5));
        assert_eq!(c.measurement, Duration::from_secs(30));
        assert_eq!(engine.plan().len(), 4);
    }

    #[test]
    fn bad_config_fails_before_any_band() {
        assert!(matches!(
            ScalingEngine::from_bench_config(&config("zigzag")),
            Err(BenchError::Configuration(_))
        ));

        let mut bad = config("linear");
        bad.scaling.duration = "soon".to_string();
        assert!(matches!(
            ScalingEngine::from_bench_config(&bad),
            Err(BenchError::Configuration(_))
        ));

        let mut bad = config("linear");
        bad.scaling.min_workers = 10;
        assert!(matches!(
            ScalingEngine::from_bench_config(&bad),
            Err(BenchError::Configuration(_))
        ));
    }

    #[test]
    fn oversized_durations_fail_fast() {
        let mut huge = config("linear");
        huge.scaling.duration = "999999999999999999m".to_string();
        assert!(matches!(
            ScalingEngine::from_bench_config(&huge),
            Err(BenchError::Configuration(_))
        ));

        // Each value parses, but the sum over the plan does not fit.
        let mut huge = config("linear");
        huge.scaling.duration = format!("{}s", u64::MAX);
        huge.scaling.cooldown = format!("{}s", u64::MAX);
        assert!(matches!(
            ScalingEngine::from_bench_config(&huge),
            Err(BenchError::Configuration(_))
        ));

        let mut long = config("linear");
        long.scaling.duration = "20000m".to_string();
        assert!(matches!(
            ScalingEngine::from_bench_config(&long),
            Err(BenchError::Configuration(_))
        ));
    }

    #[test]
    fn run_budget_includes_grace_and_cooldowns() {
        let engine = ScalingEngine::from_bench_config(&config("linear")).unwrap();
        // 4 × (5s + 30s + 5s) + 3 × 5s.
        assert_eq!(engine.config().run_budget(4), Some(Duration::from_secs(175)));
        assert_eq!(engine.config().run_budget(0), Some(Duration::ZERO));
    }

    #[test]
    fn remaining_time_estimate() {
        let engine = ScalingEngine::from_bench_config(&config("linear")).unwrap();
        // 4 bands × 35s + 3 cooldowns × 5s.
        assert_eq!(engine.estimate_remaining(0), Duration::from_secs(155));
        assert_eq!(engine.estimate_remaining(3), Duration::from_secs(35));
        assert_eq!(engine.estimate_remaining(4), Duration::ZERO);
    }

    #[test]
    fn stop_reason_serialization() {
        let json = serde_json::to_string(&StopReason::EarlyTerminated("drop".into())).unwrap();
        assert_eq!(json, r#"{"kind":"early_terminated","reason":"drop"}"#);
        let json = serde_json::to_string(&StopReason::Completed).unwrap();
        assert_eq!(json, r#"{"kind":"completed"}"#);
    }
}
