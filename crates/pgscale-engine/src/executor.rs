//! Band executor: runs one band through its phase state machine.
//!
//! ```text
//! Idle ──► Warming ──► Measuring ──► Completed
//!             │            │
//!             └────────────┴──► Cancelled | Failed { reason }
//! ```
//!
//! One worker task per configured worker runs the workload, sharing a
//! semaphore sized to the band's connection count. The whole band is
//! bounded by a deadline of warmup + measurement + grace. After the
//! measurement window the workers are told to stop and given `grace` to
//! return before they are aborted; the band record is only computed once
//! every worker task has finished.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pgscale_core::config::EarlyTerminationConfig;
use pgscale_core::{BandMetrics, BenchError, BenchResult, ScalingBand};
use pgscale_metrics::{calculate_band_metrics, BandContext, MetricsSink};

use crate::sampler::spawn_sampler;
use crate::workload::{signalled, WorkerContext, Workload};

/// Current phase of the band being executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandPhase {
    Idle,
    Warming,
    Measuring,
    Completed,
    Cancelled,
    Failed { reason: String },
}

impl BandPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BandPhase::Completed | BandPhase::Cancelled | BandPhase::Failed { .. }
        )
    }
}

/// Timing and health settings applied to every band.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub warmup: Duration,
    pub measurement: Duration,
    /// Slack past the measurement window for workers to stop.
    pub grace: Duration,
    /// Zero disables the in-band sampler.
    pub sample_interval: Duration,
    pub health_max_error_rate: f64,
    pub health_max_latency_ms: f64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        let health = EarlyTerminationConfig::default();
        Self {
            warmup: Duration::from_secs(5),
            measurement: Duration::from_secs(30),
            grace: Duration::from_secs(5),
            sample_interval: Duration::from_secs(1),
            health_max_error_rate: health.health_max_error_rate,
            health_max_latency_ms: health.health_max_latency_ms,
        }
    }
}

impl ExecutorSettings {
    /// Warmup + measurement + grace, or `None` if the sum overflows.
    pub fn band_budget(&self) -> Option<Duration> {
        self.warmup
            .checked_add(self.measurement)?
            .checked_add(self.grace)
    }
}

/// Why a hold ended before its timer.
enum Interrupt {
    Cancelled,
    Failed(String),
}

pub struct BandExecutor<W: Workload> {
    workload: Arc<W>,
    target: Arc<str>,
    settings: ExecutorSettings,
    phase: BandPhase,
}

impl<W: Workload> BandExecutor<W> {
    pub fn new(workload: Arc<W>, target: &str, settings: ExecutorSettings) -> Self {
        Self {
            workload,
            target: Arc::from(target),
            settings,
            phase: BandPhase::Idle,
        }
    }

    pub fn phase(&self) -> &BandPhase {
        &self.phase
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run one band to completion.
    ///
    /// Returns `Cancelled` if `cancel` fires during the band, or
    /// `BandExecution` if a worker fails, panics, or the deadline passes.
    pub async fn execute(
        &mut self,
        band_id: u32,
        band: ScalingBand,
        cancel: &mut watch::Receiver<bool>,
    ) -> BenchResult<BandMetrics> {
        self.phase = BandPhase::Idle;
        if *cancel.borrow() {
            self.transition(band_id, BandPhase::Cancelled);
            return Err(BenchError::Cancelled);
        }

        let started_at_ms = epoch_millis();
        let deadline = self
            .settings
            .band_budget()
            .and_then(|budget| Instant::now().checked_add(budget))
            .ok_or_else(|| BenchError::config("band duration overflows the clock"))?;

        let sink = Arc::new(MetricsSink::new());
        let connections = Arc::new(Semaphore::new(band.connections as usize));
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut workers = JoinSet::new();
        for worker_id in 0..band.workers {
            let ctx = WorkerContext::new(
                worker_id,
                band,
                Arc::clone(&self.target),
                Arc::clone(&connections),
                Arc::clone(&sink),
                stop_rx.clone(),
            );
            let workload = Arc::clone(&self.workload);
            workers.spawn(async move { workload.run(ctx).await });
        }
        info!(
            band = band_id,
            workers = band.workers,
            connections = band.connections,
            "band started"
        );

        if !self.settings.warmup.is_zero() {
            self.transition(band_id, BandPhase::Warming);
            if let Err(interrupt) =
                hold(self.settings.warmup, deadline, &mut workers, cancel).await
            {
                return self.abort(band_id, interrupt, &stop_tx, workers).await;
            }
            debug!(band = band_id, "warmup complete");
        }

        let baseline = sink.counters().await;
        let measure_start = Instant::now();
        self.transition(band_id, BandPhase::Measuring);
        let sampler = spawn_sampler(
            Arc::clone(&sink),
            baseline.clone(),
            self.settings.sample_interval,
            stop_rx.clone(),
        );

        if let Err(interrupt) =
            hold(self.settings.measurement, deadline, &mut workers, cancel).await
        {
            sampler.abort();
            return self.abort(band_id, interrupt, &stop_tx, workers).await;
        }

        let _ = stop_tx.send(true);
        let raw = sink.window_since(&baseline).await;
        let duration = measure_start.elapsed();
        let ended_at_ms = epoch_millis();

        let samples = sampler.await.unwrap_or_else(|e| {
            warn!(band = band_id, error = %e, "sampler task failed");
            Vec::new()
        });
        let database = self.workload.database_stats().await;
        drain(band_id, workers, self.settings.grace).await;

        let metrics = calculate_band_metrics(
            &raw,
            &BandContext {
                band_id,
                band,
                started_at_ms,
                ended_at_ms,
                duration,
                samples,
                database,
                health_max_error_rate: self.settings.health_max_error_rate,
                health_max_latency_ms: self.settings.health_max_latency_ms,
            },
        );
        self.transition(band_id, BandPhase::Completed);
        Ok(metrics)
    }

    async fn abort(
        &mut self,
        band_id: u32,
        interrupt: Interrupt,
        stop_tx: &watch::Sender<bool>,
        workers: JoinSet<anyhow::Result<()>>,
    ) -> BenchResult<BandMetrics> {
        let _ = stop_tx.send(true);
        drain(band_id, workers, self.settings.grace).await;
        match interrupt {
            Interrupt::Cancelled => {
                self.transition(band_id, BandPhase::Cancelled);
                Err(BenchError::Cancelled)
            }
            Interrupt::Failed(reason) => {
                warn!(band = band_id, %reason, "band failed");
                self.transition(
                    band_id,
                    BandPhase::Failed {
                        reason: reason.clone(),
                    },
                );
                Err(BenchError::BandExecution { band_id, reason })
            }
        }
    }

    fn transition(&mut self, band_id: u32, next: BandPhase) {
        debug!(band = band_id, from = ?self.phase, to = ?next, "band phase");
        self.phase = next;
    }
}

/// Wait out `period` while watching the workers, the band deadline, and
/// the cancellation signal. A worker that returns `Ok` early is not an
/// interruption.
async fn hold(
    period: Duration,
    deadline: Instant,
    workers: &mut JoinSet<anyhow::Result<()>>,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(), Interrupt> {
    let until = Instant::now() + period;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(until) => return Ok(()),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(Interrupt::Failed("band deadline exceeded".to_string()));
            }
            _ = signalled(cancel) => return Err(Interrupt::Cancelled),
            Some(joined) = workers.join_next() => match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(Interrupt::Failed(format!("workload error: {e:#}"))),
                Err(e) => return Err(Interrupt::Failed(format!("worker task failed: {e}"))),
            },
        }
    }
}

/// Give workers `grace` to return after the stop signal, then abort the rest.
async fn drain(band_id: u32, mut workers: JoinSet<anyhow::Result<()>>, grace: Duration) {
    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(band = band_id, error = %e, "worker error after stop"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(band = band_id, error = %e, "worker task failed after stop"),
            }
        }
    })
    .await;

    if finished.is_err() {
        warn!(
            band = band_id,
            remaining = workers.len(),
            "workers did not stop within grace period, aborting"
        );
        workers.shutdown().await;
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
