//! In-band sampler: periodic point-in-time readings during measurement.
//!
//! Runs as its own task next to the workers and stops on the band's stop
//! signal, returning the samples it collected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use pgscale_core::{finite, IntervalSample};
use pgscale_metrics::stats::ratio;
use pgscale_metrics::{CounterSnapshot, MetricsSink};

use crate::workload::signalled;

/// Start sampling `sink` every `interval`, relative to `baseline`.
pub fn spawn_sampler(
    sink: Arc<MetricsSink>,
    baseline: CounterSnapshot,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<Vec<IntervalSample>> {
    tokio::spawn(async move {
        let mut samples = Vec::new();
        if interval.is_zero() {
            return samples;
        }

        let started = Instant::now();
        let mut previous = baseline;
        let mut previous_at = started;
        let mut next = started + interval;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next) => {
                    let now = Instant::now();
                    let current = sink.counters().await;
                    let avg_latency_ms = sink
                        .mean_latency_ms(previous.latency_count..current.latency_count)
                        .await;
                    samples.push(interval_sample(
                        &previous,
                        &current,
                        (now - started).as_millis() as u64,
                        (now - previous_at).as_secs_f64(),
                        avg_latency_ms,
                    ));
                    previous = current;
                    previous_at = now;
                    next += interval;
                }
                _ = signalled(&mut stop) => break,
            }
        }

        debug!(samples = samples.len(), "sampler stopped");
        samples
    })
}

/// One reading from two cumulative snapshots `secs` apart.
pub fn interval_sample(
    previous: &CounterSnapshot,
    current: &CounterSnapshot,
    elapsed_ms: u64,
    secs: f64,
    avg_latency_ms: f64,
) -> IntervalSample {
    let committed = current.committed.saturating_sub(previous.committed);
    let attempted = current.transactions().saturating_sub(previous.transactions());
    let errors = current.errors.saturating_sub(previous.errors);

    IntervalSample {
        elapsed_ms,
        tps: ratio(committed as f64, secs),
        error_rate: ratio(errors as f64 * 100.0, attempted as f64),
        avg_latency_ms: finite(avg_latency_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(committed: u64, aborted: u64, errors: u64) -> CounterSnapshot {
        CounterSnapshot {
            committed,
            aborted,
            errors,
            ..Default::default()
        }
    }

    #[test]
    fn sample_from_deltas() {
        let s = interval_sample(&snapshot(100, 0, 0), &snapshot(150, 10, 3), 1000, 0.5, 4.0);
        assert_eq!(s.tps, 100.0);
        assert_eq!(s.error_rate, 5.0);
        assert_eq!(s.avg_latency_ms, 4.0);
        assert_eq!(s.elapsed_ms, 1000);
    }

    #[test]
    fn idle_interval_is_zero() {
        let s = interval_sample(&snapshot(5, 0, 0), &snapshot(5, 0, 0), 10, 0.0, f64::NAN);
        assert_eq!(s.tps, 0.0);
        assert_eq!(s.error_rate, 0.0);
        assert_eq!(s.avg_latency_ms, 0.0);
    }

    #[tokio::test]
    async fn sampler_collects_until_stopped() {
        let sink = Arc::new(MetricsSink::new());
        let baseline = sink.counters().await;
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sampler(Arc::clone(&sink), baseline, Duration::from_millis(10), rx);

        for _ in 0..5 {
            sink.record_commit();
            sink.record_latency(2_000_000).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();

        let samples = handle.await.unwrap();
        assert!(!samples.is_empty());
        assert!(samples.windows(2).all(|w| w[0].elapsed_ms <= w[1].elapsed_ms));
        assert!(samples.iter().all(|s| s.error_rate == 0.0));
    }

    #[tokio::test]
    async fn zero_interval_disables_sampling() {
        let sink = Arc::new(MetricsSink::new());
        let (_tx, rx) = watch::channel(false);
        let samples = spawn_sampler(sink, CounterSnapshot::default(), Duration::ZERO, rx)
            .await
            .unwrap();
        assert!(samples.is_empty());
    }
}
