//! Workload contract: what the engine runs inside each band.
//!
//! The engine only ever calls `run`, once per worker task. `setup` and
//! `cleanup` are for the surrounding driver (the CLI calls them around a
//! whole scaling run).

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{watch, Semaphore, SemaphorePermit};

use pgscale_core::{DatabaseStats, ScalingBand};
use pgscale_metrics::MetricsSink;

pub trait Workload: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Prepare schema and data on `target`.
    fn setup(&self, _target: &str) -> impl Future<Output = anyhow::Result<()>> + Send {
        async { Ok(()) }
    }

    /// Execute transactions until `ctx.should_stop()`, recording every
    /// outcome into `ctx.sink`. Returning an error fails the band.
    fn run(&self, ctx: WorkerContext) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn cleanup(&self, _target: &str) -> impl Future<Output = anyhow::Result<()>> + Send {
        async { Ok(()) }
    }

    /// Server-side statistics at the end of a band's measurement window.
    fn database_stats(&self) -> impl Future<Output = Option<DatabaseStats>> + Send {
        async { None }
    }
}

/// Everything one worker task gets for the lifetime of a band.
pub struct WorkerContext {
    /// 0-based within the band.
    pub worker_id: u32,
    pub band: ScalingBand,
    pub target: Arc<str>,
    /// One permit per connection in the band.
    pub connections: Arc<Semaphore>,
    pub sink: Arc<MetricsSink>,
    stop: watch::Receiver<bool>,
}

impl WorkerContext {
    pub fn new(
        worker_id: u32,
        band: ScalingBand,
        target: Arc<str>,
        connections: Arc<Semaphore>,
        sink: Arc<MetricsSink>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            worker_id,
            band,
            target,
            connections,
            sink,
            stop,
        }
    }

    /// Check out a connection slot; held until the permit drops.
    pub async fn acquire_connection(&self) -> anyhow::Result<SemaphorePermit<'_>> {
        self.connections
            .acquire()
            .await
            .context("connection budget closed")
    }

    pub fn should_stop(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once the band signals its workers to stop.
    pub async fn stopped(&mut self) {
        signalled(&mut self.stop).await;
    }
}

/// Wait until a shutdown channel carries `true`. Never resolves if the
/// sender is dropped without signalling.
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context(connections: usize) -> (WorkerContext, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let ctx = WorkerContext::new(
            0,
            ScalingBand::new(1, connections as u32),
            Arc::from("postgres://localhost/bench"),
            Arc::new(Semaphore::new(connections)),
            Arc::new(MetricsSink::new()),
            rx,
        );
        (ctx, tx)
    }

    #[tokio::test]
    async fn stop_signal_is_observed() {
        let (mut ctx, tx) = context(1);
        assert!(!ctx.should_stop());
        tx.send(true).unwrap();
        assert!(ctx.should_stop());
        tokio::time::timeout(Duration::from_millis(100), ctx.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_sender_never_signals() {
        let (mut ctx, tx) = context(1);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(20), ctx.stopped()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn connection_budget_limits_concurrency() {
        let (ctx, _tx) = context(2);
        let a = ctx.acquire_connection().await.unwrap();
        let _b = ctx.acquire_connection().await.unwrap();
        assert_eq!(ctx.connections.available_permits(), 0);
        drop(a);
        assert_eq!(ctx.connections.available_permits(), 1);
    }
}
