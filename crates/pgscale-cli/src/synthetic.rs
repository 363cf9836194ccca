//! In-process workload with a saturating latency model.
//!
//! Each transaction holds a connection slot, then queues for one of
//! `cores` simulated server cores for `service` time. Every transaction
//! in flight beyond the core count adds 5% to the service time, and once
//! more than twice the core count are in flight, one transaction in
//! `FAILURE_PERIOD` fails with a serialization error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::Semaphore;
use tracing::debug;

use pgscale_core::DatabaseStats;
use pgscale_engine::{WorkerContext, Workload};
use pgscale_metrics::QueryKind;

/// Each excess in-flight transaction adds `service / CONTENTION_DIVISOR`.
const CONTENTION_DIVISOR: u32 = 20;
const FAILURE_PERIOD: u64 = 25;

pub struct SyntheticWorkload {
    name: String,
    cores: usize,
    service: Duration,
    server: Arc<Semaphore>,
    in_flight: AtomicU64,
    transactions: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl SyntheticWorkload {
    pub fn new(name: &str, cores: usize, service: Duration) -> Self {
        let cores = cores.max(1);
        Self {
            name: name.to_string(),
            cores,
            service,
            server: Arc::new(Semaphore::new(cores)),
            in_flight: AtomicU64::new(0),
            transactions: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    /// Service time with `in_flight` transactions competing.
    fn service_time(&self, in_flight: u64) -> Duration {
        let excess = in_flight.saturating_sub(self.cores as u64).min(u64::from(u32::MAX)) as u32;
        self.service + self.service * excess / CONTENTION_DIVISOR
    }

    fn fails(&self, in_flight: u64, sequence: u64) -> bool {
        in_flight > 2 * self.cores as u64 && sequence % FAILURE_PERIOD == 0
    }

    async fn transaction(&self, ctx: &WorkerContext) -> anyhow::Result<()> {
        let _conn = ctx.acquire_connection().await?;
        let started = Instant::now();
        let in_flight = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;

        let outcome = async {
            let _core = self.server.acquire().await.context("server closed")?;
            tokio::time::sleep(self.service_time(in_flight)).await;
            anyhow::Ok(())
        }
        .await;
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        outcome?;

        let sequence = self.transactions.fetch_add(1, Ordering::Relaxed) + 1;
        ctx.sink.record_query(QueryKind::Select);
        ctx.sink.record_query(QueryKind::Update);
        if self.fails(in_flight, sequence) {
            self.rollbacks.fetch_add(1, Ordering::Relaxed);
            ctx.sink.record_abort();
            ctx.sink.record_error("serialization_failure").await;
        } else {
            self.commits.fetch_add(1, Ordering::Relaxed);
            ctx.sink.record_commit();
        }
        ctx.sink
            .record_latency(started.elapsed().as_nanos() as u64)
            .await;
        Ok(())
    }
}

impl Workload for SyntheticWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&self, target: &str) -> anyhow::Result<()> {
        debug!(workload = %self.name, %target, cores = self.cores, "synthetic setup");
        Ok(())
    }

    async fn run(&self, ctx: WorkerContext) -> anyhow::Result<()> {
        while !ctx.should_stop() {
            self.transaction(&ctx).await?;
        }
        Ok(())
    }

    async fn database_stats(&self) -> Option<DatabaseStats> {
        Some(DatabaseStats {
            cache_hit_ratio: 0.99,
            active_connections: self.in_flight.load(Ordering::Relaxed) as u32,
            deadlocks: 0,
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            temp_bytes: 0,
        })
    }
}
