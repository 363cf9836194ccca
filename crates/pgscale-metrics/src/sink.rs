//! Metrics sink: the object worker tasks write into during a band.
//!
//! Uses atomics for counters and mutex-protected vectors for latency
//! samples and tagged error counts. The executor only derives band
//! statistics after every worker has stopped, so the final read always
//! sees a quiesced sink.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use pgscale_core::QueryCounts;

/// Statement category for query counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl QueryKind {
    fn slot(self) -> usize {
        match self {
            QueryKind::Select => 0,
            QueryKind::Insert => 1,
            QueryKind::Update => 2,
            QueryKind::Delete => 3,
            QueryKind::Other => 4,
        }
    }
}

/// Cumulative counter values at one instant. Used as the warmup
/// baseline and by the in-band sampler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterSnapshot {
    pub committed: u64,
    pub aborted: u64,
    pub queries: QueryCounts,
    pub errors: u64,
    pub error_breakdown: BTreeMap<String, u64>,
    /// Number of latency samples recorded so far.
    pub latency_count: usize,
}

impl CounterSnapshot {
    pub fn transactions(&self) -> u64 {
        self.committed + self.aborted
    }
}

/// Counts for a measurement window, the input to the band calculator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBandCounts {
    pub committed: u64,
    pub aborted: u64,
    pub queries: QueryCounts,
    pub errors: u64,
    pub error_breakdown: BTreeMap<String, u64>,
    /// Per-transaction latencies in nanoseconds.
    pub latencies_ns: Vec<u64>,
}

/// Shared, concurrently written metrics for one band.
pub struct MetricsSink {
    committed: AtomicU64,
    aborted: AtomicU64,
    queries: [AtomicU64; 5],
    errors: AtomicU64,
    error_kinds: Mutex<HashMap<String, u64>>,
    latencies: Mutex<Vec<u64>>,
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink {
    pub fn new() -> Self {
        Self {
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            queries: std::array::from_fn(|_| AtomicU64::new(0)),
            errors: AtomicU64::new(0),
            error_kinds: Mutex::new(HashMap::new()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abort(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query(&self, kind: QueryKind) {
        self.queries[kind.slot()].fetch_add(1, Ordering::Relaxed);
    }

    /// Append one transaction latency, in nanoseconds.
    pub async fn record_latency(&self, nanos: u64) {
        self.latencies.lock().await.push(nanos);
    }

    /// Count an error under a type tag (e.g. "serialization_failure").
    pub async fn record_error(&self, kind: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self
            .error_kinds
            .lock()
            .await
            .entry(kind.to_string())
            .or_insert(0) += 1;
    }

    /// Committed transactions so far (without locking).
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Read all cumulative counters.
    pub async fn counters(&self) -> CounterSnapshot {
        let error_breakdown = self
            .error_kinds
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let latency_count = self.latencies.lock().await.len();

        CounterSnapshot {
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            queries: self.query_counts(),
            errors: self.errors.load(Ordering::Relaxed),
            error_breakdown,
            latency_count,
        }
    }

    /// Counts accumulated since `baseline`, with the latencies recorded
    /// after the baseline was taken.
    pub async fn window_since(&self, baseline: &CounterSnapshot) -> RawBandCounts {
        let now = self.counters().await;

        let mut error_breakdown = BTreeMap::new();
        for (kind, count) in &now.error_breakdown {
            let before = baseline.error_breakdown.get(kind).copied().unwrap_or(0);
            let delta = count.saturating_sub(before);
            if delta > 0 {
                error_breakdown.insert(kind.clone(), delta);
            }
        }

        let latencies_ns = {
            let latencies = self.latencies.lock().await;
            let start = baseline.latency_count.min(latencies.len());
            latencies[start..].to_vec()
        };

        RawBandCounts {
            committed: now.committed.saturating_sub(baseline.committed),
            aborted: now.aborted.saturating_sub(baseline.aborted),
            queries: now.queries.saturating_sub(&baseline.queries),
            errors: now.errors.saturating_sub(baseline.errors),
            error_breakdown,
            latencies_ns,
        }
    }

    /// Mean latency in milliseconds over a range of sample indices.
    pub async fn mean_latency_ms(&self, range: Range<usize>) -> f64 {
        let latencies = self.latencies.lock().await;
        let end = range.end.min(latencies.len());
        let start = range.start.min(end);
        let window = &latencies[start..end];
        if window.is_empty() {
            return 0.0;
        }
        let total: f64 = window.iter().map(|ns| *ns as f64).sum();
        total / window.len() as f64 / 1_000_000.0
    }

    fn query_counts(&self) -> QueryCounts {
        let load = |kind: QueryKind| self.queries[kind.slot()].load(Ordering::Relaxed);
        QueryCounts {
            select: load(QueryKind::Select),
            insert: load(QueryKind::Insert),
            update: load(QueryKind::Update),
            delete: load(QueryKind::Delete),
            other: load(QueryKind::Other),
        }
    }
}
