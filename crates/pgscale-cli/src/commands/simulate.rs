use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use pgscale_core::BenchConfig;
use pgscale_engine::{ScalingEngine, ScalingResult, StopReason, Workload};

use crate::synthetic::SyntheticWorkload;
use crate::OutputFormat;

pub async fn simulate(
    config_path: &Path,
    output: OutputFormat,
    cores: usize,
    service_ms: u64,
) -> anyhow::Result<()> {
    let config = BenchConfig::from_file(config_path)?;
    let engine = ScalingEngine::from_bench_config(&config)
        .with_context(|| format!("invalid scaling config in {}", config_path.display()))?;
    let workload = Arc::new(SyntheticWorkload::new(
        &config.run.workload,
        cores,
        Duration::from_millis(service_ms),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing after completed bands");
            let _ = shutdown_tx.send(true);
        }
    });

    workload.setup(&config.run.target).await?;
    let result = engine.run(Arc::clone(&workload), shutdown_rx).await;
    if let Err(e) = workload.cleanup(&config.run.target).await {
        warn!(error = %e, "workload cleanup failed");
    }
    signal.abort();

    let result = result?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Summary => println!("{}", format_summary(&result)),
    }
    Ok(())
}

pub fn format_summary(result: &ScalingResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} / {}: {} bands in {:.1}s",
        result.workload_name,
        result.strategy_name,
        result.bands.len(),
        result.total_duration.as_secs_f64()
    );
    match &result.stop_reason {
        StopReason::Completed => {}
        StopReason::Cancelled => {
            let _ = writeln!(out, "stopped early: cancelled");
        }
        StopReason::EarlyTerminated(reason) => {
            let _ = writeln!(out, "stopped early: {reason}");
        }
    }

    let _ = writeln!(
        out,
        "\n{:>4}  {:>9}  {:>10}  {:>9}  {:>9}  {:>6}  {:>6}",
        "band", "workers", "conns", "tps", "p95 ms", "err %", "health"
    );
    for b in &result.bands {
        let _ = writeln!(
            out,
            "{:>4}  {:>9}  {:>10}  {:>9.1}  {:>9.2}  {:>6.2}  {:>6.2}",
            b.band_id,
            b.workers(),
            b.connections(),
            b.tps(),
            b.p95_latency_ms(),
            b.error_rate(),
            b.health_score
        );
    }

    if let Some(fit) = &result.analysis.regression {
        let _ = writeln!(
            out,
            "\nbest fit: {} (R² {:.3})",
            fit.model.label(),
            fit.r_squared
        );
    }
    for region in &result.analysis.regions {
        let _ = writeln!(
            out,
            "region: {} bands {}-{}",
            region.kind.label(),
            region.start_band,
            region.end_band
        );
    }

    match &result.optimal_config {
        Some(o) => {
            let _ = writeln!(
                out,
                "\noptimal: {} workers / {} connections ({:.1} TPS)",
                o.workers, o.connections, o.tps
            );
        }
        None => {
            let _ = writeln!(out, "\noptimal: none");
        }
    }
    if let Some(e) = &result.analysis_error {
        let _ = writeln!(out, "analysis: {e}");
    }

    if !result.recommendations.is_empty() {
        let _ = writeln!(out, "\nrecommendations:");
        for r in &result.recommendations {
            let _ = writeln!(out, "  - {r}");
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("pgscale.toml");
        std::fs::write(
            &path,
            r#"
[run]
workload = "synthetic"

[scaling]
strategy = "synchronized"
min_workers = 1
max_workers = 3
min_connections = 1
max_connections = 3
warmup = "0s"
duration = "30ms"
cooldown = "0s"
grace = "50ms"
sample_interval = "10ms"
"#,
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn summary_of_a_short_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = BenchConfig::from_file(&fast_config(dir.path())).unwrap();
        let engine = ScalingEngine::from_bench_config(&config).unwrap();
        let workload = Arc::new(SyntheticWorkload::new("synthetic", 2, Duration::from_millis(1)));
        let (_tx, rx) = watch::channel(false);

        let result = engine.run(workload, rx).await.unwrap();
        let text = format_summary(&result);
        assert!(text.starts_with("synthetic / synchronized: 3 bands"));
        assert!(text.contains("optimal:"));
        assert!(text.contains("recommendations:"));
        assert!(!text.contains("stopped early"));
    }

    #[tokio::test]
    async fn simulate_command_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = fast_config(dir.path());
        simulate(&path, OutputFormat::Json, 2, 1).await.unwrap();
        assert!(simulate(&dir.path().join("missing.toml"), OutputFormat::Summary, 2, 1)
            .await
            .is_err());
    }
}
