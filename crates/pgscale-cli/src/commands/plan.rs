use std::path::Path;

use anyhow::Context;
use pgscale_core::BenchConfig;
use pgscale_engine::ScalingEngine;

pub fn plan(config_path: &Path) -> anyhow::Result<()> {
    let config = BenchConfig::from_file(config_path)?;
    let engine = ScalingEngine::from_bench_config(&config)
        .with_context(|| format!("invalid scaling config in {}", config_path.display()))?;
    println!("{}", format_plan(&engine));
    Ok(())
}

pub fn format_plan(engine: &ScalingEngine) -> String {
    let c = engine.config();
    let mut out = format!(
        "{} strategy, {} bands (warmup {:?}, measure {:?}, cooldown {:?})\n",
        c.strategy,
        engine.plan().len(),
        c.warmup,
        c.measurement,
        c.cooldown
    );
    out.push_str(&format!("{:>5}  {:>8}  {:>11}\n", "band", "workers", "connections"));
    for (i, band) in engine.plan().iter().enumerate() {
        out.push_str(&format!(
            "{:>5}  {:>8}  {:>11}\n",
            i + 1,
            band.workers,
            band.connections
        ));
    }
    out.push_str(&format!(
        "estimated duration: {}s",
        engine.estimate_remaining(0).as_secs()
    ));
    out
}
