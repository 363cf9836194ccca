use std::path::Path;

use anyhow::{bail, Context};
use pgscale_core::BenchConfig;

pub fn init(path: &Path, workload: &str, target: &str) -> anyhow::Result<()> {
    let output = path.join("pgscale.toml");
    if output.exists() {
        bail!("{} already exists", output.display());
    }

    let config = BenchConfig::scaffold(workload, target);
    std::fs::write(&output, config.to_toml_string()?)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("✓ Generated {}", output.display());
    Ok(())
}
