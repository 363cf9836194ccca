use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod synthetic;

#[derive(Parser)]
#[command(
    name = "pgscale",
    about = "pgscale: progressive scaling analysis for PostgreSQL workloads",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter pgscale.toml
    Init {
        /// Directory to write into (default: current directory)
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Workload name recorded in results
        #[arg(short, long, default_value = "synthetic")]
        workload: String,
        /// Connection string handed to the workload
        #[arg(short, long, default_value = "")]
        target: String,
    },
    /// Print the band sequence a config would run
    Plan {
        #[arg(short, long, default_value = "pgscale.toml")]
        config: PathBuf,
    },
    /// Run the full scaling engine against an in-process synthetic workload.
    ///
    /// The synthetic workload models a server with a fixed number of
    /// cores: throughput grows with concurrency until the cores saturate,
    /// then latency climbs and serialization failures appear.
    Simulate {
        #[arg(short, long, default_value = "pgscale.toml")]
        config: PathBuf,
        /// Output format: json or summary
        #[arg(short, long, value_enum, default_value = "summary")]
        output: OutputFormat,
        /// Simulated server cores
        #[arg(long, default_value = "8")]
        cores: usize,
        /// Simulated service time per transaction, in milliseconds
        #[arg(long, default_value = "2")]
        service_ms: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Summary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Init {
            path,
            workload,
            target,
        } => commands::init::init(&path, &workload, &target),
        Commands::Plan { config } => commands::plan::plan(&config),
        Commands::Simulate {
            config,
            output,
            cores,
            service_ms,
        } => commands::simulate::simulate(&config, output, cores, service_ms).await,
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,pgscale=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
