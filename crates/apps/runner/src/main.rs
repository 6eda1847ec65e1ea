use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use terracosim::{launch, CosimSpec, RunConfig};
use tracing_subscriber::EnvFilter;

const OUTPUT_ENV: &str = "TERRACOSIM_OUTPUT";
const TIMEOUT_ENV: &str = "TERRACOSIM_TIMEOUT";

#[derive(Parser, Debug)]
#[command(name = "terracosim")]
#[command(about = "Tire/terrain co-simulation runner", long_about = None)]
struct Args {
    /// Co-simulation file (specfiles are resolved relative to it)
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory, overrides the file and TERRACOSIM_OUTPUT
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Simulated end time in seconds
    #[arg(long)]
    end_time: Option<f64>,

    /// Synchronization step in seconds
    #[arg(long)]
    sync_step: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::info!("terracosim v{}", env!("CARGO_PKG_VERSION"));

    let mut spec = CosimSpec::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    apply_overrides(&mut spec, &args)?;
    spec.validate().context("Invalid run parameters")?;

    let loaded = spec.load().context("Failed to load specfiles")?;
    let config = RunConfig::from_spec(&spec);
    if let Some(dir) = &config.output_dir {
        tracing::info!("Writing output to {}", dir.display());
    }

    let summary = launch(&config, loaded).context("Co-simulation failed")?;
    println!("{summary}");
    Ok(())
}

/// Command line flags first, then environment, then the file.
fn apply_overrides(spec: &mut CosimSpec, args: &Args) -> Result<()> {
    if let Some(dir) = &args.output {
        spec.output.directory = Some(dir.clone());
    } else if let Ok(dir) = std::env::var(OUTPUT_ENV) {
        spec.output.directory = Some(PathBuf::from(dir));
    }

    if let Ok(timeout) = std::env::var(TIMEOUT_ENV) {
        spec.timeout = timeout.parse().with_context(|| {
            format!("{TIMEOUT_ENV} must be a number of seconds, got '{timeout}'")
        })?;
    }
    if let Some(end_time) = args.end_time {
        spec.end_time = end_time;
    }
    if let Some(sync_step) = args.sync_step {
        spec.sync_step = sync_step;
    }
    Ok(())
}
