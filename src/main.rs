use anyhow::{Context, Result};
use clap::Parser;
use declextract::{
    cli::Cli,
    config::{ManagerConfig, RunConfig},
    orchestrator::ToolExtractor,
    pipeline,
    subsystem::Extractor,
};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; --debug raises everything to TRACE
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let mgr = ManagerConfig::load_file(&args.config).context("failed to load manager config")?;
    let cfg = RunConfig::new(&mgr, &args)?;

    if cfg.workers == 0 {
        anyhow::bail!("Invalid value for --jobs: 0 (must be >= 1)");
    }

    let subsystems = match &cfg.subsystem_rules {
        Some(path) => Extractor::from_file(path)?,
        None => Extractor::linux()?,
    };

    let extractor = ToolExtractor::new(&cfg.binary, cfg.compile_db());
    let summary = pipeline::run(&cfg, &extractor, &subsystems)?;
    tracing::info!(
        "processed {} units: {} declarations ({} unused removed), {} interfaces",
        summary.units,
        summary.declarations,
        summary.removed,
        summary.interfaces
    );
    Ok(())
}
