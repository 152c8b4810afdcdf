use assets_optimizer::args::Args;
use assets_optimizer::config::ProbeBackend;
use assets_optimizer::convert::CommandEncoder;
use assets_optimizer::pipeline::Pipeline;
use assets_optimizer::probe::{CommandProbe, ExifToolProbe, ProbeClient};
use anyhow::Context;
use clap::Parser;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    // Validate options and build the run configuration
    let report_path = args.report.clone();
    let config = args.into_config();

    // Select probe backend and encoders
    let probe: Box<dyn ProbeClient> = match config.probe_backend {
        ProbeBackend::Command => Box::new(CommandProbe::default()),
        ProbeBackend::Exiftool => Box::new(ExifToolProbe::new()),
    };
    let encoder = CommandEncoder::new(config.webp_quality);

    // Process files
    let report = Pipeline::new(&config, &*probe, &encoder).run()?;

    // Save the run report if requested
    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
