use astrocam::archive::select_backend;
use astrocam::config::{executable_dir, load_areas, load_config};
use astrocam::pipeline::SCRATCH_DIR_NAME;
use astrocam::{Pipeline, PipelineOptions, RunMode, RunOutcome, run_with_shutdown};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "astrocam", version)]
#[command(about = "Batch camera images per sky area, archive them and upload the archives", long_about = None)]
struct Cli {
    /// Run in test mode (exit on errors, timeout after 2 minutes)
    #[arg(long)]
    test: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("astrocam=info"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();
}

async fn run(mode: RunMode) -> astrocam::Result<RunOutcome> {
    let base_dir = executable_dir()?;
    let config = load_config(&base_dir)?;
    config.validate()?;

    let areas = load_areas()?;
    if areas.is_empty() {
        warn!("areas file lists no areas, only leftover archives will be delivered");
    }

    let backend = select_backend(config.archive_mode);
    let mut pipeline = Pipeline::new(
        &config,
        areas,
        &base_dir.join(SCRATCH_DIR_NAME),
        backend,
        mode,
        PipelineOptions::default(),
    )
    .await?;

    run_with_shutdown(&mut pipeline).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let mode = if cli.test {
        RunMode::Test
    } else {
        RunMode::Normal
    };

    match run(mode).await {
        Ok(RunOutcome::Shutdown) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::IdleTimeout) => {
            info!("test run finished without new images");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "astrocam stopped");
            ExitCode::FAILURE
        }
    }
}
