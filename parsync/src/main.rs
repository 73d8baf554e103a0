//! parsync - main entry point
//!
//! Parallel rsync with aggregated progress.

use clap::Parser;
use indicatif::HumanBytes;
use parsync::{
    cli::{self, Args},
    config::Config,
    display::ProgressSink,
    shutdown::ShutdownCoordinator,
    utils, IndicatifSink, RsyncCommand, SyncError, Syncer,
};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<SyncError>() {
            Some(SyncError::Interrupted) => {
                eprintln!("Interrupted");
                ExitCode::from(130)
            }
            Some(SyncError::InvalidArguments(_)) => {
                eprintln!("Error: {e}");
                eprintln!("Usage: parsync [-j N] [--config FILE] [--log-level LEVEL] <rsync options> SRC... DEST");
                ExitCode::FAILURE
            }
            _ => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let (trailing, rsync_args) = cli::extract_options(args.rsync_args)?;

    let config_path = trailing.config.or(args.config);
    let config = Config::load(config_path.as_deref())?;

    let log_level = trailing
        .log_level
        .or(args.log_level)
        .unwrap_or_else(|| config.log.level.clone());
    utils::logger::init(&log_level)?;

    let jobs = trailing.jobs.or(args.jobs).unwrap_or(config.sync.jobs);
    if jobs == 0 {
        return Err(SyncError::InvalidArguments("number of jobs must be at least 1".into()).into());
    }

    let command = RsyncCommand::from_args(rsync_args)?
        .with_program(config.rsync.program.clone(), config.rsync.program_args.clone());

    tracing::info!(
        "Starting parsync v{} with {} jobs",
        env!("CARGO_PKG_VERSION"),
        jobs
    );

    let shutdown = ShutdownCoordinator::new();
    let cancel = shutdown.token();
    let signal_handle = tokio::spawn(async move {
        if let Err(e) = shutdown.wait_for_signal().await {
            tracing::warn!("Failed to install signal handlers: {}", e);
        }
    });

    let sink: Arc<dyn ProgressSink> = Arc::new(IndicatifSink::new());
    let mut syncer = Syncer::new(command, jobs, sink)
        .with_tuning(config.estimate_tuning())
        .with_cancel(cancel);

    let result = syncer.run().await;
    signal_handle.abort();

    let summary = result?;
    tracing::info!(
        "Synchronized {} files ({}) with {} jobs",
        summary.files,
        HumanBytes(summary.bytes),
        summary.jobs
    );

    Ok(())
}
