use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use walletsweep_core::Result;
use walletsweep_scheduler::{
    cli::{Cli, Command},
    config::SchedulerConfig,
    executor, Orchestrator, SessionRequest,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,walletsweep_scheduler=debug")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(
                event = "walletsweep.scheduler.failed",
                kind = err.kind(),
                error = %err,
                "session aborted"
            );
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = SchedulerConfig::from_env()?;
    tracing::debug!(event = "walletsweep.scheduler.config", config = ?cfg, "loaded config");

    let Command::Extract {
        wallet,
        chain_id,
        from_block,
        to_block,
    } = cli.command;

    let store = if cfg.session_lease {
        Some(cfg.storage.build().await?)
    } else {
        None
    };
    let executor = executor::build(&cfg).await?;
    let orchestrator = Orchestrator::new(executor, cfg.session_settings(store)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(event = "walletsweep.scheduler.shutdown", "interrupt received; cancelling wait");
            on_signal.cancel();
        }
    });

    let report = orchestrator
        .run(
            &SessionRequest {
                wallet,
                chain_id,
                from_block,
                to_block,
            },
            &cancel,
        )
        .await?;

    let (succeeded, failed, unknown) = report.tally();
    println!(
        "session_id={} extract_tasks={} succeeded={succeeded} failed={failed} unknown={unknown}",
        report.session_id,
        report.extract_tasks.len()
    );
    Ok(())
}
