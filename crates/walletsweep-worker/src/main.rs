use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use walletsweep_worker::{config::WorkerConfig, exit_code_for, invoke};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,walletsweep_worker=debug")),
        )
        .init();

    let cfg = match WorkerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::error!(event = "walletsweep.worker.config", error = %err, "invalid configuration");
            return ExitCode::from(exit_code_for(&err));
        }
    };
    tracing::debug!(event = "walletsweep.worker.started", config = ?cfg, "worker started");

    let store = match cfg.storage.build().await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(event = "walletsweep.worker.storage", error = %err, "cannot build object store");
            return ExitCode::from(exit_code_for(&err));
        }
    };

    ExitCode::from(invoke(&cfg, store.as_ref()).await)
}
