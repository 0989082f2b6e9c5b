//! Metasync - mirror a catalog snapshot into a metadata repository.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metasync_cli::{Args, Runner, SyncTask};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metasync=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting metasync");

    let args = Args::parse();
    let config = args.into_config()?;

    tracing::info!(
        snapshot = %config.snapshot_path.display(),
        repository = %config.repository_path.display(),
        interval_secs = ?config.interval.map(|i| i.as_secs()),
        page_size = config.sync.page_size,
        "configuration loaded"
    );

    let runner = Runner::open(&config)?;

    let Some(interval) = config.interval else {
        let report = runner.run_once().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    };

    let task = SyncTask::start(runner, interval);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl+c");
    }
    tracing::info!("received shutdown signal");
    task.join().await;
    tracing::info!("shutdown complete");

    Ok(())
}
