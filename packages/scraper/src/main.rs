use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scraper_core::config::Config;
use scraper_core::runner::DatabaseRunner;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Invalid configuration terminates before any I/O.
    let cfg = Config::parse();
    if let Err(err) = cfg.validate() {
        eprintln!("invalid configuration: {err:#}");
        return ExitCode::FAILURE;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scraper_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!(
        concurrency = cfg.concurrency,
        produce = cfg.produce,
        "starting placescout"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            cancel.cancel();
        });
    }

    match run(cfg, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config, cancel: CancellationToken) -> Result<()> {
    let runner = DatabaseRunner::new(cfg).await?;
    let result = runner.run(cancel).await;
    runner.close().await;
    result
}
