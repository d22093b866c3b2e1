//! GMP relayer binary
//!
//! `gmp-relayer subscriber` reports gateway contract calls upstream,
//! `gmp-relayer includer` executes coordination tasks on a destination chain.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use gmp_relayer::chain::{ChainProvider, EventWatcher};
use gmp_relayer::cli::{Cli, Command};
use gmp_relayer::config::{IncluderSettings, SubscriberSettings, Tuning};
use gmp_relayer::coordination::CoordinationClient;
use gmp_relayer::includer::{initial_cursor, TaskPoller, TaskProcessor};
use gmp_relayer::metrics::MetricsServer;
use gmp_relayer::signer::{DigestSigner, ExternalKeystoreBackend};
use gmp_relayer::state;
use gmp_relayer::tx::{GasEstimator, TransactionSender};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    info!("Starting GMP relayer v{}", env!("CARGO_PKG_VERSION"));

    let tuning = Tuning::load(cli.config.as_deref()).context("loading tuning file")?;
    let (stop, shutdown) = watch::channel(false);

    // Start metrics server
    let metrics_handle = if tuning.metrics.enabled {
        let server = MetricsServer::new(tuning.metrics.port);
        let shutdown = shutdown.clone();
        info!("Metrics: http://0.0.0.0:{}/metrics", tuning.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let worker: JoinHandle<()> = match cli.command {
        Command::Includer(args) => {
            let settings = IncluderSettings::from_env(&args, tuning)?;
            let poller = Arc::new(build_includer(&settings, shutdown.clone()).await?);
            tokio::spawn(async move { poller.run(shutdown).await })
        }
        Command::Subscriber(args) => {
            let settings = SubscriberSettings::from_env(&args, tuning)?;
            let watcher = build_subscriber(&settings).await?;
            tokio::spawn(async move {
                if let Err(e) = watcher.run(shutdown).await {
                    error!("Event watcher error: {}", e);
                }
            })
        }
    };

    info!("GMP relayer is running");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");
    let _ = stop.send(true);

    // The in-flight task finishes or abandons its receipt wait before the loop exits
    worker.await.context("relay loop panicked")?;
    if let Some(h) = metrics_handle {
        let _ = h.await;
    }

    info!("GMP relayer stopped");
    Ok(())
}

async fn build_includer(
    settings: &IncluderSettings,
    shutdown: watch::Receiver<bool>,
) -> Result<TaskPoller> {
    let relayer = &settings.tuning.relayer;

    let provider = Arc::new(ChainProvider::new(settings.destination.clone())?);
    if !provider.health_check().await {
        warn!(
            "Destination chain {} is not reachable yet",
            settings.destination.chain
        );
    }

    let coordination = Arc::new(CoordinationClient::new(&settings.coordination)?);
    let checkpoint = state::open(&settings.tuning.checkpoint, &settings.task_chain).await?;
    let cursor = initial_cursor(
        settings.latest_task.clone(),
        settings.resume_from_checkpoint,
        checkpoint.as_ref(),
    )
    .await?;

    let sender = TransactionSender::new(
        provider,
        settings.relayer_address,
        GasEstimator::new(
            relayer.gas_limit_buffer_percent,
            relayer.gas_price_buffer_percent,
            relayer.max_gas_price_gwei,
        ),
        Duration::from_millis(relayer.receipt_poll_interval_ms),
        relayer.receipt_timeout_secs.map(Duration::from_secs),
        shutdown,
    );
    let backend = ExternalKeystoreBackend::new(
        settings.tuning.signer.command.clone(),
        settings.keystore.clone(),
    )?;

    let processor = Arc::new(TaskProcessor::new(
        Arc::new(sender),
        Arc::new(DigestSigner::new(backend)),
        coordination.clone(),
        checkpoint,
        settings.destination.contract_address,
        settings.destination.api_name(),
    ));

    info!(
        "Includer ready: destination {} (chain id {}), target {:?}, task queue {}",
        settings.destination.chain,
        settings.destination.chain_id,
        settings.destination.contract_address,
        settings.task_chain
    );

    Ok(TaskPoller::new(
        coordination,
        processor,
        settings.task_chain.clone(),
        settings.poll_interval,
        cursor,
    ))
}

async fn build_subscriber(settings: &SubscriberSettings) -> Result<EventWatcher> {
    let provider = Arc::new(ChainProvider::new(settings.source.clone())?);
    if !provider.health_check().await {
        warn!("Source chain {} is not reachable yet", settings.source.chain);
    }

    let coordination = Arc::new(CoordinationClient::new(&settings.coordination)?);

    Ok(EventWatcher::new(
        provider,
        coordination,
        settings.from_block,
        settings.poll_interval,
        settings.tuning.relayer.max_block_range,
    ))
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,gmp_relayer=debug,hyper=warn,sqlx=warn")
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
