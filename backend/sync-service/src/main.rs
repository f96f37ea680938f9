use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::{bail, Context, Result};
use sync_service::config::Config;
use sync_service::infra::Infra;
use sync_service::metrics;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Upper bound for in-flight deliveries to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting sync-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        exchange = %config.broker.exchange,
        database = %config.mongo.database,
        index = %config.elasticsearch.index,
        post_audit_enabled = config.sync.post_audit_enabled,
        max_attempts = config.sync.max_attempts,
        "Configuration loaded"
    );

    let infra = Infra::connect(&config)
        .await
        .context("Failed to connect to infrastructure")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = JoinSet::new();
    sync_service::start_consumers(&infra, &config, shutdown_rx, &mut workers)
        .await
        .context("Failed to start consumers")?;

    let http_server = HttpServer::new(|| {
        App::new()
            .route("/health", web::get().to(metrics::health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
    })
    .bind(("0.0.0.0", config.http_port))
    .context("Failed to bind HTTP server")?
    .run();
    let http_handle = http_server.handle();
    let http_task = tokio::spawn(http_server);
    info!(port = config.http_port, "Health and metrics server started");

    let stopped_early = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            false
        }
        Some(_) = workers.join_next() => {
            error!("Consumer worker stopped unexpectedly, shutting down");
            true
        }
    };

    // Stop taking deliveries, let in-flight ones finish, then close connections.
    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(result) = workers.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "Consumer worker panicked");
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!("Workers did not drain in time, aborting them");
    }
    workers.shutdown().await;
    infra.close().await;

    http_handle.stop(true).await;
    if let Err(err) = http_task.await {
        warn!(error = %err, "HTTP server task failed");
    }

    info!("sync-service stopped");
    if stopped_early {
        bail!("consumer workers stopped before shutdown was requested");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sync_service=info,event_schema=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}
