//! Relay worker binary: polls the outbox table on a fixed interval and ships
//! claimed batches to the columnar sink.
//!
//! Environment variables: see [`outbox_relay::config::RelayConfig`].

use std::sync::Arc;
use std::time::Duration;

use outbox_relay::config::RelayConfig;
use outbox_relay::metrics::RelayMetrics;
use outbox_relay::registry::EventRegistry;
use outbox_relay::relay::RelayWorker;
use outbox_relay::sink::ClickHouseSinkClient;
use outbox_relay::store::PgOutboxStore;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,outbox_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting outbox relay worker");

    let config = RelayConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(PgOutboxStore::new(pool));
    let sink = Arc::new(ClickHouseSinkClient::new(
        &config.sink_host,
        &config.sink_database,
        &config.sink_user,
        &config.sink_password,
        &config.sink_table_name,
    ));
    let registry = EventRegistry::with_defaults();
    let metrics = RelayMetrics::new("outbox-relay");

    let worker = RelayWorker::new(
        store,
        sink,
        registry,
        metrics,
        config.batch_limit,
        config.chunk_size,
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl_c");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut interval = tokio::time::interval(Duration::from_secs(config.tick_interval_secs));

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("finishing in-flight tick before exit");
                    break;
                }
            }
            _ = interval.tick() => {
                if let Err(e) = worker.tick().await {
                    error!(error = %e, "relay tick returned an error, will retry next interval");
                }
            }
        }
    }

    info!("outbox relay worker stopped");
    Ok(())
}
