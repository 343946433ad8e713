use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_outbox::api;
use order_outbox::application::OrderService;
use order_outbox::config::Config;
use order_outbox::messaging::RedpandaPublisher;
use order_outbox::outbox::{OutboxRelay, PgStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering; override with
    // RUST_LOG, e.g. RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_outbox=debug")),
        )
        .init();

    let config = Config::from_env();

    // Store and bus must be reachable at startup; these are the only
    // failures fatal to the process.
    tracing::info!("Connecting to PostgreSQL...");
    let store = Arc::new(PgStore::connect(&config.db_conn_str).await?);
    store.ensure_schema().await?;
    tracing::info!("Connected to PostgreSQL");

    tracing::info!(brokers = %config.bus_conn_str, "Creating bus producer");
    let publisher = Arc::new(RedpandaPublisher::new(&config.bus_conn_str)?);

    let service = Arc::new(OrderService::new(store.clone()));

    let relay = OutboxRelay::new(store, publisher, config.poll_interval);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_handle = tokio::spawn(async move { relay.run(shutdown_rx).await });
    tracing::info!(
        poll_interval_secs = config.poll_interval.as_secs(),
        "Outbox relay started"
    );

    api::serve(service, config.port).await?;

    // The HTTP server handles the termination signal; once it returns, stop
    // the relay between cycles and wait for it.
    let _ = shutdown_tx.send(true);
    relay_handle.await?;

    Ok(())
}
