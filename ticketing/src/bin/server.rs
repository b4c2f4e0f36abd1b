//! Ticketing booking server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Opens the `PostgreSQL` booking store (or, with the `in-memory-store`
//!   feature and no `DATABASE_URL`, an in-memory one)
//! - Starts the Prometheus exporter and the pending reclaimer
//! - Serves the HTTP API until Ctrl+C
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/ticketing \
//! STRIPE_SECRET_KEY=sk_test_... \
//! STRIPE_WEBHOOK_SECRET=whsec_... \
//! cargo run --bin server
//! ```

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use ticketing::config::LogFormat;
use ticketing::{AppState, Config, HttpPaymentGateway, build_router, metrics, reclaimer};
use ticketing_core::webhook::WebhookVerifier;
use ticketing_core::{BookingStore, RetryPolicy, SystemClock};
use ticketing_postgres::PostgresBookingStore;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    init_tracing(config.server.log_format);

    tracing::info!("Starting ticketing server...");
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        postgres = config.database.url.is_some(),
        payments_api = %config.payments.api_base,
        "Configuration loaded"
    );

    if config.server.metrics_port != 0 {
        let addr = SocketAddr::new(config.server.host.parse()?, config.server.metrics_port);
        metrics::install_exporter(addr)?;
    }

    let store = open_store(&config).await?;
    let gateway = Arc::new(HttpPaymentGateway::new(&config.payments)?);
    let retry = RetryPolicy::default().with_max_retries(config.booking.max_retries);

    let mut state = AppState::new(store, gateway, Arc::new(SystemClock), retry);
    match &config.payments.webhook_secret {
        Some(secret) => {
            let tolerance = Duration::from_secs(config.payments.webhook_tolerance);
            state = state.with_webhooks(WebhookVerifier::new(secret.clone(), tolerance));
        },
        None => tracing::warn!("STRIPE_WEBHOOK_SECRET not set; webhook deliveries will be refused"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reclaim_task = config.booking.pending_ttl().map(|ttl| {
        reclaimer::spawn(
            state.coordinator.clone(),
            ttl,
            config.booking.reclaim_interval(),
            shutdown_rx,
        )
    });
    if reclaim_task.is_none() {
        tracing::info!("Pending reclaimer disabled");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Ticketing server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    let _ = shutdown_tx.send(true);
    if let Some(task) = reclaim_task {
        let grace = Duration::from_secs(config.server.shutdown_timeout);
        if tokio::time::timeout(grace, task).await.is_err() {
            tracing::warn!("Pending reclaimer did not stop within the shutdown timeout");
        }
    }

    tracing::info!("Ticketing server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ticketing=debug,ticketing_core=debug,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn BookingStore>> {
    let Some(url) = config.database.url.as_deref() else {
        return in_memory_store();
    };

    let store = PostgresBookingStore::connect(url, config.database.max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    if config.database.run_migrations {
        store.migrate().await.context("failed to run migrations")?;
        tracing::info!("Database migrations applied");
    }
    Ok(Arc::new(store))
}

#[cfg(feature = "in-memory-store")]
#[allow(clippy::unnecessary_wraps)]
fn in_memory_store() -> anyhow::Result<Arc<dyn BookingStore>> {
    tracing::warn!("DATABASE_URL not set; bookings are kept in memory and lost on restart");
    Ok(Arc::new(ticketing_testing::InMemoryBookingStore::new()))
}

#[cfg(not(feature = "in-memory-store"))]
fn in_memory_store() -> anyhow::Result<Arc<dyn BookingStore>> {
    anyhow::bail!("DATABASE_URL must be set (build with --features in-memory-store to run without PostgreSQL)")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl+C");
    }
    tracing::info!("Shutdown signal received");
}
