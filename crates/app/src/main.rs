/// Delivery Estimation Backend
///
/// Entry point of the food-delivery backend. It serves nearby merchant
/// search, delivery estimates, order confirmation and order history over HTTP.
///
/// # Architecture
///
/// - Repository layer for data access (PostgreSQL through a shared pool)
/// - Service layer for business logic
/// - API layer for HTTP endpoints and metrics
///
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use app_config::AppConfig;
use repository::{PgCatalogRepository, PgPurchaseRepository};
use server::Server;
use service::{PurchaseService, PurchaseServiceImpl};

/// Initialize the tracing subscriber for logging; `RUST_LOG` overrides the `info` default.
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    info!("Delivery backend starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db_pool = db::init_db_pool(&config)
        .await
        .context("Failed to initialize database")?;
    info!("Database initialized successfully");

    let rules = config.delivery_rules();
    info!(
        radius_km = rules.service_radius_km,
        speed_kmh = rules.courier_speed_kmh,
        "Delivery rules loaded"
    );
    let purchase_service: Arc<dyn PurchaseService> = Arc::new(PurchaseServiceImpl::new(
        PgCatalogRepository::new(db_pool.clone()),
        PgPurchaseRepository::new(db_pool),
        rules,
    ));

    // Cancelled once on shutdown; every request token is derived from it.
    let shutdown = CancellationToken::new();
    let http_server = Server::new(config.http_port, purchase_service, shutdown.clone())?;

    let mut tasks = JoinSet::new();
    tasks.spawn(async move {
        if let Err(err) = http_server.start().await {
            error!("HTTP server error: {:#}", err);
            return Err(err);
        }
        Ok(())
    });

    tokio::select! {
        _ = server::shutdown_signal() => {}
        Some(res) = tasks.join_next() => {
            // The server stopped on its own, which only happens on error.
            shutdown.cancel();
            return match res {
                Ok(inner) => inner,
                Err(err) => Err(err).context("HTTP server task failed"),
            };
        }
    }

    shutdown.cancel();
    let drain = async {
        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                error!("Task error: {}", err);
            }
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        warn!(
            "In-flight requests did not finish within {:?}, aborting",
            config.shutdown_timeout
        );
        tasks.abort_all();
    }

    info!("Application stopped");
    Ok(())
}
