use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use booking_server::booking::{BookingService, MockPaymentGateway, PgInventoryStore, SystemClock};
use booking_server::config::Config;
use booking_server::routes::create_routes;
use booking_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("booking_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;

    tracing::info!("Migrations run successfully");

    tracing::warn!("Using mock payment gateway, only the test card is accepted");
    let booking = BookingService::new(
        Arc::new(PgInventoryStore::new(pool)),
        Arc::new(MockPaymentGateway::new()),
        Arc::new(SystemClock),
    );
    let app = create_routes(AppState::new(booking, config.request_timeout), &config);

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Server running at http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
