//! Auction marketplace backend — entry point.
//!
//! Runs a background sweeper task that closes overdue auctions and
//! exposes the Axum REST API for auctions, bidding, settlement and
//! bid history.

mod api;
mod bidding;
mod closer;
mod config;
mod db;
mod errors;
mod gateway;
mod history;
mod ledger;
mod models;
mod search;
mod settlement;
mod sweeper;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use gateway::DummyGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // ─── Background sweeper ───────────────────────────────
    tokio::spawn(sweeper::run(pool.clone(), config.sweep_interval_secs));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        pool,
        gateway: Arc::new(DummyGateway),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/auctions", post(api::create_auction))
        .route("/auctions/search", post(api::search_auctions))
        .route("/auctions/:id", get(api::get_auction))
        .route(
            "/auctions/:id/bids",
            get(api::get_auction_bids).post(api::place_bid),
        )
        .route("/auctions/:id/end", post(api::end_auction))
        .route("/auctions/:id/status", get(api::get_auction_status))
        .route("/orders", post(api::create_order))
        .route("/orders/:id", get(api::get_order))
        .route("/orders/:id/shipping-method", put(api::update_shipping_method))
        .route("/orders/:id/pay", post(api::pay_order))
        .route("/orders/:id/receipt", get(api::get_receipt))
        .route("/orders/:id/shipment", get(api::get_shipment))
        .route("/users/me/bids", get(api::get_my_bids))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
