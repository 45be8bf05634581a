//! Equisim — multi-user equity trading simulator engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use equisim_core::api::{self, AppState};
use equisim_core::bots::BotManager;
use equisim_core::config::Config;
use equisim_core::generator::OrderGenerator;
use equisim_core::ledger::UserLedger;
use equisim_core::news::NewsEngine;
use equisim_core::orchestrator::TickOrchestrator;
use equisim_core::orderbook::OrderBook;
use equisim_core::registry::Registry;
use equisim_core::risk::RiskGate;
use equisim_core::snapshot::SeedSnapshot;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("loading configuration")?;

    let snapshot = match &config.seed_path {
        Some(path) => SeedSnapshot::load(path).with_context(|| format!("loading seed snapshot from {path}"))?,
        None => {
            tracing::info!("no SEED_SNAPSHOT_PATH configured, using built-in demo snapshot");
            SeedSnapshot::demo()
        }
    };

    let symbols: Vec<String> = snapshot.instruments.iter().map(|i| i.id.clone()).collect();
    let instruments = Arc::new(snapshot.instruments.clone());

    let registry = Arc::new(Registry::new(
        snapshot.instruments.clone(),
        snapshot.factors.clone(),
        snapshot.betas.clone(),
    ));
    let ledger = Arc::new(UserLedger::new());
    let book = Arc::new(OrderBook::new(symbols.clone(), ledger.clone()));
    let risk = Arc::new(RiskGate::new(registry.clone(), ledger.clone()));
    let news = Arc::new(NewsEngine::new(registry.clone(), snapshot.news_events.clone()));
    let prices = Arc::new(equisim_core::priceproc::PriceSimulator::new(snapshot.instruments.clone()));
    let bots = Arc::new(BotManager::new(book.clone(), snapshot.instruments.clone()));
    let generator = Arc::new(OrderGenerator::new(book.clone(), prices.clone(), symbols.clone()));

    let orchestrator = Arc::new(TickOrchestrator::new());
    orchestrator.spawn_all(
        &config,
        news.clone(),
        prices.clone(),
        bots.clone(),
        generator.clone(),
        book.clone(),
        symbols.clone(),
    );

    let cors_origins = config.cors_origins.clone();
    let cors = CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .allow_origin(AllowOrigin::list(
            cors_origins
                .iter()
                .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok()),
        ));

    let state = AppState {
        book,
        ledger,
        risk,
        news,
        bots,
        instruments,
        orchestrator: orchestrator.clone(),
    };

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding to port {}", config.port))?;
    tracing::info!(port = config.port, "equisim listening");

    axum::serve(listener, app).await.context("serving http")?;

    orchestrator.shutdown();
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
