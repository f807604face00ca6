mod config;
mod context;
mod errors;
mod extraction;
mod generation;
mod llm_client;
mod report;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::context::TokenBudget;
use crate::extraction::ocr::OcrEngine;
use crate::llm_client::{LlmClient, LlmSettings};
use crate::report::store::ReportStore;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting finreport v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(LlmSettings::from(&config))?;
    info!(
        "LLM client initialized (model: {}, temperature: {})",
        llm.model(),
        config.llm_temperature
    );

    // Tokenizer load is slow; build it once
    let budget = TokenBudget::new(config.max_context_tokens)?;
    info!(
        "Context budget: {} tokens, strategy {:?}",
        budget.max_tokens(),
        config.context_strategy
    );

    let ocr = OcrEngine::new(config.tesseract_cmd.clone());

    let reports = ReportStore::new(&config.reports_dir)?;
    info!("Reports directory: {}", reports.dir().display());

    // Build app state
    let state = AppState {
        config: config.clone(),
        llm: Arc::new(llm),
        budget,
        ocr,
        reports,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
