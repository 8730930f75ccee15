use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;

use ragquery_backend::core::config::AppPaths;
use ragquery_backend::core::logging;
use ragquery_backend::server;
use ragquery_backend::state::AppState;

const SMOKE_QUESTION: &str = "Какие документы есть в хранилище?";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let state = AppState::initialize(paths).context("Failed to initialize application")?;
    log_effective_config(&state);

    let built = state
        .index_documents()
        .await
        .context("Failed to build the document index")?;
    tracing::info!(
        "Index ready via {} strategy: {} chunks",
        built.strategy_used,
        built.value.chunks
    );

    let smoke_answer = state.orchestrator.query(SMOKE_QUESTION).await;
    tracing::info!("Smoke query answer: {}", smoke_answer);

    let server_settings = &state.settings.server;
    let bind_addr = format!("{}:{}", server_settings.host, server_settings.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("RAGQ_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn log_effective_config(state: &AppState) {
    match serde_json::to_value(state.settings.as_ref()) {
        Ok(value) => {
            let redacted: Value = state.config.redact_sensitive_values(&value);
            tracing::info!("Effective configuration: {}", redacted);
        }
        Err(err) => tracing::warn!("Could not serialize configuration: {}", err),
    }
}
