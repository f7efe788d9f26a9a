use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use ragchat_backend::core;
use ragchat_backend::server;
use ragchat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    core::logging::init(&state.paths);

    match state.config.load_config() {
        Ok(raw) => tracing::debug!(
            config = %state.config.redact_sensitive_values(&raw),
            "Effective configuration"
        ),
        Err(err) => tracing::warn!("Failed to reload config for logging: {}", err),
    }

    let bind_addr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    );
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!(
        llm = state.llm.name(),
        store = ?state.settings.rag.store,
        embedding = ?state.settings.embedding.provider,
        "Listening on {}",
        addr
    );

    let app: Router = server::router::router(state.clone());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
