use anyhow::Context;
use cinepost_metadata::{Cascade, ProviderSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Provider credentials are read once here and injected into the cascade
    let settings = ProviderSettings::from_env();
    let cascade = Cascade::from_settings(&settings);

    for provider in cascade.providers() {
        info!(
            provider = %provider.name,
            kind = ?provider.kind,
            grounding = provider.supports_grounding,
            "provider enabled"
        );
    }
    for skipped in cascade.unconfigured() {
        warn!(provider = %skipped.name, setting = %skipped.setting, "provider not configured");
    }
    info!(timeout = ?settings.attempt_timeout(), "per-attempt timeout");

    let app = cinepost_server::routes::build_router(cinepost_server::state::AppState::new(cascade));

    let bind_addr =
        std::env::var("CINEPOST_BIND").unwrap_or_else(|_| "127.0.0.1:8787".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("failed to bind")?;
    info!(addr = %bind_addr, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
