//! CLI command implementations

pub mod connections;
pub mod inspect;
pub mod live;
pub mod recent;
pub mod watch;

use anyhow::{Context, Result};
use chissl_common::EntityKind;
use chissl_inspect::api::CaptureApi;
use chissl_inspect::config::Config;

/// Build the capture service client from the effective config
pub fn connect(config: &Config) -> Result<CaptureApi> {
    CaptureApi::new(
        &config.server_url,
        config.auth.as_deref(),
        config.request_timeout(),
    )
    .with_context(|| format!("Failed to create client for {}", config.server_url))
}

/// Parse an entity kind argument, accepting the same spellings as the dashboard
pub fn parse_kind(kind: &str) -> Result<EntityKind> {
    kind.parse::<EntityKind>()
        .with_context(|| format!("Expected tunnel, listener or multicast, got '{}'", kind))
}

/// Resolve on Ctrl+C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
