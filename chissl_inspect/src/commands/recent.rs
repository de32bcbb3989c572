//! One-shot fetch of recent traffic

use anyhow::{Context, Result};
use chissl_common::{EntityRef, FilterKind};
use chissl_inspect::api::CaptureApi;
use chissl_inspect::inspector::{HistoryLoader, HistoryQuery, RenderMode, ViewMode};
use chissl_inspect::terminal::TerminalView;
use std::sync::Arc;

pub async fn run(
    api: CaptureApi,
    entity: EntityRef,
    filter: FilterKind,
    mode: RenderMode,
) -> Result<()> {
    // The error is reported once, by main
    let view = Arc::new(TerminalView::one_shot(ViewMode::Recent));
    let loader = HistoryLoader::new(Arc::new(api), view);
    loader.set_render_mode(mode);

    let events = loader
        .load_recent(HistoryQuery::new(entity.clone(), filter))
        .await
        .with_context(|| format!("Failed to load recent traffic for {}", entity))?;

    tracing::info!("{} events for {}", events.len(), entity);
    Ok(())
}
