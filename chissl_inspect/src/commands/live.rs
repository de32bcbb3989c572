//! Follow live traffic until Ctrl+C or the stream ends

use super::shutdown_signal;
use anyhow::Result;
use chissl_common::EntityRef;
use chissl_inspect::api::CaptureApi;
use chissl_inspect::inspector::{StreamClient, ViewMode};
use chissl_inspect::terminal::TerminalView;
use std::sync::Arc;
use std::time::Duration;

const STATE_POLL: Duration = Duration::from_millis(250);

pub async fn run(api: CaptureApi, entity: EntityRef, capacity: usize) -> Result<()> {
    let view = Arc::new(TerminalView::new(ViewMode::Live));
    let mut client = StreamClient::new(Arc::new(api), view, capacity);
    client.start_live(entity.clone()).await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut poll = tokio::time::interval(STATE_POLL);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = poll.tick() => {
                if !client.state().is_open() {
                    break;
                }
            }
        }
    }

    let failure = client.last_error();
    let dropped = client.dropped_events();
    client.stop_live().await;

    if dropped > 0 {
        tracing::warn!("Dropped {} malformed events from {}", dropped, entity);
    }
    if let Some(err) = failure {
        anyhow::bail!("Live stream for {} failed: {}", entity, err);
    }
    Ok(())
}
