//! Inspector session: one entity bound to the live and recent views

use super::buffer::LiveEntry;
use super::history::{HistoryLoader, HistoryQuery};
use super::render::RenderMode;
use super::stream::{ConnectionState, StreamClient};
use super::view::{InspectorView, ViewMode};
use crate::api::CaptureSource;
use crate::error::Result;
use crate::scheduler::RefreshScheduler;
use chissl_common::{EntityRef, FilterKind, TrafficEvent};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct InspectorSession {
    id: String,
    entity: EntityRef,
    view_mode: ViewMode,
    filter: FilterKind,
    history: Arc<HistoryLoader>,
    stream: StreamClient,
    scheduler: RefreshScheduler,
    view: Arc<dyn InspectorView>,
    refresh_key: String,
    closed: bool,
}

impl InspectorSession {
    /// Bind `entity` to the view and load its recent traffic.
    ///
    /// The live stream is not started until `start_live` is called. A failed
    /// history load is rendered in the view and does not prevent the
    /// session from opening.
    pub async fn open(
        entity: EntityRef,
        source: Arc<dyn CaptureSource>,
        view: Arc<dyn InspectorView>,
        scheduler: RefreshScheduler,
        live_capacity: usize,
    ) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let refresh_key = format!("inspector:{}:recent", &id[..8]);
        tracing::debug!(entity = %entity, session = %id, "Opening inspector session");

        view.opened(&entity);
        let session = Self {
            history: Arc::new(HistoryLoader::new(source.clone(), view.clone())),
            stream: StreamClient::new(source, view.clone(), live_capacity),
            id,
            entity,
            view_mode: ViewMode::Recent,
            filter: FilterKind::All,
            scheduler,
            view,
            refresh_key,
            closed: false,
        };
        session.view.tab_changed(ViewMode::Recent);

        // Errors are already shown in place of the results
        let _ = session.refresh_recent().await;
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn filter(&self) -> FilterKind {
        self.filter
    }

    /// Switch tabs; neither tab's state is torn down
    pub fn show(&mut self, mode: ViewMode) {
        self.view_mode = mode;
        self.view.tab_changed(mode);
    }

    /// Reload recent traffic with the current filter
    pub async fn refresh_recent(&self) -> Result<Vec<TrafficEvent>> {
        let query = HistoryQuery::new(self.entity.clone(), self.filter);
        self.history.load_recent(query).await
    }

    /// Change the event filter and reload
    pub async fn set_filter(&mut self, filter: FilterKind) -> Result<Vec<TrafficEvent>> {
        self.filter = filter;
        self.refresh_recent().await
    }

    /// Re-render the fetched batch; never fetches or waits on one
    pub fn set_render_mode(&self, mode: RenderMode) {
        self.history.set_render_mode(mode);
    }

    pub fn render_mode(&self) -> RenderMode {
        self.history.render_mode()
    }

    /// Current rendering of the recent tab
    pub fn recent_output(&self) -> Option<String> {
        self.history.rendered()
    }

    pub async fn start_live(&mut self) {
        self.stream.start_live(self.entity.clone()).await;
    }

    pub async fn stop_live(&mut self) {
        self.stream.stop_live().await;
    }

    pub fn clear_live(&self) {
        self.stream.clear_live();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn live_entries(&self) -> Vec<LiveEntry> {
        self.stream.entries()
    }

    /// Reload the recent tab every `interval`, or stop doing so with `None`
    pub fn auto_refresh_recent(&self, interval: Option<Duration>) {
        let Some(interval) = interval else {
            self.scheduler.stop(&self.refresh_key);
            return;
        };

        let history = self.history.clone();
        self.scheduler.start(
            self.refresh_key.clone(),
            move || {
                let history = history.clone();
                async move {
                    history.reload().await?;
                    Ok::<(), anyhow::Error>(())
                }
            },
            interval,
        );
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.scheduler.is_active(&self.refresh_key)
    }

    /// Tear the session down: live stream, scheduled refreshes, view state
    pub async fn close(mut self) {
        if self.stream.state().is_open() {
            self.stream.stop_live().await;
        }
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.scheduler.stop(&self.refresh_key);
        self.view.teardown();
        tracing::debug!(entity = %self.entity, session = %self.id, "Inspector session closed");
    }
}

impl Drop for InspectorSession {
    fn drop(&mut self) {
        // The stream client aborts its own task when dropped
        self.release();
    }
}
