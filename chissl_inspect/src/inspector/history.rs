//! Recent traffic loader

use super::render::{self, RenderMode};
use super::view::InspectorView;
use crate::api::CaptureSource;
use crate::error::Result;
use chissl_common::{EntityRef, FilterKind, TrafficEvent};
use std::sync::{Arc, Mutex, MutexGuard};

/// What to fetch; issuing the same query twice is harmless
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub entity: EntityRef,
    pub filter: FilterKind,
}

impl HistoryQuery {
    pub fn new(entity: EntityRef, filter: FilterKind) -> Self {
        Self { entity, filter }
    }
}

#[derive(Default)]
struct HistoryState {
    mode: RenderMode,
    batch: Option<Vec<TrafficEvent>>,
    last_query: Option<HistoryQuery>,
    /// Bumped per load; only the newest load may store its result
    generation: u64,
}

impl HistoryState {
    fn rendered(&self) -> Option<String> {
        self.batch
            .as_deref()
            .map(|events| render::render_batch(events, self.mode))
    }
}

/// Fetches and renders recent traffic.
///
/// The lock only guards the stored batch. Fetches run without it, so
/// render mode switches never wait for a request in flight.
pub struct HistoryLoader {
    source: Arc<dyn CaptureSource>,
    view: Arc<dyn InspectorView>,
    state: Mutex<HistoryState>,
}

impl HistoryLoader {
    pub fn new(source: Arc<dyn CaptureSource>, view: Arc<dyn InspectorView>) -> Self {
        Self {
            source,
            view,
            state: Mutex::new(HistoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch the latest batch for `query` and render it.
    ///
    /// The filter is applied again locally since not every capture service
    /// honours the `type` parameter. On failure the error replaces the
    /// rendered results and nothing is retried. A load overtaken by a newer
    /// one returns its result without storing or rendering it.
    pub async fn load_recent(&self, query: HistoryQuery) -> Result<Vec<TrafficEvent>> {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.last_query = Some(query.clone());
            state.generation
        };

        let fetched = self
            .source
            .fetch_recent(&query.entity, query.filter)
            .await
            .map(|events| {
                events
                    .into_iter()
                    .filter(|event| query.filter.matches(event.kind))
                    .collect::<Vec<_>>()
            });

        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!(entity = %query.entity, "Discarding superseded history load");
            return fetched;
        }

        match fetched {
            Ok(events) => {
                tracing::debug!(
                    entity = %query.entity,
                    "Loaded {} recent events ({:?})",
                    events.len(),
                    query.filter
                );
                state.batch = Some(events.clone());
                if let Some(output) = state.rendered() {
                    self.view.recent_rendered(&output);
                }
                Ok(events)
            }
            Err(err) => {
                tracing::warn!(entity = %query.entity, "Failed to load recent traffic: {}", err);
                state.batch = None;
                self.view.recent_failed(&err);
                Err(err)
            }
        }
    }

    /// Repeat the last query, if there was one
    pub async fn reload(&self) -> Result<Option<Vec<TrafficEvent>>> {
        let query = self.lock().last_query.clone();
        match query {
            Some(query) => self.load_recent(query).await.map(Some),
            None => Ok(None),
        }
    }

    /// Switch presentation and re-render the batch already fetched
    pub fn set_render_mode(&self, mode: RenderMode) {
        let mut state = self.lock();
        state.mode = mode;
        if let Some(output) = state.rendered() {
            self.view.recent_rendered(&output);
        }
    }

    pub fn render_mode(&self) -> RenderMode {
        self.lock().mode
    }

    pub fn last_query(&self) -> Option<HistoryQuery> {
        self.lock().last_query.clone()
    }

    /// The most recently fetched batch
    pub fn batch(&self) -> Option<Vec<TrafficEvent>> {
        self.lock().batch.clone()
    }

    /// Current rendering of the batch
    pub fn rendered(&self) -> Option<String> {
        self.lock().rendered()
    }
}
