//! Owner of the inspector's view containers
//!
//! Only one session may write into a view at a time. Opening a new
//! entity fully closes the previous occupant before the new session binds.

use super::session::InspectorSession;
use super::view::InspectorView;
use crate::api::CaptureSource;
use crate::scheduler::RefreshScheduler;
use chissl_common::EntityRef;
use std::sync::Arc;

pub struct InspectorHost {
    source: Arc<dyn CaptureSource>,
    view: Arc<dyn InspectorView>,
    scheduler: RefreshScheduler,
    live_capacity: usize,
    session: Option<InspectorSession>,
}

impl InspectorHost {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        view: Arc<dyn InspectorView>,
        scheduler: RefreshScheduler,
        live_capacity: usize,
    ) -> Self {
        Self {
            source,
            view,
            scheduler,
            live_capacity,
            session: None,
        }
    }

    /// Open an inspector for `entity`, closing the current one first
    pub async fn open(&mut self, entity: EntityRef) -> &mut InspectorSession {
        self.close().await;

        let session = InspectorSession::open(
            entity,
            self.source.clone(),
            self.view.clone(),
            self.scheduler.clone(),
            self.live_capacity,
        )
        .await;
        self.session.insert(session)
    }

    /// Close the current session, if any
    pub async fn close(&mut self) {
        if let Some(previous) = self.session.take() {
            previous.close().await;
        }
    }

    pub fn session(&self) -> Option<&InspectorSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut InspectorSession> {
        self.session.as_mut()
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }
}
