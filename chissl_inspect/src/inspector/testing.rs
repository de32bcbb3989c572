//! In-process fakes for inspector tests

use super::buffer::LiveEntry;
use super::stream::ConnectionState;
use super::view::{InspectorView, ViewMode};
use crate::api::{ByteStream, CaptureSource};
use crate::error::{InspectError, Result};
use bytes::Bytes;
use chissl_common::{EntityRef, FilterKind, TrafficEvent};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Poll `cond` until it holds, failing the test after five seconds
pub(crate) async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within 5s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeState {
    senders: Vec<Option<mpsc::UnboundedSender<Result<Bytes>>>>,
    refuse: Option<String>,
    recent: Vec<TrafficEvent>,
    fail_recent: Option<u16>,
    fetches: Vec<(EntityRef, FilterKind)>,
    delays: VecDeque<Duration>,
}

/// Capture source whose streams are fed by the test
#[derive(Default)]
pub(crate) struct FakeSource {
    state: Mutex<FakeState>,
    open: Arc<AtomicUsize>,
    max_open: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose `recent` endpoint returns `events` regardless of filter
    pub fn with_recent(events: Vec<TrafficEvent>) -> Self {
        let source = Self::default();
        source.state.lock().unwrap().recent = events;
        source
    }

    pub fn send(&self, connection: usize, text: &str) {
        let state = self.state.lock().unwrap();
        if let Some(Some(tx)) = state.senders.get(connection) {
            let _ = tx.send(Ok(Bytes::from(text.to_string())));
        }
    }

    pub fn fail(&self, connection: usize, reason: &str) {
        let state = self.state.lock().unwrap();
        if let Some(Some(tx)) = state.senders.get(connection) {
            let _ = tx.send(Err(InspectError::Connection(reason.to_string())));
        }
    }

    /// End a stream cleanly
    pub fn end(&self, connection: usize) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.senders.get_mut(connection) {
            slot.take();
        }
    }

    pub fn refuse_next(&self, reason: &str) {
        self.state.lock().unwrap().refuse = Some(reason.to_string());
    }

    pub fn fail_recent(&self, status: Option<u16>) {
        self.state.lock().unwrap().fail_recent = status;
    }

    pub fn set_recent(&self, events: Vec<TrafficEvent>) {
        self.state.lock().unwrap().recent = events;
    }

    /// Hold the next `fetch_recent` answer back for `delay`
    pub fn delay_next_recent(&self, delay: Duration) {
        self.state.lock().unwrap().delays.push_back(delay);
    }

    /// Number of streams ever opened
    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().senders.len()
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open_connections(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> Vec<(EntityRef, FilterKind)> {
        self.state.lock().unwrap().fetches.clone()
    }
}

impl CaptureSource for FakeSource {
    fn open_stream(&self, _entity: &EntityRef) -> BoxFuture<'static, Result<ByteStream>> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.refuse.take() {
            return Box::pin(async move { Err(InspectError::Connection(reason)) });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.senders.push(Some(tx));
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);
        let guard = OpenGuard(self.open.clone());

        Box::pin(async move {
            let stream = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
                rx.recv().await.map(|item| (item, (rx, guard)))
            });
            Ok(stream.boxed())
        })
    }

    fn fetch_recent(
        &self,
        entity: &EntityRef,
        filter: FilterKind,
    ) -> BoxFuture<'static, Result<Vec<TrafficEvent>>> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push((entity.clone(), filter));
        let result = match state.fail_recent {
            Some(status) => Err(InspectError::Status(status)),
            None => Ok(state.recent.clone()),
        };
        let delay = state.delays.pop_front();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ViewCall {
    Opened(String),
    Status(ConnectionState, Option<String>),
    Append(String),
    LiveCleared,
    Recent(String),
    RecentFailed(String),
    Tab(ViewMode),
    Teardown,
}

/// View that records every call it receives
#[derive(Default)]
pub(crate) struct RecordingView {
    calls: Mutex<Vec<ViewCall>>,
}

impl RecordingView {
    fn record(&self, call: ViewCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<ViewCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<ConnectionState> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ViewCall::Status(state, _) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn appended(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ViewCall::Append(_)))
            .count()
    }

    /// Every rendering of the recent container, in order
    pub fn recent_outputs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ViewCall::Recent(output) => Some(output),
                _ => None,
            })
            .collect()
    }
}

impl InspectorView for RecordingView {
    fn opened(&self, entity: &EntityRef) {
        self.record(ViewCall::Opened(entity.to_string()));
    }

    fn live_status(&self, state: ConnectionState, detail: Option<&str>) {
        self.record(ViewCall::Status(state, detail.map(str::to_string)));
    }

    fn live_append(&self, entry: &LiveEntry) {
        self.record(ViewCall::Append(entry.rendered.clone()));
    }

    fn live_cleared(&self) {
        self.record(ViewCall::LiveCleared);
    }

    fn recent_rendered(&self, output: &str) {
        self.record(ViewCall::Recent(output.to_string()));
    }

    fn recent_failed(&self, error: &InspectError) {
        self.record(ViewCall::RecentFailed(error.to_string()));
    }

    fn tab_changed(&self, tab: ViewMode) {
        self.record(ViewCall::Tab(tab));
    }

    fn teardown(&self) {
        self.record(ViewCall::Teardown);
    }
}
