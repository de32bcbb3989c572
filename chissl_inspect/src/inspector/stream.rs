//! Live traffic stream client
//!
//! Owns at most one push-stream connection. Opening a new connection first
//! cancels the running one and waits until its transport has been dropped.

use super::buffer::{LiveBuffer, LiveEntry};
use super::render;
use super::sse::{SseDecoder, SseMessage};
use super::view::InspectorView;
use crate::api::{ByteStream, CaptureSource};
use crate::error::Result;
use chissl_common::{EntityRef, TrafficEvent};
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Live connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Streaming,
    Error,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether a connection is being opened or is open
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Streaming)
    }
}

/// State shared between the client and its stream task
struct LiveShared {
    /// Bumped whenever a connection is superseded; stale tasks compare
    /// against it before touching anything
    generation: u64,
    state: ConnectionState,
    buffer: LiveBuffer,
    entity: Option<EntityRef>,
    last_error: Option<String>,
    /// `id:` of the last event received on the current connection
    last_event_id: Option<String>,
    dropped: u64,
}

type Shared = Arc<Mutex<LiveShared>>;

fn lock(shared: &Shared) -> MutexGuard<'_, LiveShared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct StreamClient {
    source: Arc<dyn CaptureSource>,
    view: Arc<dyn InspectorView>,
    shared: Shared,
    task: Option<JoinHandle<()>>,
}

impl StreamClient {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        view: Arc<dyn InspectorView>,
        capacity: usize,
    ) -> Self {
        Self {
            source,
            view,
            shared: Arc::new(Mutex::new(LiveShared {
                generation: 0,
                state: ConnectionState::Idle,
                buffer: LiveBuffer::new(capacity),
                entity: None,
                last_error: None,
                last_event_id: None,
                dropped: 0,
            })),
            task: None,
        }
    }

    /// Open the live stream for `entity`, closing any connection first
    pub async fn start_live(&mut self, entity: EntityRef) {
        if self.task.is_some() {
            tracing::debug!(entity = %entity, "Closing previous live stream before reconnecting");
            self.close_connection().await;
        }

        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.state = ConnectionState::Connecting;
            shared.buffer.clear();
            shared.entity = Some(entity.clone());
            shared.last_error = None;
            shared.last_event_id = None;
            self.view.live_cleared();
            self.view.live_status(ConnectionState::Connecting, None);
            shared.generation
        };

        let connect = self.source.open_stream(&entity);
        let task = StreamTask {
            shared: self.shared.clone(),
            view: self.view.clone(),
            generation,
            entity,
        };
        self.task = Some(tokio::spawn(task.run(connect)));
    }

    /// Close the live stream and reset to `Idle`
    pub async fn stop_live(&mut self) {
        self.close_connection().await;

        let mut shared = lock(&self.shared);
        if let Some(entity) = shared.entity.take() {
            tracing::debug!(entity = %entity, "Live stream stopped");
        }
        shared.state = ConnectionState::Idle;
        self.view.live_status(ConnectionState::Idle, Some("Stopped"));
    }

    /// Empty the live buffer without touching the connection
    pub fn clear_live(&self) {
        let mut shared = lock(&self.shared);
        shared.buffer.clear();
        self.view.live_cleared();
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// Entity the current connection is bound to
    pub fn entity(&self) -> Option<EntityRef> {
        lock(&self.shared).entity.clone()
    }

    /// Retained live entries, oldest first
    pub fn entries(&self) -> Vec<LiveEntry> {
        lock(&self.shared).buffer.snapshot()
    }

    /// Message of the last connection failure
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared).last_error.clone()
    }

    /// Id of the last event the server tagged with one
    pub fn last_event_id(&self) -> Option<String> {
        lock(&self.shared).last_event_id.clone()
    }

    /// Number of inbound events dropped because they failed to parse
    pub fn dropped_events(&self) -> u64 {
        lock(&self.shared).dropped
    }

    /// Supersede the running task and wait for its transport to be released
    async fn close_connection(&mut self) {
        lock(&self.shared).generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        lock(&self.shared).generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Body of the spawned stream task
struct StreamTask {
    shared: Shared,
    view: Arc<dyn InspectorView>,
    generation: u64,
    entity: EntityRef,
}

impl StreamTask {
    /// Lock shared state if this task still owns the connection
    fn current(&self) -> Option<MutexGuard<'_, LiveShared>> {
        let shared = lock(&self.shared);
        (shared.generation == self.generation).then_some(shared)
    }

    async fn run(self, connect: BoxFuture<'static, Result<ByteStream>>) {
        let mut stream = match connect.await {
            Ok(stream) => stream,
            Err(err) => {
                self.fail(err.to_string());
                return;
            }
        };

        match self.current() {
            Some(mut shared) => {
                shared.state = ConnectionState::Streaming;
                self.view.live_status(ConnectionState::Streaming, None);
            }
            None => return,
        }
        tracing::debug!(entity = %self.entity, "Live stream connected");

        let mut decoder = SseDecoder::new();
        loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    for message in decoder.feed(&chunk) {
                        self.handle_message(message);
                    }
                }
                Some(Err(err)) => {
                    self.fail(err.to_string());
                    return;
                }
                None => {
                    self.closed();
                    return;
                }
            }
        }
    }

    fn handle_message(&self, message: SseMessage) {
        if let Some(name) = message.event.as_deref().filter(|name| *name != "message") {
            tracing::debug!(entity = %self.entity, "Ignoring '{}' event", name);
            return;
        }

        let Some(mut shared) = self.current() else {
            return;
        };
        if message.id.is_some() {
            shared.last_event_id = message.id.clone();
        }

        match TrafficEvent::from_json(&message.data) {
            Ok(event) => {
                let received_at = Utc::now();
                let entry = LiveEntry {
                    rendered: render::render_live(&event, received_at),
                    received_at,
                    event,
                };
                self.view.live_append(&entry);
                shared.buffer.push(entry);
            }
            Err(err) => {
                shared.dropped += 1;
                tracing::warn!(
                    entity = %self.entity,
                    id = ?message.id,
                    "Dropping malformed live event: {}",
                    err
                );
            }
        }
    }

    fn fail(&self, message: String) {
        let Some(mut shared) = self.current() else {
            return;
        };
        tracing::error!(entity = %self.entity, "Live stream failed: {}", message);
        shared.state = ConnectionState::Error;
        self.view.live_status(ConnectionState::Error, Some(&message));
        shared.last_error = Some(message);

        // No automatic reconnect; the user restarts explicitly
        shared.state = ConnectionState::Idle;
        shared.entity = None;
        self.view.live_status(ConnectionState::Idle, None);
    }

    fn closed(&self) {
        let Some(mut shared) = self.current() else {
            return;
        };
        tracing::debug!(
            entity = %self.entity,
            last_event_id = ?shared.last_event_id,
            "Live stream closed by server"
        );
        shared.state = ConnectionState::Closed;
        self.view.live_status(ConnectionState::Closed, None);

        shared.state = ConnectionState::Idle;
        shared.entity = None;
        self.view.live_status(ConnectionState::Idle, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::testing::{wait_until, FakeSource, RecordingView, ViewCall};
    use chissl_common::EntityKind;

    fn client(source: &Arc<FakeSource>, view: &Arc<RecordingView>) -> StreamClient {
        StreamClient::new(source.clone(), view.clone(), 100)
    }

    fn tunnel() -> EntityRef {
        EntityRef::new(EntityKind::Tunnel, "t-1")
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped_and_stream_continues() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;

        source.send(0, ": heartbeat\n\n");
        source.send(0, "data: {\"type\":\"request\",\"method\":\"GET\",\"url\":\"/a\"}\n\n");
        source.send(0, "data: {not json\n\n");
        source.send(0, "data: {\"type\":\"response\",\"body\":\"done\"}\n\n");

        wait_until(|| live.entries().len() == 2).await;

        let entries = live.entries();
        assert_eq!(entries[0].event.url.as_deref(), Some("/a"));
        assert_eq!(entries[1].event.body.as_deref(), Some("done"));
        assert_eq!(live.state(), ConnectionState::Streaming);
        assert_eq!(live.dropped_events(), 1);
        assert_eq!(view.appended(), 2);
    }

    #[tokio::test]
    async fn test_restart_closes_previous_connection_first() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;
        assert_eq!(source.open_connections(), 1);

        live.start_live(EntityRef::new(EntityKind::Listener, "l-1")).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;

        assert_eq!(source.opened(), 2);
        assert_eq!(source.open_connections(), 1);
        assert_eq!(source.max_open_connections(), 1);
        assert_eq!(live.entity().map(|e| e.kind), Some(EntityKind::Listener));

        // Late data on the superseded connection never reaches the buffer
        source.send(0, "data: {\"type\":\"request\"}\n\n");
        source.send(1, "data: {\"type\":\"response\"}\n\n");
        wait_until(|| live.entries().len() == 1).await;
        assert_eq!(live.entries()[0].event.kind, chissl_common::EventKind::Response);
    }

    #[tokio::test]
    async fn test_transport_error_goes_idle_without_reconnect() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;

        source.fail(0, "connection reset");
        wait_until(|| live.state() == ConnectionState::Idle).await;

        assert!(live.last_error().unwrap().contains("connection reset"));
        assert_eq!(source.opened(), 1);
        assert_eq!(
            view.statuses(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Streaming,
                ConnectionState::Error,
                ConnectionState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error() {
        let source = Arc::new(FakeSource::new());
        source.refuse_next("HTTP 403");
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Idle).await;

        assert!(view.statuses().contains(&ConnectionState::Error));
        assert!(live.last_error().unwrap().contains("HTTP 403"));
    }

    #[tokio::test]
    async fn test_server_close_then_idle() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;

        source.end(0);
        wait_until(|| live.state() == ConnectionState::Idle).await;
        assert!(view.statuses().contains(&ConnectionState::Closed));
        assert!(live.last_error().is_none());
    }

    #[tokio::test]
    async fn test_stop_and_clear() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;
        source.send(0, "data: {\"type\":\"request\"}\n\n");
        wait_until(|| live.entries().len() == 1).await;

        live.clear_live();
        assert!(live.entries().is_empty());
        assert_eq!(live.state(), ConnectionState::Streaming);

        live.stop_live().await;
        assert_eq!(live.state(), ConnectionState::Idle);
        assert_eq!(source.open_connections(), 0);
        assert!(view.calls().contains(&ViewCall::Status(
            ConnectionState::Idle,
            Some("Stopped".to_string())
        )));
    }

    #[tokio::test]
    async fn test_drop_releases_connection() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;

        drop(live);
        wait_until(|| source.open_connections() == 0).await;
    }

    #[tokio::test]
    async fn test_buffer_is_bounded() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = StreamClient::new(source.clone(), view.clone(), 3);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;
        for i in 0..5 {
            source.send(0, &format!("data: {{\"type\":\"request\",\"url\":\"/{}\"}}\n\n", i));
        }
        wait_until(|| view.appended() == 5).await;

        let urls: Vec<String> = live
            .entries()
            .into_iter()
            .filter_map(|e| e.event.url)
            .collect();
        assert_eq!(urls, vec!["/2", "/3", "/4"]);
    }

    #[tokio::test]
    async fn test_restart_clears_previous_buffer() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.start_live(tunnel()).await;
        wait_until(|| live.state() == ConnectionState::Streaming).await;
        source.send(0, "id: 41\ndata: {\"type\":\"request\",\"url\":\"/old\"}\n\n");
        wait_until(|| live.entries().len() == 1).await;
        assert_eq!(live.last_event_id().as_deref(), Some("41"));

        let cleared_before = view
            .calls()
            .iter()
            .filter(|call| **call == ViewCall::LiveCleared)
            .count();
        live.start_live(EntityRef::new(EntityKind::Listener, "l-2")).await;

        assert!(live.entries().is_empty());
        assert!(live.last_event_id().is_none());
        let cleared_after = view
            .calls()
            .iter()
            .filter(|call| **call == ViewCall::LiveCleared)
            .count();
        assert_eq!(cleared_after, cleared_before + 1);

        wait_until(|| live.state() == ConnectionState::Streaming).await;
        source.send(1, "id: 1\ndata: {\"type\":\"response\",\"body\":\"new\"}\n\n");
        wait_until(|| live.entries().len() == 1).await;
        assert_eq!(live.entries()[0].event.body.as_deref(), Some("new"));
        assert_eq!(live.last_event_id().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_stop_without_start_stays_idle() {
        let source = Arc::new(FakeSource::new());
        let view = Arc::new(RecordingView::default());
        let mut live = client(&source, &view);

        live.stop_live().await;

        assert_eq!(live.state(), ConnectionState::Idle);
        assert!(live.entity().is_none());
        assert!(live.last_error().is_none());
        assert_eq!(source.opened(), 0);
        assert_eq!(view.statuses(), vec![ConnectionState::Idle]);
    }
}
