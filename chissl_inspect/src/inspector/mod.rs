//! Traffic inspector: live stream, recent history and the session tying
//! them to a host view

mod buffer;
mod history;
mod host;
pub mod render;
mod session;
mod sse;
mod stream;
mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{LiveBuffer, LiveEntry, DEFAULT_LIVE_CAPACITY};
pub use history::{HistoryLoader, HistoryQuery};
pub use host::InspectorHost;
pub use render::RenderMode;
pub use session::InspectorSession;
pub use sse::{SseDecoder, SseMessage};
pub use stream::{ConnectionState, StreamClient};
pub use view::{InspectorView, ViewMode};
