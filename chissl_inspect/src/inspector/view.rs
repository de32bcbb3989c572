//! Host view interface
//!
//! The inspector never writes to an output target directly. The host
//! supplies an `InspectorView` that owns the live and recent containers.
//! Callbacks may run on stream tasks and must not call back into the
//! inspector.

use super::buffer::LiveEntry;
use super::stream::ConnectionState;
use crate::error::InspectError;
use chissl_common::EntityRef;

/// Which tab of the inspector is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    Live,
    #[default]
    Recent,
}

pub trait InspectorView: Send + Sync + 'static {
    /// The inspector has been bound to an entity
    fn opened(&self, _entity: &EntityRef) {}

    /// Connection status indicator changed
    fn live_status(&self, state: ConnectionState, detail: Option<&str>);

    /// A live event was appended to the buffer
    fn live_append(&self, entry: &LiveEntry);

    /// The live container was emptied
    fn live_cleared(&self);

    /// The recent container was replaced with freshly rendered content
    fn recent_rendered(&self, output: &str);

    /// Loading recent traffic failed; shown in place of the results
    fn recent_failed(&self, error: &InspectError);

    /// The active tab changed
    fn tab_changed(&self, _tab: ViewMode) {}

    /// Remove every trace of the session from the containers
    fn teardown(&self) {}
}
