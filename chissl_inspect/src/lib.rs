//! chissl inspect - Traffic inspector and dashboard refresh for chissl
//!
//! The library holds the inspector core (live stream, recent history,
//! sessions), the refresh scheduler and the capture service client. The
//! `chissl-inspect` binary wires them to the terminal.

pub mod api;
pub mod config;
pub mod error;
pub mod inspector;
pub mod scheduler;
pub mod stats;
pub mod terminal;

pub use api::{CaptureApi, CaptureSource};
pub use error::{InspectError, Result};
pub use scheduler::RefreshScheduler;
