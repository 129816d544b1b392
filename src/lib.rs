//! dashsync library root.

pub mod api;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod model;
pub mod presence;
pub mod protocol;
pub mod store;
pub mod sync;

pub use api::{DashboardApi, HttpApi, TaskDraft};
pub use config::{load_settings, load_settings_or_default, Settings};
pub use dispatch::{Dispatcher, Notice, Outcome, PullBatch, RenderFrame, RenderReason, RenderTrigger};
pub use error::{Error, Result};
pub use presence::{PresenceTracker, PresenceView};
pub use protocol::{MergeKind, ServerEvent};
pub use store::EntityStore;
pub use sync::{Command, ConnectionState, SyncClient, SyncHandle};
