//! Entity store: the client's authoritative copy of server state.

pub mod collection;
pub mod entity_store;
pub mod fence;

pub use collection::Collection;
pub use entity_store::{EntityStore, TimelineItem, DEFAULT_FEED_CAP, DEFAULT_STATUS_CAP};
pub use fence::{CollectionKind, PullFence};
