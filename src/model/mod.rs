//! Dashboard data model.

pub mod entities;
pub mod merge;
pub mod status;

pub use entities::{
    parse_timestamp, ActivityEntry, Agent, FeedEntry, Keyed, Metrics, Mood, Note, Quota,
    ScheduledItem, Snapshot, StatusUpdate, Task, Timestamp, TokenUsage,
};
pub use merge::{merge_fields, EntityPatch, EntityRef};
pub use status::{AgentStatus, Priority, TaskStatus};
