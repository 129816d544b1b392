//! Typed server events and their merge classification.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;

use crate::error::{Error, Result};
use crate::model::{
    ActivityEntry, EntityPatch, EntityRef, FeedEntry, Metrics, Mood, Note, ScheduledItem,
    Snapshot, StatusUpdate, Task,
};

use super::envelope::Envelope;

/// Merge operation an event maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeKind {
    Snapshot,
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    ActivityAppended,
    StatusUpdate,
    FeedAppended,
    FeedCleared,
    MetricsUpdated,
    MoodUpdated,
    TasksArchived,
    KeepAlive,
    Unknown,
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeKind::Snapshot => "snapshot",
            MergeKind::EntityCreated => "entity-created",
            MergeKind::EntityUpdated => "entity-updated",
            MergeKind::EntityDeleted => "entity-deleted",
            MergeKind::ActivityAppended => "activity-appended",
            MergeKind::StatusUpdate => "status-update",
            MergeKind::FeedAppended => "feed-appended",
            MergeKind::FeedCleared => "feed-cleared",
            MergeKind::MetricsUpdated => "metrics-updated",
            MergeKind::MoodUpdated => "mood-updated",
            MergeKind::TasksArchived => "tasks-archived",
            MergeKind::KeepAlive => "keep-alive",
            MergeKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ArchiveSummary {
    #[serde(default)]
    pub count: u64,
}

/// Every event the server pushes, closed over the known kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Init(Snapshot),
    TaskCreated(Task),
    TaskUpdated(EntityPatch),
    TaskDeleted(EntityRef),
    AgentUpdated(EntityPatch),
    AgentRemoved(EntityRef),
    NoteAdded(Note),
    NoteUpdated(EntityPatch),
    NoteDeleted(EntityRef),
    ScheduledAdded(ScheduledItem),
    ScheduledDeleted(EntityRef),
    Activity(ActivityEntry),
    StatusUpdate(StatusUpdate),
    MetricsUpdated(Metrics),
    MoodUpdated(Mood),
    Feed(FeedEntry),
    FeedCleared,
    TasksArchived(ArchiveSummary),
    Pong,
    /// Unrecognised `type`; carried for logging and otherwise ignored.
    Unknown(String),
}

fn payload<T: DeserializeOwned>(envelope: Envelope) -> Result<T> {
    let kind = envelope.kind;
    serde_json::from_value(envelope.data)
        .map_err(|e| Error::Decode(format!("bad '{}' payload: {}", kind, e)))
}

impl ServerEvent {
    /// Decode a text frame into an event.
    pub fn decode(text: &str) -> Result<Self> {
        Self::from_envelope(Envelope::parse(text)?)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        let event = match envelope.kind.as_str() {
            "init" => ServerEvent::Init(payload(envelope)?),
            "task_created" => ServerEvent::TaskCreated(payload(envelope)?),
            "task_updated" => ServerEvent::TaskUpdated(payload(envelope)?),
            "task_deleted" => ServerEvent::TaskDeleted(payload(envelope)?),
            "agent_updated" => ServerEvent::AgentUpdated(payload(envelope)?),
            "agent_removed" => ServerEvent::AgentRemoved(payload(envelope)?),
            "note_added" => ServerEvent::NoteAdded(payload(envelope)?),
            "note_updated" => ServerEvent::NoteUpdated(payload(envelope)?),
            "note_deleted" => ServerEvent::NoteDeleted(payload(envelope)?),
            "scheduled_added" => ServerEvent::ScheduledAdded(payload(envelope)?),
            "scheduled_deleted" => ServerEvent::ScheduledDeleted(payload(envelope)?),
            "activity" => ServerEvent::Activity(payload(envelope)?),
            "status_update" => ServerEvent::StatusUpdate(payload(envelope)?),
            "metrics_updated" => ServerEvent::MetricsUpdated(payload(envelope)?),
            "mood_updated" => ServerEvent::MoodUpdated(payload(envelope)?),
            "feed" => ServerEvent::Feed(payload(envelope)?),
            "feed_cleared" => ServerEvent::FeedCleared,
            "tasks_archived" => {
                if envelope.data.is_null() {
                    ServerEvent::TasksArchived(ArchiveSummary { count: 0 })
                } else {
                    ServerEvent::TasksArchived(payload(envelope)?)
                }
            }
            "pong" => ServerEvent::Pong,
            _ => ServerEvent::Unknown(envelope.kind),
        };
        Ok(event)
    }

    pub fn kind(&self) -> MergeKind {
        match self {
            ServerEvent::Init(_) => MergeKind::Snapshot,
            ServerEvent::TaskCreated(_)
            | ServerEvent::NoteAdded(_)
            | ServerEvent::ScheduledAdded(_) => MergeKind::EntityCreated,
            ServerEvent::TaskUpdated(_)
            | ServerEvent::AgentUpdated(_)
            | ServerEvent::NoteUpdated(_) => MergeKind::EntityUpdated,
            ServerEvent::TaskDeleted(_)
            | ServerEvent::AgentRemoved(_)
            | ServerEvent::NoteDeleted(_)
            | ServerEvent::ScheduledDeleted(_) => MergeKind::EntityDeleted,
            ServerEvent::Activity(_) => MergeKind::ActivityAppended,
            ServerEvent::StatusUpdate(_) => MergeKind::StatusUpdate,
            ServerEvent::MetricsUpdated(_) => MergeKind::MetricsUpdated,
            ServerEvent::MoodUpdated(_) => MergeKind::MoodUpdated,
            ServerEvent::Feed(_) => MergeKind::FeedAppended,
            ServerEvent::FeedCleared => MergeKind::FeedCleared,
            ServerEvent::TasksArchived(_) => MergeKind::TasksArchived,
            ServerEvent::Pong => MergeKind::KeepAlive,
            ServerEvent::Unknown(_) => MergeKind::Unknown,
        }
    }
}
