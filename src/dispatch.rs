//! Event dispatch: routes server events onto the entity store and notifies
//! the render trigger after every effective mutation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::config::Limits;
use crate::error::Result;
use crate::model::{Agent, FeedEntry, Keyed, Metrics, Mood, Note, ScheduledItem, Task};
use crate::presence::{PresenceTracker, PresenceView};
use crate::protocol::{MergeKind, ServerEvent};
use crate::store::{CollectionKind, EntityStore, PullFence};
use crate::sync::ConnectionState;

/// Result of applying one event to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The store changed.
    Applied(MergeKind),
    /// A known event that left the store as it was.
    NoOp(MergeKind),
    /// Tasks changed server-side in bulk; pull them again.
    ResyncTasks,
    /// Keep-alive replies, unknown types and undecodable frames.
    Ignored,
}

impl Outcome {
    pub fn changed(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// Apply exactly one merge operation for `event`.
///
/// Only a malformed field patch can fail; everything else degrades to a
/// no-op.
pub fn apply(store: &mut EntityStore, event: ServerEvent) -> Result<Outcome> {
    let kind = event.kind();
    let changed = match event {
        ServerEvent::Init(snapshot) => {
            store.apply_snapshot(snapshot);
            true
        }
        ServerEvent::TaskCreated(task) => store.tasks_mut().insert_if_absent(task),
        ServerEvent::NoteAdded(note) => store.notes_mut().insert_if_absent(note),
        ServerEvent::ScheduledAdded(item) => store.scheduled_mut().insert_if_absent(item),
        ServerEvent::TaskUpdated(patch) => store.tasks_mut().merge(&patch.id, &patch.fields)?,
        ServerEvent::AgentUpdated(patch) => store.agents_mut().merge(&patch.id, &patch.fields)?,
        ServerEvent::NoteUpdated(patch) => store.notes_mut().merge(&patch.id, &patch.fields)?,
        ServerEvent::TaskDeleted(target) => store.tasks_mut().remove(&target.id),
        ServerEvent::AgentRemoved(target) => store.agents_mut().remove(&target.id),
        ServerEvent::NoteDeleted(target) => store.notes_mut().remove(&target.id),
        ServerEvent::ScheduledDeleted(target) => store.scheduled_mut().remove(&target.id),
        ServerEvent::Activity(entry) => {
            store.append_activity(entry);
            true
        }
        ServerEvent::StatusUpdate(entry) => {
            store.push_status(entry);
            true
        }
        ServerEvent::Feed(entry) => {
            store.push_feed(entry);
            true
        }
        ServerEvent::FeedCleared => store.clear_feed(),
        ServerEvent::MetricsUpdated(metrics) => store.set_metrics(metrics),
        ServerEvent::MoodUpdated(mood) => store.set_mood(mood),
        ServerEvent::TasksArchived(summary) => {
            tracing::debug!("{} tasks archived server-side", summary.count);
            return Ok(Outcome::ResyncTasks);
        }
        ServerEvent::Pong => return Ok(Outcome::Ignored),
        ServerEvent::Unknown(kind) => {
            tracing::debug!("Ignoring unknown event type '{}'", kind);
            return Ok(Outcome::Ignored);
        }
    };

    Ok(if changed {
        Outcome::Applied(kind)
    } else {
        Outcome::NoOp(kind)
    })
}

/// One pulled collection, ready to merge.
#[derive(Debug, Clone, PartialEq)]
pub enum PullBatch {
    Agents(Vec<Agent>),
    Tasks(Vec<Task>),
    Notes(Vec<Note>),
    Scheduled(Vec<ScheduledItem>),
    Metrics(Metrics),
    Mood(Mood),
    Feed(Vec<FeedEntry>),
}

impl PullBatch {
    pub fn label(&self) -> &'static str {
        match self {
            PullBatch::Agents(_) => "agents",
            PullBatch::Tasks(_) => "tasks",
            PullBatch::Notes(_) => "notes",
            PullBatch::Scheduled(_) => "scheduled",
            PullBatch::Metrics(_) => "metrics",
            PullBatch::Mood(_) => "mood",
            PullBatch::Feed(_) => "feed",
        }
    }

    pub fn kind(&self) -> CollectionKind {
        match self {
            PullBatch::Agents(_) => CollectionKind::Agents,
            PullBatch::Tasks(_) => CollectionKind::Tasks,
            PullBatch::Notes(_) => CollectionKind::Notes,
            PullBatch::Scheduled(_) => CollectionKind::Scheduled,
            PullBatch::Metrics(_) => CollectionKind::Metrics,
            PullBatch::Mood(_) => CollectionKind::Mood,
            PullBatch::Feed(_) => CollectionKind::Feed,
        }
    }
}

/// Record what `event` is about to change so older in-flight pulls cannot
/// undo it.
fn fence_event(fence: &mut PullFence, event: &ServerEvent) {
    match event {
        ServerEvent::Init(_) => {
            fence.reset(CollectionKind::Tasks);
            fence.reset(CollectionKind::Agents);
        }
        ServerEvent::TaskCreated(task) => fence.touch(CollectionKind::Tasks, task.id()),
        ServerEvent::TaskUpdated(patch) => fence.touch(CollectionKind::Tasks, &patch.id),
        ServerEvent::TaskDeleted(target) => fence.touch(CollectionKind::Tasks, &target.id),
        ServerEvent::AgentUpdated(patch) => fence.touch(CollectionKind::Agents, &patch.id),
        ServerEvent::AgentRemoved(target) => fence.touch(CollectionKind::Agents, &target.id),
        ServerEvent::NoteAdded(note) => fence.touch(CollectionKind::Notes, note.id()),
        ServerEvent::NoteUpdated(patch) => fence.touch(CollectionKind::Notes, &patch.id),
        ServerEvent::NoteDeleted(target) => fence.touch(CollectionKind::Notes, &target.id),
        ServerEvent::ScheduledAdded(item) => fence.touch(CollectionKind::Scheduled, item.id()),
        ServerEvent::ScheduledDeleted(target) => {
            fence.touch(CollectionKind::Scheduled, &target.id)
        }
        ServerEvent::FeedCleared => fence.reset(CollectionKind::Feed),
        ServerEvent::MetricsUpdated(_) => fence.reset(CollectionKind::Metrics),
        ServerEvent::MoodUpdated(_) => fence.reset(CollectionKind::Mood),
        _ => {}
    }
}

/// Drop pulled records a push has touched since the pull was issued.
fn fresh<T: Keyed>(
    fence: &PullFence,
    kind: CollectionKind,
    items: Vec<T>,
    issued: u64,
) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| !fence.superseded(kind, item.id(), issued))
        .collect()
}

/// Why a render pass happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderReason {
    Merge(MergeKind),
    Pull,
    Tick,
    Connection,
}

impl fmt::Display for RenderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderReason::Merge(kind) => write!(f, "merge:{}", kind),
            RenderReason::Pull => f.write_str("pull"),
            RenderReason::Tick => f.write_str("tick"),
            RenderReason::Connection => f.write_str("connection"),
        }
    }
}

/// Everything a renderer sees on one pass.
pub struct RenderFrame<'a> {
    pub reason: RenderReason,
    pub store: &'a EntityStore,
    pub presence: &'a PresenceView,
    pub connection: ConnectionState,
    pub at: DateTime<Utc>,
}

/// User-visible message about a failed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub operation: String,
    pub message: String,
}

impl Notice {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

/// Implemented by the embedding application to redraw after changes.
pub trait RenderTrigger: Send {
    fn render(&mut self, frame: &RenderFrame<'_>);

    fn notice(&mut self, notice: &Notice) {
        tracing::warn!("{}", notice);
    }
}

/// Owns the store and derived presence state; the single mutation point.
pub struct Dispatcher<R> {
    store: EntityStore,
    fence: PullFence,
    presence: PresenceTracker,
    view: PresenceView,
    connection: ConnectionState,
    render: R,
}

impl<R: RenderTrigger> Dispatcher<R> {
    pub fn new(limits: &Limits, render: R) -> Self {
        Self {
            store: EntityStore::new(limits),
            fence: PullFence::new(),
            presence: PresenceTracker::new(limits),
            view: PresenceView::default(),
            connection: ConnectionState::Disconnected,
            render,
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn presence(&self) -> &PresenceView {
        &self.view
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn render_trigger(&self) -> &R {
        &self.render
    }

    pub fn into_render_trigger(self) -> R {
        self.render
    }

    /// Drop all local and derived state.
    pub fn reset(&mut self) {
        self.store.reset();
        self.fence.clear();
        self.presence.reset();
        self.view = PresenceView::default();
    }

    /// Decode and apply one text frame. Undecodable frames are dropped.
    pub fn handle_text(&mut self, text: &str, now: DateTime<Utc>) -> Outcome {
        match ServerEvent::decode(text) {
            Ok(event) => self.handle_event(event, now),
            Err(e) => {
                tracing::warn!("Dropping frame: {}", e);
                Outcome::Ignored
            }
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent, now: DateTime<Utc>) -> Outcome {
        let kind = event.kind();
        fence_event(&mut self.fence, &event);
        let outcome = match apply(&mut self.store, event) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Dropping {} event: {}", kind, e);
                return Outcome::Ignored;
            }
        };
        if let Outcome::Applied(kind) = outcome {
            self.render_pass(RenderReason::Merge(kind), now);
        }
        outcome
    }

    /// Stamp for a pull about to be issued; hand it back to
    /// [`merge_pull`](Self::merge_pull) with the result.
    pub fn issue_pull(&mut self) -> u64 {
        self.fence.issue()
    }

    /// Merge a pulled collection. Records are upserted, never removed.
    ///
    /// A result older than one already merged for the same collection is
    /// dropped, as is one issued before a wholesale push. Records a push
    /// touched after `issued` keep their pushed state.
    pub fn merge_pull(&mut self, batch: PullBatch, issued: u64, now: DateTime<Utc>) -> bool {
        let label = batch.label();
        let kind = batch.kind();
        if !self.fence.admit(kind, issued) {
            tracing::debug!("Discarding stale {} pull", label);
            return false;
        }
        let fence = &self.fence;
        let changed = match batch {
            PullBatch::Agents(agents) => {
                let agents = fresh(fence, kind, agents, issued);
                self.store.agents_mut().upsert_all(agents)
            }
            PullBatch::Tasks(tasks) => {
                let tasks = fresh(fence, kind, tasks, issued);
                self.store.tasks_mut().upsert_all(tasks)
            }
            PullBatch::Notes(notes) => {
                let notes = fresh(fence, kind, notes, issued);
                self.store.notes_mut().upsert_all(notes)
            }
            PullBatch::Scheduled(items) => {
                let items = fresh(fence, kind, items, issued);
                self.store.scheduled_mut().upsert_all(items)
            }
            PullBatch::Metrics(metrics) => self.store.set_metrics(metrics),
            PullBatch::Mood(mood) => self.store.set_mood(mood),
            PullBatch::Feed(entries) => self.store.merge_feed(entries),
        };
        if changed {
            tracing::trace!("pulled {} changed the store", label);
            self.render_pass(RenderReason::Pull, now);
        }
        changed
    }

    /// Recompute elapsed labels and fades without touching the store.
    pub fn render_tick(&mut self, now: DateTime<Utc>) {
        self.render_pass(RenderReason::Tick, now);
    }

    pub fn set_connection(&mut self, state: ConnectionState, now: DateTime<Utc>) {
        if self.connection == state {
            return;
        }
        self.connection = state;
        self.render_pass(RenderReason::Connection, now);
    }

    pub fn notice(&mut self, notice: Notice) {
        self.render.notice(&notice);
    }

    fn render_pass(&mut self, reason: RenderReason, now: DateTime<Utc>) {
        self.view = self.presence.observe(self.store.agents(), now);
        let frame = RenderFrame {
            reason,
            store: &self.store,
            presence: &self.view,
            connection: self.connection,
            at: now,
        };
        self.render.render(&frame);
    }
}
