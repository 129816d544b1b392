//! The authoritative in-memory model of the dashboard.
//!
//! Pure data: no I/O, no timers. Every mutator reports whether it changed
//! anything so callers can skip redundant render passes.

use serde::Serialize;
use std::collections::VecDeque;

use crate::config::Limits;
use crate::model::{
    ActivityEntry, Agent, FeedEntry, Metrics, Mood, Note, ScheduledItem, Snapshot, StatusUpdate,
    Task, Timestamp,
};

use super::collection::Collection;

pub const DEFAULT_STATUS_CAP: usize = 200;
pub const DEFAULT_FEED_CAP: usize = 500;

/// Entry with its arrival sequence number.
#[derive(Debug, Clone, PartialEq)]
struct Arrived<T> {
    seq: u64,
    entry: T,
}

/// One line of the combined activity/status timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", content = "entry", rename_all = "snake_case")]
pub enum TimelineItem<'a> {
    Activity(&'a ActivityEntry),
    Status(&'a StatusUpdate),
}

impl TimelineItem<'_> {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            TimelineItem::Activity(entry) => entry.timestamp,
            TimelineItem::Status(entry) => entry.timestamp,
        }
    }
}

/// Typed, bounded collections for every entity kind.
#[derive(Debug, Clone)]
pub struct EntityStore {
    tasks: Collection<Task>,
    agents: Collection<Agent>,
    notes: Collection<Note>,
    scheduled: Collection<ScheduledItem>,
    activity: Vec<Arrived<ActivityEntry>>,
    status_updates: VecDeque<Arrived<StatusUpdate>>,
    feed: VecDeque<FeedEntry>,
    metrics: Option<Metrics>,
    mood: Option<Mood>,
    status_cap: usize,
    feed_cap: usize,
    next_seq: u64,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::with_caps(DEFAULT_STATUS_CAP, DEFAULT_FEED_CAP)
    }
}

impl EntityStore {
    pub fn new(limits: &Limits) -> Self {
        Self::with_caps(limits.status_cap, limits.feed_cap)
    }

    pub fn with_caps(status_cap: usize, feed_cap: usize) -> Self {
        Self {
            tasks: Collection::new(),
            agents: Collection::new(),
            notes: Collection::new(),
            scheduled: Collection::new(),
            activity: Vec::new(),
            status_updates: VecDeque::new(),
            feed: VecDeque::new(),
            metrics: None,
            mood: None,
            status_cap: status_cap.max(1),
            feed_cap: feed_cap.max(1),
            next_seq: 0,
        }
    }

    /// Drop every collection, keeping the caps.
    pub fn reset(&mut self) {
        *self = Self::with_caps(self.status_cap, self.feed_cap);
    }

    pub fn tasks(&self) -> &Collection<Task> {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut Collection<Task> {
        &mut self.tasks
    }

    pub fn agents(&self) -> &Collection<Agent> {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut Collection<Agent> {
        &mut self.agents
    }

    pub fn notes(&self) -> &Collection<Note> {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut Collection<Note> {
        &mut self.notes
    }

    pub fn scheduled(&self) -> &Collection<ScheduledItem> {
        &self.scheduled
    }

    pub fn scheduled_mut(&mut self) -> &mut Collection<ScheduledItem> {
        &mut self.scheduled
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    pub fn mood(&self) -> Option<&Mood> {
        self.mood.as_ref()
    }

    pub fn activity(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.activity.iter().map(|a| &a.entry)
    }

    pub fn status_updates(&self) -> impl Iterator<Item = &StatusUpdate> {
        self.status_updates.iter().map(|a| &a.entry)
    }

    pub fn status_update_count(&self) -> usize {
        self.status_updates.len()
    }

    pub fn feed(&self) -> impl Iterator<Item = &FeedEntry> {
        self.feed.iter()
    }

    pub fn feed_len(&self) -> usize {
        self.feed.len()
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Replace tasks, agents and activity wholesale.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.tasks.replace_all(snapshot.tasks);
        self.agents.replace_all(snapshot.agents);
        self.activity.clear();
        for entry in snapshot.activity {
            self.append_activity(entry);
        }
    }

    pub fn append_activity(&mut self, entry: ActivityEntry) {
        let seq = self.next_seq();
        self.activity.push(Arrived { seq, entry });
    }

    /// Append a status update, evicting the oldest beyond the cap.
    pub fn push_status(&mut self, entry: StatusUpdate) {
        let seq = self.next_seq();
        self.status_updates.push_back(Arrived { seq, entry });
        while self.status_updates.len() > self.status_cap {
            self.status_updates.pop_front();
        }
    }

    /// Append a feed entry, evicting the oldest beyond the cap.
    pub fn push_feed(&mut self, entry: FeedEntry) {
        self.feed.push_back(entry);
        self.trim_feed();
    }

    /// Returns true if the feed had anything in it.
    pub fn clear_feed(&mut self) -> bool {
        let had_entries = !self.feed.is_empty();
        self.feed.clear();
        had_entries
    }

    /// Union a pulled feed page into the local feed.
    ///
    /// Entries already present (by id, or by content when id-less) are kept
    /// as-is; new ones are slotted in by timestamp. Returns true if any entry
    /// was added.
    pub fn merge_feed(&mut self, entries: Vec<FeedEntry>) -> bool {
        let mut added = false;
        for entry in entries {
            if self.feed.iter().any(|existing| existing.same_entry(&entry)) {
                continue;
            }
            let idx = self
                .feed
                .iter()
                .rposition(|existing| existing.timestamp <= entry.timestamp)
                .map_or(0, |i| i + 1);
            self.feed.insert(idx, entry);
            added = true;
        }
        if added {
            self.trim_feed();
        }
        added
    }

    fn trim_feed(&mut self) {
        while self.feed.len() > self.feed_cap {
            self.feed.pop_front();
        }
    }

    /// Returns true if the metrics changed.
    pub fn set_metrics(&mut self, metrics: Metrics) -> bool {
        if self.metrics.as_ref() == Some(&metrics) {
            return false;
        }
        self.metrics = Some(metrics);
        true
    }

    /// Returns true if the mood changed.
    pub fn set_mood(&mut self, mood: Mood) -> bool {
        if self.mood.as_ref() == Some(&mood) {
            return false;
        }
        self.mood = Some(mood);
        true
    }

    /// Activity and status updates merged, newest first.
    ///
    /// Equal timestamps fall back to arrival order, later arrivals first;
    /// entries without a timestamp sink to the bottom.
    pub fn timeline(&self) -> Vec<TimelineItem<'_>> {
        let mut items: Vec<(Timestamp, u64, TimelineItem<'_>)> = self
            .activity
            .iter()
            .map(|a| (a.entry.timestamp, a.seq, TimelineItem::Activity(&a.entry)))
            .chain(
                self.status_updates
                    .iter()
                    .map(|a| (a.entry.timestamp, a.seq, TimelineItem::Status(&a.entry))),
            )
            .collect();

        items.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        items.into_iter().map(|(_, _, item)| item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Some(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    fn activity(msg: &str, ts: Timestamp) -> ActivityEntry {
        ActivityEntry {
            message: msg.to_string(),
            timestamp: ts,
        }
    }

    fn status(detail: &str, ts: Timestamp) -> StatusUpdate {
        StatusUpdate {
            agent: "coder".to_string(),
            status: "working".to_string(),
            detail: detail.to_string(),
            timestamp: ts,
        }
    }

    fn feed(n: usize, ts: Timestamp) -> FeedEntry {
        FeedEntry {
            id: Some(format!("f{}", n)),
            kind: "working".to_string(),
            message: format!("entry {}", n),
            timestamp: ts,
        }
    }

    #[test]
    fn test_status_cap_evicts_oldest() {
        let mut store = EntityStore::default();
        for i in 0..201 {
            store.push_status(status(&format!("s{}", i), at(i)));
        }
        assert_eq!(store.status_update_count(), 200);
        let details: Vec<_> = store.status_updates().map(|s| s.detail.clone()).collect();
        assert_eq!(details.first().unwrap(), "s1");
        assert_eq!(details.last().unwrap(), "s200");
    }

    #[test]
    fn test_feed_cap_evicts_oldest() {
        let mut store = EntityStore::default();
        for i in 0..501 {
            store.push_feed(feed(i, at(i as i64)));
        }
        assert_eq!(store.feed_len(), 500);
        assert_eq!(store.feed().next().unwrap().id.as_deref(), Some("f1"));
        assert_eq!(store.feed().last().unwrap().id.as_deref(), Some("f500"));
    }

    #[test]
    fn test_timeline_orders_descending() {
        let mut store = EntityStore::default();
        store.append_activity(activity("t1", at(10)));
        store.append_activity(activity("t2", at(30)));
        store.push_status(status("t3", at(20)));

        let order: Vec<_> = store.timeline().iter().map(|i| i.timestamp()).collect();
        assert_eq!(order, vec![at(30), at(20), at(10)]);
    }

    #[test]
    fn test_timeline_ties_and_missing_timestamps() {
        let mut store = EntityStore::default();
        store.append_activity(activity("no-ts", None));
        store.append_activity(activity("first", at(5)));
        store.push_status(status("second", at(5)));

        let timeline = store.timeline();
        assert!(matches!(timeline[0], TimelineItem::Status(s) if s.detail == "second"));
        assert!(matches!(timeline[1], TimelineItem::Activity(a) if a.message == "first"));
        assert!(matches!(timeline[2], TimelineItem::Activity(a) if a.message == "no-ts"));
    }

    #[test]
    fn test_merge_feed_unions_by_identity() {
        let mut store = EntityStore::default();
        store.push_feed(feed(1, at(1)));
        store.push_feed(feed(3, at(3)));

        let added = store.merge_feed(vec![feed(1, at(1)), feed(2, at(2)), feed(4, at(4))]);
        assert!(added);
        let ids: Vec<_> = store.feed().map(|f| f.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["f1", "f2", "f3", "f4"]);

        assert!(!store.merge_feed(vec![feed(2, at(2))]));
    }

    #[test]
    fn test_clear_feed_and_reset() {
        let mut store = EntityStore::with_caps(3, 3);
        assert!(!store.clear_feed());
        store.push_feed(feed(1, at(1)));
        assert!(store.clear_feed());
        assert_eq!(store.feed_len(), 0);

        store.append_activity(activity("x", at(1)));
        store.set_mood(Mood::default());
        store.reset();
        assert_eq!(store.activity().count(), 0);
        assert!(store.mood().is_none());
        for i in 0..5 {
            store.push_status(status("s", at(i)));
        }
        assert_eq!(store.status_update_count(), 3);
    }

    #[test]
    fn test_singletons_report_change() {
        let mut store = EntityStore::default();
        let metrics = Metrics {
            provider: Some("anthropic".to_string()),
            ..Metrics::default()
        };
        assert!(store.set_metrics(metrics.clone()));
        assert!(!store.set_metrics(metrics));
    }
}
