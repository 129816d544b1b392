//! Ordering between pushed changes and pulls that were in flight when they
//! arrived.
//!
//! Every pull is stamped when it is issued and every push is stamped when it
//! is applied, from one shared clock. A pull result is merged only if it is
//! newer than the last pull merged into the same collection and newer than
//! the last wholesale replacement; individual records touched by a push
//! after the pull went out are skipped.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Tasks,
    Agents,
    Notes,
    Scheduled,
    Metrics,
    Mood,
    Feed,
}

#[derive(Debug, Default, Clone)]
struct Lane {
    applied: u64,
    reset: u64,
    touched: HashMap<String, u64>,
}

#[derive(Debug, Default, Clone)]
pub struct PullFence {
    clock: u64,
    lanes: HashMap<CollectionKind, Lane>,
}

impl PullFence {
    pub fn new() -> Self {
        Self::default()
    }

    fn advance(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Stamp for a pull about to be issued.
    pub fn issue(&mut self) -> u64 {
        self.advance()
    }

    /// A push changed (or removed) the record `id`.
    pub fn touch(&mut self, kind: CollectionKind, id: &str) {
        let stamp = self.advance();
        self.lanes
            .entry(kind)
            .or_default()
            .touched
            .insert(id.to_string(), stamp);
    }

    /// A push replaced the whole collection or singleton.
    pub fn reset(&mut self, kind: CollectionKind) {
        let stamp = self.advance();
        let lane = self.lanes.entry(kind).or_default();
        lane.reset = stamp;
        lane.touched.clear();
    }

    /// Whether a pull issued at `issued` may be merged. Admitting it makes
    /// every older pull of the same collection stale.
    pub fn admit(&mut self, kind: CollectionKind, issued: u64) -> bool {
        let lane = self.lanes.entry(kind).or_default();
        if issued <= lane.applied || issued < lane.reset {
            return false;
        }
        lane.applied = issued;
        lane.touched.retain(|_, stamp| *stamp > issued);
        true
    }

    /// Whether a push touched `id` after the pull issued at `issued` went out.
    pub fn superseded(&self, kind: CollectionKind, id: &str, issued: u64) -> bool {
        self.lanes
            .get(&kind)
            .and_then(|lane| lane.touched.get(id))
            .map_or(false, |stamp| *stamp > issued)
    }

    /// Forget per-collection history; the clock keeps running.
    pub fn clear(&mut self) {
        self.lanes.clear();
    }

    #[cfg(test)]
    fn tracked(&self, kind: CollectionKind) -> usize {
        self.lanes.get(&kind).map_or(0, |lane| lane.touched.len())
    }
}
