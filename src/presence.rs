//! Presence and elapsed-time tracking for active agents.
//!
//! Everything here is derived from the agent collection and can be thrown
//! away at any time; only visual continuity is lost.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::config::{Limits, MAX_FADE_WINDOW_SECS};
use crate::model::Agent;

/// An agent that is working right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAgent {
    pub agent_id: String,
    pub name: String,
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
    pub elapsed_label: String,
}

/// An agent that stopped working recently.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentlyCompleted {
    pub agent_id: String,
    pub name: String,
    pub task: String,
    pub completed_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
}

/// A recently completed record with its fade state for this pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FadingRecord {
    #[serde(flatten)]
    pub record: RecentlyCompleted,
    pub age_seconds: i64,
    pub opacity: f32,
}

/// Output of one observation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresenceView {
    pub active: Vec<ActiveAgent>,
    pub recent: Vec<FadingRecord>,
}

#[derive(Debug, Clone)]
struct Session {
    name: String,
    task: String,
    started_at: DateTime<Utc>,
}

/// Derives active durations and the fading "recently completed" list.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    sessions: HashMap<String, Session>,
    recent: VecDeque<RecentlyCompleted>,
    recent_cap: usize,
    fade_window: Duration,
    fade_floor: f32,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(&Limits::default())
    }
}

impl PresenceTracker {
    pub fn new(limits: &Limits) -> Self {
        Self {
            sessions: HashMap::new(),
            recent: VecDeque::new(),
            recent_cap: limits.recent_cap.max(1),
            fade_window: Duration::seconds(
                limits.fade_window_secs.clamp(1, MAX_FADE_WINDOW_SECS),
            ),
            fade_floor: limits.fade_floor.clamp(0.0, 1.0),
        }
    }

    pub fn reset(&mut self) {
        self.sessions.clear();
        self.recent.clear();
    }

    /// Compare `agents` against the previous pass and return what to show.
    pub fn observe<'a, I>(&mut self, agents: I, now: DateTime<Utc>) -> PresenceView
    where
        I: IntoIterator<Item = &'a Agent>,
    {
        let mut seen = Vec::new();
        for agent in agents {
            if !agent.is_active() {
                continue;
            }
            let task = agent.current_task.clone().unwrap_or_default();
            let session = self
                .sessions
                .entry(agent.id.clone())
                .or_insert_with(|| Session {
                    name: agent.display_name().to_string(),
                    task: task.clone(),
                    started_at: agent.started_working_at.unwrap_or(now),
                });
            session.name = agent.display_name().to_string();
            session.task = task;
            seen.push(agent.id.clone());
        }

        let finished: Vec<String> = self
            .sessions
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in finished {
            if let Some(session) = self.sessions.remove(&id) {
                tracing::debug!(agent = %id, task = %session.task, "agent finished working");
                self.push_recent(RecentlyCompleted {
                    agent_id: id,
                    elapsed_seconds: seconds_between(session.started_at, now),
                    name: session.name,
                    task: session.task,
                    completed_at: now,
                });
            }
        }

        let window = self.fade_window;
        self.recent.retain(|r| now - r.completed_at <= window);

        let mut active: Vec<ActiveAgent> = self
            .sessions
            .iter()
            .map(|(id, session)| {
                let elapsed = seconds_between(session.started_at, now);
                ActiveAgent {
                    agent_id: id.clone(),
                    name: session.name.clone(),
                    task: session.task.clone(),
                    started_at: session.started_at,
                    elapsed_seconds: elapsed,
                    elapsed_label: format_elapsed(elapsed),
                }
            })
            .collect();
        active.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });

        let recent = self
            .recent
            .iter()
            .rev()
            .map(|record| {
                let age = seconds_between(record.completed_at, now);
                FadingRecord {
                    record: record.clone(),
                    age_seconds: age,
                    opacity: self.opacity(age),
                }
            })
            .collect();

        PresenceView { active, recent }
    }

    fn push_recent(&mut self, record: RecentlyCompleted) {
        self.recent.push_back(record);
        while self.recent.len() > self.recent_cap {
            self.recent.pop_front();
        }
    }

    /// Linear fade from 1.0 to the floor across the fade window.
    pub fn opacity(&self, age_seconds: i64) -> f32 {
        let window = self.fade_window.num_seconds() as f32;
        let progress = (age_seconds.max(0) as f32 / window).min(1.0);
        1.0 - (1.0 - self.fade_floor) * progress
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().max(0)
}

/// `45s`, `3m 07s`, `1h 02m`.
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {:02}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
