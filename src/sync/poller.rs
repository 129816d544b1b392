//! Interval pulls backing up the push channel.
//!
//! The fast agent poll and the tick run only while connected; the slow poll
//! runs for the whole client lifetime. Pulls are spawned and their results
//! come back as [`LoopEvent::Pulled`], carrying the stamp they were issued
//! with. A failed pull skips that cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::api::DashboardApi;
use crate::config::Settings;
use crate::dispatch::PullBatch;
use crate::error::Result;

use super::timer::{TimerPurpose, TimerSlot};
use super::LoopEvent;

pub struct FallbackPoller {
    api: Arc<dyn DashboardApi>,
    tx: UnboundedSender<LoopEvent>,
    agent_poll: TimerSlot,
    tick: TimerSlot,
    slow: TimerSlot,
    agent_period: Duration,
    tick_period: Duration,
    slow_period: Duration,
    feed_limit: usize,
}

impl FallbackPoller {
    pub fn new(
        settings: &Settings,
        api: Arc<dyn DashboardApi>,
        tx: UnboundedSender<LoopEvent>,
    ) -> Self {
        Self {
            api,
            tx,
            agent_poll: TimerSlot::new(TimerPurpose::AgentPoll),
            tick: TimerSlot::new(TimerPurpose::Tick),
            slow: TimerSlot::new(TimerPurpose::SlowPoll),
            agent_period: settings.timing.agent_poll(),
            tick_period: settings.timing.tick(),
            slow_period: settings.timing.slow_poll(),
            feed_limit: settings.limits.feed_fetch_limit,
        }
    }

    pub fn is_running(&self, purpose: TimerPurpose) -> bool {
        self.slot(purpose).map_or(false, TimerSlot::is_armed)
    }

    fn slot(&self, purpose: TimerPurpose) -> Option<&TimerSlot> {
        match purpose {
            TimerPurpose::AgentPoll => Some(&self.agent_poll),
            TimerPurpose::Tick => Some(&self.tick),
            TimerPurpose::SlowPoll => Some(&self.slow),
            _ => None,
        }
    }

    fn slot_mut(&mut self, purpose: TimerPurpose) -> Option<&mut TimerSlot> {
        match purpose {
            TimerPurpose::AgentPoll => Some(&mut self.agent_poll),
            TimerPurpose::Tick => Some(&mut self.tick),
            TimerPurpose::SlowPoll => Some(&mut self.slow),
            _ => None,
        }
    }

    pub fn start_agent_poll(&mut self) -> bool {
        self.agent_poll
            .arm_repeating(self.agent_period, false, &self.tx)
    }

    pub fn start_tick(&mut self) -> bool {
        self.tick.arm_repeating(self.tick_period, false, &self.tx)
    }

    /// Fast agent poll and tick, on socket open.
    pub fn start_connected(&mut self) {
        self.start_agent_poll();
        self.start_tick();
    }

    /// On socket close. Idempotent.
    pub fn stop_connected(&mut self) {
        self.agent_poll.cancel();
        self.tick.cancel();
    }

    /// Slow poll; its first run is immediate.
    pub fn start_slow(&mut self) -> bool {
        self.slow.arm_repeating(self.slow_period, true, &self.tx)
    }

    pub fn stop_all(&mut self) {
        self.stop_connected();
        self.slow.cancel();
    }

    /// A poller timer fired. Spawns the matching pull stamped `issued` and
    /// returns true if the timer is current; the caller handles the tick
    /// itself.
    pub fn on_timer(&mut self, purpose: TimerPurpose, generation: u64, issued: u64) -> bool {
        let accepted = self
            .slot_mut(purpose)
            .map_or(false, |slot| slot.accept(generation));
        if !accepted {
            return false;
        }
        match purpose {
            TimerPurpose::AgentPoll => self.pull_agents(issued),
            TimerPurpose::SlowPoll => self.pull_slow(issued),
            _ => {}
        }
        true
    }

    /// Pull tasks again after a bulk server-side change.
    pub fn resync_tasks(&self, issued: u64) {
        self.spawn_pull("tasks", issued, |api| async move {
            api.list_tasks().await.map(PullBatch::Tasks)
        });
    }

    /// Run every pull once, outside the schedule.
    pub fn refresh_now(&self, issued: u64) {
        self.pull_agents(issued);
        self.pull_slow(issued);
    }

    fn pull_agents(&self, issued: u64) {
        self.spawn_pull("agents", issued, |api| async move {
            api.list_agents().await.map(PullBatch::Agents)
        });
    }

    fn pull_slow(&self, issued: u64) {
        self.resync_tasks(issued);
        self.spawn_pull("notes", issued, |api| async move {
            api.list_notes().await.map(PullBatch::Notes)
        });
        self.spawn_pull("scheduled", issued, |api| async move {
            api.list_scheduled().await.map(PullBatch::Scheduled)
        });
        self.spawn_pull("metrics", issued, |api| async move {
            api.get_metrics().await.map(PullBatch::Metrics)
        });
        self.spawn_pull("mood", issued, |api| async move {
            api.get_mood().await.map(PullBatch::Mood)
        });
        let limit = self.feed_limit;
        self.spawn_pull("feed", issued, move |api| async move {
            api.list_feed(limit).await.map(PullBatch::Feed)
        });
    }

    fn spawn_pull<F, Fut>(&self, label: &'static str, issued: u64, fetch: F)
    where
        F: FnOnce(Arc<dyn DashboardApi>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<PullBatch>> + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match fetch(api).await {
                Ok(batch) => {
                    let _ = tx.send(LoopEvent::Pulled { batch, issued });
                }
                Err(e) => tracing::debug!("Skipping {} pull: {}", label, e),
            }
        });
    }
}
