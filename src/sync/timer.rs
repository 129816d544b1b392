//! Handle-or-none timer slots.
//!
//! A slot holds at most one spawned timer task. Firing never touches state
//! directly: the task only sends [`LoopEvent::TimerFired`] tagged with the
//! slot's generation, and the loop asks the slot whether that generation is
//! still current.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::LoopEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    Reconnect,
    AgentPoll,
    Tick,
    SlowPoll,
    KeepAlive,
}

impl fmt::Display for TimerPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerPurpose::Reconnect => "reconnect",
            TimerPurpose::AgentPoll => "agent-poll",
            TimerPurpose::Tick => "tick",
            TimerPurpose::SlowPoll => "slow-poll",
            TimerPurpose::KeepAlive => "keep-alive",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct TimerSlot {
    purpose: TimerPurpose,
    handle: Option<JoinHandle<()>>,
    generation: u64,
    repeating: bool,
}

impl TimerSlot {
    pub fn new(purpose: TimerPurpose) -> Self {
        Self {
            purpose,
            handle: None,
            generation: 0,
            repeating: false,
        }
    }

    pub fn purpose(&self) -> TimerPurpose {
        self.purpose
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fire once after `delay`. No-op if the slot is already armed.
    pub fn arm_once(&mut self, delay: Duration, tx: &UnboundedSender<LoopEvent>) -> bool {
        if self.is_armed() {
            return false;
        }
        let generation = self.bump();
        let purpose = self.purpose;
        let tx = tx.clone();
        self.repeating = false;
        self.handle = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(LoopEvent::TimerFired {
                purpose,
                generation,
            });
        }));
        true
    }

    /// Fire every `period`, optionally once right away. No-op if armed.
    pub fn arm_repeating(
        &mut self,
        period: Duration,
        immediate: bool,
        tx: &UnboundedSender<LoopEvent>,
    ) -> bool {
        if self.is_armed() {
            return false;
        }
        let generation = self.bump();
        let purpose = self.purpose;
        let tx = tx.clone();
        let start = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        self.repeating = true;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let fired = LoopEvent::TimerFired {
                    purpose,
                    generation,
                };
                if tx.send(fired).is_err() {
                    break;
                }
            }
        }));
        true
    }

    /// Abort the pending task, if any. Idempotent.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                self.bump();
                true
            }
            None => false,
        }
    }

    /// Whether a fired `generation` is current. A one-shot slot disarms on
    /// acceptance.
    pub fn accept(&mut self, generation: u64) -> bool {
        if !self.is_armed() || generation != self.generation {
            tracing::trace!("stale {} timer (generation {})", self.purpose, generation);
            return false;
        }
        if !self.repeating {
            self.handle = None;
        }
        true
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fired(event: LoopEvent) -> (TimerPurpose, u64) {
        match event {
            LoopEvent::TimerFired {
                purpose,
                generation,
            } => (purpose, generation),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_armed_slot_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerPurpose::Reconnect);

        assert!(slot.arm_once(Duration::from_secs(1), &tx));
        assert!(!slot.arm_once(Duration::from_secs(1), &tx));

        let (purpose, generation) = fired(rx.recv().await.unwrap());
        assert_eq!(purpose, TimerPurpose::Reconnect);
        assert!(slot.accept(generation));
        assert!(!slot.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_generation_is_stale() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerPurpose::Reconnect);

        slot.arm_once(Duration::from_secs(1), &tx);
        let old = slot.generation();
        assert!(slot.cancel());
        assert!(!slot.cancel());

        slot.arm_once(Duration::from_secs(1), &tx);
        assert!(!slot.accept(old));
        assert!(slot.accept(slot.generation()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_fires_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerPurpose::SlowPoll);

        slot.arm_repeating(Duration::from_secs(10), true, &tx);
        let (_, generation) = fired(rx.recv().await.unwrap());
        assert!(slot.accept(generation));
        assert!(slot.is_armed());

        let (_, again) = fired(rx.recv().await.unwrap());
        assert_eq!(again, generation);

        slot.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        while let Ok(event) = rx.try_recv() {
            let (_, generation) = fired(event);
            assert!(!slot.accept(generation));
        }
    }
}
