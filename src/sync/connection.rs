//! Push-channel lifecycle: `Disconnected -> Connecting -> Connected`.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::connect_async;
use url::Url;

use crate::config::Settings;
use crate::error::{Error, Result};

use super::timer::{TimerPurpose, TimerSlot};
use super::LoopEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Owns connection attempts and the single reconnect timer.
///
/// Attempts run on spawned tasks and report back as [`LoopEvent::Connected`]
/// or [`LoopEvent::ConnectFailed`], tagged with the attempt number so a late
/// result from an abandoned attempt can be told apart.
pub struct ConnectionManager {
    url: Url,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    state: ConnectionState,
    reconnect: TimerSlot,
    attempt: u64,
    connects: u64,
    reconnects_scheduled: u64,
    tx: UnboundedSender<LoopEvent>,
}

impl ConnectionManager {
    pub fn new(settings: &Settings, tx: UnboundedSender<LoopEvent>) -> Result<Self> {
        Ok(Self {
            url: settings.server.socket_url()?,
            connect_timeout: settings.timing.connect_timeout(),
            reconnect_delay: settings.timing.reconnect_delay(),
            state: ConnectionState::Disconnected,
            reconnect: TimerSlot::new(TimerPurpose::Reconnect),
            attempt: 0,
            connects: 0,
            reconnects_scheduled: 0,
            tx,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Connection attempts started so far.
    pub fn connect_count(&self) -> u64 {
        self.connects
    }

    /// Reconnect timers armed so far.
    pub fn reconnects_scheduled(&self) -> u64 {
        self.reconnects_scheduled
    }

    /// Reconnect timers currently outstanding; never more than one.
    pub fn pending_reconnects(&self) -> usize {
        usize::from(self.reconnect.is_armed())
    }

    /// Start an attempt unless one is running or the socket is open.
    pub fn connect(&mut self) -> bool {
        let Some(generation) = self.begin_attempt() else {
            return false;
        };

        let url = self.url.to_string();
        let limit = self.connect_timeout;
        let tx = self.tx.clone();
        tracing::info!("Connecting to {} (attempt {})", url, generation);
        tokio::spawn(async move {
            let event = match tokio::time::timeout(limit, connect_async(url)).await {
                Ok(Ok((stream, _response))) => LoopEvent::Connected {
                    generation,
                    stream: Box::new(stream),
                },
                Ok(Err(e)) => LoopEvent::ConnectFailed {
                    generation,
                    error: Error::from(e).to_string(),
                },
                Err(_) => LoopEvent::ConnectFailed {
                    generation,
                    error: Error::Transport(format!("connect timed out after {:?}", limit))
                        .to_string(),
                },
            };
            let _ = tx.send(event);
        });
        true
    }

    fn begin_attempt(&mut self) -> Option<u64> {
        if self.state != ConnectionState::Disconnected {
            return None;
        }
        self.state = ConnectionState::Connecting;
        self.attempt += 1;
        self.connects += 1;
        Some(self.attempt)
    }

    /// The attempt `generation` succeeded. Returns false for a stale attempt,
    /// in which case the caller drops the stream.
    pub fn on_open(&mut self, generation: u64) -> bool {
        if generation != self.attempt || self.state != ConnectionState::Connecting {
            tracing::debug!("Discarding stale connection (attempt {})", generation);
            return false;
        }
        self.reconnect.cancel();
        self.state = ConnectionState::Connected;
        tracing::info!("Connected to {}", self.url);
        true
    }

    /// The attempt `generation` failed. Returns false for a stale attempt.
    pub fn on_connect_failed(&mut self, generation: u64, error: &str) -> bool {
        if generation != self.attempt || self.state != ConnectionState::Connecting {
            return false;
        }
        self.on_close(error);
        true
    }

    /// Socket closed or errored, or an attempt failed.
    pub fn on_close(&mut self, reason: &str) {
        if self.state != ConnectionState::Disconnected {
            tracing::warn!("Connection lost: {}", reason);
        }
        self.state = ConnectionState::Disconnected;
        if self.reconnect.arm_once(self.reconnect_delay, &self.tx) {
            self.reconnects_scheduled += 1;
            tracing::debug!("Reconnect scheduled in {:?}", self.reconnect_delay);
        }
    }

    /// The reconnect timer fired. Starts a new attempt if it is current.
    pub fn on_reconnect_due(&mut self, generation: u64) -> bool {
        if !self.reconnect.accept(generation) {
            return false;
        }
        self.connect()
    }

    /// Cancel any pending reconnect and forget the current attempt.
    pub fn shutdown(&mut self) {
        self.reconnect.cancel();
        self.attempt += 1;
        self.state = ConnectionState::Disconnected;
    }
}
