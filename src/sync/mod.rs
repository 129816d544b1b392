//! Synchronization runtime.
//!
//! - `timer`: handle-or-none timer slots with generation tags
//! - `connection`: push-channel lifecycle and fixed-delay reconnection
//! - `poller`: interval pulls that back up the push channel
//! - `client`: the single loop task that owns all mutable state

pub mod client;
pub mod connection;
pub mod poller;
pub mod timer;

use std::fmt;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::dispatch::{Notice, PullBatch};
use crate::protocol::ServerEvent;

pub use client::{Command, SyncClient, SyncHandle};
pub use connection::{ConnectionManager, ConnectionState};
pub use poller::FallbackPoller;
pub use timer::{TimerPurpose, TimerSlot};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Result of a spawned write request.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The server accepted the write. Carries the merge it confirms, if any.
    Confirmed(Option<ServerEvent>),
    Failed(Notice),
}

/// Everything spawned tasks report back to the loop.
pub enum LoopEvent {
    TimerFired {
        purpose: TimerPurpose,
        generation: u64,
    },
    Connected {
        generation: u64,
        stream: Box<WsStream>,
    },
    ConnectFailed {
        generation: u64,
        error: String,
    },
    /// A pull result with the stamp it was issued under.
    Pulled { batch: PullBatch, issued: u64 },
    WriteFinished(WriteOutcome),
}

impl fmt::Debug for LoopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopEvent::TimerFired {
                purpose,
                generation,
            } => f
                .debug_struct("TimerFired")
                .field("purpose", purpose)
                .field("generation", generation)
                .finish(),
            LoopEvent::Connected { generation, .. } => f
                .debug_struct("Connected")
                .field("generation", generation)
                .finish_non_exhaustive(),
            LoopEvent::ConnectFailed { generation, error } => f
                .debug_struct("ConnectFailed")
                .field("generation", generation)
                .field("error", error)
                .finish(),
            LoopEvent::Pulled { batch, issued } => f
                .debug_struct("Pulled")
                .field("batch", &batch.label())
                .field("issued", issued)
                .finish(),
            LoopEvent::WriteFinished(outcome) => {
                f.debug_tuple("WriteFinished").field(outcome).finish()
            }
        }
    }
}
