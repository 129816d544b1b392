//! Push-channel protocol.
//!
//! - Raw `{type, data}` envelopes
//! - Typed server events with their merge classification
//! - Client keep-alive messages

pub mod envelope;
pub mod events;

pub use envelope::{ClientMessage, Envelope};
pub use events::{ArchiveSummary, MergeKind, ServerEvent};
