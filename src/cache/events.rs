//! Stream lifecycle events.
//!
//! The discovery protocol server reports stream lifecycle through one
//! closed event type instead of a per-protocol-variant callback
//! surface. The delta (incremental) variants share the
//! state-of-the-world bookkeeping; only logging distinguishes them.

use tracing::debug;

use super::{CacheError, SnapshotCache};

/// One stream lifecycle notification from the protocol server.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Open { stream_id: i64 },
    Request { stream_id: i64, node_id: String },
    Closed { stream_id: i64 },
    DeltaOpen { stream_id: i64 },
    DeltaRequest { stream_id: i64, node_id: String },
    DeltaClosed { stream_id: i64 },
}

impl StreamEvent {
    /// The stream the event concerns.
    pub fn stream_id(&self) -> i64 {
        match self {
            StreamEvent::Open { stream_id }
            | StreamEvent::Request { stream_id, .. }
            | StreamEvent::Closed { stream_id }
            | StreamEvent::DeltaOpen { stream_id }
            | StreamEvent::DeltaRequest { stream_id, .. }
            | StreamEvent::DeltaClosed { stream_id } => *stream_id,
        }
    }
}

impl SnapshotCache {
    /// Dispatch one stream lifecycle event into the bookkeeping.
    pub fn handle_stream_event(&self, event: StreamEvent) -> Result<(), CacheError> {
        match event {
            StreamEvent::Open { stream_id } => {
                self.on_stream_open(stream_id);
                Ok(())
            }
            StreamEvent::DeltaOpen { stream_id } => {
                debug!(stream = stream_id, "delta stream opened");
                self.on_stream_open(stream_id);
                Ok(())
            }
            StreamEvent::Request { stream_id, node_id }
            | StreamEvent::DeltaRequest { stream_id, node_id } => {
                self.on_stream_request(stream_id, &node_id)
            }
            StreamEvent::Closed { stream_id } | StreamEvent::DeltaClosed { stream_id } => {
                self.on_stream_closed(stream_id);
                Ok(())
            }
        }
    }
}
