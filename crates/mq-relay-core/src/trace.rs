//! Names of the structured pipeline trace events.
//!
//! Every event is emitted through `tracing` with an `event` field holding one
//! of these names and a `path` field of the form
//! `instance/topic/group/tag/message_id`.

use std::fmt;

/// Pipeline stage reported by a trace record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// A message was fetched and acknowledged
    Consume,
    /// The broker refused to acknowledge a delivery
    BadAck,
    /// A message was discarded by the ownership filter
    Drop,
    /// A message was requeued on handler request
    RePublish,
    /// An application message was published
    Publish,
}

impl TraceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consume => "Consume",
            Self::BadAck => "BadAck",
            Self::Drop => "Drop",
            Self::RePublish => "RePublish",
            Self::Publish => "Publish",
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
