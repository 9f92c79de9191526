//! Protocol frames and their wire encoding.
//!
//! Every frame is written as an SSE event:
//!
//! ```text
//! event: <type>\n
//! data: <payload>\n
//! \n
//! ```
//!
//! A payload containing line breaks is split over several `data:` lines, which
//! an SSE decoder joins back with `\n`.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

/// Message carried by every `internal-error` frame.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Error";

/// Content type of a task response stream.
pub const TEXT_EVENT_STREAM: &str = "text/event-stream";

/// The type of a protocol frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Heartbeat sent while the action is pending.
    Wait,
    /// The action completed; carries the serialized result.
    Settle,
    /// The action raised a domain error; carries the serialized message.
    ServerError,
    /// The action failed unexpectedly; carries a fixed serialized message.
    InternalError,
}

impl EventType {
    /// The event name written on the `event:` line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Settle => "settle",
            Self::ServerError => "server-error",
            Self::InternalError => "internal-error",
        }
    }

    /// Returns `true` if a frame of this type ends an invocation.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Wait)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event name that is not part of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wait" => Ok(Self::Wait),
            "settle" => Ok(Self::Settle),
            "server-error" => Ok(Self::ServerError),
            "internal-error" => Ok(Self::InternalError),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

/// One protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame type
    pub event: EventType,
    /// The serialized payload (empty for heartbeats)
    pub data: String,
}

impl Frame {
    /// Create a frame.
    pub fn new(event: EventType, data: impl Into<String>) -> Self {
        Self {
            event,
            data: data.into(),
        }
    }

    /// A heartbeat frame.
    pub fn wait() -> Self {
        Self::new(EventType::Wait, String::new())
    }

    /// Encode this frame as UTF-8 event stream text.
    pub fn encode(&self) -> Bytes {
        let mut out = String::with_capacity(self.data.len() + 32);
        out.push_str("event: ");
        out.push_str(self.event.as_str());
        out.push('\n');

        // `lines()` would drop a trailing empty line, so split by hand.
        let data = self.data.replace("\r\n", "\n").replace('\r', "\n");
        for line in data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        Bytes::from(out)
    }
}
