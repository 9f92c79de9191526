//! The event-stream vocabulary shared by the server emitter and the client
//! consumer.
//!
//! - [`frame`] - frame types and their `event:`/`data:` encoding
//! - [`sse_parser`] - incremental decoder for the same grammar

pub mod frame;
pub mod sse_parser;

pub use frame::{EventType, Frame, UnknownEventType, INTERNAL_ERROR_MESSAGE, TEXT_EVENT_STREAM};
pub use sse_parser::{SseEvent, SseItem, SseParser};
