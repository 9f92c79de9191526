//! Server side: turning a [`ServerTask`](crate::ServerTask) into an HTTP
//! endpoint that streams its progress and result.

pub mod emitter;
pub mod handler;

pub use emitter::{
    ActionOutcome, EmitterReport, EmitterState, EventStreamEmitter, FrameSink, FrameStream,
};
pub use handler::TaskHandler;
