//! Server emitter: drives one action to completion over an event stream.
//!
//! # State Machine
//!
//! ```text
//! PendingInput -> Running
//! Running      -> Settled | FailedDomain | FailedInternal   (one terminal frame)
//! Running      -> Closed                                    (request aborted, no frame)
//! Settled | FailedDomain | FailedInternal -> Closed
//! Closed       -> (no transitions)
//! ```
//!
//! While `Running`, a heartbeat timer emits a `wait` frame every interval,
//! concurrently with the action. Every write goes through [`FrameSink`], whose
//! closed guard is monotonic: once the terminal frame is written (or the
//! caller goes away) the sender is gone, and any later write, such as a
//! heartbeat tick that was already due, is a silent no-op.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::protocol::{EventType, Frame, INTERNAL_ERROR_MESSAGE};
use crate::transformer::Transformer;

/// Stream of encoded frames, suitable as an HTTP response body.
pub type FrameStream = UnboundedReceiverStream<Bytes>;

/// Emitter lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmitterState {
    /// Input not yet handed to the action.
    PendingInput,
    /// Action running, heartbeats flowing.
    Running,
    /// `settle` written.
    Settled,
    /// `server-error` written.
    FailedDomain,
    /// `internal-error` written.
    FailedInternal,
    /// Stream closed (terminal).
    Closed,
}

impl EmitterState {
    /// Returns `true` if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        use EmitterState::*;
        matches!(
            (self, next),
            (PendingInput, Running)
                | (Running, Settled | FailedDomain | FailedInternal | Closed)
                | (Settled | FailedDomain | FailedInternal, Closed)
        )
    }
}

impl fmt::Display for EmitterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingInput => write!(f, "pending_input"),
            Self::Running => write!(f, "running"),
            Self::Settled => write!(f, "settled"),
            Self::FailedDomain => write!(f, "failed_domain"),
            Self::FailedInternal => write!(f, "failed_internal"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// How an action ended, already serialized for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The serialized result.
    Settled(String),
    /// The serialized domain error message.
    DomainError(String),
    /// Any other failure, carrying the serialized generic message. The
    /// underlying detail has been logged, never serialized.
    InternalError(String),
}

impl ActionOutcome {
    /// Classify the result of an action whose panics were caught.
    ///
    /// A [`TaskError`] anywhere in the error chain is a domain error. Every
    /// other error, a panic, or a result the transformer cannot serialize is
    /// an internal error; its detail goes to the log only.
    pub fn from_action<O: serde::Serialize>(
        result: Result<anyhow::Result<O>, Box<dyn Any + Send>>,
        transformer: &Transformer,
    ) -> Self {
        match result {
            Ok(Ok(value)) => match transformer.serialize(&value) {
                Ok(data) => Self::Settled(data),
                Err(err) => {
                    tracing::error!(error = %err, "Failed to serialize task result");
                    Self::internal(transformer)
                },
            },
            Ok(Err(err)) => match find_task_error(&err) {
                Some(task_error) => match transformer.serialize(task_error.message()) {
                    Ok(data) => {
                        tracing::debug!(message = task_error.message(), "Task raised a domain error");
                        Self::DomainError(data)
                    },
                    Err(transform) => {
                        tracing::error!(error = %transform, "Failed to serialize task error message");
                        Self::internal(transformer)
                    },
                },
                None => {
                    tracing::error!(error = ?err, "Task failed with an internal error");
                    Self::internal(transformer)
                },
            },
            Err(panic) => {
                tracing::error!(panic = panic_message(&*panic), "Task panicked");
                Self::internal(transformer)
            },
        }
    }

    fn internal(transformer: &Transformer) -> Self {
        let data = transformer
            .serialize(INTERNAL_ERROR_MESSAGE)
            .unwrap_or_else(|_| format!("\"{}\"", INTERNAL_ERROR_MESSAGE));
        Self::InternalError(data)
    }
}

fn find_task_error(err: &anyhow::Error) -> Option<&TaskError> {
    err.downcast_ref::<TaskError>()
        .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<TaskError>()))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Write half of the event stream.
#[derive(Debug)]
pub struct FrameSink {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

impl FrameSink {
    /// Create a sink and the body stream it feeds.
    pub fn channel() -> (Self, FrameStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, UnboundedReceiverStream::new(rx))
    }

    /// Write a frame. Returns `false`, writing nothing, once the sink is
    /// closed or the reader has gone away.
    pub fn send(&mut self, frame: &Frame) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        if tx.send(frame.encode()).is_err() {
            self.tx = None;
            return false;
        }
        true
    }

    /// Close the sink, ending the stream once buffered frames are read.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Returns `true` once the sink is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Resolves when the reader drops the stream.
    fn reader_gone(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move {
            match tx {
                Some(tx) => tx.closed().await,
                None => std::future::pending().await,
            }
        }
    }
}

/// Summary of one emitter run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterReport {
    /// The terminal frame written, or `None` if the request was aborted.
    pub terminal: Option<EventType>,
    /// Number of `wait` frames written.
    pub heartbeats: usize,
}

/// Drives an action and writes its frames.
#[derive(Debug)]
pub struct EventStreamEmitter {
    state: EmitterState,
    sink: FrameSink,
    heartbeat_interval: Duration,
    heartbeats: usize,
}

impl EventStreamEmitter {
    /// Create an emitter writing to `sink`.
    pub fn new(sink: FrameSink, heartbeat_interval: Duration) -> Self {
        Self {
            state: EmitterState::PendingInput,
            sink,
            heartbeat_interval,
            heartbeats: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> EmitterState {
        self.state
    }

    /// Run `action` to completion, emitting heartbeats while it is pending and
    /// exactly one terminal frame when it ends.
    ///
    /// If the reader drops the stream, or `cancellation` fires, the action is
    /// dropped, `cancellation` is cancelled, and the stream closes without a
    /// terminal frame.
    pub async fn run<F>(mut self, action: F, cancellation: CancellationToken) -> EmitterReport
    where
        F: Future<Output = ActionOutcome>,
    {
        self.transition(EmitterState::Running);

        let period = self.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = {
            let reader_gone = self.sink.reader_gone();
            tokio::pin!(action);
            tokio::pin!(reader_gone);

            loop {
                tokio::select! {
                    biased;
                    () = &mut reader_gone => break None,
                    () = cancellation.cancelled() => break None,
                    outcome = &mut action => break Some(outcome),
                    _ = heartbeat.tick() => {
                        if self.sink.send(&Frame::wait()) {
                            self.heartbeats += 1;
                            tracing::trace!(heartbeats = self.heartbeats, "Sent wait frame");
                        }
                    },
                }
            }
        };

        match outcome {
            Some(outcome) => self.finish(outcome),
            None => self.abort(&cancellation),
        }
    }

    fn finish(mut self, outcome: ActionOutcome) -> EmitterReport {
        let (state, frame) = match outcome {
            ActionOutcome::Settled(data) => (EmitterState::Settled, Frame::new(EventType::Settle, data)),
            ActionOutcome::DomainError(data) => {
                (EmitterState::FailedDomain, Frame::new(EventType::ServerError, data))
            },
            ActionOutcome::InternalError(data) => (
                EmitterState::FailedInternal,
                Frame::new(EventType::InternalError, data),
            ),
        };

        self.transition(state);
        let written = self.sink.send(&frame);
        if !written {
            tracing::warn!(event = %frame.event, "Reader gone before the terminal frame was written");
        }
        self.sink.close();
        self.transition(EmitterState::Closed);

        EmitterReport {
            terminal: written.then_some(frame.event),
            heartbeats: self.heartbeats,
        }
    }

    fn abort(mut self, cancellation: &CancellationToken) -> EmitterReport {
        tracing::warn!(
            heartbeats = self.heartbeats,
            "Request aborted; closing event stream without a terminal frame"
        );
        cancellation.cancel();
        self.sink.close();
        self.transition(EmitterState::Closed);

        EmitterReport {
            terminal: None,
            heartbeats: self.heartbeats,
        }
    }

    fn transition(&mut self, next: EmitterState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "invalid emitter transition from {} to {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Emitter transition");
        self.state = next;
        if self.state.is_terminal() {
            tracing::debug!(heartbeats = self.heartbeats, "Event stream closed");
        }
    }
}
