//! Error types for server tasks.
//!
//! Three families of errors live here:
//!
//! - [`Error`] - configuration, transformer and input failures raised by the
//!   library itself. These never travel inside an event stream.
//! - [`TaskError`] - the expected, caller-visible failure an action raises on
//!   purpose. It is the only error whose message reaches the client.
//! - [`TaskClientError`] - the single failure type the client resolves to,
//!   tagged with an [`ErrorCode`] so callers can branch on a closed set.

use std::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::transformer::TransformError;

/// Result type alias for server task operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the library outside of the frame protocol.
#[derive(Error, Debug)]
pub enum Error {
    /// The task or its hosting environment is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The transformer failed to serialize or parse a payload.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The request did not carry a usable action input.
    #[error("{0}")]
    InvalidInput(String),

    /// Reading a configuration file failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// The path that could not be read
        path: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// An expected failure raised by a task action.
///
/// Return this (through `?` or `Err(TaskError::new(..).into())`) when the
/// action fails in a way the caller should see. The message is sent verbatim
/// in a `server-error` frame. Any other error is reported to the client only
/// as a generic internal error.
///
/// # Examples
///
/// ```
/// use server_task::TaskError;
///
/// fn pick_url(url: Option<String>) -> anyhow::Result<String> {
///     let url = url.ok_or_else(|| TaskError::new("Failed to generate image"))?;
///     Ok(url)
/// }
///
/// let err = pick_url(None).unwrap_err();
/// assert_eq!(
///     err.downcast_ref::<TaskError>().map(TaskError::message),
///     Some("Failed to generate image")
/// );
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    /// Create a new task error with a caller-visible message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The caller-visible message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Classification of a failed client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The stream ended, or was aborted, before a terminal frame arrived.
    NoData,
    /// The action raised a [`TaskError`].
    ServerError,
    /// The action failed unexpectedly.
    InternalError,
    /// The stream asked the client to reconnect, which the protocol does not support.
    Reconnect,
    /// A frame of an unknown type, or an undecodable payload, was received.
    Unexpected,
    /// The HTTP request failed or returned a non-success status.
    RequestFailed,
}

impl ErrorCode {
    /// The wire spelling of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoData => "NO_DATA",
            Self::ServerError => "SERVER_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Reconnect => "RECONNECT",
            Self::Unexpected => "UNEXPECTED",
            Self::RequestFailed => "REQUEST_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error that occurred on the client side of a task call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TaskClientError {
    code: ErrorCode,
    message: String,
    status: Option<StatusCode>,
}

impl TaskClientError {
    /// Create a new client error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
        }
    }

    /// Create a [`ErrorCode::RequestFailed`] error for a non-success response.
    pub fn request_failed(status: Option<StatusCode>, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::RequestFailed,
            message: message.into(),
            status,
        }
    }

    /// The error classification.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The error message. For [`ErrorCode::ServerError`] this is exactly the
    /// message of the [`TaskError`] raised by the action.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status of the response, when the failure came from one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}
