//! # server-task
//!
//! Long-running server actions over a plain HTTP response stream.
//!
//! A task binds a route to an async action. Each request runs the action once
//! and answers with a Server-Sent-Events stream: `wait` frames on a fixed
//! heartbeat while the action is pending, then exactly one terminal frame
//! (`settle` with the result, `server-error` with a caller-visible message, or
//! `internal-error` with a fixed generic message). The client reads that
//! stream back into a single typed outcome.
//!
//! ## Server
//!
//! ```rust,no_run
//! use server_task::{create_task, TaskError};
//!
//! # async fn serve() -> Result<(), Box<dyn std::error::Error>> {
//! let greet = create_task("/api/greet").with_action(|name: String, _ctx| async move {
//!     if name.is_empty() {
//!         return Err(TaskError::new("Nobody to greet").into());
//!     }
//!     anyhow::Ok(format!("Hello {name}!"))
//! });
//!
//! let app: axum::Router = greet.router()?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Client
//!
//! ```rust,no_run
//! use server_task::{ErrorCode, TaskClient, TaskClientConfig};
//! use url::Url;
//!
//! # async fn call() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TaskClient::new(TaskClientConfig::new(Url::parse("http://127.0.0.1:3000")?));
//!
//! match client.execute::<_, String>("/api/greet", "Ada").await {
//!     Ok(greeting) => println!("{greeting}"),
//!     Err(err) if err.code() == ErrorCode::ServerError => eprintln!("{}", err.message()),
//!     Err(err) => return Err(err.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `server` (default): axum request handler and router glue
//! - `client` (default): `reqwest`-based [`TaskClient`] and [`TaskBinding`]
//! - `logging` (default): [`init_logging`] built on `tracing-subscriber`

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod protocol;
#[cfg(feature = "server")]
pub mod server;
pub mod task;
pub mod transformer;

pub use client::read_event_stream;
#[cfg(feature = "client")]
pub use client::{RequestMethod, TaskBinding, TaskClient, TaskClientConfig, TaskClientConfigBuilder};
pub use config::ServerTaskConfig;
pub use error::{Error, ErrorCode, Result, TaskClientError, TaskError};
#[cfg(feature = "logging")]
pub use logging::init_logging;
pub use protocol::{EventType, Frame};
#[cfg(feature = "server")]
pub use server::TaskHandler;
pub use task::{create_task, RouteParams, ServerTask, TaskBuilder, TaskContext, TaskSettings};
pub use transformer::{TransformError, Transformer};
