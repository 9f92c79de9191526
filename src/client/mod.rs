//! Client side: invoking a task and classifying its event stream.
//!
//! [`consumer`] is the transport-independent read loop. With the `client`
//! feature, [`TaskClient`] drives it over HTTP and [`TaskBinding`] wraps a
//! single route for repeated use.

pub mod consumer;

#[cfg(feature = "client")]
mod binding;
#[cfg(feature = "client")]
mod config;
#[cfg(feature = "client")]
mod task_client;

pub use consumer::read_event_stream;

#[cfg(feature = "client")]
pub use binding::TaskBinding;
#[cfg(feature = "client")]
pub use config::{RequestMethod, TaskClientConfig, TaskClientConfigBuilder};
#[cfg(feature = "client")]
pub use task_client::TaskClient;
