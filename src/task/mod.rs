//! Task definitions.
//!
//! A [`ServerTask`] binds a route to a transformer and an action. It is built
//! once with [`create_task`] and shared by every request to that route; nothing
//! in it changes after construction.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::config::ServerTaskConfig;
use crate::transformer::Transformer;

mod builder;
mod context;

pub use builder::{create_task, TaskBuilder};
pub use context::{RouteParams, TaskContext};

pub(crate) type ActionFn<I, O> =
    dyn Fn(I, TaskContext) -> BoxFuture<'static, anyhow::Result<O>> + Send + Sync;

/// Per-task settings resolved from [`ServerTaskConfig`] and builder calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    /// Interval between `wait` frames.
    pub heartbeat_interval: Duration,
    /// Largest accepted POST body.
    pub max_body_bytes: usize,
    /// Query parameter carrying GET input.
    pub input_param: String,
}

impl From<&ServerTaskConfig> for TaskSettings {
    fn from(config: &ServerTaskConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            max_body_bytes: config.max_body_bytes,
            input_param: config.input_param.clone(),
        }
    }
}

struct TaskDefinition<I, O> {
    route: String,
    transformer: Transformer,
    settings: TaskSettings,
    action: Box<ActionFn<I, O>>,
}

/// A long-running operation bound to a route.
///
/// `I` is the action input, `O` its result. Cloning is cheap and every clone
/// refers to the same definition.
pub struct ServerTask<I, O> {
    inner: Arc<TaskDefinition<I, O>>,
}

impl<I, O> Clone for ServerTask<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O> fmt::Debug for ServerTask<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTask")
            .field("route", &self.inner.route)
            .field("transformer", &self.inner.transformer)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl<I, O> ServerTask<I, O> {
    pub(crate) fn new(
        route: String,
        transformer: Transformer,
        settings: TaskSettings,
        action: Box<ActionFn<I, O>>,
    ) -> Self {
        Self {
            inner: Arc::new(TaskDefinition {
                route,
                transformer,
                settings,
                action,
            }),
        }
    }

    /// The route this task is served on.
    pub fn route(&self) -> &str {
        &self.inner.route
    }

    /// The transformer used for inputs, results and error messages.
    pub fn transformer(&self) -> &Transformer {
        &self.inner.transformer
    }

    /// Interval between `wait` frames.
    pub fn heartbeat_interval(&self) -> Duration {
        self.inner.settings.heartbeat_interval
    }

    /// All resolved settings.
    pub fn settings(&self) -> &TaskSettings {
        &self.inner.settings
    }

    /// Start the action. The returned future does nothing until polled.
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    pub(crate) fn invoke(&self, input: I, ctx: TaskContext) -> BoxFuture<'static, anyhow::Result<O>> {
        (self.inner.action)(input, ctx)
    }
}
