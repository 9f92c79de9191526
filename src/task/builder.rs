//! Builder for [`ServerTask`] definitions.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ActionFn, ServerTask, TaskContext, TaskSettings};
use crate::config::ServerTaskConfig;
use crate::transformer::Transformer;

/// Start building a task served on `route`.
///
/// # Examples
///
/// ```
/// use server_task::{create_task, TaskError};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize)]
/// struct Prompt {
///     prompt: String,
/// }
///
/// #[derive(Serialize)]
/// struct Image {
///     url: String,
/// }
///
/// let generate_image = create_task("/api/generate-image").with_action(
///     |Prompt { prompt }, _ctx| async move {
///         if prompt.is_empty() {
///             return Err(TaskError::new("Failed to generate image").into());
///         }
///         anyhow::Ok(Image { url: format!("https://img.example/{prompt}.png") })
///     },
/// );
///
/// assert_eq!(generate_image.route(), "/api/generate-image");
/// ```
pub fn create_task(route: impl Into<String>) -> TaskBuilder {
    TaskBuilder::new(route)
}

/// Accumulates the transformer and settings of a task before its action is
/// attached.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    route: String,
    transformer: Transformer,
    settings: TaskSettings,
}

impl TaskBuilder {
    /// Create a builder for `route` with the JSON transformer and default settings.
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            transformer: Transformer::default(),
            settings: TaskSettings::from(&ServerTaskConfig::default()),
        }
    }

    /// Replace the default JSON transformer.
    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    /// Set the interval between `wait` frames.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.settings.heartbeat_interval = interval;
        self
    }

    /// Apply loaded configuration.
    pub fn with_config(mut self, config: &ServerTaskConfig) -> Self {
        self.settings = TaskSettings::from(config);
        self
    }

    /// Attach the action and finalize the task.
    ///
    /// The action receives the parsed input and the request context. Returning
    /// a [`TaskError`](crate::TaskError) reports its message to the caller;
    /// any other error (or a panic) is reported as a generic internal error.
    pub fn with_action<I, O, F, Fut>(self, action: F) -> ServerTask<I, O>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        let action: Box<ActionFn<I, O>> = Box::new(
            move |input: I, ctx: TaskContext| -> BoxFuture<'static, anyhow::Result<O>> {
                Box::pin(action(input, ctx))
            },
        );

        ServerTask::new(self.route, self.transformer, self.settings, action)
    }
}
