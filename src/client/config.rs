//! Configuration for [`TaskClient`](super::TaskClient).

use std::fmt::{self, Debug};

use url::Url;

use crate::transformer::Transformer;

/// HTTP method used to invoke a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMethod {
    /// Input travels in a query parameter. Aborting a GET closes the
    /// connection cleanly on every transport we target.
    #[default]
    Get,
    /// Input travels in the body as `{"input": ...}`.
    Post,
}

/// Configuration for a [`TaskClient`](super::TaskClient).
#[derive(Clone)]
pub struct TaskClientConfig {
    /// Base URL that task routes are resolved against
    pub base_url: Url,
    /// Transformer for inputs, results and error messages
    pub transformer: Transformer,
    /// Headers added to every request
    pub extra_headers: Vec<(String, String)>,
    /// HTTP method used for invocations
    pub method: RequestMethod,
    /// Query parameter carrying GET input
    pub input_param: String,
    /// HTTP client to reuse, if any
    pub http_client: Option<reqwest::Client>,
}

impl Debug for TaskClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskClientConfig")
            .field("base_url", &self.base_url)
            .field("transformer", &self.transformer)
            .field("extra_headers", &self.extra_headers)
            .field("method", &self.method)
            .field("input_param", &self.input_param)
            .field("http_client", &self.http_client.is_some())
            .finish()
    }
}

impl TaskClientConfig {
    /// Default configuration for `base_url`.
    pub fn new(base_url: Url) -> Self {
        TaskClientConfigBuilder::new(base_url).build()
    }
}

/// Builder for [`TaskClientConfig`].
#[derive(Debug, Clone)]
pub struct TaskClientConfigBuilder {
    config: TaskClientConfig,
}

impl TaskClientConfigBuilder {
    /// Create a new config builder for tasks served under `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            config: TaskClientConfig {
                base_url,
                transformer: Transformer::default(),
                extra_headers: Vec::new(),
                method: RequestMethod::default(),
                input_param: "input".to_string(),
                http_client: None,
            },
        }
    }

    /// Use the same transformer as the server-side task.
    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.config.transformer = transformer;
        self
    }

    /// Add an HTTP header to include in all requests.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Set the HTTP method used for invocations.
    pub fn with_method(mut self, method: RequestMethod) -> Self {
        self.config.method = method;
        self
    }

    /// Set the query parameter carrying GET input.
    pub fn with_input_param(mut self, name: impl Into<String>) -> Self {
        self.config.input_param = name.into();
        self
    }

    /// Reuse an existing `reqwest` client (connection pool, TLS settings, proxies).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.config.http_client = Some(client);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TaskClientConfig {
        self.config
    }
}
