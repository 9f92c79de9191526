//! Per-invocation context handed to task actions.

use std::collections::HashMap;
use std::sync::Arc;

use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Route parameters extracted by the routing layer.
pub type RouteParams = HashMap<String, String>;

/// Read-only view of the request that started a task.
///
/// The request body has already been consumed to produce the action input,
/// so only the request head is available. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct TaskContext {
    request: Arc<Parts>,
    params: Arc<RouteParams>,
    invocation_id: Uuid,
    cancellation: CancellationToken,
}

impl TaskContext {
    /// Create a context for one invocation.
    pub fn new(request: Parts, params: RouteParams) -> Self {
        Self {
            request: Arc::new(request),
            params: Arc::new(params),
            invocation_id: Uuid::new_v4(),
            cancellation: CancellationToken::new(),
        }
    }

    /// The request head (method, URI, headers, extensions).
    pub fn request(&self) -> &Parts {
        &self.request
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.request.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    /// All route parameters.
    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    /// A single route parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Unique id of this invocation, also recorded on its tracing span.
    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// Token cancelled when the caller aborts the request.
    ///
    /// The in-flight action future is dropped on abort as well; the token lets
    /// work the action spawned elsewhere stop too.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once the caller has aborted the request.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
