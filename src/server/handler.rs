//! HTTP request handler for a [`ServerTask`].

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::extract::{Path, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{FutureExt, StreamExt};
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use http::request::Parts;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::Instrument;

use super::emitter::{ActionOutcome, EventStreamEmitter, FrameSink};
use crate::error::{Error, Result};
use crate::protocol::TEXT_EVENT_STREAM;
use crate::task::{RouteParams, ServerTask, TaskContext};

const MISSING_INPUT_MESSAGE: &str = "Unable to get action input from the request";

impl<I, O> ServerTask<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    /// Returns a request handler bound to this task.
    ///
    /// Creating the handler starts nothing and can be repeated freely. It
    /// fails with [`Error::Configuration`] when called outside a Tokio runtime,
    /// which is needed to drive long-lived streaming responses, or when the
    /// heartbeat interval is zero.
    pub fn server_handler(&self) -> Result<TaskHandler<I, O>> {
        let runtime = Handle::try_current().map_err(|_| {
            Error::configuration(format!(
                "Task '{}' needs a Tokio runtime to stream responses; create its handler inside the runtime that serves requests",
                self.route()
            ))
        })?;

        if self.heartbeat_interval().is_zero() {
            return Err(Error::configuration(format!(
                "Task '{}' has a zero heartbeat interval",
                self.route()
            )));
        }

        Ok(TaskHandler {
            task: self.clone(),
            runtime,
        })
    }

    /// Returns an [`axum::Router`] serving this task on its route.
    pub fn router<S>(&self) -> Result<Router<S>>
    where
        S: Clone + Send + Sync + 'static,
    {
        Ok(self.server_handler()?.route(Router::new()))
    }
}

/// Handles requests for one task.
pub struct TaskHandler<I, O> {
    task: ServerTask<I, O>,
    runtime: Handle,
}

impl<I, O> Clone for TaskHandler<I, O> {
    fn clone(&self) -> Self {
        Self {
            task: self.task.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<I, O> fmt::Debug for TaskHandler<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandler")
            .field("task", &self.task)
            .finish()
    }
}

impl<I, O> TaskHandler<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    /// Handle one request.
    ///
    /// Input errors are answered before any stream opens: `500` with a JSON
    /// `{"message"}` body when the input is missing or malformed, `429` when it
    /// is empty. Otherwise the response is a `200` event stream and the action
    /// runs in the background until it settles or the caller goes away.
    pub async fn handle(&self, request: Request, params: RouteParams) -> Response {
        let (parts, body) = request.into_parts();

        let input = match self.extract_input(&parts, body).await {
            Ok(Some(input)) => input,
            Ok(None) => {
                tracing::debug!(route = self.task.route(), "Empty task input");
                return StatusCode::TOO_MANY_REQUESTS.into_response();
            },
            Err(err) => {
                tracing::warn!(route = self.task.route(), error = %err, "Rejected task input");
                return error_response(&err);
            },
        };

        self.stream(input, TaskContext::new(parts, params))
    }

    /// Register this handler for GET and POST on the task route of `router`.
    pub fn route<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handler = self.clone();
        let endpoint = move |params: Option<Path<HashMap<String, String>>>, request: Request| {
            let handler = handler.clone();
            let params = params.map(|Path(params)| params).unwrap_or_default();
            async move { handler.handle(request, params).await }
        };

        router.route(self.task.route(), get(endpoint.clone()).post(endpoint))
    }

    fn stream(&self, input: I, ctx: TaskContext) -> Response {
        let span = tracing::info_span!(
            "server_task",
            route = self.task.route(),
            invocation_id = %ctx.invocation_id()
        );

        let (sink, frames) = FrameSink::channel();
        let emitter = EventStreamEmitter::new(sink, self.task.heartbeat_interval());
        let cancellation = ctx.cancellation().clone();
        let transformer = self.task.transformer().clone();

        // The closure itself runs inside the caught future, so a panic before
        // it returns its future is still an internal error.
        let task = self.task.clone();
        let action = AssertUnwindSafe(async move { task.invoke(input, ctx).await })
            .catch_unwind()
            .map(move |result| ActionOutcome::from_action(result, &transformer));

        self.runtime.spawn(
            async move {
                let report = emitter.run(action, cancellation).await;
                tracing::debug!(
                    terminal = ?report.terminal,
                    heartbeats = report.heartbeats,
                    "Task invocation finished"
                );
            }
            .instrument(span),
        );

        let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
        (
            [
                (CONNECTION, "keep-alive"),
                (CACHE_CONTROL, "no-store, no-transform"),
                (CONTENT_TYPE, TEXT_EVENT_STREAM),
            ],
            body,
        )
            .into_response()
    }

    async fn extract_input(&self, parts: &Parts, body: Body) -> Result<Option<I>> {
        let transformer = self.task.transformer();
        let settings = self.task.settings();

        let value = if parts.method == Method::GET || parts.method == Method::HEAD {
            let raw = parts
                .uri
                .query()
                .and_then(|query| {
                    url::form_urlencoded::parse(query.as_bytes())
                        .find(|(key, _)| key.as_ref() == settings.input_param)
                        .map(|(_, value)| value.into_owned())
                })
                .ok_or_else(|| Error::invalid_input(MISSING_INPUT_MESSAGE))?;

            if raw.is_empty() {
                return Ok(None);
            }
            transformer.parse(&raw)?
        } else {
            let bytes = axum::body::to_bytes(body, settings.max_body_bytes)
                .await
                .map_err(|e| Error::invalid_input(format!("Failed to read request body: {}", e)))?;
            if bytes.is_empty() {
                return Ok(None);
            }

            let text = std::str::from_utf8(&bytes)
                .map_err(|e| Error::invalid_input(format!("Request body is not UTF-8: {}", e)))?;
            match transformer.parse(text)? {
                Value::Object(mut envelope) => match envelope.remove("input") {
                    Some(input) => input,
                    None => return Ok(None),
                },
                _ => return Err(Error::invalid_input(MISSING_INPUT_MESSAGE)),
            }
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::invalid_input(format!("Invalid action input: {}", e)))
    }
}

fn error_response(err: &Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": err.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::create_task;
    use crate::transformer::Transformer;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct Prompt {
        prompt: String,
    }

    fn echo_task() -> ServerTask<Prompt, String> {
        create_task("/api/echo")
            .with_heartbeat_interval(Duration::from_millis(20))
            .with_action(|Prompt { prompt }, _| async move { anyhow::Ok(prompt) })
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn handler_requires_a_runtime() {
        let err = echo_task().server_handler().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("/api/echo"));
    }

    #[tokio::test]
    async fn zero_heartbeat_is_rejected() {
        let task = create_task("/api/zero")
            .with_heartbeat_interval(Duration::ZERO)
            .with_action(|(): (), _| async { anyhow::Ok(()) });
        assert!(matches!(
            task.server_handler().unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[tokio::test]
    async fn get_streams_frames() {
        let handler = echo_task().server_handler().unwrap();
        let request = http::Request::get("/api/echo?input=%7B%22prompt%22%3A%22a%20cat%22%7D")
            .body(Body::empty())
            .unwrap();

        let response = handler.handle(request, RouteParams::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-store, no-transform");
        assert_eq!(response.headers()[CONNECTION], "keep-alive");

        assert_eq!(body_text(response).await, "event: settle\ndata: \"a cat\"\n\n");
    }

    #[tokio::test]
    async fn post_reads_input_envelope() {
        let handler = echo_task().server_handler().unwrap();
        let request = http::Request::post("/api/echo")
            .body(Body::from(r#"{"input":{"prompt":"a dog"}}"#))
            .unwrap();

        let response = handler.handle(request, RouteParams::new()).await;
        assert_eq!(body_text(response).await, "event: settle\ndata: \"a dog\"\n\n");
    }

    #[tokio::test]
    async fn missing_query_parameter_is_500() {
        let handler = echo_task().server_handler().unwrap();
        let request = http::Request::get("/api/echo").body(Body::empty()).unwrap();

        let response = handler.handle(request, RouteParams::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "message": MISSING_INPUT_MESSAGE }));
    }

    #[tokio::test]
    async fn malformed_input_is_500() {
        let handler = echo_task().server_handler().unwrap();
        let request = http::Request::get("/api/echo?input=undefined")
            .body(Body::empty())
            .unwrap();

        let response = handler.handle(request, RouteParams::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["message"].as_str().unwrap().starts_with("Transform error"));
    }

    #[tokio::test]
    async fn wrong_input_shape_is_500() {
        let handler = echo_task().server_handler().unwrap();
        let request = http::Request::get("/api/echo?input=%7B%7D")
            .body(Body::empty())
            .unwrap();

        let response = handler.handle(request, RouteParams::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("missing field `prompt`"));
    }

    #[tokio::test]
    async fn empty_input_is_429() {
        let handler = echo_task().server_handler().unwrap();

        let request = http::Request::get("/api/echo?input=").body(Body::empty()).unwrap();
        let response = handler.handle(request, RouteParams::new()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_text(response).await, "");

        let request = http::Request::post("/api/echo").body(Body::from("{}")).unwrap();
        let response = handler.handle(request, RouteParams::new()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn context_carries_route_params() {
        let task = create_task("/api/images/{id}")
            .with_action(|(): (), ctx: TaskContext| async move {
                anyhow::Ok(ctx.param("id").unwrap_or_default().to_string())
            });
        let handler = task.server_handler().unwrap();

        let params: RouteParams = [("id".to_string(), "7".to_string())].into_iter().collect();
        let request = http::Request::get("/api/images/7?input=null")
            .body(Body::empty())
            .unwrap();

        let response = handler.handle(request, params).await;
        assert_eq!(body_text(response).await, "event: settle\ndata: \"7\"\n\n");
    }

    #[tokio::test]
    async fn panic_before_the_future_is_an_internal_error() {
        let task = create_task("/api/boom").with_action(|n: u32, _| {
            let missing: Option<u32> = None;
            let value = missing.expect("null dereference");
            async move { anyhow::Ok(n + value) }
        });
        let handler = task.server_handler().unwrap();

        let request = http::Request::get("/api/boom?input=5")
            .body(Body::empty())
            .unwrap();
        let response = handler.handle(request, RouteParams::new()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert_eq!(body, "event: internal-error\ndata: \"Internal Error\"\n\n");
        assert!(!body.contains("null dereference"));
    }

    #[tokio::test]
    async fn custom_transformer_applies_to_input_and_result() {
        let reversed = Transformer::new(
            "reversed",
            |value| Ok(serde_json::to_string(value)?.chars().rev().collect()),
            |text| Ok(serde_json::from_str(&text.chars().rev().collect::<String>())?),
        );
        let task = create_task("/api/rev")
            .with_transformer(reversed)
            .with_action(|n: u32, _| async move { anyhow::Ok(n * 2) });
        let handler = task.server_handler().unwrap();

        // `12` reversed is `21`.
        let request = http::Request::get("/api/rev?input=21").body(Body::empty()).unwrap();
        let response = handler.handle(request, RouteParams::new()).await;
        assert_eq!(body_text(response).await, "event: settle\ndata: 42\n\n");
    }
}
