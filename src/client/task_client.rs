//! HTTP client for invoking tasks.

use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::binding::TaskBinding;
use super::config::{RequestMethod, TaskClientConfig};
use super::consumer::read_event_stream;
use crate::error::{ErrorCode, TaskClientError};
use crate::protocol::TEXT_EVENT_STREAM;

const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong";

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Invokes tasks over HTTP and reads their event streams.
///
/// Cloning is cheap; clones share the connection pool. Calls are independent
/// of each other: nothing is deduplicated or retried.
#[derive(Debug, Clone)]
pub struct TaskClient {
    config: Arc<TaskClientConfig>,
    http: reqwest::Client,
}

impl TaskClient {
    /// Create a client from `config`.
    pub fn new(config: TaskClientConfig) -> Self {
        let http = config.http_client.clone().unwrap_or_default();
        Self {
            config: Arc::new(config),
            http,
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &TaskClientConfig {
        &self.config
    }

    /// Invoke the task at `route` and wait for its outcome.
    ///
    /// Dropping the returned future closes the connection, which aborts the
    /// invocation on the server.
    pub async fn execute<I, O>(&self, route: &str, input: &I) -> Result<O, TaskClientError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let response = self.send(route, input).await?;

        if response.content_length() == Some(0) {
            return Err(TaskClientError::new(
                ErrorCode::NoData,
                "Response has no body",
            ));
        }

        read_event_stream(response.bytes_stream(), &self.config.transformer).await
    }

    /// Like [`execute`](Self::execute), but gives up with
    /// [`ErrorCode::NoData`] as soon as `cancellation` fires.
    pub async fn execute_with_cancel<I, O>(
        &self,
        route: &str,
        input: &I,
        cancellation: CancellationToken,
    ) -> Result<O, TaskClientError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                tracing::debug!(route, "Task call cancelled");
                Err(TaskClientError::new(ErrorCode::NoData, "The request was cancelled"))
            },
            outcome = self.execute(route, input) => outcome,
        }
    }

    /// Bind a route to this client for repeated invocation.
    pub fn bind<I, O>(&self, route: impl Into<String>) -> TaskBinding<I, O>
    where
        I: Serialize,
        O: DeserializeOwned + Clone,
    {
        TaskBinding::new(self.clone(), route)
    }

    async fn send<I>(&self, route: &str, input: &I) -> Result<Response, TaskClientError>
    where
        I: Serialize + ?Sized,
    {
        let config = &self.config;
        let url = self.task_url(route)?;

        let mut request = match config.method {
            RequestMethod::Get => {
                let payload = config
                    .transformer
                    .serialize(input)
                    .map_err(|e| encode_failed(e.message()))?;
                let mut url = url;
                url.query_pairs_mut()
                    .append_pair(&config.input_param, &payload);
                self.http.get(url)
            },
            RequestMethod::Post => {
                let input = serde_json::to_value(input).map_err(|e| encode_failed(&e.to_string()))?;
                let body = config
                    .transformer
                    .stringify(&serde_json::json!({ "input": input }))
                    .map_err(|e| encode_failed(e.message()))?;
                self.http
                    .post(url)
                    .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
                    .body(body)
            },
        };

        request = request.header(ACCEPT, TEXT_EVENT_STREAM);
        for (name, value) in &config.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        tracing::debug!(route, method = ?config.method, "Invoking task");
        let response = request.send().await.map_err(|e| {
            TaskClientError::request_failed(e.status(), format!("Request failed: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));
        let message = if is_json {
            response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
        } else {
            None
        };

        tracing::warn!(route, %status, "Task request failed");
        Err(TaskClientError::request_failed(
            Some(status),
            message.unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
        ))
    }

    fn task_url(&self, route: &str) -> Result<Url, TaskClientError> {
        self.config.base_url.join(route).map_err(|e| {
            TaskClientError::request_failed(None, format!("Invalid task route '{}': {}", route, e))
        })
    }
}

fn encode_failed(message: &str) -> TaskClientError {
    TaskClientError::request_failed(None, format!("Failed to encode task input: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TaskClientConfigBuilder;
    use pretty_assertions::assert_eq;

    fn client(base: &str, method: RequestMethod) -> TaskClient {
        TaskClient::new(
            TaskClientConfigBuilder::new(Url::parse(base).unwrap())
                .with_method(method)
                .build(),
        )
    }

    #[tokio::test]
    async fn get_sends_input_in_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/hello")
            .match_query(mockito::Matcher::UrlEncoded(
                "input".into(),
                r#"{"name":"Ada"}"#.into(),
            ))
            .match_header("accept", "text/event-stream")
            .with_header("content-type", "text/event-stream")
            .with_body("event: wait\ndata: \n\nevent: settle\ndata: \"Hello Ada\"\n\n")
            .create_async()
            .await;

        let value: String = client(&server.url(), RequestMethod::Get)
            .execute("/api/hello", &serde_json::json!({ "name": "Ada" }))
            .await
            .unwrap();

        assert_eq!(value, "Hello Ada");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_sends_input_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/hello")
            .match_body(mockito::Matcher::Json(serde_json::json!({ "input": 5 })))
            .with_header("content-type", "text/event-stream")
            .with_body("event: settle\ndata: 10\n\n")
            .create_async()
            .await;

        let value: u32 = client(&server.url(), RequestMethod::Post)
            .execute("/api/hello", &5)
            .await
            .unwrap();

        assert_eq!(value, 10);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn json_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"Unable to get action input from the request"}"#)
            .create_async()
            .await;

        let err = client(&server.url(), RequestMethod::Get)
            .execute::<_, u32>("/api/task", &1)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::RequestFailed);
        assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.message(), "Unable to get action input from the request");
    }

    #[tokio::test]
    async fn non_json_failure_is_generic() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let err = client(&server.url(), RequestMethod::Get)
            .execute::<_, u32>("/api/task", &1)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::RequestFailed);
        assert_eq!(err.status(), Some(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(err.message(), "Something went wrong");
    }

    #[tokio::test]
    async fn empty_body_is_no_data() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_header("content-type", "text/event-stream")
            .create_async()
            .await;

        let err = client(&server.url(), RequestMethod::Get)
            .execute::<_, u32>("/api/task", &1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoData);
    }

    #[tokio::test]
    async fn retry_line_is_reconnect() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_header("content-type", "text/event-stream")
            .with_body("event: wait\ndata: \n\nretry: 3000\n\n")
            .create_async()
            .await;

        let err = client(&server.url(), RequestMethod::Get)
            .execute::<_, u32>("/api/task", &1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Reconnect);
        assert_eq!(err.message(), "Should reconnect");
    }

    #[tokio::test]
    async fn extra_headers_are_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .match_header("authorization", "Bearer abc")
            .with_body("event: settle\ndata: true\n\n")
            .create_async()
            .await;

        let client = TaskClient::new(
            TaskClientConfigBuilder::new(Url::parse(&server.url()).unwrap())
                .with_header("authorization", "Bearer abc")
                .build(),
        );
        let value: bool = client.execute("/api/task", &()).await.unwrap();
        assert!(value);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cancelled_token_is_no_data() {
        let client = client("http://127.0.0.1:9", RequestMethod::Get);
        let token = CancellationToken::new();
        token.cancel();

        let err = client
            .execute_with_cancel::<_, u32>("/api/task", &1, token)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoData);
    }

    #[tokio::test]
    async fn connection_failure_is_request_failed() {
        let err = client("http://127.0.0.1:9", RequestMethod::Get)
            .execute::<_, u32>("/api/task", &1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequestFailed);
        assert!(err.message().starts_with("Request failed"));
    }
}
