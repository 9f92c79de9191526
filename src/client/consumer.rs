//! Reading a task's event stream into a single outcome.
//!
//! This is transport independent: anything that yields the response body as a
//! stream of byte chunks can be consumed.

use std::fmt::Display;
use std::str::FromStr;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ErrorCode, TaskClientError};
use crate::protocol::{EventType, SseEvent, SseItem, SseParser};
use crate::transformer::Transformer;

const NO_EVENT_MESSAGE: &str = "No event was received";
const UNSETTLED_MESSAGE: &str = "The stream closed before the task settled";
const RECONNECT_MESSAGE: &str = "Should reconnect";

/// SSE event type assigned to events that carry no `event:` field.
const DEFAULT_EVENT_TYPE: &str = "message";

/// Consume an event stream until the task settles or fails.
///
/// `wait` frames are skipped. The first terminal frame decides the outcome and
/// nothing after it is read. A `retry:` control line fails the call with
/// [`ErrorCode::Reconnect`], since invocations cannot be resumed.
pub async fn read_event_stream<O, S, B, E>(
    stream: S,
    transformer: &Transformer,
) -> Result<O, TaskClientError>
where
    O: DeserializeOwned,
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut parser = SseParser::new();
    let mut received = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            TaskClientError::request_failed(None, format!("Failed to read response body: {}", e))
        })?;

        for item in parser.feed(chunk.as_ref()) {
            received = true;
            match item {
                SseItem::Event(event) => {
                    if let Some(outcome) = classify(event, transformer) {
                        return outcome;
                    }
                },
                SseItem::ReconnectInterval(interval) => {
                    tracing::debug!(?interval, "Server requested a reconnect");
                    return Err(TaskClientError::new(ErrorCode::Reconnect, RECONNECT_MESSAGE));
                },
            }
        }
    }

    parser.finish();
    let message = if received {
        UNSETTLED_MESSAGE
    } else {
        NO_EVENT_MESSAGE
    };
    Err(TaskClientError::new(ErrorCode::NoData, message))
}

/// Returns `None` for frames that do not end the invocation.
fn classify<O: DeserializeOwned>(
    event: SseEvent,
    transformer: &Transformer,
) -> Option<Result<O, TaskClientError>> {
    let name = event.event.as_deref().unwrap_or(DEFAULT_EVENT_TYPE);
    let event_type = match EventType::from_str(name) {
        Ok(event_type) => event_type,
        Err(err) => {
            tracing::warn!(event = name, "Unexpected event in task stream");
            return Some(Err(TaskClientError::new(
                ErrorCode::Unexpected,
                err.to_string(),
            )));
        },
    };

    if !event_type.is_terminal() {
        tracing::trace!(event = %event_type, "Heartbeat");
        return None;
    }

    let outcome = match event_type {
        EventType::Settle => transformer.deserialize(&event.data).map_err(|e| {
            TaskClientError::new(
                ErrorCode::Unexpected,
                format!("Failed to decode task result: {}", e.message()),
            )
        }),
        EventType::ServerError => Err(TaskClientError::new(
            ErrorCode::ServerError,
            error_message(&event.data, transformer),
        )),
        // `internal-error`; `wait` never reaches here.
        _ => Err(TaskClientError::new(
            ErrorCode::InternalError,
            error_message(&event.data, transformer),
        )),
    };

    tracing::debug!(event = %event_type, "Task stream finished");
    Some(outcome)
}

fn error_message(data: &str, transformer: &Transformer) -> String {
    match transformer.parse(data) {
        Ok(Value::String(message)) => message,
        Ok(other) => other.to_string(),
        Err(_) => data.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::convert::Infallible;

    async fn consume<O: DeserializeOwned>(chunks: &[&str]) -> Result<O, TaskClientError> {
        let chunks: Vec<Result<Bytes, Infallible>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk.as_bytes())))
            .collect();
        read_event_stream(stream::iter(chunks), &Transformer::json()).await
    }

    #[tokio::test]
    async fn waits_are_skipped_until_settle() {
        let value: String = consume(&[
            "event: wait\ndata: \n\n",
            "event: wait\ndata: \n\n",
            "event: settle\ndata: \"Hello World!\"\n\n",
        ])
        .await
        .unwrap();
        assert_eq!(value, "Hello World!");
    }

    #[tokio::test]
    async fn frames_split_across_chunks() {
        let value: Vec<u32> = consume(&["event: set", "tle\r\ndata: [1,", "2]\r\n", "\r\n"])
            .await
            .unwrap();
        assert_eq!(value, vec![1, 2]);
    }

    #[tokio::test]
    async fn nothing_after_the_terminal_frame_is_read() {
        let value: u32 = consume(&[
            "event: settle\ndata: 1\n\n",
            "event: server-error\ndata: \"late\"\n\n",
        ])
        .await
        .unwrap();
        assert_eq!(value, 1);
    }

    #[rstest]
    #[case::server_error(
        "event: server-error\ndata: \"Failed to generate image\"\n\n",
        ErrorCode::ServerError,
        "Failed to generate image"
    )]
    #[case::internal_error(
        "event: internal-error\ndata: \"Internal Error\"\n\n",
        ErrorCode::InternalError,
        "Internal Error"
    )]
    #[case::reconnect("retry: 1000\n\n", ErrorCode::Reconnect, "Should reconnect")]
    #[case::unknown_event("event: progress\ndata: 50\n\n", ErrorCode::Unexpected, "Unknown event: progress")]
    #[case::unnamed_event("data: 1\n\n", ErrorCode::Unexpected, "Unknown event: message")]
    #[case::empty_stream("", ErrorCode::NoData, "No event was received")]
    #[case::comments_only(": keep-alive\n\n", ErrorCode::NoData, "No event was received")]
    #[case::unsettled(
        "event: wait\ndata: \n\n",
        ErrorCode::NoData,
        "The stream closed before the task settled"
    )]
    #[case::truncated_frame("event: settle\ndata: 1\n", ErrorCode::NoData, "No event was received")]
    #[tokio::test]
    async fn failures_are_classified(
        #[case] body: &str,
        #[case] code: ErrorCode,
        #[case] message: &str,
    ) {
        let err = consume::<u32>(&[body]).await.unwrap_err();
        assert_eq!(err.code(), code);
        assert_eq!(err.message(), message);
    }

    #[tokio::test]
    async fn undecodable_result_is_unexpected() {
        let err = consume::<u32>(&["event: settle\ndata: \"ten\"\n\n"])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unexpected);
        assert!(err.message().starts_with("Failed to decode task result"));
    }

    #[tokio::test]
    async fn unparseable_error_payload_is_passed_through() {
        let err = consume::<u32>(&["event: server-error\ndata: not json\n\n"])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerError);
        assert_eq!(err.message(), "not json");
    }

    #[tokio::test]
    async fn body_errors_are_request_failures() {
        let chunks: Vec<Result<Bytes, &str>> = vec![
            Ok(Bytes::from_static(b"event: wait\ndata: \n\n")),
            Err("connection reset"),
        ];
        let err = read_event_stream::<u32, _, _, _>(stream::iter(chunks), &Transformer::json())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequestFailed);
        assert_eq!(err.message(), "Failed to read response body: connection reset");
    }
}
