//! Incremental Server-Sent Events decoder.
//!
//! Bytes are fed as they arrive from the network; complete events come out.
//! Lines may end in `\n`, `\r\n` or `\r`, and a chunk may end anywhere,
//! including inside a multi-byte character. Besides events, a `retry:` line
//! with a numeric value is surfaced as [`SseItem::ReconnectInterval`], a
//! control signal distinct from any event.

use std::time::Duration;

/// A decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The last event id seen on the stream, if any
    pub id: Option<String>,
    /// The `event:` field, if present
    pub event: Option<String>,
    /// The `data:` lines joined with `\n`
    pub data: String,
}

/// One item produced by [`SseParser::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    /// A dispatched event.
    Event(SseEvent),
    /// The server asked the client to use a new reconnection delay.
    ReconnectInterval(Duration),
}

/// Streaming SSE parser.
///
/// # Examples
///
/// ```
/// use server_task::protocol::{SseItem, SseParser};
///
/// let mut parser = SseParser::new();
/// assert!(parser.feed(b"event: settle\nda").is_empty());
///
/// let items = parser.feed(b"ta: 42\n\n");
/// let SseItem::Event(event) = &items[0] else { panic!("expected an event") };
/// assert_eq!(event.event.as_deref(), Some("settle"));
/// assert_eq!(event.data, "42");
/// ```
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_event_id: Option<String>,
    skip_lf: bool,
    seen_first_line: bool,
}

impl SseParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every item completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseItem> {
        let mut items = Vec::new();
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);

        let mut line_start = 0;
        for (i, &byte) in buffer.iter().enumerate() {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    line_start = i + 1;
                    continue;
                }
            }

            if byte == b'\n' || byte == b'\r' {
                self.process_line(&buffer[line_start..i], &mut items);
                self.skip_lf = byte == b'\r';
                line_start = i + 1;
            }
        }

        buffer.drain(..line_start);
        self.buffer = buffer;
        items
    }

    /// Signal the end of the stream.
    ///
    /// An event that was not terminated by a blank line is discarded, as is
    /// any partial line. The parser is reset and can be reused.
    pub fn finish(&mut self) {
        if self.has_data || !self.buffer.is_empty() {
            tracing::trace!(
                pending_bytes = self.buffer.len(),
                "Discarding incomplete event at end of stream"
            );
        }
        *self = Self::default();
    }

    fn process_line(&mut self, raw: &[u8], items: &mut Vec<SseItem>) {
        let decoded = String::from_utf8_lossy(raw);
        let mut line: &str = &decoded;
        if !self.seen_first_line {
            self.seen_first_line = true;
            line = line.strip_prefix('\u{feff}').unwrap_or(line);
        }

        if line.is_empty() {
            self.dispatch(items);
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            },
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            },
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            },
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(millis) = value.parse::<u64>() {
                        items.push(SseItem::ReconnectInterval(Duration::from_millis(millis)));
                    }
                }
            },
            _ => {},
        }
    }

    fn dispatch(&mut self, items: &mut Vec<SseItem>) {
        let event = self.event.take();
        if !self.has_data {
            return;
        }

        let mut data = std::mem::take(&mut self.data);
        data.pop();
        self.has_data = false;

        items.push(SseItem::Event(SseEvent {
            id: self.last_event_id.clone(),
            event,
            data,
        }));
    }
}
