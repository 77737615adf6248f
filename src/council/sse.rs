// Server-Sent Events framing for the turn stream
//
// Events are separated by a blank line. Each event's `data:` lines are joined
// with '\n' and decoded as one JSON `StreamEvent`. Comment lines and other
// fields are ignored. Bytes are buffered raw so multi-byte characters split
// across network chunks survive.

use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use tracing::{debug, warn};

use super::events::StreamEvent;
use crate::error::TransportError;

/// Incremental SSE splitter
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
    }

    /// Data payload of the next complete event, skipping events without data
    pub fn next_data(&mut self) -> Option<String> {
        while let Some(end) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = data_of(&String::from_utf8_lossy(&block)) {
                return Some(data);
            }
        }
        None
    }

    /// Data of a final event that was not followed by a blank line
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_of(&String::from_utf8_lossy(&rest))
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn data_of(block: &str) -> Option<String> {
    let lines: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Decode one data payload. `Ok(None)` for the `[DONE]` sentinel.
pub fn decode_event(data: &str) -> Result<Option<StreamEvent>, TransportError> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return Ok(None);
    }

    serde_json::from_str::<StreamEvent>(trimmed)
        .map(Some)
        .map_err(|e| TransportError::Decode(format!("{}: {}", e, trimmed)))
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, TransportError>> + Send>>;

/// Turn a byte stream into a stream of decoded events, in arrival order
pub fn event_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    struct State<S> {
        bytes: Pin<Box<S>>,
        parser: SseParser,
        done: bool,
    }

    let initial = State {
        bytes: Box::pin(bytes),
        parser: SseParser::new(),
        done: false,
    };

    let events = stream::unfold(initial, |mut state| async move {
        loop {
            if let Some(data) = state.parser.next_data() {
                match decode_event(&data) {
                    Ok(Some(event)) => return Some((Ok(event), state)),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), state)),
                }
            }

            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.parser.push(chunk.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.done = true;
                    if let Some(data) = state.parser.finish() {
                        debug!("Decoding trailing event without terminator");
                        match decode_event(&data) {
                            Ok(Some(event)) => return Some((Ok(event), state)),
                            Ok(None) => {}
                            Err(e) => return Some((Err(e), state)),
                        }
                    }
                    return None;
                }
            }
        }
    });

    Box::pin(events.inspect(|item| {
        if let Err(e) = item {
            warn!("Event stream error: {}", e);
        }
    }))
}
