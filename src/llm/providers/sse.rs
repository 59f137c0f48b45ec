//! Line-oriented stream decoding for wire backends.
//!
//! Server-sent events interleave `event:`/`data:` lines separated by blank
//! lines; Ollama streams newline-delimited JSON objects. Both reduce to the
//! same shape here: a byte stream sliced into complete lines, with a filter
//! selecting the payload-bearing ones. Bytes are decoded lossily so a
//! malformed fragment cannot poison the stream.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::error::LlmError;

/// Which lines of the response body carry payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMode {
    /// SSE: lines prefixed `data:`, excluding `[DONE]` sentinels.
    SseData,
    /// NDJSON: every non-empty line.
    Json,
}

/// Accumulates incoming bytes and drains complete lines.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    fn take_tail(&mut self) -> Option<String> {
        if self.buf.trim().is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Extracts the payload from a line according to the mode.
fn extract(mode: LineMode, line: &str) -> Option<String> {
    match mode {
        LineMode::SseData => {
            let data = line.strip_prefix("data:")?.trim();
            if data.is_empty() || data == "[DONE]" {
                None
            } else {
                Some(data.to_string())
            }
        }
        LineMode::Json => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
    }
}

/// Turns an HTTP response body into a stream of payload lines.
///
/// A transport error terminates the stream after yielding it.
pub fn payload_lines(
    response: reqwest::Response,
    mode: LineMode,
) -> Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>> {
    let bytes = Box::pin(response.bytes_stream());
    let state = (bytes, LineBuffer::default(), VecDeque::<String>::new(), false);

    let stream = futures_util::stream::unfold(state, move |state| async move {
        let (mut bytes, mut buffer, mut queue, mut finished) = state;
        loop {
            if let Some(payload) = queue.pop_front() {
                return Some((Ok(payload), (bytes, buffer, queue, finished)));
            }
            if finished {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in buffer.push(&chunk) {
                        if let Some(payload) = extract(mode, &line) {
                            queue.push_back(payload);
                        }
                    }
                }
                Some(Err(e)) => {
                    finished = true;
                    return Some((
                        Err(LlmError::Stream {
                            message: e.to_string(),
                        }),
                        (bytes, buffer, queue, finished),
                    ));
                }
                None => {
                    finished = true;
                    if let Some(tail) = buffer.take_tail()
                        && let Some(payload) = extract(mode, &tail)
                    {
                        queue.push_back(payload);
                    }
                }
            }
        }
    });

    Box::pin(stream)
}
