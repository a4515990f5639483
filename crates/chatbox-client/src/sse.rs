//! Incremental parsing for SSE-style streaming responses.
//!
//! The provider streams the body as `\n`-terminated lines, but network
//! chunks split those lines arbitrarily, so bytes are buffered until a full
//! line is available and only then inspected. Complete lines parse into
//! [`SseEvent`]s: `data: [DONE]` ends the stream, any other `data: ` payload
//! may carry a content delta, and everything else (blank keep-alives,
//! comments, partial JSON) is ignored.

use chatbox_core::types::StreamChunk;

/// Prefix marking a significant SSE line.
const DATA_PREFIX: &str = "data: ";

/// Payload that terminates a stream successfully.
const DONE_MARKER: &str = "[DONE]";

/// A significant event parsed from one SSE line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty content delta.
    Delta(String),
    /// End-of-stream sentinel.
    Done,
}

// ─────────────────────────────────────────────
// Line reassembly
// ─────────────────────────────────────────────

/// Reassembles `\n`-bounded lines from arbitrarily split byte chunks.
///
/// Bytes are decoded only once a full line is available, so a chunk
/// boundary inside a multi-byte character is harmless.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the transport.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its terminator. A trailing `\r`
    /// is stripped.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Drain whatever remains after the transport closes without a final
    /// newline.
    pub fn take_remaining(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

// ─────────────────────────────────────────────
// Line parsing
// ─────────────────────────────────────────────

/// Parse one line into an event.
///
/// Returns `None` for insignificant lines: no `data: ` prefix, a malformed
/// payload, or a payload without content. Malformed JSON is a known
/// artifact of line-buffered streaming and is dropped rather than surfaced.
pub fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    if data == DONE_MARKER {
        return Some(SseEvent::Done);
    }

    let delta = delta_content(data)?;
    if delta.is_empty() {
        return None;
    }
    Some(SseEvent::Delta(delta))
}

/// Extract `choices[0].delta.content` from a payload, if present.
fn delta_content(data: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    chunk.choices.into_iter().next()?.delta.content
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
