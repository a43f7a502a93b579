//! Incremental inspection of framed event streams.
//!
//! The relay path forwards backend bytes to the caller untouched. A
//! [`StreamInspector`] receives a copy of every chunk, reassembles complete
//! `data:` frames on a side buffer, and remembers the last usage object it
//! sees, so the accounting layer can read one figure once the stream ends.
//! Inspection never gates delivery: a frame that fails to parse is skipped
//! and relaying continues.

use serde_json::Value;
use tracing::debug;

use crate::usage::{extract_usage, UsageFigure};

const DATA_PREFIX: &[u8] = b"data:";
const DONE_MARKER: &[u8] = b"[DONE]";

/// Accumulates stream chunks and extracts the usage figure from them.
#[derive(Debug, Default)]
pub struct StreamInspector {
    buffer: Vec<u8>,
    usage: Option<UsageFigure>,
    frames: u64,
    finished: bool,
}

impl StreamInspector {
    /// Create an inspector with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received chunk. Complete frames are inspected and drained;
    /// a trailing partial frame stays buffered until more bytes arrive.
    pub fn observe(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some((end, delimiter_len)) = find_frame_boundary(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + delimiter_len).collect();
            self.inspect_frame(&frame[..end]);
        }
    }

    /// The last usage figure seen, if any frame carried one.
    pub fn usage(&self) -> Option<UsageFigure> {
        self.usage
    }

    /// Number of complete frames inspected so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }

    /// Whether the end-of-stream marker (`data: [DONE]`) was observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn inspect_frame(&mut self, frame: &[u8]) {
        self.frames += 1;
        for line in frame.split(|&byte| byte == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let payload = trim_leading_spaces(payload);
            if payload == DONE_MARKER {
                self.finished = true;
                continue;
            }
            if let Ok(value) = serde_json::from_slice::<Value>(payload) {
                if let Some(figure) = extract_usage(&value) {
                    debug!(
                        input_tokens = figure.input_tokens,
                        output_tokens = figure.output_tokens,
                        cached_tokens = figure.cached_tokens,
                        "Usage frame observed in stream"
                    );
                    self.usage = Some(figure);
                }
            }
        }
    }
}

/// Locate the end of the first complete frame: a blank line, i.e. `\n\n`
/// or `\n\r\n`. Returns the frame length and the delimiter length.
fn find_frame_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    for (i, &byte) in buffer.iter().enumerate() {
        if byte != b'\n' {
            continue;
        }
        if buffer.get(i + 1) == Some(&b'\n') {
            return Some((i, 2));
        }
        if buffer.get(i + 1) == Some(&b'\r') && buffer.get(i + 2) == Some(&b'\n') {
            return Some((i, 3));
        }
    }
    None
}

fn trim_leading_spaces(mut bytes: &[u8]) -> &[u8] {
    while let [b' ', rest @ ..] = bytes {
        bytes = rest;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(inspector: &mut StreamInspector, frames: &[&str]) {
        for frame in frames {
            inspector.observe(frame.as_bytes());
        }
    }

    #[test]
    fn test_usage_in_final_frame() {
        let mut inspector = StreamInspector::new();
        feed(
            &mut inspector,
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}],\"usage\":null}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}],\"usage\":null}\n\n",
                "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":20,\"prompt_tokens_details\":{\"cached_tokens\":80}}}\n\n",
                "data: [DONE]\n\n",
            ],
        );

        assert_eq!(inspector.usage(), Some(UsageFigure::new(100, 20, 80)));
        assert!(inspector.is_finished());
        assert_eq!(inspector.frames_seen(), 4);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut inspector = StreamInspector::new();
        let frame = "data: {\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":3}}\n\n";
        let (left, right) = frame.split_at(25);

        inspector.observe(left.as_bytes());
        assert!(inspector.usage().is_none());
        inspector.observe(right.as_bytes());
        assert_eq!(inspector.usage(), Some(UsageFigure::new(7, 3, 0)));
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut inspector = StreamInspector::new();
        inspector.observe(
            b"data: {\"usage\":null}\n\ndata: {\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1}}\n\ndata: [DONE]\n\n",
        );

        assert_eq!(inspector.frames_seen(), 3);
        assert_eq!(inspector.usage(), Some(UsageFigure::new(1, 1, 0)));
        assert!(inspector.is_finished());
    }

    #[test]
    fn test_stream_without_usage() {
        let mut inspector = StreamInspector::new();
        feed(
            &mut inspector,
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
                "data: [DONE]\n\n",
            ],
        );

        assert!(inspector.usage().is_none());
        assert!(inspector.is_finished());
    }

    #[test]
    fn test_crlf_delimiters() {
        let mut inspector = StreamInspector::new();
        inspector.observe(
            b"data: {\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2}}\r\n\r\ndata: [DONE]\r\n\r\n",
        );

        assert_eq!(inspector.usage(), Some(UsageFigure::new(4, 2, 0)));
        assert!(inspector.is_finished());
    }

    #[test]
    fn test_unparseable_frame_is_skipped() {
        let mut inspector = StreamInspector::new();
        feed(
            &mut inspector,
            &[
                "data: this is not json\n\n",
                ": keep-alive comment\n\n",
                "data: {\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":2}}\n\n",
            ],
        );

        assert_eq!(inspector.usage(), Some(UsageFigure::new(2, 2, 0)));
    }

    #[test]
    fn test_later_usage_frame_wins() {
        let mut inspector = StreamInspector::new();
        feed(
            &mut inspector,
            &[
                "data: {\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1}}\n\n",
                "data: {\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":9}}\n\n",
            ],
        );

        assert_eq!(inspector.usage(), Some(UsageFigure::new(9, 9, 0)));
    }
}
