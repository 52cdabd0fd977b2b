//! Server-sent-event decoding for OpenAI-compatible chat streams.
//!
//! The body of a streaming chat completion is a sequence of lines:
//!
//! ```text
//! data: {"id":"021","choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}
//! data: {"id":"021","choices":[{"delta":{"content":""},"finish_reason":"stop"}]}
//! data: {"id":"021","choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}
//! data: [DONE]
//! ```
//!
//! Each `data:` payload maps to zero or more [`StreamChunk`]s:
//!
//! * a choice with content → [`StreamChunk::TextDelta`]
//! * a choice with a finish reason → [`StreamChunk::StreamEnd`]
//! * no choices and a `usage` object → [`StreamChunk::UsageReport`]
//!
//! Usage attached to a chunk that still carries choices is ignored; backends
//! that report usage send it in a dedicated trailing chunk.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! characters split across network reads decode correctly.

use crate::error::StreamError;
use crate::output::UsageRecord;
use crate::service::{ChunkStream, StreamChunk};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;

/// Sentinel payload closing the stream.
const DONE: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

/// What one `data:` payload means.
#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent {
    Chunks(Vec<StreamChunk>),
    Done,
}

/// Extract the payload of a `data:` line. Other fields and comments yield `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    let payload = rest.strip_prefix(' ').unwrap_or(rest).trim_end();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Decode one `data:` payload.
pub fn decode_payload(payload: &str) -> Result<SseEvent, StreamError> {
    if payload == DONE {
        return Ok(SseEvent::Done);
    }

    let chunk: WireChunk = serde_json::from_str(payload)
        .map_err(|e| StreamError::MalformedChunk(format!("{e}: {}", truncate(payload, 120))))?;

    if let Some(err) = chunk.error {
        return Err(StreamError::Remote(err.message));
    }

    let mut out = Vec::new();
    match chunk.choices.first() {
        Some(choice) => {
            if let Some(content) = choice.delta.as_ref().and_then(|d| d.content.as_ref()) {
                if !content.is_empty() {
                    out.push(StreamChunk::TextDelta(content.clone()));
                }
            }
            if choice.finish_reason.is_some() {
                out.push(StreamChunk::StreamEnd {
                    request_id: chunk.id.unwrap_or_default(),
                });
            }
        }
        None => {
            if let Some(u) = chunk.usage {
                out.push(StreamChunk::UsageReport(UsageRecord::new(
                    u.prompt_tokens,
                    u.completion_tokens,
                    u.total_tokens,
                )));
            }
        }
    }
    Ok(SseEvent::Chunks(out))
}

/// Accumulates raw bytes and hands out complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Append `bytes`; return every line completed by them, without `\n`/`\r\n`.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            let raw = std::mem::take(&mut self.buf);
            Some(decode_line(&raw))
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

struct DecodeState<S> {
    bytes: std::pin::Pin<Box<S>>,
    lines: LineBuffer,
    pending: VecDeque<Result<StreamChunk, StreamError>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn handle_line(&mut self, line: &str) {
        if self.finished {
            return;
        }
        let Some(payload) = data_payload(line) else {
            return;
        };
        match decode_payload(payload) {
            Ok(SseEvent::Chunks(chunks)) => self.pending.extend(chunks.into_iter().map(Ok)),
            Ok(SseEvent::Done) => self.finished = true,
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

/// Turn a raw SSE body into a [`ChunkStream`].
///
/// The stream ends at `[DONE]`, at the end of the body, or right after the
/// first error (transport or decoding), whichever comes first.
pub fn decode_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        lines: LineBuffer::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(bytes)) => {
                    for line in st.lines.push(bytes.as_ref()) {
                        st.handle_line(&line);
                    }
                }
                Some(Err(e)) => {
                    st.pending
                        .push_back(Err(StreamError::Transport(e.to_string())));
                    st.finished = true;
                }
                None => {
                    if let Some(line) = st.lines.finish() {
                        st.handle_line(&line);
                    }
                    st.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELTA: &str = r#"{"id":"r1","choices":[{"index":0,"delta":{"role":"assistant","content":"Hello"},"finish_reason":null}],"usage":null}"#;
    const FINISH: &str = r#"{"id":"r1","choices":[{"index":0,"delta":{"content":""},"finish_reason":"stop"}]}"#;
    const USAGE: &str = r#"{"id":"r1","choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;

    #[test]
    fn data_payload_variants() {
        assert_eq!(data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data: [DONE]"), Some("[DONE]"));
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("event: message"), None);
        assert_eq!(data_payload(""), None);
        assert_eq!(data_payload("data: "), None);
    }

    #[test]
    fn decode_text_delta() {
        assert_eq!(
            decode_payload(DELTA).unwrap(),
            SseEvent::Chunks(vec![StreamChunk::TextDelta("Hello".into())])
        );
    }

    #[test]
    fn decode_finish_chunk() {
        assert_eq!(
            decode_payload(FINISH).unwrap(),
            SseEvent::Chunks(vec![StreamChunk::StreamEnd {
                request_id: "r1".into()
            }])
        );
    }

    #[test]
    fn decode_usage_chunk() {
        assert_eq!(
            decode_payload(USAGE).unwrap(),
            SseEvent::Chunks(vec![StreamChunk::UsageReport(UsageRecord::new(10, 5, 15))])
        );
    }

    #[test]
    fn usage_alongside_choices_is_ignored() {
        let payload = r#"{"id":"r1","choices":[{"delta":{"content":"x"}}],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#;
        assert_eq!(
            decode_payload(payload).unwrap(),
            SseEvent::Chunks(vec![StreamChunk::TextDelta("x".into())])
        );
    }

    #[test]
    fn decode_done_and_errors() {
        assert_eq!(decode_payload("[DONE]").unwrap(), SseEvent::Done);
        assert!(matches!(
            decode_payload("{not json"),
            Err(StreamError::MalformedChunk(_))
        ));
        assert_eq!(
            decode_payload(r#"{"error":{"message":"quota exceeded","code":"429"}}"#),
            Err(StreamError::Remote("quota exceeded".into()))
        );
    }

    #[test]
    fn line_buffer_handles_split_utf8_and_crlf() {
        let text = "data: 你好\r\n";
        let bytes = text.as_bytes();
        let mut lb = LineBuffer::default();
        // Split inside the first multi-byte character.
        assert!(lb.push(&bytes[..7]).is_empty());
        let lines = lb.push(&bytes[7..]);
        assert_eq!(lines, vec!["data: 你好".to_string()]);
        assert_eq!(lb.finish(), None);
    }

    #[test]
    fn line_buffer_flushes_unterminated_tail() {
        let mut lb = LineBuffer::default();
        assert_eq!(lb.push(b"a\nb"), vec!["a".to_string()]);
        assert_eq!(lb.finish(), Some("b".to_string()));
    }

    fn body(parts: Vec<Result<Vec<u8>, String>>) -> ChunkStream {
        decode_stream(stream::iter(parts))
    }

    #[tokio::test]
    async fn decode_full_stream() {
        let raw = format!("data: {DELTA}\n\ndata: {FINISH}\n\ndata: {USAGE}\n\ndata: [DONE]\n\n");
        let (a, b) = raw.as_bytes().split_at(20);
        let chunks: Vec<_> = body(vec![Ok(a.to_vec()), Ok(b.to_vec())])
            .collect::<Vec<_>>()
            .await;

        assert_eq!(
            chunks,
            vec![
                Ok(StreamChunk::TextDelta("Hello".into())),
                Ok(StreamChunk::StreamEnd {
                    request_id: "r1".into()
                }),
                Ok(StreamChunk::UsageReport(UsageRecord::new(10, 5, 15))),
            ]
        );
    }

    #[tokio::test]
    async fn lines_after_done_are_ignored() {
        let raw = format!("data: [DONE]\ndata: {DELTA}\n");
        let chunks: Vec<_> = body(vec![Ok(raw.into_bytes())]).collect::<Vec<_>>().await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let first = format!("data: {DELTA}\n");
        let chunks: Vec<_> = body(vec![
            Ok(first.into_bytes()),
            Err("connection reset".to_string()),
            Ok(format!("data: {USAGE}\n").into_bytes()),
        ])
        .collect::<Vec<_>>()
        .await;

        assert_eq!(
            chunks,
            vec![
                Ok(StreamChunk::TextDelta("Hello".into())),
                Err(StreamError::Transport("connection reset".into())),
            ]
        );
    }
}
