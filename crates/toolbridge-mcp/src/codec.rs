//! Message framing for the stdio transport.
//!
//! Outbound messages are always written with LSP-style framing:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "...", "params": {...}}
//! ```
//!
//! Inbound bytes arrive in arbitrary chunks. [`FrameDecoder`] accumulates
//! them and hands back only complete messages. Servers that write one JSON
//! document per line instead of using headers are also understood; the
//! framing mode is fixed by the first unambiguous data on the stream.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &[u8] = b"Content-Length:";

/// Encode a message as a single Content-Length framed buffer.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// How the inbound stream delimits messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// `Content-Length` header followed by a blank line and the body.
    ContentLength,
    /// One JSON document per `\n`-terminated line.
    NewlineDelimited,
}

/// Incremental decoder for server output.
///
/// Between calls the buffer holds at most one incomplete trailing fragment.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    mode: Option<FramingMode>,
}

impl FrameDecoder {
    /// Create an empty decoder with no framing mode detected yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The framing mode, once detected.
    pub fn mode(&self) -> Option<FramingMode> {
        self.mode
    }

    /// Number of bytes waiting for the rest of their message.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return every message it completes.
    ///
    /// Malformed bodies and header blocks without a usable length are logged
    /// and dropped; they never abort the stream.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        if self.mode.is_none() {
            self.mode = self.detect_mode();
        }
        match self.mode {
            Some(FramingMode::ContentLength) => self.drain_framed(&mut messages),
            Some(FramingMode::NewlineDelimited) => self.drain_lines(&mut messages),
            None => {}
        }
        messages
    }

    /// Decide the framing mode from buffered data, if it is unambiguous yet.
    ///
    /// Complete lines that are neither JSON nor part of a header (startup
    /// banners and the like) are discarded while the mode is undecided.
    fn detect_mode(&mut self) -> Option<FramingMode> {
        loop {
            let start = self
                .buffer
                .iter()
                .position(|b| !b.is_ascii_whitespace())?;
            let rest = &self.buffer[start..];

            if rest[0] == b'{' || rest[0] == b'[' {
                return rest
                    .contains(&b'\n')
                    .then_some(FramingMode::NewlineDelimited);
            }
            if find_ignore_case(&self.buffer, CONTENT_LENGTH).is_some() {
                return Some(FramingMode::ContentLength);
            }

            let prefix = rest.len().min(CONTENT_LENGTH.len());
            if rest[..prefix].eq_ignore_ascii_case(&CONTENT_LENGTH[..prefix]) {
                return None;
            }

            let newline = start + rest.iter().position(|&b| b == b'\n')?;
            let noise: Vec<u8> = self.buffer.drain(..=newline).collect();
            tracing::debug!(
                line = %String::from_utf8_lossy(&noise).trim(),
                "discarding unframed server output"
            );
        }
    }

    fn drain_framed(&mut self, messages: &mut Vec<Value>) {
        while let Some(header_end) = find(&self.buffer, HEADER_TERMINATOR) {
            let body_start = header_end + HEADER_TERMINATOR.len();
            let header = String::from_utf8_lossy(&self.buffer[..header_end]).into_owned();

            let Some(content_length) = parse_content_length(&header) else {
                tracing::warn!(
                    header = %header.trim(),
                    "dropping header block without a valid Content-Length"
                );
                self.buffer.drain(..body_start);
                continue;
            };

            if self.buffer.len() < body_start + content_length {
                break;
            }

            let frame: Vec<u8> = self.buffer.drain(..body_start + content_length).collect();
            let body = &frame[body_start..];
            match serde_json::from_slice::<Value>(body) {
                Ok(message) => {
                    tracing::trace!(content_length, "received MCP message");
                    messages.push(message);
                }
                Err(e) => tracing::warn!(
                    error = %e,
                    content_length,
                    body = %String::from_utf8_lossy(body),
                    "dropping malformed MCP message"
                ),
            }
        }
    }

    fn drain_lines(&mut self, messages: &mut Vec<Value>) {
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(text) {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!(
                    error = %e,
                    line = %text,
                    "dropping malformed MCP line"
                ),
            }
        }
    }
}

type Sink = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Serializes whole frames onto a byte sink, one writer at a time.
pub struct FrameWriter {
    sink: Sink,
}

impl FrameWriter {
    /// Wrap an async byte sink such as a child's stdin.
    pub fn new<W>(sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            sink: Arc::new(tokio::sync::Mutex::new(Box::new(sink))),
        }
    }

    /// Write one encoded frame and flush it.
    ///
    /// The write runs on its own task. If the returned future is dropped
    /// mid-write, the frame is still written in full, so the stream never
    /// carries half a message.
    pub async fn write_frame(&self, frame: &[u8]) -> std::io::Result<()> {
        let sink = Arc::clone(&self.sink);
        let frame = frame.to_vec();
        tokio::spawn(async move {
            let mut sink = sink.lock().await;
            sink.write_all(&frame).await?;
            sink.flush().await
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter").finish_non_exhaustive()
    }
}

fn parse_content_length(header: &str) -> Option<usize> {
    header.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn find_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
