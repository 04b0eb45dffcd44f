//! Log stream decoding.
//!
//! Containers started without a TTY produce a multiplexed stdout/stderr
//! stream in which each frame is an 8-byte header (stream type, three zero
//! bytes, big-endian u32 payload length) followed by the payload. The
//! decoder strips the framing and re-splits the payload into lines. A
//! TTY-attached container produces an unframed byte stream; that case is
//! detected from the first bytes and passed through unchanged.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures_core::Stream;

use crate::error::DockerError;

const FRAME_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Framed,
    Raw,
}

/// Incremental decoder from raw response chunks to complete log lines.
#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    buf: BytesMut,
    line: Vec<u8>,
    mode: Option<Mode>,
}

impl FrameDecoder {
    /// Consume one response chunk, appending any completed lines to `out`.
    pub(crate) fn feed(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.buf.extend_from_slice(chunk);
        loop {
            match self.mode {
                None => {
                    if self.buf.len() < 4 {
                        return;
                    }
                    let framed = matches!(self.buf[0], 0 | 1 | 2)
                        && self.buf[1] == 0
                        && self.buf[2] == 0
                        && self.buf[3] == 0;
                    self.mode = Some(if framed { Mode::Framed } else { Mode::Raw });
                }
                Some(Mode::Raw) => {
                    let payload = self.buf.split();
                    self.push_payload(&payload, out);
                    return;
                }
                Some(Mode::Framed) => {
                    if self.buf.len() < FRAME_HEADER_LEN {
                        return;
                    }
                    let len = u32::from_be_bytes([
                        self.buf[4],
                        self.buf[5],
                        self.buf[6],
                        self.buf[7],
                    ]) as usize;
                    if self.buf.len() < FRAME_HEADER_LEN + len {
                        return;
                    }
                    self.buf.advance(FRAME_HEADER_LEN);
                    let payload = self.buf.split_to(len);
                    self.push_payload(&payload, out);
                }
            }
        }
    }

    /// Flush once the upstream closes. A partial trailing frame is dropped;
    /// a partial trailing line is emitted as-is.
    pub(crate) fn finish(&mut self, out: &mut Vec<String>) {
        if !matches!(self.mode, Some(Mode::Framed)) && !self.buf.is_empty() {
            let payload = self.buf.split();
            self.push_payload(&payload, out);
        }
        self.buf.clear();
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            out.push(String::from_utf8_lossy(&line).into_owned());
        }
    }

    fn push_payload(&mut self, payload: &[u8], out: &mut Vec<String>) {
        for &byte in payload {
            if byte == b'\n' {
                if self.line.last() == Some(&b'\r') {
                    self.line.pop();
                }
                let line = std::mem::take(&mut self.line);
                out.push(String::from_utf8_lossy(&line).into_owned());
            } else {
                self.line.push(byte);
            }
        }
    }
}

/// Decode a fully buffered log response into lines.
pub(crate) fn decode_lines(body: &[u8]) -> Vec<String> {
    let mut decoder = FrameDecoder::default();
    let mut out = Vec::new();
    decoder.feed(body, &mut out);
    decoder.finish(&mut out);
    out
}

/// Lazy sequence of log lines from one container.
///
/// A historical read ends when the runtime closes the response; in follow
/// mode the stream keeps yielding lines until the consumer drops it. No
/// cancellation is signalled upstream on drop.
pub struct LogLines {
    source: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    decoder: FrameDecoder,
    ready: VecDeque<String>,
    done: bool,
}

impl LogLines {
    pub(crate) fn new(
        source: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            source: Box::pin(source),
            decoder: FrameDecoder::default(),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl Stream for LogLines {
    type Item = Result<String, DockerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match this.source.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let mut lines = Vec::new();
                    this.decoder.feed(&chunk, &mut lines);
                    this.ready.extend(lines);
                }
                Poll::Ready(Some(Err(err))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(DockerError::Http(err))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    let mut lines = Vec::new();
                    this.decoder.finish(&mut lines);
                    this.ready.extend(lines);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
