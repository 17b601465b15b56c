//! Server-Sent Events (SSE) frame decoding.
//!
//! The Q&A backend streams one token per frame:
//! ```text
//! data: Hello
//!
//! data:  world
//!
//! data: __NEWLINE__
//!
//! data: end-of-stream
//! ```
//!
//! Payloads are taken verbatim after the `data: ` marker; leading spaces
//! are part of the token.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::Stream;

use crate::client::ClientError;
use crate::model::Frame;
use crate::options::RenderOptions;

const FRAME_DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data: ";

/// Counters describing what a decoder has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames carrying a token or a newline placeholder
    pub content: usize,
    /// Frames discarded for lacking the `data: ` marker
    pub malformed: usize,
    /// End-of-stream sentinels seen
    pub sentinels: usize,
}

/// Incremental decoder turning raw response bytes into [`Frame`]s.
///
/// Bytes may arrive split anywhere, including inside a multi-byte character
/// or inside the frame delimiter. Incomplete input is held back until the
/// next [`feed`](Self::feed) or until [`finish`](Self::finish).
#[derive(Debug)]
pub struct FrameDecoder {
    undecoded: Vec<u8>,
    pending: String,
    newline_placeholder: String,
    end_sentinel: String,
    stats: FrameStats,
}

impl FrameDecoder {
    pub fn new(options: &RenderOptions) -> Self {
        Self {
            undecoded: Vec::new(),
            pending: String::new(),
            newline_placeholder: options.newline_placeholder.clone(),
            end_sentinel: options.end_sentinel.clone(),
            stats: FrameStats::default(),
        }
    }

    /// Decode a chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.undecoded.extend_from_slice(chunk);
        self.decode_text();

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.find(FRAME_DELIMITER) {
            let raw: String = self.pending.drain(..pos + FRAME_DELIMITER.len()).collect();
            if let Some(frame) = self.classify(&raw[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is left once the byte stream has ended.
    ///
    /// A trailing frame that never received its blank-line delimiter is still
    /// decoded.
    pub fn finish(&mut self) -> Vec<Frame> {
        if !self.undecoded.is_empty() {
            let rest = String::from_utf8_lossy(&self.undecoded).into_owned();
            self.undecoded.clear();
            self.pending.push_str(&rest);
        }

        let mut frames = self.feed(&[]);
        let tail = std::mem::take(&mut self.pending);
        let tail = tail.trim_end_matches('\n');
        if !tail.is_empty() {
            if let Some(frame) = self.classify(tail) {
                frames.push(frame);
            }
        }
        frames
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    fn decode_text(&mut self) {
        loop {
            match std::str::from_utf8(&self.undecoded) {
                Ok(text) => {
                    self.pending.push_str(text);
                    self.undecoded.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.undecoded[..valid]) {
                        self.pending.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            self.undecoded.drain(..valid + len);
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.undecoded.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn classify(&mut self, raw: &str) -> Option<Frame> {
        let Some(payload) = frame_payload(raw) else {
            self.stats.malformed += 1;
            tracing::debug!(frame = %raw, "discarding frame without data marker");
            return None;
        };

        if payload == self.end_sentinel {
            self.stats.sentinels += 1;
            return Some(Frame::End);
        }

        self.stats.content += 1;
        if payload == self.newline_placeholder {
            Some(Frame::Newline)
        } else {
            Some(Frame::Token(payload.to_string()))
        }
    }
}

/// Extract the payload of a frame.
///
/// # Example
/// ```
/// use qachat::sse::frame_payload;
///
/// assert_eq!(frame_payload("data:  world"), Some(" world"));
/// assert_eq!(frame_payload("event: ping"), None);
/// ```
pub fn frame_payload(frame: &str) -> Option<&str> {
    frame.strip_prefix(DATA_PREFIX)
}

/// Adapt a response body into a stream of decoded frames.
///
/// Transport errors are passed through. The decoder is flushed once the body
/// ends, so a trailing frame without its delimiter still comes out.
///
/// # Example
/// ```ignore
/// let mut frames = frames(response.bytes_stream(), &RenderOptions::default());
/// while let Some(frame) = frames.next().await {
///     println!("{:?}", frame?);
/// }
/// ```
pub fn frames<St, B>(body: St, options: &RenderOptions) -> FrameStream<St>
where
    St: Stream<Item = Result<B, ClientError>> + Unpin,
    B: AsRef<[u8]>,
{
    FrameStream {
        body,
        decoder: FrameDecoder::new(options),
        ready: VecDeque::new(),
        ended: false,
    }
}

/// Stream returned by [`frames`].
#[derive(Debug)]
pub struct FrameStream<St> {
    body: St,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
    ended: bool,
}

impl<St> FrameStream<St> {
    /// Counters for the frames decoded so far.
    pub fn stats(&self) -> FrameStats {
        self.decoder.stats()
    }
}

impl<St, B> Stream for FrameStream<St>
where
    St: Stream<Item = Result<B, ClientError>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<Frame, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(frame) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.ended {
                return Poll::Ready(None);
            }
            match ready!(Pin::new(&mut this.body).poll_next(cx)) {
                Some(Ok(chunk)) => this.ready.extend(this.decoder.feed(chunk.as_ref())),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    this.ended = true;
                    this.ready.extend(this.decoder.finish());
                }
            }
        }
    }
}
