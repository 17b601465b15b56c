//! Progressive rendering of a streamed answer.
//!
//! Tokens are buffered and painted in two ways while the stream is open: a
//! newline placeholder forces a block-level parse of the buffer (hard flush),
//! and every `tokens_per_chunk` tokens the buffer is parsed inline and added
//! to the open paragraph (soft flush). Once the stream ends, everything
//! painted so far is replaced by one parse of the complete message, which
//! repairs anything a partial parse got wrong (an unterminated code fence,
//! emphasis split across flushes).

use futures::{Stream, StreamExt};
use tokio::sync::Mutex;

use crate::client::ClientError;
use crate::markdown::{to_html, to_inline_html};
use crate::model::Frame;
use crate::options::RenderOptions;
use crate::rewrite::rewrite_links;
use crate::sse::{frames, FrameStats};
use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushKind {
    /// Block-level parse, triggered by a newline placeholder
    Hard,
    /// Inline parse into the open paragraph, triggered by the token threshold
    Soft,
}

/// Summary of a completed render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    /// The answer as markdown, newline placeholders translated
    pub message: String,
    /// The HTML the message was finally rendered to
    pub html: String,
    pub stats: FrameStats,
    pub hard_flushes: usize,
    pub soft_flushes: usize,
}

/// Render state for one streamed message.
#[derive(Debug)]
pub struct StreamRenderer {
    options: RenderOptions,
    buffer: String,
    tokens: usize,
    message: String,
    hard_flushes: usize,
    soft_flushes: usize,
}

impl StreamRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            buffer: String::new(),
            tokens: 0,
            message: String::new(),
            hard_flushes: 0,
            soft_flushes: 0,
        }
    }

    /// The full message received so far.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text received since the last flush.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Apply one frame, flushing to `surface` when it calls for it.
    pub fn push<S: Surface + ?Sized>(&mut self, frame: Frame, surface: &mut S) {
        match frame {
            Frame::Token(token) => {
                self.message.push_str(&token);
                self.buffer.push_str(&token);
                self.tokens += 1;
                if self.tokens >= self.options.tokens_per_chunk {
                    self.flush(FlushKind::Soft, surface);
                }
            }
            Frame::Newline => {
                self.message.push('\n');
                self.flush(FlushKind::Hard, surface);
            }
            Frame::End => {
                tracing::debug!("end-of-stream sentinel received");
            }
        }
    }

    /// Paint the buffered text and clear the buffer.
    ///
    /// A hard flush always appends a block, empty when nothing was buffered,
    /// so the next span starts a fresh paragraph. A soft flush with nothing to
    /// show leaves the surface untouched. The surface is scrolled to its end
    /// only if it was near the end before the flush.
    pub fn flush<S: Surface + ?Sized>(&mut self, kind: FlushKind, surface: &mut S) {
        let follow = surface.viewport().is_near_end(self.options.scroll_threshold);

        match kind {
            FlushKind::Hard => {
                let html = if self.buffer.trim().is_empty() {
                    String::new()
                } else {
                    rewrite_links(&to_html(&self.buffer))
                };
                surface.close_paragraph();
                surface.append_block(&html);
                self.hard_flushes += 1;
            }
            FlushKind::Soft => {
                let html = to_inline_html(&self.buffer);
                if html.trim().is_empty() {
                    self.buffer.clear();
                    self.tokens = 0;
                    return;
                }
                surface.append_span(&rewrite_links(&html));
                self.soft_flushes += 1;
            }
        }

        tracing::debug!(?kind, tokens = self.tokens, bytes = self.buffer.len(), "flushed");
        self.buffer.clear();
        self.tokens = 0;

        if follow {
            surface.scroll_to_end();
        }
    }

    /// Flush what is left and replace the streamed fragments with a single
    /// render of the whole message. Returns the final HTML.
    pub fn finish<S: Surface + ?Sized>(&mut self, surface: &mut S) -> String {
        self.flush(FlushKind::Soft, surface);
        let html = rewrite_links(&to_html(&self.message));
        surface.replace(&html);
        surface.scroll_to_end();
        html
    }

    /// Drive a whole response body through the renderer.
    ///
    /// The surface is locked only while a frame is applied, never while the
    /// body is awaited, so the host can read and scroll it mid-stream.
    ///
    /// A transport error stops the read loop; whatever was buffered is still
    /// painted before the error is returned, and no final replacement happens.
    pub async fn render<St, B, S>(
        mut self,
        body: St,
        surface: &Mutex<S>,
    ) -> Result<RenderOutcome, ClientError>
    where
        St: Stream<Item = Result<B, ClientError>>,
        B: AsRef<[u8]>,
        S: Surface,
    {
        let mut frames = frames(Box::pin(body), &self.options);

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => self.push(frame, &mut *surface.lock().await),
                Err(e) => {
                    tracing::warn!(error = %e, received = self.message.len(), "answer stream aborted");
                    self.flush(FlushKind::Soft, &mut *surface.lock().await);
                    return Err(e);
                }
            }
        }

        let html = self.finish(&mut *surface.lock().await);
        let stats = frames.stats();
        tracing::info!(
            frames = stats.content,
            malformed = stats.malformed,
            sentinels = stats.sentinels,
            hard_flushes = self.hard_flushes,
            soft_flushes = self.soft_flushes,
            "answer stream complete"
        );

        Ok(RenderOutcome {
            message: self.message,
            html,
            stats,
            hard_flushes: self.hard_flushes,
            soft_flushes: self.soft_flushes,
        })
    }
}
