//! Character-by-character reveal of a finished answer.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::markdown::{escape_html, to_html};
use crate::rewrite::rewrite_links;
use crate::surface::Surface;

/// A reveal in flight, along with the write that completes it at once.
struct Reveal {
    task: JoinHandle<()>,
    complete: BoxFuture<'static, ()>,
}

/// Reveals text into the latest message of a shared surface, one character
/// per tick, then swaps in the rendered markdown.
///
/// At most one reveal runs per typewriter. [`skip`](Self::skip) stops the
/// animation and shows the whole answer; [`cancel`](Self::cancel) and
/// dropping the typewriter just stop it.
#[derive(Default)]
pub struct Typewriter {
    reveal: Option<Reveal>,
}

impl Typewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start revealing `text`, cancelling any reveal still in flight.
    pub fn start<S>(&mut self, text: String, delay: Duration, scroll_threshold: f64, surface: Arc<Mutex<S>>)
    where
        S: Surface + Send + 'static,
    {
        if self.cancel() {
            tracing::debug!("previous reveal cancelled");
        }

        let html = rewrite_links(&to_html(&text));
        let complete: BoxFuture<'static, ()> = {
            let surface = Arc::clone(&surface);
            let html = html.clone();
            Box::pin(async move {
                let mut surface = surface.lock().await;
                surface.replace(&html);
                surface.scroll_to_end();
            })
        };

        let task = tokio::spawn(async move {
            let mut revealed = String::with_capacity(text.len());
            for c in text.chars() {
                revealed.push(c);
                {
                    let mut surface = surface.lock().await;
                    let follow = surface.viewport().is_near_end(scroll_threshold);
                    surface.replace(&escape_html(&revealed).replace('\n', "<br>"));
                    if follow {
                        surface.scroll_to_end();
                    }
                }
                tokio::time::sleep(delay).await;
            }

            let mut surface = surface.lock().await;
            surface.replace(&html);
            surface.scroll_to_end();
        });

        self.reveal = Some(Reveal { task, complete });
    }

    /// Stop the reveal in flight and show the complete answer in its place.
    /// Returns whether a reveal was interrupted.
    pub async fn skip(&mut self) -> bool {
        let Some(reveal) = self.reveal.take() else {
            return false;
        };
        if reveal.task.is_finished() {
            return false;
        }

        reveal.task.abort();
        if let Err(e) = reveal.task.await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "reveal task failed");
            }
        }
        reveal.complete.await;
        tracing::debug!("reveal skipped to the end");
        true
    }

    /// Abort the reveal in flight, leaving whatever was shown so far.
    /// Returns whether one was still running.
    pub fn cancel(&mut self) -> bool {
        match self.reveal.take() {
            Some(reveal) => {
                let running = !reveal.task.is_finished();
                reveal.task.abort();
                running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.reveal
            .as_ref()
            .is_some_and(|reveal| !reveal.task.is_finished())
    }

    /// Wait for the current reveal to complete.
    pub async fn wait(&mut self) {
        if let Some(reveal) = self.reveal.take() {
            if let Err(e) = reveal.task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "reveal task failed");
                }
            }
        }
    }
}

impl Drop for Typewriter {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::surface::MemorySurface;

    fn shared_surface() -> Arc<Mutex<MemorySurface>> {
        let mut surface = MemorySurface::default();
        surface.push_message(Role::Bot, "");
        Arc::new(Mutex::new(surface))
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_ends_with_rendered_markdown() {
        let surface = shared_surface();
        let mut typewriter = Typewriter::new();
        typewriter.start(
            "Open **daily**".to_string(),
            Duration::from_millis(10),
            500.0,
            Arc::clone(&surface),
        );
        typewriter.wait().await;

        assert!(!typewriter.is_running());
        assert_eq!(surface.lock().await.last_html(), "<p>Open <strong>daily</strong></p>\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_partial_reveal() {
        let surface = shared_surface();
        let mut typewriter = Typewriter::new();
        typewriter.start("abcdef".to_string(), Duration::from_secs(1), 500.0, Arc::clone(&surface));
        tokio::task::yield_now().await;

        assert!(typewriter.cancel());
        tokio::time::sleep(Duration::from_secs(10)).await;

        let html = surface.lock().await.last_html();
        assert!(html.starts_with('a'));
        assert_ne!(html, "<p>abcdef</p>\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_reveal_cancels_previous() {
        let surface = shared_surface();
        let mut typewriter = Typewriter::new();
        typewriter.start(
            "first answer".to_string(),
            Duration::from_secs(1),
            500.0,
            Arc::clone(&surface),
        );
        tokio::task::yield_now().await;
        typewriter.start("second".to_string(), Duration::from_millis(1), 500.0, Arc::clone(&surface));
        typewriter.wait().await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(surface.lock().await.last_html(), "<p>second</p>\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_shows_whole_answer() {
        let surface = shared_surface();
        let mut typewriter = Typewriter::new();
        typewriter.start(
            "Open **daily**".to_string(),
            Duration::from_secs(1),
            500.0,
            Arc::clone(&surface),
        );
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(typewriter.is_running());

        assert!(typewriter.skip().await);
        assert!(!typewriter.is_running());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(surface.lock().await.last_html(), "<p>Open <strong>daily</strong></p>\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_after_finish_is_noop() {
        let surface = shared_surface();
        let mut typewriter = Typewriter::new();
        typewriter.start("ok".to_string(), Duration::from_millis(1), 500.0, Arc::clone(&surface));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!typewriter.skip().await);
        assert_eq!(surface.lock().await.last_html(), "<p>ok</p>\n");
    }

    #[test]
    fn test_cancel_without_task() {
        let mut typewriter = Typewriter::new();
        assert!(!typewriter.cancel());
        assert!(!typewriter.is_running());
    }
}
