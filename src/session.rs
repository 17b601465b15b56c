//! One conversation between a user and a Q&A backend.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::{Client, ClientError, StreamingClient};
use crate::model::{FaqCatalog, Language, Role};
use crate::options::RenderOptions;
use crate::render::{RenderOutcome, StreamRenderer};
use crate::surface::Surface;
use crate::typewriter::Typewriter;

/// What became of a submitted question.
#[derive(Debug)]
pub enum SendOutcome {
    /// The question was blank; nothing was sent.
    Skipped,
    /// The streamed answer was rendered in full.
    Streamed(RenderOutcome),
    /// The buffered answer arrived and is being revealed.
    Revealing,
    /// The request failed; the error text was posted as a bot message.
    Failed(ClientError),
}

/// Chat session state: a backend, the surface it paints into and the
/// options that drive rendering.
///
/// Sessions share nothing with one another, so several may run side by side.
pub struct ChatSession<C, S> {
    client: C,
    surface: Arc<Mutex<S>>,
    options: RenderOptions,
    typewriter: Typewriter,
}

impl<C, S> ChatSession<C, S>
where
    S: Surface,
{
    pub fn new(client: C, surface: S, options: RenderOptions) -> Self {
        Self {
            client,
            surface: Arc::new(Mutex::new(surface)),
            options,
            typewriter: Typewriter::new(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Shared handle to the surface.
    pub fn surface(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.surface)
    }

    /// Ask `message` over the streaming endpoint and render the answer as it
    /// arrives.
    pub async fn send(&mut self, message: &str) -> SendOutcome
    where
        C: StreamingClient,
    {
        let message = message.trim();
        if message.is_empty() {
            return SendOutcome::Skipped;
        }
        self.typewriter.skip().await;
        self.open_exchange(message).await;

        let result = self.stream_answer(message).await;
        self.close_exchange(result.map(SendOutcome::Streamed)).await
    }

    async fn stream_answer(&self, message: &str) -> Result<RenderOutcome, ClientError>
    where
        C: StreamingClient,
    {
        let body = self.client.ask_stream(message).await?;
        self.surface.lock().await.push_message(Role::Bot, "");
        StreamRenderer::new(self.options.clone())
            .render(body, &*self.surface)
            .await
    }

    /// Fetch the default FAQ list.
    pub async fn faqs(&self) -> Result<FaqCatalog, ClientError>
    where
        C: Client,
    {
        self.client.faqs().await.inspect_err(|e| {
            tracing::warn!(error = %e, "failed to load FAQs");
        })
    }

    /// Fetch the FAQ list translated into `language`.
    pub async fn switch_language(&self, language: Language) -> Result<FaqCatalog, ClientError>
    where
        C: Client,
    {
        tracing::debug!(lang = language.code(), "switching FAQ language");
        self.client.translated_faqs(language).await.inspect_err(|e| {
            tracing::warn!(error = %e, lang = language.code(), "failed to load translated FAQs");
        })
    }

    async fn open_exchange(&self, message: &str) {
        let mut surface = self.surface.lock().await;
        surface.push_message(Role::User, message);
        surface.scroll_to_end();
        surface.set_pending(true);
    }

    async fn close_exchange(&self, result: Result<SendOutcome, ClientError>) -> SendOutcome {
        let mut surface = self.surface.lock().await;
        surface.set_pending(false);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "question failed");
                surface.push_message(Role::Bot, &e.user_message());
                SendOutcome::Failed(e)
            }
        };
        surface.scroll_to_end();
        outcome
    }
}

impl<C, S> ChatSession<C, S>
where
    C: Client,
    S: Surface + Send + 'static,
{
    /// Ask `message` over the buffered endpoint and reveal the answer one
    /// character at a time.
    pub async fn send_buffered(&mut self, message: &str) -> SendOutcome {
        let message = message.trim();
        if message.is_empty() {
            return SendOutcome::Skipped;
        }
        self.typewriter.skip().await;
        self.open_exchange(message).await;

        let answer = match self.client.ask(message).await {
            Ok(answer) => answer,
            Err(e) => return self.close_exchange(Err(e)).await,
        };
        {
            let mut surface = self.surface.lock().await;
            surface.push_message(Role::Bot, "");
        }
        let outcome = self.close_exchange(Ok(SendOutcome::Revealing)).await;

        self.typewriter.start(
            answer,
            self.options.typewriter_delay,
            self.options.scroll_threshold,
            Arc::clone(&self.surface),
        );
        outcome
    }

    /// Wait for the reveal in flight, if any, to finish.
    pub async fn wait_for_reveal(&mut self) {
        self.typewriter.wait().await;
    }

    pub fn is_revealing(&self) -> bool {
        self.typewriter.is_running()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream, StreamExt};

    use super::*;
    use crate::client::{ByteStream, TOO_MANY_REQUESTS_MESSAGE};
    use crate::surface::MemorySurface;

    #[derive(Default)]
    struct Scripted {
        chunks: Vec<String>,
        status: Option<u16>,
        break_mid_stream: bool,
        chunk_delay: Option<Duration>,
    }

    impl Scripted {
        fn answering(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|chunk| chunk.to_string()).collect(),
                ..Default::default()
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                status: Some(status),
                ..Default::default()
            }
        }

        fn check(&self) -> Result<(), ClientError> {
            match self.status {
                Some(429) => Err(ClientError::TooManyRequests),
                Some(status) => Err(ClientError::Status {
                    status,
                    detail: "index offline".to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Client for Scripted {
        async fn ask(&self, _message: &str) -> Result<String, ClientError> {
            self.check()?;
            Ok(self.chunks.concat())
        }

        async fn faqs(&self) -> Result<FaqCatalog, ClientError> {
            self.check()?;
            Ok(FaqCatalog::Flat(vec!["When is the library open?".to_string()]))
        }

        async fn translated_faqs(&self, language: Language) -> Result<FaqCatalog, ClientError> {
            self.check()?;
            Ok(FaqCatalog::Flat(vec![format!("faq in {}", language.code())]))
        }
    }

    #[async_trait]
    impl StreamingClient for Scripted {
        async fn ask_stream(&self, _message: &str) -> Result<ByteStream, ClientError> {
            self.check()?;
            let mut chunks: Vec<Result<Bytes, ClientError>> = self
                .chunks
                .iter()
                .map(|chunk| Ok(Bytes::from(chunk.clone())))
                .collect();
            if self.break_mid_stream {
                chunks.push(Err(ClientError::Config("connection reset".to_string())));
            }
            match self.chunk_delay {
                Some(delay) => Ok(Box::pin(stream::iter(chunks).then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    chunk
                }))),
                None => Ok(Box::pin(stream::iter(chunks))),
            }
        }
    }

    fn session(client: Scripted) -> ChatSession<Scripted, MemorySurface> {
        ChatSession::new(client, MemorySurface::default(), RenderOptions::default())
    }

    #[tokio::test]
    async fn test_blank_question_is_skipped() {
        let mut session = session(Scripted::answering(&["data: hi\n\n"]));
        assert!(matches!(session.send("   \n").await, SendOutcome::Skipped));
        assert!(session.surface().lock().await.messages().is_empty());
    }

    #[tokio::test]
    async fn test_streamed_answer_replaces_with_final_render() {
        let mut session = session(Scripted::answering(&[
            "data: Hello\n\ndata:  **wor",
            "ld**\n\ndata: end-of-stream\n\n",
        ]));

        let outcome = match session.send("  Hi there ").await {
            SendOutcome::Streamed(outcome) => outcome,
            other => panic!("expected a streamed answer, got {:?}", other),
        };
        assert_eq!(outcome.message, "Hello **world**");

        let surface = session.surface();
        let surface = surface.lock().await;
        let messages = surface.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].html(), "Hi there");
        assert_eq!(messages[1].role, Role::Bot);
        assert_eq!(surface.last_html(), "<p>Hello <strong>world</strong></p>\n");
        assert!(!surface.is_pending());
    }

    #[tokio::test]
    async fn test_too_many_requests_shown_as_bot_message() {
        let mut session = session(Scripted::failing(429));

        let outcome = session.send("hours?").await;
        assert!(matches!(outcome, SendOutcome::Failed(ClientError::TooManyRequests)));

        let surface = session.surface();
        let surface = surface.lock().await;
        assert_eq!(surface.messages().len(), 2);
        assert_eq!(surface.last_message().unwrap().role, Role::Bot);
        assert_eq!(surface.last_html(), TOO_MANY_REQUESTS_MESSAGE);
        assert!(!surface.is_pending());
    }

    #[tokio::test]
    async fn test_status_error_shows_detail() {
        let mut session = session(Scripted::failing(500));
        session.send("hours?").await;
        assert_eq!(session.surface().lock().await.last_html(), "Error: index offline");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_answer() {
        let mut session = session(Scripted {
            chunks: vec!["data: Partial answer\n\n".to_string()],
            break_mid_stream: true,
            ..Default::default()
        });

        assert!(matches!(session.send("hours?").await, SendOutcome::Failed(_)));

        let surface = session.surface();
        let surface = surface.lock().await;
        let messages = surface.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[1].html().contains("Partial answer"));
        assert_eq!(surface.last_html(), crate::client::NETWORK_MESSAGE);
        assert!(!surface.is_pending());
    }

    #[tokio::test]
    async fn test_question_scrolls_to_end_even_when_scrolled_up() {
        let mut surface = MemorySurface::new(100.0, 10.0);
        for i in 0..50 {
            surface.push_message(Role::User, &format!("earlier question {}", i));
        }
        surface.scroll_to(0.0);
        let mut session = ChatSession::new(
            Scripted::answering(&["data: ok\n\n"]),
            surface,
            RenderOptions::default(),
        );

        session.send("hours?").await;

        let viewport = session.surface().lock().await.viewport();
        assert_eq!(viewport.distance_from_end(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_answer_is_revealed() {
        let options = RenderOptions::default().with_typewriter_delay(Duration::from_millis(5));
        let mut session = ChatSession::new(
            Scripted::answering(&["Open *daily*"]),
            MemorySurface::default(),
            options,
        );

        assert!(matches!(session.send_buffered("hours?").await, SendOutcome::Revealing));
        assert!(!session.surface().lock().await.is_pending());
        session.wait_for_reveal().await;

        assert!(!session.is_revealing());
        assert_eq!(
            session.surface().lock().await.last_html(),
            "<p>Open <em>daily</em></p>\n"
        );
    }

    #[tokio::test]
    async fn test_faq_pass_throughs() {
        let session = session(Scripted::default());
        assert_eq!(session.faqs().await.unwrap().questions(), vec!["When is the library open?"]);
        assert_eq!(
            session.switch_language(Language::Es).await.unwrap().questions(),
            vec!["faq in es"]
        );

        let failing = ChatSession::new(
            Scripted::failing(503),
            MemorySurface::default(),
            RenderOptions::default(),
        );
        assert!(matches!(failing.faqs().await, Err(ClientError::Status { status: 503, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_usable_while_answer_streams() {
        let mut session = session(Scripted {
            chunks: vec![
                "data: Slow\n\n".to_string(),
                "data:  answer\n\n".to_string(),
                "data: end-of-stream\n\n".to_string(),
            ],
            chunk_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let surface = session.surface();

        let (outcome, locked_mid_stream) = tokio::join!(session.send("hours?"), async {
            tokio::time::sleep(Duration::from_secs(7)).await;
            let locked = surface.try_lock().is_err();
            if let Ok(mut surface) = surface.try_lock() {
                assert!(surface.is_pending());
                surface.scroll_to(0.0);
            }
            locked
        });

        assert!(!locked_mid_stream);
        assert!(matches!(outcome, SendOutcome::Streamed(_)));
        assert_eq!(surface.lock().await.last_html(), "<p>Slow answer</p>\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_completes_interrupted_reveal() {
        let options = RenderOptions::default().with_typewriter_delay(Duration::from_secs(1));
        let mut session = ChatSession::new(
            Scripted::answering(&["First **answer**"]),
            MemorySurface::default(),
            options,
        );

        assert!(matches!(session.send_buffered("first").await, SendOutcome::Revealing));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(session.is_revealing());

        assert!(matches!(session.send_buffered("second").await, SendOutcome::Revealing));

        let surface = session.surface();
        let surface = surface.lock().await;
        let messages = surface.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].html(), "<p>First <strong>answer</strong></p>\n");
        assert_eq!(messages[2].html(), "second");
    }
}
