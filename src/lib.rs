//! # qachat - streaming Q&A chat client
//!
//! Talks to a question-answering backend and paints its answers onto a chat
//! surface while they stream in.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Trait-based backend client with an HTTP implementation
//! - Incremental markdown rendering of Server-Sent Events token streams
//! - Link and media rewriting of rendered answers
//! - Cancelable typewriter reveal for non-streamed answers
//!
//! ## Architecture
//!
//! A [`ChatSession`] owns a backend [`Client`] and a [`Surface`]. Each
//! question is answered either over the streaming endpoint, where a
//! [`StreamRenderer`] decodes frames and paints blocks and spans as tokens
//! arrive, or over the buffered endpoint, where the finished answer is
//! revealed character by character.
//!
//! ### Core Types
//!
//! - **`TransportOptions<T>`**: Transport configuration (timeout, base URL, headers)
//! - **`RenderOptions`**: Flush cadence, scroll threshold and frame markers
//! - **`Surface`**: The chat body answers are painted into
//!
//! ## Example
//! ```no_run
//! use qachat::options::{HttpTransport, RenderOptions, TransportOptions};
//! use qachat::providers::QaClient;
//! use qachat::session::{ChatSession, SendOutcome};
//! use qachat::surface::MemorySurface;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = QaClient::new(TransportOptions::new(HttpTransport::new(
//!         "http://localhost:8000/wichita/api",
//!     )));
//!     let mut session = ChatSession::new(client, MemorySurface::default(), RenderOptions::default());
//!
//!     if let SendOutcome::Streamed(outcome) = session.send("When is trash pickup?").await {
//!         println!("{}", outcome.html);
//!     }
//! }
//! ```

pub mod client;
pub mod http;
pub mod markdown;
pub mod model;
pub mod options;
pub mod providers;
pub mod render;
pub mod rewrite;
pub mod session;
pub mod sse;
pub mod surface;
pub mod typewriter;

// Re-exports for convenience
pub use client::{Client, ClientError, StreamingClient};
pub use model::{FaqCatalog, Frame, Language, Role};
pub use render::StreamRenderer;
pub use session::ChatSession;
pub use surface::Surface;
