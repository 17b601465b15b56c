//! Stream one answer from a Q&A backend and print the rendered HTML.
//!
//! Run with:
//! ```bash
//! export QA_API_BASE_URL="http://localhost:8000/wichita/api"
//! RUST_LOG=qachat=debug cargo run --example stream_answer -- "When is trash pickup?"
//! ```

use qachat::options::{HttpTransport, RenderOptions, TransportOptions};
use qachat::providers::QaClient;
use qachat::session::{ChatSession, SendOutcome};
use qachat::surface::MemorySurface;
use qachat::Language;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let base_url = std::env::var("QA_API_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8000/wichita/api".to_string());
    let question = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let question = if question.trim().is_empty() {
        "What are the library hours?".to_string()
    } else {
        question
    };

    let client = QaClient::new(TransportOptions::new(HttpTransport::new(base_url)));
    let mut session = ChatSession::new(client, MemorySurface::default(), RenderOptions::default());

    // FAQs are optional; a failure is already logged by the session
    if let Ok(faqs) = session.faqs().await {
        println!("=== FAQs ({}) ===", faqs.theme());
        for question in faqs.questions() {
            println!("- {}", question);
        }
    }
    if let Ok(faqs) = session.switch_language(Language::Es).await {
        println!("\n=== FAQs ({}) ===", Language::Es.native_name());
        for question in faqs.questions() {
            println!("- {}", question);
        }
    }

    println!("\nAsking: {}", question);
    match session.send(&question).await {
        SendOutcome::Streamed(outcome) => {
            println!("\n=== Markdown ===\n{}", outcome.message);
            println!("\n=== HTML ===\n{}", outcome.html);
            println!(
                "\nframes: {}, discarded: {}, hard flushes: {}, soft flushes: {}",
                outcome.stats.content,
                outcome.stats.malformed,
                outcome.hard_flushes,
                outcome.soft_flushes
            );
        }
        SendOutcome::Failed(e) => {
            let surface = session.surface();
            println!("\n{}", surface.lock().await.last_html());
            return Err(e.into());
        }
        SendOutcome::Skipped | SendOutcome::Revealing => {}
    }

    Ok(())
}
