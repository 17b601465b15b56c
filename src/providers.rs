//! Q&A backend implementations.

pub mod qa;

// Re-export for convenience
pub use qa::QaClient;
