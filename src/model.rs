//! Data models shared by the transport, the renderer and the session.

use serde::{Deserialize, Serialize};

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    /// Label shown above a message.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Bot => "Bot",
        }
    }
}

/// One decoded event-stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Literal text content
    Token(String),

    /// Placeholder standing for a line break in the answer
    Newline,

    /// End-of-stream sentinel; carries no content
    End,
}

/// Request body sent to both Q&A endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionRequest<'a> {
    #[serde(rename = "userMessage")]
    pub user_message: &'a str,
}

/// Envelope returned by the non-streaming Q&A endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnswerEnvelope {
    Success {
        answer: String,
    },
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        detail: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// A heading with the questions grouped beneath it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaqGroup {
    pub heading: String,
    #[serde(default)]
    pub subheading: Vec<String>,
}

/// The FAQ list as served by the backend.
///
/// The backend sends either a flat array of questions or an array of
/// heading objects. The whole array is decoded into one variant here so the
/// rest of the crate matches on it instead of probing element shapes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FaqCatalog {
    Flat(Vec<String>),
    Grouped(Vec<FaqGroup>),
}

impl FaqCatalog {
    /// CSS theme class the widget applies to the FAQ container.
    pub fn theme(&self) -> &'static str {
        match self {
            FaqCatalog::Flat(_) => "Headings-theme",
            FaqCatalog::Grouped(_) => "SubHeadings-theme",
        }
    }

    /// Every clickable question, in display order.
    pub fn questions(&self) -> Vec<&str> {
        match self {
            FaqCatalog::Flat(questions) => questions.iter().map(String::as_str).collect(),
            FaqCatalog::Grouped(groups) => groups
                .iter()
                .flat_map(|group| group.subheading.iter().map(String::as_str))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FaqCatalog::Flat(questions) => questions.is_empty(),
            FaqCatalog::Grouped(groups) => groups.is_empty(),
        }
    }
}

/// Languages the FAQ list can be translated into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Vi,
    Fr,
    De,
    Ja,
    Ru,
    Ar,
    Ko,
    Hi,
    Bn,
}

impl Language {
    pub const ALL: [Language; 11] = [
        Language::En,
        Language::Es,
        Language::Vi,
        Language::Fr,
        Language::De,
        Language::Ja,
        Language::Ru,
        Language::Ar,
        Language::Ko,
        Language::Hi,
        Language::Bn,
    ];

    /// ISO 639-1 code passed as the `lang` query parameter.
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Vi => "vi",
            Language::Fr => "fr",
            Language::De => "de",
            Language::Ja => "ja",
            Language::Ru => "ru",
            Language::Ar => "ar",
            Language::Ko => "ko",
            Language::Hi => "hi",
            Language::Bn => "bn",
        }
    }

    /// Name of the language in that language.
    pub fn native_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Es => "Español",
            Language::Vi => "Tiếng Việt",
            Language::Fr => "Français",
            Language::De => "Deutsch",
            Language::Ja => "日本語",
            Language::Ru => "Русский",
            Language::Ar => "العربية",
            Language::Ko => "한국어",
            Language::Hi => "हिन्दी",
            Language::Bn => "বাংলা",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }
}
