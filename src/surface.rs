//! Rendering surfaces.
//!
//! A [`Surface`] is the append-only chat body a session paints into: a list
//! of messages, the latest of which receives streamed blocks and spans, plus
//! the scroll metrics needed to decide whether to follow new content.

use itertools::Itertools;

use crate::markdown::escape_html;
use crate::model::Role;

/// Scroll metrics of a surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl Viewport {
    /// Distance between the bottom of the visible area and the end of the content.
    pub fn distance_from_end(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }

    pub fn is_near_end(&self, threshold: f64) -> bool {
        self.distance_from_end() < threshold
    }
}

/// The chat body a renderer paints into.
pub trait Surface {
    /// Open a new message holding plain (unparsed) text.
    fn push_message(&mut self, role: Role, text: &str);

    /// Append a finished block of HTML to the latest message.
    fn append_block(&mut self, html: &str);

    /// Append inline HTML to the open paragraph of the latest message,
    /// opening a paragraph first when none is open.
    fn append_span(&mut self, html: &str);

    /// End the open paragraph; the next span starts a new one.
    fn close_paragraph(&mut self);

    /// Replace the whole content of the latest message.
    fn replace(&mut self, html: &str);

    /// Show or hide the awaiting-response indicator.
    fn set_pending(&mut self, pending: bool);

    fn viewport(&self) -> Viewport;

    fn scroll_to_end(&mut self);
}

/// A piece of a message rendered while its answer was streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Block(String),
    Paragraph(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Fragments(Vec<Fragment>),
    Html(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    paragraph_open: bool,
}

impl Message {
    fn new(role: Role, text: &str) -> Self {
        Self {
            role,
            content: Content::Text(text.to_string()),
            paragraph_open: false,
        }
    }

    /// Add a streamed fragment. Text or HTML content is discarded first.
    fn push_fragment(&mut self, fragment: Fragment) {
        match &mut self.content {
            Content::Fragments(fragments) => fragments.push(fragment),
            other => *other = Content::Fragments(vec![fragment]),
        }
    }

    fn push_span(&mut self, html: &str) {
        let continues = self.paragraph_open
            && match &self.content {
                Content::Fragments(fragments) => {
                    matches!(fragments.last(), Some(Fragment::Paragraph(_)))
                }
                _ => false,
            };
        if continues {
            if let Content::Fragments(fragments) = &mut self.content {
                if let Some(Fragment::Paragraph(spans)) = fragments.last_mut() {
                    spans.push(html.to_string());
                }
            }
        } else {
            self.push_fragment(Fragment::Paragraph(vec![html.to_string()]));
        }
        self.paragraph_open = true;
    }

    /// Number of streamed fragments currently shown.
    pub fn fragment_count(&self) -> usize {
        match &self.content {
            Content::Fragments(fragments) => fragments.len(),
            _ => 0,
        }
    }

    pub fn html(&self) -> String {
        match &self.content {
            Content::Text(text) => escape_html(text),
            Content::Html(html) => html.clone(),
            Content::Fragments(fragments) => fragments
                .iter()
                .map(|fragment| match fragment {
                    Fragment::Block(html) => format!("<div class=\"fade-in-markdown\">{}</div>", html),
                    Fragment::Paragraph(spans) => format!(
                        "<p>{}</p>",
                        spans
                            .iter()
                            .map(|span| format!("<span class=\"fade-in-markdown\">{}</span>", span))
                            .join("")
                    ),
                })
                .join(""),
        }
    }

    fn rows(&self) -> usize {
        let body = match &self.content {
            Content::Text(text) if text.is_empty() => 0,
            Content::Text(_) => 1,
            Content::Html(html) => html.lines().count().max(1),
            Content::Fragments(fragments) => fragments
                .iter()
                .map(|fragment| match fragment {
                    Fragment::Block(_) => 1,
                    Fragment::Paragraph(spans) => spans.len().max(1),
                })
                .sum(),
        };
        // label row
        body + 1
    }
}

/// In-memory surface.
///
/// Content height is modelled as a fixed row height per label, plain text,
/// block, span or HTML line, which is enough to exercise scroll following.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    messages: Vec<Message>,
    scroll_top: f64,
    client_height: f64,
    row_height: f64,
    pending: bool,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new(400.0, 24.0)
    }
}

impl MemorySurface {
    pub fn new(client_height: f64, row_height: f64) -> Self {
        Self {
            messages: Vec::new(),
            scroll_top: 0.0,
            client_height,
            row_height,
            pending: false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// HTML of the latest message, empty when there is none.
    pub fn last_html(&self) -> String {
        self.messages.last().map(Message::html).unwrap_or_default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Scroll to an absolute offset, as a user dragging the scrollbar would.
    pub fn scroll_to(&mut self, top: f64) {
        self.scroll_top = top.clamp(0.0, self.max_scroll_top());
    }

    fn scroll_height(&self) -> f64 {
        self.messages.iter().map(Message::rows).sum::<usize>() as f64 * self.row_height
    }

    fn max_scroll_top(&self) -> f64 {
        (self.scroll_height() - self.client_height).max(0.0)
    }

    fn latest(&mut self) -> &mut Message {
        if self.messages.is_empty() {
            self.messages.push(Message::new(Role::Bot, ""));
        }
        let last = self.messages.len() - 1;
        &mut self.messages[last]
    }
}

impl Surface for MemorySurface {
    fn push_message(&mut self, role: Role, text: &str) {
        self.messages.push(Message::new(role, text));
    }

    fn append_block(&mut self, html: &str) {
        self.latest().push_fragment(Fragment::Block(html.to_string()));
    }

    fn append_span(&mut self, html: &str) {
        self.latest().push_span(html);
    }

    fn close_paragraph(&mut self) {
        self.latest().paragraph_open = false;
    }

    fn replace(&mut self, html: &str) {
        let message = self.latest();
        message.content = Content::Html(html.to_string());
        message.paragraph_open = false;
    }

    fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    fn viewport(&self) -> Viewport {
        Viewport {
            scroll_top: self.scroll_top,
            scroll_height: self.scroll_height(),
            client_height: self.client_height,
        }
    }

    fn scroll_to_end(&mut self) {
        self.scroll_top = self.max_scroll_top();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_near_end() {
        let viewport = Viewport {
            scroll_top: 100.0,
            scroll_height: 1000.0,
            client_height: 400.0,
        };
        assert_eq!(viewport.distance_from_end(), 500.0);
        assert!(!viewport.is_near_end(500.0));
        assert!(viewport.is_near_end(501.0));
    }

    #[test]
    fn test_spans_share_open_paragraph() {
        let mut surface = MemorySurface::default();
        surface.push_message(Role::Bot, "");
        surface.append_span("Hello ");
        surface.append_span("world");
        surface.append_block("<p>Done.</p>");
        surface.append_span("Next");

        assert_eq!(surface.last_message().unwrap().fragment_count(), 3);
        assert_eq!(
            surface.last_html(),
            "<p><span class=\"fade-in-markdown\">Hello </span><span class=\"fade-in-markdown\">world</span></p>\
             <div class=\"fade-in-markdown\"><p>Done.</p></div>\
             <p><span class=\"fade-in-markdown\">Next</span></p>"
        );
    }

    #[test]
    fn test_close_paragraph_starts_new_one() {
        let mut surface = MemorySurface::default();
        surface.push_message(Role::Bot, "");
        surface.append_span("one");
        surface.close_paragraph();
        surface.append_span("two");
        surface.append_span("three");

        let message = surface.last_message().unwrap();
        assert_eq!(
            message.content,
            Content::Fragments(vec![
                Fragment::Paragraph(vec!["one".to_string()]),
                Fragment::Paragraph(vec!["two".to_string(), "three".to_string()]),
            ])
        );
    }

    #[test]
    fn test_span_after_replace_starts_fresh() {
        let mut surface = MemorySurface::default();
        surface.push_message(Role::Bot, "");
        surface.append_span("old");
        surface.replace("<p>final</p>");
        surface.append_span("new");
        assert_eq!(surface.last_message().unwrap().fragment_count(), 1);
        assert_eq!(
            surface.last_html(),
            "<p><span class=\"fade-in-markdown\">new</span></p>"
        );
    }

    #[test]
    fn test_replace_discards_fragments() {
        let mut surface = MemorySurface::default();
        surface.push_message(Role::Bot, "");
        surface.append_block("<p>a</p>");
        surface.replace("<p>final</p>");
        assert_eq!(surface.last_message().unwrap().fragment_count(), 0);
        assert_eq!(surface.last_html(), "<p>final</p>");
    }

    #[test]
    fn test_user_text_is_escaped() {
        let mut surface = MemorySurface::default();
        surface.push_message(Role::User, "<b>hi</b>");
        assert_eq!(surface.last_html(), "&lt;b&gt;hi&lt;/b&gt;");
    }

    #[test]
    fn test_scroll_to_end_and_clamp() {
        let mut surface = MemorySurface::new(100.0, 10.0);
        for i in 0..20 {
            surface.push_message(Role::User, &format!("question {}", i));
        }
        // 20 messages * 2 rows * 10px
        assert_eq!(surface.viewport().scroll_height, 400.0);
        surface.scroll_to_end();
        assert_eq!(surface.viewport().scroll_top, 300.0);
        surface.scroll_to(-5.0);
        assert_eq!(surface.viewport().scroll_top, 0.0);
        surface.scroll_to(1_000.0);
        assert_eq!(surface.viewport().scroll_top, 300.0);
    }
}
