//! Markdown to HTML conversion.
//!
//! Two modes are offered: a full-document parse used for finished blocks and
//! the final render, and an inline-only parse used while a paragraph is still
//! being streamed.

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use pulldown_cmark_escape as escape;

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Render a complete markdown document.
pub fn to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, parser_options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Render markdown without emitting any block-level element.
///
/// Inline formatting (emphasis, code spans, links, images) is kept. Block
/// structure is flattened: block tags are dropped, and the inline content of
/// consecutive blocks is separated by a line break character. Code block
/// contents come through as escaped text.
pub fn to_inline_html(markdown: &str) -> String {
    let mut events = Vec::new();
    let mut pending_break = false;

    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Start(ref tag) if !is_inline_tag(tag) => {
                pending_break = !events.is_empty();
            }
            Event::End(ref tag) if !is_inline_tag_end(tag) => {
                pending_break = !events.is_empty();
            }
            Event::Rule | Event::TaskListMarker(_) => {}
            event => {
                if pending_break {
                    events.push(Event::SoftBreak);
                    pending_break = false;
                }
                events.push(event);
            }
        }
    }

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

fn is_inline_tag(tag: &Tag) -> bool {
    matches!(
        tag,
        Tag::Emphasis
            | Tag::Strong
            | Tag::Strikethrough
            | Tag::Link { .. }
            | Tag::Image { .. }
    )
}

fn is_inline_tag_end(tag: &TagEnd) -> bool {
    matches!(
        tag,
        TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link | TagEnd::Image
    )
}

/// Escape text for inclusion in HTML content or a double-quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // writing into a String cannot fail
    let _ = escape::escape_html(&mut out, text);
    out
}
