//! Link and media rewriting for rendered answers.
//!
//! Answers come back from the markdown parser as HTML that may contain
//! anchors, bare URLs and `[embed]` markers. [`rewrite_links`] turns media
//! URLs into native embeds, forces every remaining link to open in a new
//! browsing context, and converts bare URLs found in text into the same
//! markup. The input tree is never mutated while it is walked; a new tree is
//! built and serialised instead.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::markdown::escape_html;

/// Returned in place of an empty answer.
pub const FALLBACK_TEXT: &str = "Please try again";

const LINK_STYLE: &str = "color: #0000FF; text-decoration: underline;";
const MAX_DEPTH: usize = 256;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];
/// Elements whose subtree is copied through untouched.
const OPAQUE_ELEMENTS: &[&str] = &["iframe", "video", "script", "style"];
const MEDIA_ELEMENTS: &[&str] = &["img", "video", "iframe"];

static PAREN_BEFORE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*((?:https?://|www\.)\S+)").expect("valid regex"));
static EMBED_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\[embed\]\s*<a\s+href="([^"]+)"[^>]*>[\s\S]*?</a>"#).expect("valid regex")
});
static EMBED_RAW_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[embed\][\s:]*((?:https?://|www\.)[^\s<]+)").expect("valid regex")
});
static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:https?://|www\.)[^\s<]+").expect("valid regex"));
static YOUTUBE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtube\.com/(?:watch\?v=|embed/)|youtu\.be/)([a-zA-Z0-9_-]{11})")
        .expect("valid regex")
});
static VIDEO_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(mp4|webm|ogv)$").expect("valid regex"));
static IMAGE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpeg|jpg|gif|png|webp|svg)$").expect("valid regex"));

/// Failures of the tree-level pass. Never surfaced to callers.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RewriteError {
    #[error("markup nested deeper than {0} elements")]
    TooDeep(usize),
}

/// Rewrite links and media in an HTML fragment.
///
/// Empty input yields [`FALLBACK_TEXT`]. If the fragment cannot be walked,
/// the text is returned with only the string-level rewrites applied.
///
/// # Example
/// ```
/// use qachat::rewrite::rewrite_links;
///
/// let html = rewrite_links("Check this out: https://example.com/video.mp4");
/// assert!(html.contains("<video controls"));
/// assert!(!html.contains("<a "));
/// ```
pub fn rewrite_links(html: &str) -> String {
    if html.trim().is_empty() {
        return FALLBACK_TEXT.to_string();
    }

    let text = rewrite_embed_markers(html);
    match rewrite_tree(&text) {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!(error = %e, "link rewrite degraded to string pass");
            text
        }
    }
}

fn rewrite_embed_markers(html: &str) -> String {
    let text = PAREN_BEFORE_URL.replace_all(html, "${1}");
    let text = EMBED_ANCHOR.replace_all(&text, |caps: &Captures| forced_embed(caps[1].trim()));
    let text = EMBED_RAW_URL.replace_all(&text, |caps: &Captures| {
        let (url, _) = clean_url(&caps[1]);
        forced_embed(&url)
    });
    text.into_owned()
}

fn rewrite_tree(html: &str) -> Result<String, RewriteError> {
    let nodes = parse_fragment(html)?;
    let nodes = rewrite_nodes(nodes);
    let mut out = String::with_capacity(html.len() + html.len() / 2);
    write_nodes(&nodes, &mut out);
    Ok(out)
}

/// Markup for a URL the author explicitly asked to embed.
fn forced_embed(url: &str) -> String {
    format!(
        r#"<iframe width="660" height="415" src="{url}" frameborder="0" allowfullscreen style="max-width: 100%; margin-top: 5px;"></iframe><br>{}"#,
        plain_link(url)
    )
}

fn plain_link(url: &str) -> String {
    format!(r#"<a href="{url}" target="_blank" rel="noopener noreferrer" style="{LINK_STYLE}">{url}</a>"#)
}

/// Embed markup for a media URL, or a plain link for anything else.
pub fn embed_url(url: &str) -> String {
    if is_youtube(url) {
        return format!(
            r#"<iframe width="560" height="315" src="{}" frameborder="0" allow="accelerometer; autoplay; encrypted-media; gyroscope; picture-in-picture" allowfullscreen style="max-width: 100%; border-radius: 8px; margin-top: 5px;"></iframe>"#,
            youtube_embed_url(url)
        );
    }

    if let Some(caps) = VIDEO_EXTENSION.captures(url) {
        let extension = caps[1].to_ascii_lowercase();
        let video_type = if extension == "ogv" { "ogg" } else { extension.as_str() };
        return format!(
            r#"<video controls width="560" height="315" style="max-width: 100%; border-radius: 8px; margin-top: 5px;"><source src="{url}" type="video/{video_type}">Your browser does not support the video tag.</video>"#
        );
    }

    if IMAGE_EXTENSION.is_match(url) {
        let filename = url.rsplit('/').next().unwrap_or_default();
        let alt = if filename.is_empty() {
            "Displayed image".to_string()
        } else {
            let decoded = urlencoding::decode(filename)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| filename.to_string());
            format!("Image: {}", escape_html(&decoded))
        };
        return format!(
            r#"<img src="{url}" alt="{alt}" style="max-width: 100%; height: auto; border-radius: 8px; margin-top: 5px;">"#
        );
    }

    plain_link(url)
}

fn is_youtube(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

fn is_media_url(url: &str) -> bool {
    is_youtube(url) || VIDEO_EXTENSION.is_match(url) || IMAGE_EXTENSION.is_match(url)
}

fn youtube_embed_url(url: &str) -> String {
    match YOUTUBE_ID.captures(url) {
        Some(caps) => format!("https://www.youtube.com/embed/{}", &caps[1]),
        None => url.to_string(),
    }
}

/// Strip wrapping punctuation from a URL matched in prose.
///
/// Returns the URL, with `http://` prepended when it had no scheme, and the
/// trailing punctuation that was removed.
fn clean_url(raw: &str) -> (String, &str) {
    let trimmed = raw.trim().trim_start_matches('(');
    let cleaned = trimmed.trim_end_matches(&[')', '.', ',', '!', '?'][..]);
    let trailing = &trimmed[cleaned.len()..];
    let url = if cleaned.starts_with("http") {
        cleaned.to_string()
    } else {
        format!("http://{}", cleaned)
    };
    (url, trailing)
}

// --- Fragment tree ---

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Element(Element),
    Text(String),
    /// Markup copied verbatim: comments, doctypes, generated embeds
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    attrs: Vec<(String, Option<String>)>,
    children: Vec<Node>,
    self_closing: bool,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    fn set_attr(&mut self, name: &str, value: String) {
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = Some(value),
            None => self.attrs.push((name.to_string(), Some(value))),
        }
    }

    fn contains_media(&self) -> bool {
        self.children.iter().any(|child| match child {
            Node::Element(el) => MEDIA_ELEMENTS.contains(&el.name.as_str()) || el.contains_media(),
            _ => false,
        })
    }
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<Element>,
}

impl TreeBuilder {
    fn children(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(el) => &mut el.children,
            None => &mut self.root,
        }
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let children = self.children();
        if let Some(Node::Text(previous)) = children.last_mut() {
            previous.push_str(text);
        } else {
            children.push(Node::Text(text.to_string()));
        }
    }

    fn raw(&mut self, markup: &str) {
        if !markup.is_empty() {
            self.children().push(Node::Raw(markup.to_string()));
        }
    }

    fn open(&mut self, el: Element) -> Result<(), RewriteError> {
        if el.self_closing || VOID_ELEMENTS.contains(&el.name.as_str()) {
            self.children().push(Node::Element(el));
            return Ok(());
        }
        if self.open.len() >= MAX_DEPTH {
            return Err(RewriteError::TooDeep(MAX_DEPTH));
        }
        self.open.push(el);
        Ok(())
    }

    /// Close the innermost open element named `name`, along with anything
    /// left open inside it. Stray closing tags are dropped.
    fn close(&mut self, name: &str) {
        if let Some(idx) = self.open.iter().rposition(|el| el.name == name) {
            while self.open.len() > idx {
                self.pop();
            }
        }
    }

    fn pop(&mut self) {
        if let Some(el) = self.open.pop() {
            self.children().push(Node::Element(el));
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.open.is_empty() {
            self.pop();
        }
        self.root
    }
}

fn parse_fragment(input: &str) -> Result<Vec<Node>, RewriteError> {
    let mut builder = TreeBuilder::default();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < input.len() {
        let Some(offset) = input[pos..].find('<') else {
            builder.text(&input[pos..]);
            break;
        };
        builder.text(&input[pos..pos + offset]);
        pos += offset;

        let rest = &input[pos..];
        if rest.starts_with("<!--") {
            let end = rest.find("-->").map_or(rest.len(), |i| i + 3);
            builder.raw(&rest[..end]);
            pos += end;
        } else if rest.starts_with("</") {
            match rest.find('>') {
                Some(end) => {
                    let name = rest[2..end]
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_ascii_lowercase();
                    builder.close(&name);
                    pos += end + 1;
                }
                None => {
                    builder.raw(&escape_html(rest));
                    pos = input.len();
                }
            }
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest.find('>').map_or(rest.len(), |i| i + 1);
            builder.raw(&rest[..end]);
            pos += end;
        } else if bytes.get(pos + 1).is_some_and(u8::is_ascii_alphabetic) {
            match parse_tag(rest) {
                Some((el, consumed)) => {
                    pos += consumed;
                    let raw_text =
                        !el.self_closing && RAW_TEXT_ELEMENTS.contains(&el.name.as_str());
                    let closing = format!("</{}", el.name);
                    builder.open(el)?;
                    if raw_text {
                        let remaining = &input[pos..];
                        let end = remaining
                            .to_ascii_lowercase()
                            .find(&closing)
                            .unwrap_or(remaining.len());
                        builder.raw(&remaining[..end]);
                        pos += end;
                    }
                }
                None => {
                    builder.raw(&escape_html(rest));
                    pos = input.len();
                }
            }
        } else {
            builder.text("<");
            pos += 1;
        }
    }

    Ok(builder.finish())
}

/// Parse an opening tag at the start of `input`.
///
/// Returns the element and the number of bytes consumed, or `None` when the
/// tag is never closed by `>`.
fn parse_tag(input: &str) -> Option<(Element, usize)> {
    let bytes = input.as_bytes();
    let mut i = 1;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'>' | b'/') {
        i += 1;
    }
    let name = input[1..i].to_ascii_lowercase();
    let mut attrs = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match *bytes.get(i)? {
            b'>' => return Some((element(name, attrs, false), i + 1)),
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Some((element(name, attrs, true), i + 2))
            }
            b'/' | b'=' => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let key = input[start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            attrs.push((key, None));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = match *bytes.get(i)? {
            quote @ (b'"' | b'\'') => {
                let end = i + 1 + input[i + 1..].find(quote as char)?;
                let value = input[i + 1..end].to_string();
                i = end + 1;
                value
            }
            _ => {
                let start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                input[start..i].to_string()
            }
        };
        attrs.push((key, Some(value)));
    }
}

fn element(name: String, attrs: Vec<(String, Option<String>)>, self_closing: bool) -> Element {
    Element {
        name,
        attrs,
        children: Vec::new(),
        self_closing,
    }
}

// --- Rewriting ---

fn rewrite_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Text(text) => out.extend(link_text(&text)),
            Node::Element(el) if el.name == "a" => out.push(rewrite_anchor(el)),
            Node::Element(el) if OPAQUE_ELEMENTS.contains(&el.name.as_str()) => {
                out.push(Node::Element(el))
            }
            Node::Element(mut el) => {
                el.children = rewrite_nodes(std::mem::take(&mut el.children));
                out.push(Node::Element(el));
            }
            raw @ Node::Raw(_) => out.push(raw),
        }
    }
    out
}

fn rewrite_anchor(mut anchor: Element) -> Node {
    if let Some(href) = anchor.attr("href") {
        if is_media_url(href) && !anchor.contains_media() {
            return Node::Raw(embed_url(href));
        }
    }

    let style = match anchor.attr("style") {
        Some(existing) if existing.contains(LINK_STYLE) => existing.to_string(),
        Some(existing) if !existing.trim().is_empty() => {
            format!("{}; {}", existing.trim().trim_end_matches(';'), LINK_STYLE)
        }
        _ => LINK_STYLE.to_string(),
    };
    anchor.set_attr("style", style);
    anchor.set_attr("target", "_blank".to_string());
    anchor.set_attr("rel", "noopener noreferrer".to_string());
    Node::Element(anchor)
}

/// Split a text node around the bare URLs it contains.
fn link_text(text: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut last = 0;

    for found in BARE_URL.find_iter(text) {
        if found.start() > last {
            nodes.push(Node::Text(text[last..found.start()].to_string()));
        }
        let (url, trailing) = clean_url(found.as_str());
        nodes.push(Node::Raw(embed_url(&url)));
        if !trailing.is_empty() {
            nodes.push(Node::Text(trailing.to_string()));
        }
        last = found.end();
    }

    if last < text.len() {
        nodes.push(Node::Text(text[last..].to_string()));
    }
    nodes
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) | Node::Raw(text) => out.push_str(text),
            Node::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (key, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(key);
                    if let Some(value) = value {
                        out.push_str("=\"");
                        out.push_str(&value.replace('"', "&quot;"));
                        out.push('"');
                    }
                }
                if el.self_closing {
                    out.push_str(" />");
                    continue;
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.name.as_str()) {
                    continue;
                }
                write_nodes(&el.children, out);
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_falls_back() {
        assert_eq!(rewrite_links(""), FALLBACK_TEXT);
        assert_eq!(rewrite_links("  \n "), FALLBACK_TEXT);
    }

    #[test]
    fn test_bare_video_url_becomes_video() {
        let html = rewrite_links("Check this out: https://example.com/video.mp4");
        assert!(html.starts_with("Check this out: <video controls"));
        assert!(html.contains(r#"<source src="https://example.com/video.mp4" type="video/mp4">"#));
        assert!(!html.contains("<a "));
    }

    #[test]
    fn test_embed_marker_with_raw_url() {
        let html = rewrite_links("[embed] www.example.com");
        assert!(html.contains(r#"<iframe width="660" height="415" src="http://www.example.com""#));
        assert!(html.contains(r#"<a href="http://www.example.com""#));
        assert!(html.contains("<br>"));
        assert!(!html.contains("[embed]"));
    }

    #[test]
    fn test_embed_marker_with_anchor() {
        let html = rewrite_links(
            r#"<p>[embed] <a href="https://maps.example.com/park">Riverside Park</a></p>"#,
        );
        assert!(html.contains(r#"<iframe width="660" height="415" src="https://maps.example.com/park""#));
        assert!(html.contains(r#">https://maps.example.com/park</a>"#));
        assert!(!html.contains("Riverside Park"));
    }

    #[test]
    fn test_anchor_gets_safe_attributes() {
        let html = rewrite_links(r#"<p>See <a href="https://wichita.gov">the city site</a>.</p>"#);
        assert_eq!(
            html,
            format!(
                r#"<p>See <a href="https://wichita.gov" style="{LINK_STYLE}" target="_blank" rel="noopener noreferrer">the city site</a>.</p>"#
            )
        );
    }

    #[test]
    fn test_anchor_to_image_is_embedded() {
        let html = rewrite_links(r#"<a href="https://example.com/img/Park%20Map.png">map</a>"#);
        assert!(html.starts_with("<img src=\"https://example.com/img/Park%20Map.png\""));
        assert!(html.contains(r#"alt="Image: Park Map.png""#));
    }

    #[test]
    fn test_anchor_wrapping_media_is_kept() {
        let html = rewrite_links(
            r#"<a href="https://example.com/a.png"><img src="https://example.com/a.png" alt="a" /></a>"#,
        );
        assert!(html.starts_with(r#"<a href="https://example.com/a.png""#));
        assert!(html.contains(r#"target="_blank""#));
        assert_eq!(html.matches("<img").count(), 1);
    }

    #[test]
    fn test_youtube_link_is_embedded() {
        let html = rewrite_links("Watch https://www.youtube.com/watch?v=dQw4w9WgXcQ today");
        assert!(html.contains(r#"src="https://www.youtube.com/embed/dQw4w9WgXcQ""#));
        assert!(html.ends_with(" today"));
    }

    #[test]
    fn test_trailing_punctuation_stays_in_text() {
        let html = rewrite_links("<p>Apply at www.example.com/apply.</p>");
        assert!(html.contains(r#"<a href="http://www.example.com/apply""#));
        assert!(html.ends_with("</a>.</p>"));
    }

    #[test]
    fn test_parenthesised_url() {
        let html = rewrite_links("Forms (https://example.com/forms) are online");
        assert!(html.contains(r#"href="https://example.com/forms""#));
        assert!(!html.contains("(https"));
    }

    #[test]
    fn test_urls_in_opaque_elements_untouched() {
        let input = r#"<script>var u = "https://example.com/a.mp4";</script><style>/* https://x.io */</style>"#;
        assert_eq!(rewrite_links(input), input);
    }

    #[test]
    fn test_ogv_maps_to_ogg() {
        let html = embed_url("https://example.com/clip.OGV");
        assert!(html.contains(r#"type="video/ogg""#));
    }

    #[test]
    fn test_markup_without_links_is_preserved() {
        let input = "<h2>Hours</h2>\n<ul>\n<li>Mon &amp; Tue</li>\n</ul>\n<!-- note --><hr />";
        assert_eq!(rewrite_links(input), input);
    }

    #[test]
    fn test_unclosed_elements_are_closed() {
        assert_eq!(rewrite_links("<p><em>partial"), "<p><em>partial</em></p>");
    }

    #[test]
    fn test_unterminated_tag_is_escaped_not_linked() {
        let html = rewrite_links(r#"<a href="https://x.io/a.png""#);
        assert_eq!(html, "&lt;a href=&quot;https://x.io/a.png&quot;");

        let html = rewrite_links(r#"<p>See https://example.com</p></p"#);
        assert!(html.starts_with(r#"<p>See <a href="https://example.com""#));
        assert!(html.ends_with("</p>&lt;/p"));
    }

    #[test]
    fn test_deep_nesting_degrades_to_string_pass() {
        let input = format!("{}text", "<div>".repeat(MAX_DEPTH + 1));
        assert_eq!(parse_fragment(&input), Err(RewriteError::TooDeep(MAX_DEPTH)));
        assert_eq!(rewrite_links(&input), input);
    }

    #[test]
    fn test_clean_url() {
        assert_eq!(clean_url("((www.example.com)."), ("http://www.example.com".to_string(), ")."));
        assert_eq!(clean_url("https://a.io/x?"), ("https://a.io/x".to_string(), "?"));
    }
}
