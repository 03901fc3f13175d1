//! Visible-text extraction from fetched bodies.

use html_scraper::{ElementRef, Html, Node, Selector};

/// Subtrees that never contribute visible article text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "header", "footer", "nav", "form", "svg",
    "template", "head",
];

/// Elements that separate words even when the markup has no whitespace between them.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre", "section",
    "table", "td", "th", "tr", "ul",
];

pub fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort guess for whether bytes are HTML-ish.
pub fn bytes_look_like_html(bytes: &[u8]) -> bool {
    let mut i = 0usize;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let rest = &bytes[i..];
    let head = &rest[..rest.len().min(16)];
    let lc = head.to_ascii_lowercase();
    lc.starts_with(b"<!doctype")
        || lc.starts_with(b"<html")
        || lc.starts_with(b"<head")
        || lc.starts_with(b"<body")
        || lc.starts_with(b"<!--")
}

enum Step<'a> {
    Open(ElementRef<'a>),
    Text(&'a str),
    Space,
}

/// Depth-first walk with an explicit stack; page nesting depth is attacker-controlled.
fn collect_visible(root: ElementRef<'_>, out: &mut String) {
    let mut stack = vec![Step::Open(root)];
    while let Some(step) = stack.pop() {
        let el = match step {
            Step::Text(t) => {
                out.push_str(t);
                continue;
            }
            Step::Space => {
                out.push(' ');
                continue;
            }
            Step::Open(el) => el,
        };
        // Pushed in reverse so children pop in document order.
        let children: Vec<_> = el.children().collect();
        for child in children.into_iter().rev() {
            match child.value() {
                Node::Text(t) => stack.push(Step::Text(&**t)),
                Node::Element(e) => {
                    let name = e.name();
                    if SKIP_TAGS.contains(&name) {
                        continue;
                    }
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let block = BLOCK_TAGS.contains(&name);
                    if block {
                        stack.push(Step::Space);
                    }
                    stack.push(Step::Open(child_el));
                    if block {
                        stack.push(Step::Space);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Visible body text of an HTML document, whitespace-normalized.
pub fn html_visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut raw = String::with_capacity(html.len() / 2);
    let body = Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next());
    match body {
        Some(b) => collect_visible(b, &mut raw),
        None => collect_visible(doc.root_element(), &mut raw),
    }
    norm_ws(&raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Html,
    Text,
    Unsupported,
}

/// Classify a response body by content type, sniffing when the header is missing or generic.
pub fn body_kind(content_type: Option<&str>, bytes: &[u8]) -> BodyKind {
    let ct = content_type
        .map(|s| s.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();
    match ct.as_str() {
        "text/html" | "application/xhtml+xml" => BodyKind::Html,
        "text/plain" => BodyKind::Text,
        "" | "application/octet-stream" => {
            if bytes_look_like_html(bytes) {
                BodyKind::Html
            } else if std::str::from_utf8(bytes).is_ok() && !bytes.contains(&0) {
                BodyKind::Text
            } else {
                BodyKind::Unsupported
            }
        }
        _ => BodyKind::Unsupported,
    }
}

/// Extract normalized visible text; unsupported bodies yield an empty string.
pub fn page_text(content_type: Option<&str>, bytes: &[u8]) -> String {
    match body_kind(content_type, bytes) {
        BodyKind::Html => html_visible_text(&String::from_utf8_lossy(bytes)),
        BodyKind::Text => norm_ws(&String::from_utf8_lossy(bytes)),
        BodyKind::Unsupported => String::new(),
    }
}
