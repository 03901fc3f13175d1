//! Sentence-aligned chunking.
//!
//! Used twice in the pipeline: once on the candidate document (small chunks, one search per
//! chunk) and once on every fetched page (larger segments that chunks are scored against).

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split `text` into sentence-like units.
///
/// A unit is a run of text followed by one or more terminal punctuation characters; a trailing
/// unterminated fragment is its own unit. Punctuation with no text before it stays with the
/// following unit. Units are trimmed and empty units are dropped.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut has_body = false;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if !is_terminal(c) {
            if !c.is_whitespace() {
                has_body = true;
            }
            continue;
        }
        // Consume the whole punctuation run ("?!", "...").
        let mut end = i + c.len_utf8();
        while let Some(&(j, c2)) = iter.peek() {
            if !is_terminal(c2) {
                break;
            }
            end = j + c2.len_utf8();
            iter.next();
        }
        if has_body {
            let unit = text[start..end].trim();
            if !unit.is_empty() {
                out.push(unit);
            }
            start = end;
            has_body = false;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Greedily pack sentences into chunks of at most `max_len` characters.
///
/// `max_len` is a soft cap: a single sentence longer than it is emitted whole, never split.
/// Empty or whitespace-only input yields no chunks.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for unit in sentences(text) {
        let unit_chars = unit.chars().count();
        if buf.is_empty() {
            buf.push_str(unit);
            buf_chars = unit_chars;
            continue;
        }
        if buf_chars + 1 + unit_chars > max_len {
            chunks.push(std::mem::take(&mut buf));
            buf.push_str(unit);
            buf_chars = unit_chars;
        } else {
            buf.push(' ');
            buf.push_str(unit);
            buf_chars += 1 + unit_chars;
        }
    }
    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

/// `chunk` for optional input; `None` behaves like empty text.
pub fn chunk_opt(text: Option<&str>, max_len: usize) -> Vec<String> {
    text.map(|t| chunk(t, max_len)).unwrap_or_default()
}
