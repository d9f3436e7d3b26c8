//! Highlighting of matched fragments in the full-text field

use super::fuzzy::fuzzy_matches;

pub const PRE_TAG: &str = "<mark>";
pub const POST_TAG: &str = "</mark>";

/// Wrap every word of `text` that fuzzily matches one of `query_terms` in
/// [`PRE_TAG`]/[`POST_TAG`].
///
/// `query_terms` must already be analyzed (lower-cased). Returns `None`
/// when nothing matches.
pub fn highlight(text: &str, query_terms: &[String]) -> Option<String> {
    if text.is_empty() || query_terms.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut matched = false;
    let mut last = 0;

    for (start, end) in word_spans(text) {
        let word = text[start..end].to_lowercase();
        if query_terms.iter().any(|term| fuzzy_matches(term, &word)) {
            out.push_str(&text[last..start]);
            out.push_str(PRE_TAG);
            out.push_str(&text[start..end]);
            out.push_str(POST_TAG);
            last = end;
            matched = true;
        }
    }

    if !matched {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

/// Byte spans of alphanumeric runs
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        match (ch.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}
