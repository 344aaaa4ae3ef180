//! Plain-text intro excerpts.
//!
//! The body is parsed as an HTML fragment, its text nodes joined, entities
//! decoded, and whitespace runs collapsed. The result is cut at a character
//! (not byte) limit and marked with [`ELLIPSIS`] only when something was cut.

use scraper::Html;

pub const ELLIPSIS: &str = "…";

/// Strip markup from `body` and truncate to `max_chars` characters.
pub fn make_intro(body: &str, max_chars: usize) -> String {
    truncate_chars(&strip_markup(body), max_chars)
}

pub fn strip_markup(body: &str) -> String {
    let fragment = Html::parse_fragment(body);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => format!("{}{}", &text[..byte_pos], ELLIPSIS),
        None => text.to_string(),
    }
}
