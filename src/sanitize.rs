//! Cell-text cleanup for upstream title/description fields.
//!
//! Upstream descriptions carry raw HTML, and spreadsheet cells reject most
//! ASCII control characters. [`clean_text`] handles both.

use scraper::Html;

/// Inputs longer than this (in chars) are parsed as markup even without a `<`.
const MARKUP_LENGTH_THRESHOLD: usize = 100;

/// Strips markup (when the input looks like markup) and control characters.
///
/// The markup heuristic is deliberately loose: anything over
/// [`MARKUP_LENGTH_THRESHOLD`] chars or containing `<` goes through the HTML
/// parser, whose visible text nodes are trimmed and concatenated.
#[must_use]
pub fn clean_text(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let text = if looks_like_markup(input) {
        visible_text(input)
    } else {
        input.to_owned()
    };

    strip_control_chars(&text)
}

pub fn looks_like_markup(input: &str) -> bool {
    input.contains('<') || input.chars().count() > MARKUP_LENGTH_THRESHOLD
}

fn visible_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Control characters a spreadsheet cell cannot hold (tab, LF and CR are fine).
pub fn is_forbidden_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}')
}

#[must_use]
pub fn strip_control_chars(input: &str) -> String {
    input.chars().filter(|c| !is_forbidden_control(*c)).collect()
}
