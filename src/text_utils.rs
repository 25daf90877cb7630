//! Text cleanup helpers for recognized OCR text.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static RE_WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize recognized text for display and hand-off.
///
/// Applies NFC composition, turns control characters that are whitespace
/// (tabs, line breaks) into spaces, drops every other non-printing character
/// (controls, zero-width and format characters), collapses whitespace runs to
/// a single space and trims both ends.
pub fn sanitize_text(text: &str) -> String {
    let printable: String = text
        .nfc()
        .filter_map(|ch| {
            if ch.is_whitespace() {
                Some(' ')
            } else if ch.is_control() || is_invisible_format(ch) {
                None
            } else {
                Some(ch)
            }
        })
        .collect();
    RE_WHITESPACE_RUN
        .replace_all(&printable, " ")
        .trim()
        .to_string()
}

fn is_invisible_format(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
    )
}

#[cfg(test)]
mod tests {
    use super::sanitize_text;

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(sanitize_text("  hello \t\n  world  "), "hello world");
    }

    #[test]
    fn strips_non_printing_characters() {
        assert_eq!(sanitize_text("he\u{0007}llo\u{200B} wor\u{FEFF}ld"), "hello world");
    }

    #[test]
    fn composes_decomposed_accents() {
        assert_eq!(sanitize_text("cafe\u{0301}"), "caf\u{00E9}");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(sanitize_text(" \u{0000} "), "");
    }
}
