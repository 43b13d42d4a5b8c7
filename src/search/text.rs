//! Text comparison shared by every predicate that looks at strings.
//!
//! Plain comparisons fold case (when asked to) and then normalize to NFC, so
//! `"Cafe\u{301}"` and `"café"` compare equal. Regexes are compiled with
//! dot-matches-newline, Unicode case-insensitivity when case-insensitive, and
//! canonical equivalence by normalizing both pattern and haystack to NFC.

use std::borrow::Cow;

use regex::{Regex, RegexBuilder};
use unicode_normalization::{IsNormalized, UnicodeNormalization, is_nfc_quick};

use super::error::ParseError;

/// NFC form of `text`, borrowing when it is already normalized.
pub fn nfc(text: &str) -> Cow<'_, str> {
    match is_nfc_quick(text.chars()) {
        IsNormalized::Yes => Cow::Borrowed(text),
        _ => Cow::Owned(text.nfc().collect()),
    }
}

/// Canonical form for substring comparison.
pub fn fold(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        nfc(text)
    } else {
        Cow::Owned(nfc(&text.to_lowercase()).into_owned())
    }
}

/// Substring test on folded text. `needle` must already be folded.
pub fn contains_folded(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    fold(haystack, case_sensitive).contains(needle)
}

/// A user regex compiled once, usable for unanchored search and for whole
/// string matching.
#[derive(Debug, Clone)]
pub struct TextPattern {
    source: String,
    search: Regex,
    whole: Regex,
}

impl TextPattern {
    pub fn compile(pattern: &str, case_sensitive: bool) -> Result<Self, ParseError> {
        let normalized = nfc(pattern);
        let search = build_regex(&normalized, case_sensitive)
            .map_err(|e| wrap_error(&normalized, case_sensitive, &e))?;
        let whole = build_regex(&format!(r"\A(?:{normalized})\z"), case_sensitive)
            .map_err(|e| ParseError::regex(&normalized, None, &e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            search,
            whole,
        })
    }

    /// Pattern found anywhere in `text`.
    pub fn find(&self, text: &str) -> bool {
        self.search.is_match(&nfc(text))
    }

    /// Pattern matches all of `text`.
    pub fn matches_fully(&self, text: &str) -> bool {
        self.whole.is_match(&nfc(text))
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.search.as_str() == other.search.as_str()
    }
}

fn build_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .unicode(true)
        .dot_matches_new_line(true)
        .case_insensitive(!case_sensitive)
        .build()
}

/// Errors carry the NFC pattern, which is the text the offset counts into.
fn wrap_error(normalized: &str, case_sensitive: bool, error: &regex::Error) -> ParseError {
    let offset = match error {
        regex::Error::Syntax(_) => syntax_offset(normalized, case_sensitive),
        _ => None,
    };
    ParseError::regex(normalized, offset, &error.to_string())
}

/// Character offset of a syntax error, as reported by the regex parser.
fn syntax_offset(pattern: &str, case_sensitive: bool) -> Option<usize> {
    let error = regex_syntax::ParserBuilder::new()
        .unicode(true)
        .dot_matches_new_line(true)
        .case_insensitive(!case_sensitive)
        .build()
        .parse(pattern)
        .err()?;
    let byte_offset = match &error {
        regex_syntax::Error::Parse(e) => e.span().start.offset,
        regex_syntax::Error::Translate(e) => e.span().start.offset,
        _ => return None,
    };
    pattern.get(..byte_offset).map(|prefix| prefix.chars().count())
}
