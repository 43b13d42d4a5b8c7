//! The single error type of the search compiler.

use super::lexer::Token;

/// Syntax or regex failure while compiling a search expression.
///
/// Everything the compiler rejects ends up here with a message meant for
/// the person who typed the query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
    pattern: Option<String>,
    offset: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            pattern: None,
            offset: None,
        }
    }

    /// Structural mismatch: the parser needed `expected` but saw `found`.
    pub fn unexpected(expected: &Token, found: &Token) -> Self {
        Self::new(format!(
            "Unexpected token. Expected {expected}, found {found}"
        ))
    }

    /// A regex that failed to compile. `offset` is a character offset into
    /// `pattern` when the engine could point at the problem.
    pub fn regex(pattern: &str, offset: Option<usize>, detail: &str) -> Self {
        let message = match offset {
            Some(offset) => format!(
                "The regex \"{pattern}\" had a parse error at offset {offset}, full error:\n\n{detail}"
            ),
            None => format!("The regex \"{pattern}\" had a parse error, full error:\n\n{detail}"),
        };
        Self {
            message,
            pattern: Some(pattern.to_string()),
            offset,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending regex, for regex failures.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }
}
