//! Tokenizer for search expressions.
//!
//! Tokens are produced lazily with a single token of pushback, which is all
//! the recursive-descent parser needs. Whitespace separates tokens.
//! `(`, `)`, `=`, `:` and `?` are always structural, `!` only when it starts
//! a token, and the bare word `OR` is the disjunction. A double-quoted
//! string is one key token and may contain spaces and operators; inside it
//! `\"` and `\\` are the only escapes.

use std::fmt;

use winnow::combinator::{alt, opt};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use super::error::ParseError;
use super::range::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Any literal word or quoted string.
    Key(String),

    Equals,     // =
    Colon,      // :
    Question,   // ?
    Not,        // !
    Or,         // OR
    LeftParen,  // (
    RightParen, // )

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Key(text) => write!(f, "'{text}'"),
            Token::Equals => write!(f, "'='"),
            Token::Colon => write!(f, "':'"),
            Token::Question => write!(f, "'?'"),
            Token::Not => write!(f, "'!'"),
            Token::Or => write!(f, "'OR'"),
            Token::LeftParen => write!(f, "'('"),
            Token::RightParen => write!(f, "')'"),
            Token::Eof => write!(f, "<end of input>"),
        }
    }
}

type PResult<T> = Result<T, winnow::error::ErrMode<winnow::error::ContextError>>;

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '=' | ':' | '?' | '"')
}

/// A plain word, or `OR`.
fn lex_word(input: &mut &str) -> PResult<Token> {
    let word = take_while(1.., |c: char| !is_delimiter(c)).parse_next(input)?;
    if word == "OR" {
        Ok(Token::Or)
    } else {
        Ok(Token::Key(word.to_string()))
    }
}

/// A double-quoted key. An unterminated quote runs to the end of input.
fn lex_quoted(input: &mut &str) -> PResult<Token> {
    '"'.parse_next(input)?;
    let mut text = String::new();
    loop {
        let chunk = take_while(0.., |c: char| c != '"' && c != '\\').parse_next(input)?;
        text.push_str(chunk);
        match opt(any).parse_next(input)? {
            None | Some('"') => return Ok(Token::Key(text)),
            Some(_) => match opt(one_of(['"', '\\'])).parse_next(input)? {
                Some(escaped) => text.push(escaped),
                None => text.push('\\'),
            },
        }
    }
}

fn lex_token(input: &mut &str) -> PResult<Token> {
    take_while(0.., char::is_whitespace).parse_next(input)?;

    if input.is_empty() {
        return Ok(Token::Eof);
    }

    alt((
        '('.value(Token::LeftParen),
        ')'.value(Token::RightParen),
        '!'.value(Token::Not),
        '='.value(Token::Equals),
        ':'.value(Token::Colon),
        '?'.value(Token::Question),
        lex_quoted,
        lex_word,
    ))
    .parse_next(input)
}

/// Pull tokenizer with one token of lookahead.
pub struct Tokenizer<'a> {
    remaining: &'a str,
    current: Option<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            remaining: input,
            current: None,
        }
    }

    fn lex(&mut self) -> Result<Token, ParseError> {
        let before = self.remaining;
        lex_token(&mut self.remaining)
            .map_err(|e| ParseError::new(format!("Unable to read token at '{before}': {e:?}")))
    }

    /// The next token without consuming it.
    pub fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.current.is_none() {
            self.current = Some(self.lex()?);
        }
        Ok(self.current.get_or_insert(Token::Eof))
    }

    /// Consumes and returns the next token. Keeps returning [`Token::Eof`]
    /// once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        match self.current.take() {
            Some(token) => Ok(token),
            None => self.lex(),
        }
    }

    /// Consumes the next token iff it equals `expected`.
    pub fn read_if_equal(&mut self, expected: &Token) -> Result<bool, ParseError> {
        if self.peek()? == expected {
            self.current = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes the next token iff it is a key and returns its text.
    pub fn read_key(&mut self) -> Result<Option<String>, ParseError> {
        if matches!(self.peek()?, Token::Key(_)) {
            if let Some(Token::Key(text)) = self.current.take() {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    /// The next literal as raw text, quoted or not; `None` if the next token
    /// is not a literal.
    pub fn read_text_or_number(&mut self) -> Result<Option<String>, ParseError> {
        self.read_key()
    }

    /// Reads an integer literal, failing with `error_message` otherwise.
    pub fn read_number(&mut self, error_message: &str) -> Result<i64, ParseError> {
        self.read_key()?
            .and_then(|text| text.trim().parse::<i64>().ok())
            .ok_or_else(|| ParseError::new(error_message))
    }

    /// Reads a numeric range literal, failing with `error_message` otherwise.
    pub fn read_range(&mut self, error_message: &str) -> Result<Range, ParseError> {
        self.read_key()?
            .and_then(|text| Range::parse(&text))
            .ok_or_else(|| ParseError::new(error_message))
    }
}
