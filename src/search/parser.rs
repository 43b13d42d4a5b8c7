//! Recursive-descent compiler for search expressions.
//!
//! Grammar (in rough EBNF):
//!
//! query      = expression EOF
//! expression = factor ( "OR" expression | expression )?
//! factor     = "(" expression ")"
//!            | "!" factor
//!            | KEY ( "=" value | ":" value | "?" )?
//!
//! Adjacent factors are ANDed. `OR` takes everything to its right as its
//! right operand, so `a b OR c` is `a && (b || c)` and `a OR b c` is
//! `a || (b && c)`.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::model::BoundsSource;

use super::SearchFlags;
use super::error::ParseError;
use super::lexer::{Token, Tokenizer};
use super::predicate::{
    AnyTextMatch, AreaSource, CountDimension, ExactKeyValue, InArea, KeyValueMatch, Predicate,
    Quantifier,
};
use super::range::Range;

/// Compiler state for one query.
pub struct SearchCompiler<'a> {
    flags: SearchFlags,
    bounds: &'a dyn BoundsSource,
    tokenizer: Tokenizer<'a>,
}

/// Turns an optional parse result into a hard error naming what is missing.
fn require(found: Option<Predicate>, error_message: &str) -> Result<Predicate, ParseError> {
    found.ok_or_else(|| ParseError::new(error_message))
}

impl<'a> SearchCompiler<'a> {
    pub fn new(query: &'a str, flags: SearchFlags, bounds: &'a dyn BoundsSource) -> Self {
        Self {
            flags,
            bounds,
            tokenizer: Tokenizer::new(query),
        }
    }

    /// Parse the whole query. Anything left over after the expression is an
    /// error; an empty query matches everything.
    pub fn parse(mut self) -> Result<Predicate, ParseError> {
        let predicate = self.parse_expression()?;
        if !self.tokenizer.read_if_equal(&Token::Eof)? {
            let found = self.tokenizer.next_token()?;
            return Err(ParseError::new(format!("Unexpected token: {found}")));
        }
        Ok(predicate.unwrap_or(Predicate::Always))
    }

    fn parse_expression(&mut self) -> Result<Option<Predicate>, ParseError> {
        let Some(factor) = self.parse_factor()? else {
            return Ok(None);
        };

        if self.tokenizer.read_if_equal(&Token::Or)? {
            let rhs = require(self.parse_expression()?, "Missing parameter for OR")?;
            return Ok(Some(Predicate::or(factor, rhs)));
        }

        match self.parse_expression()? {
            Some(rest) => Ok(Some(Predicate::and(factor, rest))),
            None => Ok(Some(factor)),
        }
    }

    fn parse_factor(&mut self) -> Result<Option<Predicate>, ParseError> {
        if self.tokenizer.read_if_equal(&Token::LeftParen)? {
            let expression = self.parse_expression()?;
            if !self.tokenizer.read_if_equal(&Token::RightParen)? {
                let found = self.tokenizer.next_token()?;
                return Err(ParseError::unexpected(&Token::RightParen, &found));
            }
            return Ok(Some(expression.unwrap_or(Predicate::Always)));
        }

        if self.tokenizer.read_if_equal(&Token::Not)? {
            let inner = require(self.parse_factor()?, "Missing operator for NOT")?;
            return Ok(Some(Predicate::not(inner)));
        }

        match self.tokenizer.read_key()? {
            Some(key) => self.parse_key(key).map(Some),
            None => Ok(None),
        }
    }

    fn parse_key(&mut self, key: String) -> Result<Predicate, ParseError> {
        if self.tokenizer.read_if_equal(&Token::Equals)? {
            let value = self.tokenizer.read_text_or_number()?;
            return match key.as_str() {
                "type" | "user" | "role" => self.parse_kv(&key, value),
                _ => Ok(Predicate::ExactKeyValue(ExactKeyValue::new(
                    &key,
                    value.as_deref(),
                    self.flags.regex,
                    self.flags.case_sensitive,
                )?)),
            };
        }

        if self.tokenizer.read_if_equal(&Token::Colon)? {
            return self.parse_keyword_value(key);
        }

        if self.tokenizer.read_if_equal(&Token::Question)? {
            return Ok(Predicate::BooleanFlag { key, default: false });
        }

        self.parse_bare_keyword(key)
    }

    /// `key:value`, where a handful of keys take numbers or ranges.
    fn parse_keyword_value(&mut self, key: String) -> Result<Predicate, ParseError> {
        match key.as_str() {
            "id" => Ok(Predicate::Id(
                self.tokenizer.read_number("Primitive id expected")?,
            )),
            "tags" => self.count_range(CountDimension::TagCount),
            "nodes" => self.count_range(CountDimension::NodeCount),
            "areasize" => self.count_range(CountDimension::Area),
            "timestamp" => self.parse_timestamp(),
            "changeset" => Ok(Predicate::ChangesetId(
                self.tokenizer.read_number("Changeset id expected")?,
            )),
            "version" => Ok(Predicate::Version(
                self.tokenizer.read_number("Version expected")?,
            )),
            _ => {
                let value = self.tokenizer.read_text_or_number()?;
                self.parse_kv(&key, value)
            }
        }
    }

    fn count_range(&mut self, dimension: CountDimension) -> Result<Predicate, ParseError> {
        let range = self.tokenizer.read_range("Range of numbers expected")?;
        Ok(Predicate::CountRange { dimension, range })
    }

    fn parse_kv(&self, key: &str, value: Option<String>) -> Result<Predicate, ParseError> {
        let value = value.unwrap_or_default();
        match key {
            "type" => Predicate::type_is(&value),
            "user" => Ok(Predicate::user_is(&value)),
            "role" => Ok(Predicate::RoleIs(value)),
            _ => Ok(Predicate::KeyValue(KeyValueMatch::new(
                key,
                &value,
                self.flags.regex,
                self.flags.case_sensitive,
            )?)),
        }
    }

    /// `timestamp:min/max` is a range (either side may be empty);
    /// `timestamp:text` is a substring match on the RFC 3339 timestamp.
    fn parse_timestamp(&mut self) -> Result<Predicate, ParseError> {
        let text = self.tokenizer.read_text_or_number()?.unwrap_or_default();
        let parts: Vec<&str> = text.split('/').map(str::trim).collect();

        match parts.as_slice() {
            [single] => Ok(Predicate::KeyValue(KeyValueMatch::new(
                "timestamp",
                single,
                false,
                self.flags.case_sensitive,
            )?)),
            [min, max] => {
                let start = if min.is_empty() {
                    i64::MIN
                } else {
                    parse_date(min)?
                };
                let end = if max.is_empty() {
                    OffsetDateTime::now_utc().unix_timestamp()
                } else {
                    parse_date(max)?
                };
                Ok(Predicate::CountRange {
                    dimension: CountDimension::Timestamp,
                    range: Range::new(start, end),
                })
            }
            _ => Err(ParseError::new("Expecting min/max after 'timestamp'")),
        }
    }

    fn parse_bare_keyword(&mut self, key: String) -> Result<Predicate, ParseError> {
        let bounds = self.bounds;
        let area = |source, quantifier| {
            Predicate::InArea(InArea::capture(source, quantifier, bounds))
        };

        let predicate = match key.as_str() {
            "new" => Predicate::IsNew,
            "modified" => Predicate::IsModified,
            "incomplete" => Predicate::IsIncomplete,
            "untagged" => Predicate::IsUntagged,
            "selected" => Predicate::IsSelected,
            "closed" => Predicate::IsClosedWay,
            "indownloadedarea" => area(AreaSource::DownloadedArea, Quantifier::Any),
            "allindownloadedarea" => area(AreaSource::DownloadedArea, Quantifier::All),
            "inview" => area(AreaSource::CurrentView, Quantifier::Any),
            "allinview" => area(AreaSource::CurrentView, Quantifier::All),
            "child" => {
                let inner = self.parse_factor()?.unwrap_or(Predicate::Always);
                Predicate::HasChild(Box::new(inner))
            }
            "parent" => {
                let inner = self.parse_factor()?.unwrap_or(Predicate::Always);
                Predicate::HasParent(Box::new(inner))
            }
            _ => Predicate::AnyText(AnyTextMatch::new(
                &key,
                self.flags.regex,
                self.flags.case_sensitive,
            )?),
        };
        Ok(predicate)
    }
}

/// Unix seconds for `YYYY`, `YYYY-MM`, `YYYY-MM-DD` (UTC midnight) or a full
/// RFC 3339 timestamp.
fn parse_date(text: &str) -> Result<i64, ParseError> {
    if let Ok(datetime) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(datetime.unix_timestamp());
    }

    // Missing month and day default to the first.
    let full = match text.matches('-').count() {
        0 => format!("{text}-01-01"),
        1 => format!("{text}-01"),
        _ => text.to_string(),
    };
    let date = Date::parse(&full, format_description!("[year]-[month]-[day]"))
        .map_err(|_| ParseError::new(format!("Invalid date: {text}")))?;
    Ok(date.midnight().assume_utc().unix_timestamp())
}
