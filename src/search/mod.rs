//! JOSM-style search expressions over OSM features.
//!
//! Syntax:
//!   word                    - word appears in any tag key or value
//!   key:value               - value appears in the value of `key`
//!   key=value               - exact tag match (`*` for any key or value)
//!   key=                    - `key` is absent (`*=` : no tags at all)
//!   key?                    - `key` is a true-ish OSM boolean
//!   "quoted text"           - one word, may contain spaces and operators
//!   a b                     - AND
//!   a OR b                  - OR (everything to the right is the operand)
//!   !a                      - NOT
//!   (a)                     - grouping
//!   type:node|way|relation  user:name  role:name
//!   id:n  changeset:n  version:n
//!   nodes:a-b  tags:a-b  areasize:a-b  timestamp:min/max
//!   new  modified  incomplete  untagged  selected  closed
//!   child X  parent X
//!   inview  allinview  indownloadedarea  allindownloadedarea
//!
//! With regex mode on, every text operand is a regular expression.

mod error;
mod eval;
mod lexer;
mod parser;
mod predicate;
mod range;
mod text;

pub use error::ParseError;
pub use eval::evaluate;
pub use lexer::{Token, Tokenizer};
pub use parser::SearchCompiler;
pub use predicate::*;
pub use range::Range;

use crate::model::{BoundsSource, NoBounds};

/// Per-search options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchFlags {
    /// Compare text case-sensitively.
    pub case_sensitive: bool,
    /// Treat every text operand as a regular expression.
    pub regex: bool,
}

impl SearchFlags {
    pub fn new(case_sensitive: bool, regex: bool) -> Self {
        Self {
            case_sensitive,
            regex,
        }
    }
}

/// Compile `query` without any map bounds; area keywords match nothing.
pub fn compile(query: &str, flags: SearchFlags) -> Result<Predicate, ParseError> {
    compile_with_bounds(query, flags, &NoBounds)
}

/// Compile `query`, capturing the downloaded area and view of `bounds` for
/// the area keywords.
pub fn compile_with_bounds(
    query: &str,
    flags: SearchFlags,
    bounds: &dyn BoundsSource,
) -> Result<Predicate, ParseError> {
    let predicate = SearchCompiler::new(query, flags, bounds).parse()?;
    tracing::debug!("Search: compiled {:?} as {} ({:?})", query, predicate, flags);
    Ok(predicate)
}
