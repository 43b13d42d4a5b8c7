//! Numeric ranges for `nodes:`, `tags:` and `areasize:`.

use std::fmt;

/// Closed interval of integers with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    start: i64,
    end: i64,
}

impl Range {
    /// Builds a range, swapping the bounds if given in reverse.
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.start && value <= self.end
    }

    /// Parses `value`, `min-max`, `min-` or `-max`. An open bound extends to
    /// the limit of `i64`. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.split_once('-') {
            None => {
                let value = parse_bound(text)?;
                Some(Range::new(value, value))
            }
            Some((min, max)) => {
                let min = min.trim();
                let max = max.trim();
                match (min.is_empty(), max.is_empty()) {
                    (true, true) => None,
                    (true, false) => Some(Range::new(i64::MIN, parse_bound(max)?)),
                    (false, true) => Some(Range::new(parse_bound(min)?, i64::MAX)),
                    (false, false) => Some(Range::new(parse_bound(min)?, parse_bound(max)?)),
                }
            }
        }
    }
}

fn parse_bound(text: &str) -> Option<i64> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
