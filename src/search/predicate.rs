//! Compiled search predicates.
//!
//! A [`Predicate`] is an immutable tree built once per query. Leaves that
//! compare text carry their flags and any regex, compiled at construction.

use std::fmt;

use crate::model::{Bounds, BoundsSource, Primitive, PrimitiveKind, format_timestamp};

use super::error::ParseError;
use super::range::Range;
use super::text::{self, TextPattern};

/// Root of a compiled search.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches everything (empty query).
    Always,
    Never,
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),

    /// `id:n`; `id:0` matches every new feature.
    Id(i64),
    ChangesetId(i64),
    Version(i64),

    /// `key:value` substring match.
    KeyValue(KeyValueMatch),
    /// `key=value` exact match.
    ExactKeyValue(ExactKeyValue),
    /// `key?`
    BooleanFlag { key: String, default: bool },
    /// Bare word searched in all keys and values.
    AnyText(AnyTextMatch),

    TypeIs(PrimitiveKind),
    /// `None` is the anonymous user.
    UserIs(Option<String>),
    RoleIs(String),

    CountRange {
        dimension: CountDimension,
        range: Range,
    },

    IsNew,
    IsModified,
    IsIncomplete,
    IsUntagged,
    IsSelected,
    IsClosedWay,

    /// Way or relation with a member matching the inner predicate.
    HasChild(Box<Predicate>),
    /// Feature referenced by a way or relation matching the inner predicate.
    HasParent(Box<Predicate>),

    InArea(InArea),
}

impl Predicate {
    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    pub fn and(lhs: Predicate, rhs: Predicate) -> Self {
        Predicate::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Predicate, rhs: Predicate) -> Self {
        Predicate::Or(Box::new(lhs), Box::new(rhs))
    }

    /// `type:<name>`; anything but node, way or relation is rejected.
    pub fn type_is(name: &str) -> Result<Self, ParseError> {
        name.parse::<PrimitiveKind>()
            .map(Predicate::TypeIs)
            .map_err(|_| {
                ParseError::new(format!(
                    "Unknown primitive type: {name}. Allowed values are node, way or relation"
                ))
            })
    }

    pub fn user_is(name: &str) -> Self {
        if name == "anonymous" {
            Predicate::UserIs(None)
        } else {
            Predicate::UserIs(Some(name.to_string()))
        }
    }
}

/// What a [`Predicate::CountRange`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountDimension {
    NodeCount,
    TagCount,
    /// Unix seconds of the last modification.
    Timestamp,
    /// Area of a closed way in square metres.
    Area,
}

impl CountDimension {
    pub fn keyword(&self) -> &'static str {
        match self {
            CountDimension::NodeCount => "nodes",
            CountDimension::TagCount => "tags",
            CountDimension::Timestamp => "timestamp",
            CountDimension::Area => "areasize",
        }
    }
}

/// Substring (or regex search) on one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValueMatch {
    key: String,
    value: String,
    patterns: Option<(TextPattern, TextPattern)>,
    case_sensitive: bool,
}

impl KeyValueMatch {
    pub fn new(
        key: &str,
        value: &str,
        regex_search: bool,
        case_sensitive: bool,
    ) -> Result<Self, ParseError> {
        if regex_search {
            let key_pattern = TextPattern::compile(key, case_sensitive)?;
            let value_pattern = TextPattern::compile(value, case_sensitive)?;
            return Ok(Self {
                key: key.to_string(),
                value: value.to_string(),
                patterns: Some((key_pattern, value_pattern)),
                case_sensitive,
            });
        }

        let key = if case_sensitive {
            key.to_string()
        } else {
            key.to_lowercase()
        };
        Ok(Self {
            key,
            value: text::fold(value, case_sensitive).into_owned(),
            patterns: None,
            case_sensitive,
        })
    }

    pub fn matches<P: Primitive>(&self, osm: &P) -> bool {
        if let Some((key_pattern, value_pattern)) = &self.patterns {
            // A regex key can match any number of tags, so every tag is a candidate.
            return osm
                .tags()
                .any(|(k, v)| key_pattern.find(k) && value_pattern.find(v));
        }

        let contains = |actual: &str| text::contains_folded(actual, &self.value, self.case_sensitive);

        if self.key == "timestamp" {
            return osm
                .timestamp()
                .and_then(format_timestamp)
                .is_some_and(|actual| contains(&actual));
        }

        if self.case_sensitive {
            osm.get(&self.key).is_some_and(contains)
        } else {
            osm.tags()
                .any(|(k, v)| k.to_lowercase() == self.key && contains(v))
        }
    }
}

/// How an [`ExactKeyValue`] compares, fixed by its key and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExactMode {
    /// `*=` : feature has no tags.
    None,
    /// `key=` : feature lacks `key`.
    MissingKey,
    /// `*=*` : feature has some tag.
    Any,
    /// `*=value` : some tag has `value`.
    AnyKey,
    /// `key=*` : `key` is present.
    AnyValue,
    /// `key=value`
    Exact,
}

impl ExactMode {
    pub fn derive(key: &str, value: &str) -> Self {
        match (key, value) {
            ("*", "") => ExactMode::None,
            (_, "") => ExactMode::MissingKey,
            ("*", "*") => ExactMode::Any,
            ("*", _) => ExactMode::AnyKey,
            (_, "*") => ExactMode::AnyValue,
            _ => ExactMode::Exact,
        }
    }
}

/// Exact tag match, or whole-string regex match in regex mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactKeyValue {
    mode: ExactMode,
    key: String,
    value: String,
    key_pattern: Option<TextPattern>,
    value_pattern: Option<TextPattern>,
}

impl ExactKeyValue {
    pub fn new(
        key: &str,
        value: Option<&str>,
        regex_search: bool,
        case_sensitive: bool,
    ) -> Result<Self, ParseError> {
        if key.is_empty() {
            return Err(ParseError::new(
                "Key cannot be empty when tag operator is used. Sample use: key=value",
            ));
        }
        let value = value.unwrap_or("");
        let compile = |text: &str| -> Result<Option<TextPattern>, ParseError> {
            if regex_search && !text.is_empty() && text != "*" {
                TextPattern::compile(text, case_sensitive).map(Some)
            } else {
                Ok(None)
            }
        };

        Ok(Self {
            mode: ExactMode::derive(key, value),
            key: key.to_string(),
            value: value.to_string(),
            key_pattern: compile(key)?,
            value_pattern: compile(value)?,
        })
    }

    pub fn mode(&self) -> ExactMode {
        self.mode
    }

    fn key_matches(&self, key: &str) -> bool {
        match &self.key_pattern {
            Some(pattern) => pattern.matches_fully(key),
            None => key == self.key,
        }
    }

    fn value_matches(&self, value: &str) -> bool {
        match &self.value_pattern {
            Some(pattern) => pattern.matches_fully(value),
            None => value == self.value,
        }
    }

    pub fn matches<P: Primitive>(&self, osm: &P) -> bool {
        if !osm.has_keys() {
            return matches!(self.mode, ExactMode::None | ExactMode::MissingKey);
        }

        match self.mode {
            ExactMode::None => false,
            ExactMode::Any => true,
            ExactMode::MissingKey => match &self.key_pattern {
                Some(_) => !osm.tags().any(|(k, _)| self.key_matches(k)),
                None => osm.get(&self.key).is_none(),
            },
            ExactMode::AnyValue => match &self.key_pattern {
                Some(_) => osm.tags().any(|(k, _)| self.key_matches(k)),
                None => osm.get(&self.key).is_some(),
            },
            ExactMode::AnyKey => osm.tags().any(|(_, v)| self.value_matches(v)),
            ExactMode::Exact => match &self.key_pattern {
                Some(_) => osm
                    .tags()
                    .any(|(k, v)| self.key_matches(k) && self.value_matches(v)),
                None => osm.get(&self.key).is_some_and(|v| self.value_matches(v)),
            },
        }
    }
}

/// Free text searched in every tag key and value.
#[derive(Debug, Clone, PartialEq)]
pub struct AnyTextMatch {
    search: String,
    pattern: Option<TextPattern>,
    case_sensitive: bool,
}

impl AnyTextMatch {
    pub fn new(search: &str, regex_search: bool, case_sensitive: bool) -> Result<Self, ParseError> {
        let pattern = if regex_search {
            Some(TextPattern::compile(search, case_sensitive)?)
        } else {
            None
        };
        let search = if regex_search {
            text::nfc(search).into_owned()
        } else {
            text::fold(search, case_sensitive).into_owned()
        };
        Ok(Self {
            search,
            pattern,
            case_sensitive,
        })
    }

    pub fn matches<P: Primitive>(&self, osm: &P) -> bool {
        // Only an anonymous untagged feature matches the empty text.
        if !osm.has_keys() {
            return self.search.is_empty() && osm.user().is_none();
        }

        osm.tags().any(|(key, value)| match &self.pattern {
            Some(pattern) => pattern.find(key) || pattern.find(value),
            None => {
                text::contains_folded(key, &self.search, self.case_sensitive)
                    || text::contains_folded(value, &self.search, self.case_sensitive)
            }
        })
    }
}

/// Where an [`InArea`] takes its bounds from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaSource {
    DownloadedArea,
    CurrentView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// One constituent point inside suffices.
    Any,
    /// Every constituent point must be inside.
    All,
}

/// Spatial containment against bounds captured at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct InArea {
    source: AreaSource,
    quantifier: Quantifier,
    bounds: Option<Bounds>,
}

impl InArea {
    /// Snapshots the current bounds of `source` so a whole scan sees the
    /// same area.
    pub fn capture(source: AreaSource, quantifier: Quantifier, provider: &dyn BoundsSource) -> Self {
        let bounds = match source {
            AreaSource::DownloadedArea => provider.downloaded_area(),
            AreaSource::CurrentView => provider.current_view(),
        };
        if bounds.is_none() {
            tracing::debug!("Search: no bounds for {:?}, area keyword matches nothing", source);
        }
        Self {
            source,
            quantifier,
            bounds,
        }
    }

    pub fn source(&self) -> AreaSource {
        self.source
    }

    pub fn quantifier(&self) -> Quantifier {
        self.quantifier
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    fn keyword(&self) -> &'static str {
        match (self.source, self.quantifier) {
            (AreaSource::DownloadedArea, Quantifier::Any) => "indownloadedarea",
            (AreaSource::DownloadedArea, Quantifier::All) => "allindownloadedarea",
            (AreaSource::CurrentView, Quantifier::Any) => "inview",
            (AreaSource::CurrentView, Quantifier::All) => "allinview",
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => write!(f, "always"),
            Predicate::Never => write!(f, "never"),
            Predicate::Not(inner) => write!(f, "!{inner}"),
            Predicate::And(lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            Predicate::Or(lhs, rhs) => write!(f, "({lhs} || {rhs})"),
            Predicate::Id(id) => write!(f, "id:{id}"),
            Predicate::ChangesetId(id) => write!(f, "changeset:{id}"),
            Predicate::Version(version) => write!(f, "version:{version}"),
            Predicate::KeyValue(kv) => write!(f, "{}:{}", kv.key, kv.value),
            Predicate::ExactKeyValue(kv) => write!(f, "{}={}", kv.key, kv.value),
            Predicate::BooleanFlag { key, .. } => write!(f, "{key}?"),
            Predicate::AnyText(any) => write!(f, "{}", any.search),
            Predicate::TypeIs(kind) => write!(f, "type:{kind}"),
            Predicate::UserIs(user) => write!(f, "user:{}", user.as_deref().unwrap_or("anonymous")),
            Predicate::RoleIs(role) => write!(f, "role:{role}"),
            Predicate::CountRange { dimension, range } => {
                write!(f, "{}:{}", dimension.keyword(), range)
            }
            Predicate::IsNew => write!(f, "new"),
            Predicate::IsModified => write!(f, "modified"),
            Predicate::IsIncomplete => write!(f, "incomplete"),
            Predicate::IsUntagged => write!(f, "untagged"),
            Predicate::IsSelected => write!(f, "selected"),
            Predicate::IsClosedWay => write!(f, "closed"),
            Predicate::HasChild(inner) => write!(f, "child({inner})"),
            Predicate::HasParent(inner) => write!(f, "parent({inner})"),
            Predicate::InArea(area) => write!(f, "{}", area.keyword()),
        }
    }
}
