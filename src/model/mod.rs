//! Read-only capability traits the search core consumes.
//!
//! The search compiler never owns map data. It sees features through
//! [`Primitive`], viewport and downloaded-area bounds through
//! [`BoundsSource`], and the live selection through [`Selection`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// The three OSM primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Node,
    Way,
    Relation,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::Node => "node",
            PrimitiveKind::Way => "way",
            PrimitiveKind::Relation => "relation",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrimitiveKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "node" => Ok(PrimitiveKind::Node),
            "way" => Ok(PrimitiveKind::Way),
            "relation" => Ok(PrimitiveKind::Relation),
            _ => Err(format!("invalid primitive type: {value}")),
        }
    }
}

/// Kind plus id; unique within a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId {
    pub kind: PrimitiveKind,
    pub id: i64,
}

impl PrimitiveId {
    pub fn new(kind: PrimitiveKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Parses `node/1`, `way/-5`, ...
impl FromStr for PrimitiveId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, id) = value
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("expected <type>/<id>, got '{value}'"))?;
        let kind = kind.parse()?;
        let id = id
            .parse::<i64>()
            .map_err(|e| format!("invalid id in '{value}': {e}"))?;
        Ok(PrimitiveId { kind, id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned lat/lon bounding box. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bounds {
    pub minlat: f64,
    pub minlon: f64,
    pub maxlat: f64,
    pub maxlon: f64,
}

impl Bounds {
    pub fn new(minlat: f64, minlon: f64, maxlat: f64, maxlon: f64) -> Self {
        Self {
            minlat: minlat.min(maxlat),
            minlon: minlon.min(maxlon),
            maxlat: minlat.max(maxlat),
            maxlon: minlon.max(maxlon),
        }
    }

    pub fn contains(&self, coor: LatLon) -> bool {
        coor.lat >= self.minlat
            && coor.lat <= self.maxlat
            && coor.lon >= self.minlon
            && coor.lon <= self.maxlon
    }

    /// Smallest box covering both.
    pub fn extend(&self, other: &Bounds) -> Bounds {
        Bounds {
            minlat: self.minlat.min(other.minlat),
            minlon: self.minlon.min(other.minlon),
            maxlat: self.maxlat.max(other.maxlat),
            maxlon: self.maxlon.max(other.maxlon),
        }
    }
}

/// Parses `minlat,minlon,maxlat,maxlon`.
impl FromStr for Bounds {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid bounds '{value}': {e}"))?;
        match parts.as_slice() {
            [minlat, minlon, maxlat, maxlon] => Ok(Bounds::new(*minlat, *minlon, *maxlat, *maxlon)),
            _ => Err(format!(
                "invalid bounds '{value}': expected minlat,minlon,maxlat,maxlon"
            )),
        }
    }
}

/// RFC 3339 rendering used wherever a timestamp is compared as text.
pub fn format_timestamp(timestamp: OffsetDateTime) -> Option<String> {
    timestamp.format(&Rfc3339).ok()
}

/// A relation member as seen by the search core.
#[derive(Debug, Clone)]
pub struct Member<P> {
    pub role: Option<String>,
    pub member: P,
}

/// A map feature: node, way or relation.
///
/// Implementations are cheap handles (typically a reference into a dataset);
/// navigation methods hand out further handles of the same type.
pub trait Primitive: Sized {
    fn kind(&self) -> PrimitiveKind;

    fn unique_id(&self) -> i64;

    fn primitive_id(&self) -> PrimitiveId {
        PrimitiveId::new(self.kind(), self.unique_id())
    }

    fn version(&self) -> i64;

    fn changeset_id(&self) -> i64;

    fn timestamp(&self) -> Option<OffsetDateTime>;

    fn user(&self) -> Option<&str>;

    /// All tags as `(key, value)` pairs.
    fn tags(&self) -> impl Iterator<Item = (&str, &str)>;

    fn get(&self, key: &str) -> Option<&str>;

    fn has_keys(&self) -> bool;

    /// Whether the feature carries tags that count as "tagged" for the
    /// `untagged` keyword.
    fn is_tagged(&self) -> bool {
        self.has_keys()
    }

    fn is_new(&self) -> bool;

    fn is_modified(&self) -> bool;

    fn is_incomplete(&self) -> bool;

    fn is_deleted(&self) -> bool;

    fn is_usable(&self) -> bool {
        !self.is_deleted() && !self.is_incomplete()
    }

    /// Node coordinate; `None` for ways, relations, and nodes without one.
    fn coor(&self) -> Option<LatLon>;

    /// Ordered way nodes; empty for non-ways.
    fn way_nodes(&self) -> Vec<Self>;

    /// `true` for ways whose first and last node are the same.
    fn is_closed(&self) -> bool;

    /// Ordered relation members; empty for non-relations.
    fn members(&self) -> Vec<Member<Self>>;

    /// Ways and relations referencing this feature.
    fn referrers(&self) -> Vec<Self>;
}

/// Provider of the bounding boxes `InArea` predicates capture.
pub trait BoundsSource {
    fn downloaded_area(&self) -> Option<Bounds>;

    fn current_view(&self) -> Option<Bounds>;
}

/// No downloaded area, no map view.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBounds;

impl BoundsSource for NoBounds {
    fn downloaded_area(&self) -> Option<Bounds> {
        None
    }

    fn current_view(&self) -> Option<Bounds> {
        None
    }
}

/// Fixed bounds, e.g. from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticBounds {
    pub downloaded: Option<Bounds>,
    pub view: Option<Bounds>,
}

impl BoundsSource for StaticBounds {
    fn downloaded_area(&self) -> Option<Bounds> {
        self.downloaded
    }

    fn current_view(&self) -> Option<Bounds> {
        self.view
    }
}

/// The editor's current selection, consulted at evaluation time.
pub trait Selection {
    fn is_selected(&self, id: PrimitiveId) -> bool;
}

/// Nothing is selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySelection;

impl Selection for EmptySelection {
    fn is_selected(&self, _id: PrimitiveId) -> bool {
        false
    }
}

impl Selection for HashSet<PrimitiveId> {
    fn is_selected(&self, id: PrimitiveId) -> bool {
        self.contains(&id)
    }
}
