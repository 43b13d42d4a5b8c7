//! In-memory OSM dataset loaded from OSM API 0.6 JSON.
//!
//! Features are stored in one flat table and reference each other by table
//! index. Way nodes and relation members that the file references but does
//! not contain become incomplete placeholders, so every reference resolves.

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::model::{Bounds, BoundsSource, LatLon, Member, Primitive, PrimitiveId, PrimitiveKind};

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    bounds: Option<Bounds>,
    #[serde(default)]
    elements: Vec<RawElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Modify,
    Delete,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    kind: PrimitiveKind,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    nodes: Vec<i64>,
    #[serde(default)]
    members: Vec<RawMember>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    version: i64,
    #[serde(default)]
    changeset: i64,
    timestamp: Option<String>,
    user: Option<String>,
    visible: Option<bool>,
    action: Option<Action>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(rename = "type")]
    kind: PrimitiveKind,
    #[serde(rename = "ref")]
    reference: i64,
    #[serde(default)]
    role: String,
}

#[derive(Debug)]
struct Entity {
    id: PrimitiveId,
    version: i64,
    changeset: i64,
    timestamp: Option<OffsetDateTime>,
    user: Option<String>,
    tags: BTreeMap<String, String>,
    coor: Option<LatLon>,
    nodes: Vec<usize>,
    members: Vec<(Option<String>, usize)>,
    referrers: Vec<usize>,
    modified: bool,
    deleted: bool,
    incomplete: bool,
}

impl Entity {
    fn from_raw(raw: &RawElement) -> Result<Self> {
        let id = PrimitiveId::new(raw.kind, raw.id);
        let timestamp = raw
            .timestamp
            .as_deref()
            .map(|t| OffsetDateTime::parse(t, &Rfc3339))
            .transpose()
            .with_context(|| format!("Dataset: Invalid timestamp on {}", id))?;
        let coor = match (raw.kind, raw.lat, raw.lon) {
            (PrimitiveKind::Node, Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)),
            _ => None,
        };
        let deleted = raw.action == Some(Action::Delete) || raw.visible == Some(false);

        Ok(Self {
            id,
            version: raw.version,
            changeset: raw.changeset,
            timestamp,
            user: raw.user.clone(),
            tags: raw.tags.clone(),
            coor,
            nodes: Vec::new(),
            members: Vec::new(),
            referrers: Vec::new(),
            modified: raw.action.is_some(),
            deleted,
            incomplete: false,
        })
    }

    fn placeholder(id: PrimitiveId) -> Self {
        Self {
            id,
            version: 0,
            changeset: 0,
            timestamp: None,
            user: None,
            tags: BTreeMap::new(),
            coor: None,
            nodes: Vec::new(),
            members: Vec::new(),
            referrers: Vec::new(),
            modified: false,
            deleted: false,
            incomplete: true,
        }
    }
}

/// Loaded features plus the bounds the file declared.
#[derive(Debug, Default)]
pub struct DataSet {
    bounds: Option<Bounds>,
    entities: Vec<Entity>,
    index: HashMap<PrimitiveId, usize>,
}

impl DataSet {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Dataset: Failed to read {:?}", path))?;
        let dataset = Self::from_json_str(&text)
            .with_context(|| format!("Dataset: Failed to load {:?}", path))?;
        tracing::info!(
            "Dataset: {} features from {:?} ({} incomplete)",
            dataset.len(),
            path,
            dataset.entities.iter().filter(|e| e.incomplete).count()
        );
        Ok(dataset)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: RawDocument =
            serde_json::from_str(text).context("Dataset: Invalid OSM JSON")?;

        let mut dataset = DataSet {
            bounds: document.bounds,
            ..Default::default()
        };

        // First pass: every element gets a slot so references can resolve.
        for raw in &document.elements {
            let id = PrimitiveId::new(raw.kind, raw.id);
            if dataset.index.contains_key(&id) {
                bail!("Dataset: Duplicate element {}", id);
            }
            let entity = Entity::from_raw(raw)?;
            dataset.index.insert(id, dataset.entities.len());
            dataset.entities.push(entity);
        }

        for raw in &document.elements {
            let owner = dataset.index[&PrimitiveId::new(raw.kind, raw.id)];
            let nodes: Vec<usize> = raw
                .nodes
                .iter()
                .map(|&node| dataset.resolve(PrimitiveId::new(PrimitiveKind::Node, node)))
                .collect();
            let members: Vec<(Option<String>, usize)> = raw
                .members
                .iter()
                .map(|m| {
                    let role = (!m.role.is_empty()).then(|| m.role.clone());
                    (role, dataset.resolve(PrimitiveId::new(m.kind, m.reference)))
                })
                .collect();

            for &child in nodes.iter().chain(members.iter().map(|(_, child)| child)) {
                let referrers = &mut dataset.entities[child].referrers;
                if !referrers.contains(&owner) {
                    referrers.push(owner);
                }
            }

            let entity = &mut dataset.entities[owner];
            entity.nodes = nodes;
            entity.members = members;
        }

        Ok(dataset)
    }

    /// Table index of `id`, adding an incomplete placeholder when missing.
    fn resolve(&mut self, id: PrimitiveId) -> usize {
        if let Some(&index) = self.index.get(&id) {
            return index;
        }
        let index = self.entities.len();
        self.entities.push(Entity::placeholder(id));
        self.index.insert(id, index);
        index
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The `bounds` element of the file, if any.
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn get(&self, id: PrimitiveId) -> Option<PrimitiveRef<'_>> {
        self.index.get(&id).map(|&index| self.at(index))
    }

    /// Every feature in load order, placeholders and deleted ones included.
    pub fn primitives(&self) -> impl Iterator<Item = PrimitiveRef<'_>> {
        (0..self.entities.len()).map(move |index| self.at(index))
    }

    /// Parallel counterpart of [`DataSet::primitives`].
    pub fn par_primitives(&self) -> impl ParallelIterator<Item = PrimitiveRef<'_>> {
        (0..self.entities.len())
            .into_par_iter()
            .map(move |index| self.at(index))
    }

    fn at(&self, index: usize) -> PrimitiveRef<'_> {
        PrimitiveRef { data: self, index }
    }
}

impl BoundsSource for DataSet {
    fn downloaded_area(&self) -> Option<Bounds> {
        self.bounds
    }

    fn current_view(&self) -> Option<Bounds> {
        None
    }
}

/// Borrowed handle to one feature of a [`DataSet`].
#[derive(Clone, Copy)]
pub struct PrimitiveRef<'a> {
    data: &'a DataSet,
    index: usize,
}

impl<'a> PrimitiveRef<'a> {
    fn entity(&self) -> &'a Entity {
        &self.data.entities[self.index]
    }

    fn handle(&self, index: usize) -> Self {
        self.data.at(index)
    }
}

impl std::fmt::Debug for PrimitiveRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrimitiveRef({})", self.entity().id)
    }
}

impl Primitive for PrimitiveRef<'_> {
    fn kind(&self) -> PrimitiveKind {
        self.entity().id.kind
    }

    fn unique_id(&self) -> i64 {
        self.entity().id.id
    }

    fn version(&self) -> i64 {
        self.entity().version
    }

    fn changeset_id(&self) -> i64 {
        self.entity().changeset
    }

    fn timestamp(&self) -> Option<OffsetDateTime> {
        self.entity().timestamp
    }

    fn user(&self) -> Option<&str> {
        self.entity().user.as_deref()
    }

    fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entity()
            .tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.entity().tags.get(key).map(String::as_str)
    }

    fn has_keys(&self) -> bool {
        !self.entity().tags.is_empty()
    }

    fn is_new(&self) -> bool {
        self.entity().id.id < 0
    }

    fn is_modified(&self) -> bool {
        self.entity().modified
    }

    fn is_incomplete(&self) -> bool {
        self.entity().incomplete
    }

    fn is_deleted(&self) -> bool {
        self.entity().deleted
    }

    fn coor(&self) -> Option<LatLon> {
        self.entity().coor
    }

    fn way_nodes(&self) -> Vec<Self> {
        self.entity().nodes.iter().map(|&i| self.handle(i)).collect()
    }

    fn is_closed(&self) -> bool {
        let nodes = &self.entity().nodes;
        self.kind() == PrimitiveKind::Way && nodes.len() >= 3 && nodes.first() == nodes.last()
    }

    fn members(&self) -> Vec<Member<Self>> {
        self.entity()
            .members
            .iter()
            .map(|(role, i)| Member {
                role: role.clone(),
                member: self.handle(*i),
            })
            .collect()
    }

    fn referrers(&self) -> Vec<Self> {
        self.entity()
            .referrers
            .iter()
            .map(|&i| self.handle(i))
            .collect()
    }
}
