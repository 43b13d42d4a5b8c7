//! Evaluator for compiled predicates.

use std::collections::HashSet;

use crate::geometry::closed_way_area;
use crate::model::{Bounds, Primitive, PrimitiveId, PrimitiveKind, Selection};

use super::predicate::{CountDimension, InArea, Predicate, Quantifier};

/// Evaluate a predicate against one feature.
///
/// `selection` is read live; it is the only input besides `osm` that can
/// change the result between two calls.
pub fn evaluate<P: Primitive>(predicate: &Predicate, osm: &P, selection: &dyn Selection) -> bool {
    match predicate {
        Predicate::Always => true,
        Predicate::Never => false,
        Predicate::Not(inner) => !evaluate(inner, osm, selection),
        Predicate::And(lhs, rhs) => evaluate(lhs, osm, selection) && evaluate(rhs, osm, selection),
        Predicate::Or(lhs, rhs) => evaluate(lhs, osm, selection) || evaluate(rhs, osm, selection),

        Predicate::Id(0) => osm.is_new(),
        Predicate::Id(id) => osm.unique_id() == *id,
        Predicate::ChangesetId(id) => osm.changeset_id() == *id,
        Predicate::Version(version) => osm.version() == *version,

        Predicate::KeyValue(kv) => kv.matches(osm),
        Predicate::ExactKeyValue(kv) => kv.matches(osm),
        Predicate::BooleanFlag { key, default } => osm
            .get(key)
            .and_then(parse_osm_boolean)
            .unwrap_or(*default),
        Predicate::AnyText(any) => any.matches(osm),

        Predicate::TypeIs(kind) => osm.kind() == *kind,
        Predicate::UserIs(user) => osm.user() == user.as_deref(),
        Predicate::RoleIs(role) => has_role(osm, role),

        Predicate::CountRange { dimension, range } => {
            count(*dimension, osm).is_some_and(|value| range.contains(value))
        }

        Predicate::IsNew => osm.is_new(),
        Predicate::IsModified => osm.is_modified() || osm.is_new(),
        Predicate::IsIncomplete => osm.is_incomplete(),
        Predicate::IsUntagged => !osm.is_tagged() && !osm.is_incomplete(),
        Predicate::IsSelected => selection.is_selected(osm.primitive_id()),
        Predicate::IsClosedWay => osm.kind() == PrimitiveKind::Way && osm.is_closed(),

        Predicate::HasChild(inner) => match osm.kind() {
            PrimitiveKind::Node => false,
            PrimitiveKind::Way => osm
                .way_nodes()
                .iter()
                .any(|node| evaluate(inner, node, selection)),
            PrimitiveKind::Relation => osm
                .members()
                .iter()
                .any(|member| evaluate(inner, &member.member, selection)),
        },
        Predicate::HasParent(inner) => osm
            .referrers()
            .iter()
            .any(|parent| evaluate(inner, parent, selection)),

        Predicate::InArea(area) => in_area(area, osm),
    }
}

impl Predicate {
    /// Shorthand for [`evaluate`].
    pub fn matches<P: Primitive>(&self, osm: &P, selection: &dyn Selection) -> bool {
        evaluate(self, osm, selection)
    }
}

/// OSM boolean tag values; `None` for anything unrecognized.
fn parse_osm_boolean(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn has_role<P: Primitive>(osm: &P, role: &str) -> bool {
    let id = osm.primitive_id();
    osm.referrers()
        .iter()
        .filter(|r| r.kind() == PrimitiveKind::Relation && !r.is_incomplete() && !r.is_deleted())
        .any(|relation| {
            relation.members().iter().any(|m| {
                m.member.primitive_id() == id && m.role.as_deref().unwrap_or("") == role
            })
        })
}

/// The measured quantity, or `None` when it does not apply to this feature.
fn count<P: Primitive>(dimension: CountDimension, osm: &P) -> Option<i64> {
    match dimension {
        CountDimension::NodeCount => {
            (osm.kind() == PrimitiveKind::Way).then(|| osm.way_nodes().len() as i64)
        }
        CountDimension::TagCount => Some(osm.tags().count() as i64),
        CountDimension::Timestamp => osm.timestamp().map(|t| t.unix_timestamp()),
        CountDimension::Area => {
            if osm.kind() != PrimitiveKind::Way || !osm.is_closed() {
                return None;
            }
            let coords = osm
                .way_nodes()
                .iter()
                .map(Primitive::coor)
                .collect::<Option<Vec<_>>>()?;
            closed_way_area(&coords).map(|area| area as i64)
        }
    }
}

fn in_area<P: Primitive>(area: &InArea, osm: &P) -> bool {
    let Some(bounds) = area.bounds() else {
        return false;
    };
    let mut visited = HashSet::new();
    inside(osm, &bounds, area.quantifier(), &mut visited)
}

fn inside<P: Primitive>(
    osm: &P,
    bounds: &Bounds,
    quantifier: Quantifier,
    visited: &mut HashSet<PrimitiveId>,
) -> bool {
    if !osm.is_usable() {
        return false;
    }

    match osm.kind() {
        PrimitiveKind::Node => osm.coor().is_some_and(|coor| bounds.contains(coor)),
        PrimitiveKind::Way => {
            let nodes = osm.way_nodes();
            match quantifier {
                Quantifier::Any => nodes.iter().any(|n| inside(n, bounds, quantifier, visited)),
                Quantifier::All => nodes.iter().all(|n| inside(n, bounds, quantifier, visited)),
            }
        }
        PrimitiveKind::Relation => {
            // Relation cycles: a relation seen before contributes nothing.
            if !visited.insert(osm.primitive_id()) {
                return quantifier == Quantifier::All;
            }
            let members = osm.members();
            match quantifier {
                Quantifier::Any => members
                    .iter()
                    .any(|m| inside(&m.member, bounds, quantifier, visited)),
                Quantifier::All => members
                    .iter()
                    .all(|m| inside(&m.member, bounds, quantifier, visited)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DataSet, PrimitiveRef};
    use crate::model::{EmptySelection, LatLon, Member, PrimitiveId, PrimitiveKind, StaticBounds};
    use time::OffsetDateTime;
    use crate::search::{SearchFlags, compile, compile_with_bounds};

    fn fixture() -> DataSet {
        DataSet::from_json_str(
            r#"{
              "version": "0.6",
              "bounds": {"minlat": 0.0, "minlon": 0.0, "maxlat": 1.0, "maxlon": 1.0},
              "elements": [
                {"type": "node", "id": 1, "lat": 0.5, "lon": 0.5, "version": 3, "changeset": 77,
                 "user": "alice", "timestamp": "2010-06-01T12:00:00Z",
                 "tags": {"amenity": "cafe", "Name": "Café Central", "wheelchair": "Yes"}},
                {"type": "node", "id": 2, "lat": 0.0, "lon": 0.0001, "version": 1, "changeset": 78},
                {"type": "node", "id": 3, "lat": 0.0001, "lon": 0.0001, "version": 1, "changeset": 78},
                {"type": "node", "id": 4, "lat": 5.0, "lon": 5.0, "version": 1, "changeset": 78,
                 "user": "bob", "tags": {"highway": "crossing", "note": "line one\nline two"}},
                {"type": "node", "id": -1, "lat": 0.2, "lon": 0.2},
                {"type": "node", "id": 6, "lat": 0.3, "lon": 0.3, "action": "delete"},
                {"type": "way", "id": 10, "nodes": [2, 3, 1, 2], "version": 2,
                 "timestamp": "2015-01-01T00:00:00Z",
                 "tags": {"building": "yes", "name": "Block"}},
                {"type": "way", "id": 11, "nodes": [1, 4], "version": 1,
                 "tags": {"highway": "primary", "lanes": "2"}},
                {"type": "way", "id": 12, "nodes": [], "action": "modify"},
                {"type": "way", "id": 13, "nodes": [1, 99]},
                {"type": "relation", "id": 20, "version": 1,
                 "members": [
                   {"type": "way", "ref": 11, "role": "outer"},
                   {"type": "node", "ref": 1, "role": ""},
                   {"type": "relation", "ref": 21, "role": "sub"}
                 ],
                 "tags": {"type": "multipolygon"}},
                {"type": "relation", "id": 21,
                 "members": [{"type": "relation", "ref": 20, "role": "loop"}],
                 "tags": {"type": "site"}}
              ]
            }"#,
        )
        .unwrap()
    }

    fn matching(dataset: &DataSet, query: &str) -> Vec<String> {
        matching_with(dataset, query, SearchFlags::default())
    }

    fn matching_with(dataset: &DataSet, query: &str, flags: SearchFlags) -> Vec<String> {
        let predicate = compile_with_bounds(query, flags, dataset).unwrap();
        let mut ids: Vec<String> = dataset
            .primitives()
            .filter(|p| predicate.matches(p, &EmptySelection))
            .map(|p| p.primitive_id().to_string())
            .collect();
        ids.sort();
        ids
    }

    fn all_ids(dataset: &DataSet) -> Vec<String> {
        let mut ids: Vec<String> = dataset
            .primitives()
            .map(|p| p.primitive_id().to_string())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let data = fixture();
        assert_eq!(matching(&data, ""), all_ids(&data));
    }

    #[test]
    fn test_type() {
        let data = fixture();
        assert_eq!(matching(&data, "type:relation"), vec!["relation/20", "relation/21"]);
        assert!(
            matching(&data, "type:node")
                .iter()
                .all(|id| id.starts_with("node/"))
        );
    }

    #[test]
    fn test_and_or() {
        let data = fixture();
        assert_eq!(matching(&data, "highway amenity"), Vec::<String>::new());
        assert_eq!(
            matching(&data, "amenity=cafe OR highway=primary"),
            vec!["node/1", "way/11"]
        );
        assert_eq!(matching(&data, "highway lanes:2"), vec!["way/11"]);
    }

    #[test]
    fn test_double_negation() {
        let data = fixture();
        for query in ["amenity", "closed", "type:way", "new"] {
            assert_eq!(
                matching(&data, &format!("!!{query}")),
                matching(&data, query),
                "{query}"
            );
        }
    }

    #[test]
    fn test_exact_key_value_modes() {
        let data = fixture();
        assert_eq!(matching(&data, "highway=*"), vec!["node/4", "way/11"]);
        assert_eq!(matching(&data, "*=primary"), vec!["way/11"]);
        assert_eq!(
            matching(&data, "*=*"),
            vec!["node/1", "node/4", "relation/20", "relation/21", "way/10", "way/11"]
        );
        assert_eq!(matching(&data, "highway=prim"), Vec::<String>::new());

        let untagged: Vec<String> = matching(&data, "*=");
        assert!(untagged.contains(&"node/2".to_string()));
        assert!(!untagged.contains(&"node/1".to_string()));

        let lacking = matching(&data, "highway=");
        assert!(lacking.contains(&"node/1".to_string()));
        assert!(lacking.contains(&"node/2".to_string()));
        assert!(!lacking.contains(&"way/11".to_string()));
    }

    #[test]
    fn test_exact_key_value_is_case_sensitive_literal() {
        let data = fixture();
        assert_eq!(matching(&data, "amenity=CAFE"), Vec::<String>::new());
        assert_eq!(matching(&data, "name=Block"), vec!["way/10"]);
    }

    #[test]
    fn test_exact_key_value_regex() {
        let data = fixture();
        let regex = SearchFlags::new(false, true);
        assert_eq!(
            matching_with(&data, "high.*=prim.*", regex),
            vec!["way/11"]
        );
        assert_eq!(matching_with(&data, "high=*", regex), Vec::<String>::new());
        assert_eq!(matching_with(&data, "high.*=*", regex), vec!["node/4", "way/11"]);
        assert_eq!(matching_with(&data, "*=cross.*", regex), vec!["node/4"]);
        assert!(!matching_with(&data, "high.*=", regex).contains(&"way/11".to_string()));
    }

    #[test]
    fn test_exact_key_value_regex_case() {
        let data = DataSet::from_json_str(
            r#"{"elements": [{"type": "node", "id": 1, "tags": {"Highway": "Primary"}}]}"#,
        )
        .unwrap();
        let folded = SearchFlags::new(false, true);
        let sensitive = SearchFlags::new(true, true);
        assert_eq!(matching_with(&data, "highway=primary", folded), vec!["node/1"]);
        assert_eq!(matching_with(&data, "highway=primary", sensitive), Vec::<String>::new());
        assert_eq!(matching_with(&data, "Highway=Primary", sensitive), vec!["node/1"]);
    }

    #[test]
    fn test_substring_is_unicode_and_case_insensitive() {
        let data = fixture();
        assert_eq!(matching(&data, "name:CAFÉ"), vec!["node/1"]);
        assert_eq!(matching(&data, "name:cafe\u{301}"), vec!["node/1"]);
        assert_eq!(matching(&data, "café"), vec!["node/1"]);

        let sensitive = SearchFlags::new(true, false);
        assert_eq!(matching_with(&data, "Name:Café", sensitive), vec!["node/1"]);
        assert_eq!(matching_with(&data, "name:Café", sensitive), Vec::<String>::new());
        assert_eq!(matching_with(&data, "CAFÉ", sensitive), Vec::<String>::new());
    }

    #[test]
    fn test_regex_substring() {
        let data = fixture();
        let regex = SearchFlags::new(false, true);
        assert_eq!(matching_with(&data, "^am.*:caf", regex), vec!["node/1"]);
        assert_eq!(matching_with(&data, "one.line", regex), vec!["node/4"]);
        assert_eq!(matching_with(&data, "CENTRAL$", regex), vec!["node/1"]);
    }

    #[test]
    fn test_any_text_on_untagged() {
        let data = fixture();
        assert!(!matching(&data, "yes").contains(&"node/2".to_string()));
        assert!(matching(&data, "\"\"").contains(&"node/2".to_string()));
    }

    #[test]
    fn test_empty_text_skips_features_with_user() {
        let data = DataSet::from_json_str(
            r#"{"elements": [
              {"type": "node", "id": 1, "user": "dora"},
              {"type": "node", "id": 2}
            ]}"#,
        )
        .unwrap();
        assert_eq!(matching(&data, "\"\""), vec!["node/2"]);
    }

    #[test]
    fn test_boolean_flag() {
        let data = fixture();
        assert_eq!(matching(&data, "wheelchair?"), vec!["node/1"]);
        assert_eq!(matching(&data, "building?"), vec!["way/10"]);
        assert_eq!(matching(&data, "amenity?"), Vec::<String>::new());
    }

    #[test]
    fn test_metadata() {
        let data = fixture();
        assert_eq!(matching(&data, "id:11"), vec!["way/11"]);
        assert_eq!(matching(&data, "id:0"), vec!["node/-1"]);
        assert_eq!(matching(&data, "changeset:77"), vec!["node/1"]);
        assert_eq!(matching(&data, "version:2"), vec!["way/10"]);
        assert_eq!(matching(&data, "user:alice"), vec!["node/1"]);
        assert!(matching(&data, "user:anonymous").contains(&"node/2".to_string()));
        assert!(!matching(&data, "user:anonymous").contains(&"node/1".to_string()));
    }

    #[test]
    fn test_timestamps() {
        let data = fixture();
        assert_eq!(matching(&data, "timestamp:2010/2011"), vec!["node/1"]);
        assert_eq!(matching(&data, "timestamp:2012/"), vec!["way/10"]);
        assert_eq!(matching(&data, "timestamp:/2012-01-01"), vec!["node/1"]);
        assert_eq!(matching(&data, "timestamp:2015-01"), vec!["way/10"]);
    }

    #[test]
    fn test_counts() {
        let data = fixture();
        assert_eq!(matching(&data, "nodes:4"), vec!["way/10"]);
        assert_eq!(matching(&data, "nodes:5-2"), matching(&data, "nodes:2-5"));
        assert_eq!(matching(&data, "nodes:0"), vec!["way/12"]);
        assert_eq!(matching(&data, "tags:3-"), vec!["node/1"]);
        // Only closed ways have an area; the block's triangle is about 310 000 m².
        assert_eq!(matching(&data, "areasize:200000-500000"), vec!["way/10"]);
        assert_eq!(matching(&data, "areasize:1000000-"), Vec::<String>::new());
    }

    #[test]
    fn test_status_flags() {
        let data = fixture();
        assert_eq!(matching(&data, "new"), vec!["node/-1"]);
        assert_eq!(matching(&data, "modified"), vec!["node/-1", "node/6", "way/12"]);
        assert_eq!(matching(&data, "incomplete"), vec!["node/99"]);
        assert_eq!(matching(&data, "closed"), vec!["way/10"]);
        let untagged = matching(&data, "untagged");
        assert!(untagged.contains(&"node/2".to_string()));
        assert!(!untagged.contains(&"node/99".to_string()));
        assert!(!untagged.contains(&"node/1".to_string()));
    }

    #[test]
    fn test_selected_reads_selection_at_evaluation() {
        let data = fixture();
        let predicate = compile("selected", SearchFlags::default()).unwrap();
        let node = data.get(PrimitiveId::new(PrimitiveKind::Node, 2)).unwrap();

        let mut selection: HashSet<PrimitiveId> = HashSet::new();
        assert!(!predicate.matches(&node, &selection));
        selection.insert(node.primitive_id());
        assert!(predicate.matches(&node, &selection));
    }

    #[test]
    fn test_child_and_parent() {
        let data = fixture();
        assert_eq!(
            matching(&data, "child(type:node)"),
            vec!["relation/20", "way/10", "way/11", "way/13"]
        );
        assert_eq!(
            matching(&data, "child highway=primary"),
            vec!["relation/20"]
        );
        assert_eq!(matching(&data, "parent building"), vec!["node/1", "node/2", "node/3"]);
        assert_eq!(
            matching(&data, "parent type:relation"),
            vec!["node/1", "relation/20", "relation/21", "way/11"]
        );
    }

    #[test]
    fn test_role() {
        let data = fixture();
        assert_eq!(matching(&data, "role:outer"), vec!["way/11"]);
        assert_eq!(matching(&data, "role:"), vec!["node/1"]);
        assert_eq!(matching(&data, "role:sub"), vec!["relation/21"]);
    }

    /// Dataset handle that reports one extra feature as incomplete.
    #[derive(Clone, Copy)]
    struct Flagged<'a> {
        inner: PrimitiveRef<'a>,
        incomplete: PrimitiveId,
    }

    impl<'a> Flagged<'a> {
        fn wrap(&self, inner: PrimitiveRef<'a>) -> Self {
            Self {
                inner,
                incomplete: self.incomplete,
            }
        }
    }

    impl Primitive for Flagged<'_> {
        fn kind(&self) -> PrimitiveKind {
            self.inner.kind()
        }

        fn unique_id(&self) -> i64 {
            self.inner.unique_id()
        }

        fn version(&self) -> i64 {
            self.inner.version()
        }

        fn changeset_id(&self) -> i64 {
            self.inner.changeset_id()
        }

        fn timestamp(&self) -> Option<OffsetDateTime> {
            self.inner.timestamp()
        }

        fn user(&self) -> Option<&str> {
            self.inner.user()
        }

        fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
            self.inner.tags()
        }

        fn get(&self, key: &str) -> Option<&str> {
            self.inner.get(key)
        }

        fn has_keys(&self) -> bool {
            self.inner.has_keys()
        }

        fn is_new(&self) -> bool {
            self.inner.is_new()
        }

        fn is_modified(&self) -> bool {
            self.inner.is_modified()
        }

        fn is_incomplete(&self) -> bool {
            self.inner.is_incomplete() || self.inner.primitive_id() == self.incomplete
        }

        fn is_deleted(&self) -> bool {
            self.inner.is_deleted()
        }

        fn coor(&self) -> Option<LatLon> {
            self.inner.coor()
        }

        fn way_nodes(&self) -> Vec<Self> {
            self.inner.way_nodes().into_iter().map(|n| self.wrap(n)).collect()
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }

        fn members(&self) -> Vec<Member<Self>> {
            self.inner
                .members()
                .into_iter()
                .map(|m| Member {
                    role: m.role,
                    member: self.wrap(m.member),
                })
                .collect()
        }

        fn referrers(&self) -> Vec<Self> {
            self.inner.referrers().into_iter().map(|r| self.wrap(r)).collect()
        }
    }

    #[test]
    fn test_role_ignores_deleted_and_incomplete_relations() {
        let data = DataSet::from_json_str(
            r#"{"elements": [
              {"type": "node", "id": 1, "lat": 0.0, "lon": 0.0},
              {"type": "node", "id": 2, "lat": 0.0, "lon": 0.0},
              {"type": "node", "id": 3, "lat": 0.0, "lon": 0.0},
              {"type": "relation", "id": 30, "action": "delete",
               "members": [{"type": "node", "ref": 1, "role": "gone"}]},
              {"type": "relation", "id": 31,
               "members": [{"type": "node", "ref": 2, "role": "stop"}]},
              {"type": "relation", "id": 32,
               "members": [{"type": "node", "ref": 3, "role": "stop"}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(matching(&data, "role:gone"), Vec::<String>::new());
        assert_eq!(matching(&data, "role:stop"), vec!["node/2", "node/3"]);

        let predicate = compile("role:stop", SearchFlags::default()).unwrap();
        let incomplete: PrimitiveId = "relation/31".parse().unwrap();
        let ids: Vec<String> = data
            .primitives()
            .map(|inner| Flagged { inner, incomplete })
            .filter(|p| predicate.matches(p, &EmptySelection))
            .map(|p| p.primitive_id().to_string())
            .collect();
        assert_eq!(ids, vec!["node/3"]);
    }

    #[test]
    fn test_in_downloaded_area() {
        let data = fixture();
        assert_eq!(
            matching(&data, "indownloadedarea type:node"),
            vec!["node/-1", "node/1", "node/2", "node/3"]
        );
        assert_eq!(
            matching(&data, "allindownloadedarea type:way"),
            vec!["way/10", "way/12"]
        );
        assert_eq!(
            matching(&data, "indownloadedarea type:way"),
            vec!["way/10", "way/11", "way/13"]
        );
        // Relation cycle 20 -> 21 -> 20 terminates.
        assert_eq!(
            matching(&data, "indownloadedarea type:relation"),
            vec!["relation/20", "relation/21"]
        );
        assert_eq!(
            matching(&data, "allindownloadedarea type:relation"),
            Vec::<String>::new()
        );
        assert!(!matching(&data, "indownloadedarea").contains(&"node/6".to_string()));
        assert!(!matching(&data, "indownloadedarea").contains(&"node/99".to_string()));
    }

    #[test]
    fn test_in_view_captures_bounds_once() {
        let data = fixture();
        let mut bounds = StaticBounds {
            downloaded: None,
            view: Some(Bounds::new(4.0, 4.0, 6.0, 6.0)),
        };
        let predicate = compile_with_bounds("inview", SearchFlags::default(), &bounds).unwrap();
        bounds.view = Some(Bounds::new(0.0, 0.0, 1.0, 1.0));

        let node = data.get(PrimitiveId::new(PrimitiveKind::Node, 4)).unwrap();
        assert!(predicate.matches(&node, &EmptySelection));

        let none = compile("inview", SearchFlags::default()).unwrap();
        assert!(!none.matches(&node, &EmptySelection));
    }

    #[test]
    fn test_parse_osm_boolean() {
        assert_eq!(parse_osm_boolean("YES"), Some(true));
        assert_eq!(parse_osm_boolean("off"), Some(false));
        assert_eq!(parse_osm_boolean("maybe"), None);
    }
}
