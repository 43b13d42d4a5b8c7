//! Geometry helpers for area searches.

use geo::ChamberlainDuquetteArea;
use geo_types::{Coord, Geometry, LineString, Point, Polygon};

use crate::model::{LatLon, Primitive, PrimitiveKind};

/// Area in square metres enclosed by a closed ring of coordinates.
///
/// `None` when the ring is degenerate (fewer than three distinct points plus
/// the closing one).
pub fn closed_way_area(ring: &[LatLon]) -> Option<f64> {
    if ring.len() < 4 {
        return None;
    }
    let exterior: LineString<f64> = ring
        .iter()
        .map(|c| Coord { x: c.lon, y: c.lat })
        .collect::<Vec<_>>()
        .into();
    let polygon = Polygon::new(exterior, vec![]);
    Some(polygon.chamberlain_duquette_unsigned_area())
}

/// Output geometry of a feature: point for nodes, polygon for closed ways,
/// line string for other ways. `None` for relations and for features with
/// missing coordinates.
pub fn feature_geometry<P: Primitive>(osm: &P) -> Option<Geometry<f64>> {
    match osm.kind() {
        PrimitiveKind::Node => osm.coor().map(|c| Geometry::Point(Point::new(c.lon, c.lat))),
        PrimitiveKind::Way => {
            let coords = osm
                .way_nodes()
                .iter()
                .map(|n| n.coor().map(|c| Coord { x: c.lon, y: c.lat }))
                .collect::<Option<Vec<_>>>()?;
            if coords.len() < 2 {
                return None;
            }
            let line_string = LineString::from(coords);
            if osm.is_closed() {
                Some(Geometry::Polygon(Polygon::new(line_string, vec![])))
            } else {
                Some(Geometry::LineString(line_string))
            }
        }
        PrimitiveKind::Relation => None,
    }
}
