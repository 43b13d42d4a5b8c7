use anyhow::Result;

use crate::dataset::PrimitiveRef;

pub mod geojsonl;
pub mod ids;

pub use self::geojsonl::GeoJsonlSink;
pub use self::ids::IdsSink;

/// Destination for matched features, written in scan order.
pub trait DataSink: Send {
    fn add_feature(&mut self, osm: &PrimitiveRef<'_>) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}
