use super::DataSink;
use crate::dataset::PrimitiveRef;
use crate::geometry::feature_geometry;
use crate::model::{Primitive, format_timestamp};
use anyhow::Result;
use geojson::{Feature, GeoJson, feature::Id};
use serde_json::{Map, Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Newline-delimited GeoJSON features. Relations are written without
/// geometry.
pub struct GeoJsonlSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl GeoJsonlSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(Box::new(file)),
        })
    }

    pub fn stdout() -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(Box::new(std::io::stdout())),
        })
    }
}

fn properties(osm: &PrimitiveRef<'_>) -> Map<String, Value> {
    let tags: Map<String, Value> = osm
        .tags()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    let meta = json!({
        "version": osm.version(),
        "changeset": osm.changeset_id(),
        "user": osm.user(),
        "timestamp": osm.timestamp().and_then(format_timestamp),
    });

    let mut properties = Map::new();
    properties.insert("type".to_string(), Value::from(osm.kind().as_str()));
    properties.insert("tags".to_string(), Value::Object(tags));
    properties.insert("meta".to_string(), meta);
    properties
}

impl DataSink for GeoJsonlSink {
    fn add_feature(&mut self, osm: &PrimitiveRef<'_>) -> Result<()> {
        let feature = Feature {
            bbox: None,
            geometry: feature_geometry(osm).map(|g| geojson::Geometry::from(&g)),
            id: Some(Id::String(osm.primitive_id().to_string())),
            properties: Some(properties(osm)),
            foreign_members: None,
        };

        let geojson = GeoJson::Feature(feature);
        serde_json::to_writer(&mut self.writer, &geojson)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
