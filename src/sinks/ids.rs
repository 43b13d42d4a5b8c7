use super::DataSink;
use crate::dataset::PrimitiveRef;
use crate::model::Primitive;
use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One `type/id` per line.
pub struct IdsSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl IdsSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn stdout() -> Result<Self> {
        Ok(Self::from_writer(Box::new(std::io::stdout())))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }
}

impl DataSink for IdsSink {
    fn add_feature(&mut self, osm: &PrimitiveRef<'_>) -> Result<()> {
        writeln!(self.writer, "{}", osm.primitive_id())?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
