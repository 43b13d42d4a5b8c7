use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::config::SearchSettings;
use crate::dataset::{DataSet, PrimitiveRef};
use crate::model::{Bounds, BoundsSource, Primitive, PrimitiveId, Selection, StaticBounds};
use crate::search::{Predicate, compile_with_bounds};
use crate::sinks::{DataSink, GeoJsonlSink, IdsSink};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Search expression, e.g. `highway=primary OR type:relation`
    pub query: String,

    /// Input OSM JSON file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file, or - for stdout
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Settings file (YAML)
    #[arg(short, long, env = "OSMSEARCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Compare text case-sensitively
    #[arg(short = 's', long)]
    pub case_sensitive: bool,

    /// Treat text operands as regular expressions
    #[arg(short, long)]
    pub regex: bool,

    /// Map view for inview/allinview, as minlat,minlon,maxlat,maxlon
    #[arg(long, allow_hyphen_values = true)]
    pub view: Option<Bounds>,

    /// Selected feature for the `selected` keyword (repeatable)
    #[arg(long = "select", value_name = "TYPE/ID", allow_hyphen_values = true)]
    pub select: Vec<PrimitiveId>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Ids)]
    pub format: OutputFormat,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum OutputFormat {
    /// One `type/id` per line
    #[value(name = "ids")]
    Ids,
    #[value(name = "geojsonl")]
    GeoJsonl,
}

impl OutputFormat {
    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Ids => "ids",
            OutputFormat::GeoJsonl => "geojsonl",
        }
    }
}

/// Settings file and environment, with command line flags on top.
pub fn resolve_settings(cli: &Cli) -> Result<SearchSettings> {
    let mut settings = SearchSettings::load(cli.config.as_deref())?;
    settings.case_sensitive |= cli.case_sensitive;
    settings.regex |= cli.regex;
    if cli.view.is_some() {
        settings.view = cli.view;
    }
    if !cli.select.is_empty() {
        settings.selection = cli.select.iter().map(ToString::to_string).collect();
    }
    Ok(settings)
}

pub fn init_sink(format: OutputFormat, output: &Path) -> Result<Box<dyn DataSink>> {
    let to_stdout = output == Path::new("-");
    if to_stdout {
        tracing::info!("Sink: {} -> stdout", format.label());
    } else {
        tracing::info!("Sink: {} -> {:?}", format.label(), output);
    }

    let sink: Box<dyn DataSink> = match (format, to_stdout) {
        (OutputFormat::Ids, true) => Box::new(IdsSink::stdout()?),
        (OutputFormat::Ids, false) => Box::new(IdsSink::new(output)?),
        (OutputFormat::GeoJsonl, true) => Box::new(GeoJsonlSink::stdout()?),
        (OutputFormat::GeoJsonl, false) => Box::new(GeoJsonlSink::new(output)?),
    };
    Ok(sink)
}

/// Every complete, non-deleted feature matching `predicate`, ordered by id.
pub fn scan<'a, S>(dataset: &'a DataSet, predicate: &Predicate, selection: &S) -> Vec<PrimitiveRef<'a>>
where
    S: Selection + Sync,
{
    let mut matches: Vec<PrimitiveRef<'a>> = dataset
        .par_primitives()
        .filter(|osm| osm.is_usable() && predicate.matches(osm, selection))
        .collect();
    matches.sort_by_key(|osm| osm.primitive_id());
    matches
}

/// Load, compile, scan and write. Returns the number of matches.
pub fn run(cli: &Cli) -> Result<usize> {
    let settings = resolve_settings(cli)?;
    let selection = settings.selection_ids()?;
    let dataset = DataSet::load(&cli.input)?;

    let bounds = StaticBounds {
        downloaded: dataset.downloaded_area(),
        view: settings.view,
    };
    let predicate = compile_with_bounds(&cli.query, settings.flags(), &bounds)
        .with_context(|| format!("Search: Invalid query {:?}", cli.query))?;

    let start = std::time::Instant::now();
    let matches = scan(&dataset, &predicate, &selection);
    tracing::info!(
        "Search: {} of {} features matched in {:.3}s",
        matches.len(),
        dataset.len(),
        start.elapsed().as_secs_f64()
    );

    let mut sink = init_sink(cli.format, &cli.output)?;
    for osm in &matches {
        sink.add_feature(osm)
            .context("Output: Failed to write feature")?;
    }
    sink.finish().context("Output: Failed to finalize sink")?;

    Ok(matches.len())
}
