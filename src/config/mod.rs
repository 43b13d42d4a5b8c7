use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::model::{Bounds, PrimitiveId};
use crate::search::SearchFlags;

pub const ENV_PREFIX: &str = "OSMSEARCH";

/// Options for one search run, read from YAML and the environment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSettings {
    pub case_sensitive: bool,
    pub regex: bool,
    /// Map view used by `inview` / `allinview`.
    pub view: Option<Bounds>,
    /// Selected features as `type/id`.
    pub selection: Vec<String>,
}

impl SearchSettings {
    /// Load from an optional YAML file overlaid by `OSMSEARCH_*` variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, environment())
    }

    pub fn load_with_env(
        path: Option<&Path>,
        env: ::config::Environment,
    ) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(env)
            .build()
            .context("Config: Failed to read settings")?;
        settings
            .try_deserialize()
            .context("Config: Invalid settings")
    }

    pub fn flags(&self) -> SearchFlags {
        SearchFlags::new(self.case_sensitive, self.regex)
    }

    pub fn selection_ids(&self) -> anyhow::Result<HashSet<PrimitiveId>> {
        self.selection
            .iter()
            .map(|entry| {
                entry
                    .parse::<PrimitiveId>()
                    .map_err(|e| anyhow!("Config: Invalid selection entry: {e}"))
            })
            .collect()
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("selection")
}
