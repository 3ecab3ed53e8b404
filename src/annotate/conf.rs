//! Pipeline configuration: an ordered list of annotation stages.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{err::Error, scores::conf::StringOrList};

use super::Options;

/// Configuration of one annotation stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StageConf {
    /// Name of the annotator in the registry.
    pub annotator: String,
    #[serde(default)]
    pub options: Options,
    /// Source column key to output column label.
    #[serde(default)]
    pub columns: IndexMap<String, String>,
    /// Keys or labels of columns that are computed but not written.
    #[serde(default)]
    pub virtuals: Option<StringOrList>,
}

impl StageConf {
    pub fn virtuals(&self) -> Vec<String> {
        self.virtuals
            .as_ref()
            .map(StringOrList::to_vec)
            .unwrap_or_default()
    }

    /// Source column keys in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }
}

/// Ordered stages; table order in the document is the execution order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct PipelineConf {
    pub stages: IndexMap<String, StageConf>,
}

impl PipelineConf {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text)
            .map_err(|e| Error::config(format!("invalid pipeline configuration: {}", e)))
    }

    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("could not read pipeline configuration {:?}: {}", path, e))
        })?;
        let conf = Self::from_toml(&text)?;
        tracing::debug!(
            "loaded {} stages from {:?}: {:?}",
            conf.stages.len(),
            path,
            conf.stages.keys().collect::<Vec<_>>()
        );
        Ok(conf)
    }
}
