//! Multi-stage annotation of tab-separated variant files.

pub mod cli;
pub mod conf;
pub mod io;
pub mod layout;
pub mod pipeline;
pub mod registry;
pub mod score;
pub mod variant;

use indexmap::IndexMap;

use crate::err::Error;

/// One cell of a line being annotated; `None` is a missing value.
pub type Cell = Option<String>;

/// Free-form options of an annotation stage.
pub type Options = IndexMap<String, toml::Value>;

/// Computes annotation values for one line at a time.
pub trait Annotator: std::fmt::Debug {
    /// Return one value for each of the stage's source column `keys`.
    fn line_annotations(&mut self, line: &[Cell], keys: &[String]) -> Result<Vec<Cell>, anyhow::Error>;
}

/// What a factory gets to know about the stage it instantiates.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// Name of the stage (its configuration table).
    pub name: &'a str,
    pub options: &'a Options,
    /// Header as it stands after the stage added its output columns.
    pub header: &'a [String],
    /// Source column keys the stage is asked for.
    pub keys: &'a [String],
}

impl StageContext<'_> {
    /// Option `key` rendered as string; TOML strings are taken verbatim.
    pub fn option(&self, key: &str) -> Option<String> {
        option_str(self.options, key)
    }

    /// Option `key` that must be present.
    pub fn required(&self, key: &str) -> Result<String, Error> {
        self.option(key).ok_or_else(|| {
            Error::config(format!("stage [{}] requires option {}", self.name, key))
        })
    }

    /// Option `key` as a path with `~` and environment variables expanded.
    pub fn path(&self, key: &str) -> Result<Option<String>, Error> {
        self.option(key)
            .map(|value| {
                shellexpand::full(&value)
                    .map(|expanded| expanded.into_owned())
                    .map_err(|e| {
                        Error::config(format!("could not expand {} of [{}]: {}", key, self.name, e))
                    })
            })
            .transpose()
    }

    /// Resolve column `label` against the stage's header.
    pub fn column(&self, label: &str) -> Result<usize, Error> {
        layout::resolve_column(self.header, label)
    }
}

/// Render option `key` as string.
pub fn option_str(options: &Options, key: &str) -> Option<String> {
    options.get(key).map(|value| match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Parse an `OPTION:VALUE` default option; values are TOML scalars or strings.
pub fn parse_default_option(s: &str) -> Result<(String, toml::Value), Error> {
    let (key, value) = s
        .split_once(':')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| Error::config(format!("default option {:?} is not OPTION:VALUE", s)))?;
    let value = value.trim();
    let parsed = toml::from_str::<toml::Table>(&format!("value = {}", value))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(value.to_owned()));
    Ok((key.trim().to_owned(), parsed))
}
