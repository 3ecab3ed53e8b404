//! Resolution of the stage list into the final column layout.

use std::collections::{BTreeSet, HashMap};

use indexmap::{IndexMap, IndexSet};

use crate::err::Error;

use super::{conf::StageConf, Options};

/// Resolve `label` to a 0-based column index in `header`.
///
/// Header names win (the last occurrence for duplicates); otherwise `label`
/// is read as a 1-based column number.
pub fn resolve_column(header: &[String], label: &str) -> Result<usize, Error> {
    if let Some(index) = header.iter().rposition(|name| name == label) {
        return Ok(index);
    }
    match label.trim().parse::<usize>() {
        Ok(number) if number >= 1 && number <= header.len() => Ok(number - 1),
        _ => Err(Error::config(format!(
            "column {:?} not found in header {:?}",
            label, header
        ))),
    }
}

/// Final placement of all columns, fixed before the first line is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Input header extended by all stage output columns.
    pub header: Vec<String>,
    /// 1-based positions of columns not written to the output.
    pub virtual_positions: BTreeSet<usize>,
    /// Output label to 1-based position in `header`.
    pub column_indices: HashMap<String, usize>,
    /// 1-based positions of the written columns, in output order.
    pub stored_columns_indices: Vec<usize>,
}

impl ColumnLayout {
    /// Header of the written output.
    pub fn stored_header(&self) -> Vec<String> {
        self.stored_columns_indices
            .iter()
            .map(|i| self.header[i - 1].clone())
            .collect()
    }
}

/// A stage with its options and the header it was resolved against.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStage {
    pub name: String,
    pub annotator: String,
    pub options: Options,
    /// Source column key to output label.
    pub columns: IndexMap<String, String>,
    pub header: Vec<String>,
}

/// Add the `defaults` that `options` does not set.
pub fn merge_defaults(options: &mut Options, defaults: &[(String, toml::Value)]) {
    for (key, value) in defaults {
        if !options.contains_key(key) {
            options.insert(key.clone(), value.clone());
        }
    }
}

/// Fold the ordered `stages` over `header` into the column layout.
///
/// With `reannotate`, every output label is appended as a new column;
/// otherwise labels already in the header replace the existing column.
pub fn resolve(
    header: Vec<String>,
    stages: &IndexMap<String, StageConf>,
    reannotate: bool,
) -> Result<(ColumnLayout, Vec<ResolvedStage>), Error> {
    let mut header = header;
    let mut virtual_positions = BTreeSet::new();
    let mut all_labels = IndexSet::new();
    let mut resolved = Vec::with_capacity(stages.len());

    for (name, stage) in stages {
        for label in stage.columns.values() {
            if reannotate || !header.contains(label) {
                header.push(label.clone());
            }
            all_labels.insert(label.clone());
        }

        for virtual_column in stage.virtuals() {
            let label = match stage.columns.get(&virtual_column) {
                Some(label) => label,
                None if stage.columns.values().any(|l| *l == virtual_column) => &virtual_column,
                None => {
                    return Err(Error::config(format!(
                        "virtual column {} of stage [{}] is not one of its columns",
                        virtual_column, name
                    )))
                }
            };
            virtual_positions.insert(resolve_column(&header, label)? + 1);
        }

        tracing::debug!(
            "stage [{}] ({}) adds {:?}",
            name,
            &stage.annotator,
            stage.columns.values().collect::<Vec<_>>()
        );
        resolved.push(ResolvedStage {
            name: name.clone(),
            annotator: stage.annotator.clone(),
            options: stage.options.clone(),
            columns: stage.columns.clone(),
            header: header.clone(),
        });
    }

    let column_indices = all_labels
        .into_iter()
        .map(|label| {
            let position = resolve_column(&header, &label)? + 1;
            Ok((label, position))
        })
        .collect::<Result<HashMap<_, _>, Error>>()?;
    let stored_columns_indices = (1..=header.len())
        .filter(|i| !virtual_positions.contains(i))
        .collect();

    Ok((
        ColumnLayout {
            header,
            virtual_positions,
            column_indices,
            stored_columns_indices,
        },
        resolved,
    ))
}
