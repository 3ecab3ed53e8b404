//! Driver running the annotation stages over every line of the input.

use indexmap::IndexMap;
use itertools::Itertools;
use thousands::Separable;

use crate::err::Error;

use super::{
    conf::{PipelineConf, StageConf},
    io::{is_comment, LineRead, LineWrite},
    layout::{merge_defaults, resolve, resolve_column, ColumnLayout},
    registry::AnnotatorRegistry,
    variant, Annotator, Cell, Options, StageContext,
};

/// Settings of the pipeline besides its stages.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Append all output columns, even those already in the input.
    pub reannotate: bool,
    /// Column whose values are split into one sub-line each.
    pub split: Option<String>,
    /// Separator of the split column values.
    pub separator: String,
    /// Options added to every configured stage that does not set them.
    pub defaults: Vec<(String, toml::Value)>,
    pub skip_preannotators: bool,
    /// Options of the variant format preannotator.
    pub preannotator_options: Options,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            reannotate: false,
            split: None,
            separator: String::from(","),
            defaults: Vec::new(),
            skip_preannotators: false,
            preannotator_options: Options::new(),
        }
    }
}

/// An instantiated stage.
#[derive(Debug)]
struct Stage {
    name: String,
    annotator: Box<dyn Annotator>,
    keys: Vec<String>,
    labels: Vec<String>,
}

/// Runs the configured stages in order over each line.
#[derive(Debug)]
pub struct MultiAnnotator {
    layout: ColumnLayout,
    stages: Vec<Stage>,
    /// 0-based index of the split column.
    split_column: Option<usize>,
    separator: String,
    has_header: bool,
}

impl MultiAnnotator {
    /// Build the pipeline for input with column `names`.
    pub fn new(
        names: Vec<String>,
        has_header: bool,
        conf: &PipelineConf,
        options: &PipelineOptions,
        registry: &AnnotatorRegistry,
    ) -> Result<Self, anyhow::Error> {
        let mut stages: IndexMap<String, StageConf> = IndexMap::new();
        if !options.skip_preannotators {
            stages.insert(
                variant::NAME.to_owned(),
                variant::stage_conf(options.preannotator_options.clone()),
            );
        }
        for (name, stage) in &conf.stages {
            if stages.contains_key(name) {
                return Err(Error::config(format!("stage name [{}] is reserved", name)).into());
            }
            let mut stage = stage.clone();
            merge_defaults(&mut stage.options, &options.defaults);
            stages.insert(name.clone(), stage);
        }

        let split_column = options
            .split
            .as_deref()
            .map(|label| resolve_column(&names, label))
            .transpose()?;
        let (layout, resolved) = resolve(names, &stages, options.reannotate)?;
        tracing::debug!("output columns: {:?}", layout.stored_header());

        let stages = resolved
            .into_iter()
            .map(|stage| {
                let keys = stage.columns.keys().cloned().collect::<Vec<_>>();
                let ctx = StageContext {
                    name: &stage.name,
                    options: &stage.options,
                    header: &stage.header,
                    keys: &keys,
                };
                let annotator = registry.create(&stage.annotator, &ctx)?;
                Ok(Stage {
                    name: stage.name.clone(),
                    annotator,
                    labels: stage.columns.values().cloned().collect(),
                    keys,
                })
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()?;

        Ok(Self {
            layout,
            stages,
            split_column,
            separator: options.separator.clone(),
            has_header,
        })
    }

    /// Build the pipeline for the input of `reader`.
    pub fn for_reader(
        reader: &dyn LineRead,
        conf: &PipelineConf,
        options: &PipelineOptions,
        registry: &AnnotatorRegistry,
    ) -> Result<Self, anyhow::Error> {
        Self::new(
            reader.column_names(),
            reader.header().is_some(),
            conf,
            options,
            registry,
        )
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Header of the output with the first column prefixed by `#`.
    pub fn output_header(&self) -> Vec<String> {
        let mut header = self.layout.stored_header();
        if let Some(first) = header.first_mut() {
            first.insert(0, '#');
        }
        header
    }

    /// One sub-line per value of the split column, or just `line` when there is nothing to split.
    pub fn split_variant(&self, line: Vec<Cell>) -> Vec<Vec<Cell>> {
        let Some(column) = self.split_column else {
            return vec![line];
        };
        let values = match line.get(column).and_then(|cell| cell.as_deref()) {
            Some(value) if value.contains(self.separator.as_str()) => value
                .split(self.separator.as_str())
                .map(str::to_owned)
                .collect::<Vec<_>>(),
            _ => return vec![line],
        };
        values
            .into_iter()
            .map(|value| {
                let mut sub_line = line.clone();
                sub_line[column] = Some(value);
                sub_line
            })
            .collect()
    }

    /// Merge sub-lines column by column; differing values are joined by the separator.
    pub fn join_variant(&self, mut lines: Vec<Vec<Cell>>) -> Vec<Cell> {
        if lines.len() == 1 {
            return lines.pop().unwrap_or_default();
        }
        let width = lines.iter().map(Vec::len).max().unwrap_or(0);
        (0..width)
            .map(|i| {
                let column = lines.iter().map(|line| line.get(i).cloned().flatten());
                if column.clone().all_equal() {
                    lines[0].get(i).cloned().flatten()
                } else {
                    Some(
                        column
                            .map(Option::unwrap_or_default)
                            .unique()
                            .join(&self.separator),
                    )
                }
            })
            .collect()
    }

    /// Run all stages over `line` and return the written columns.
    pub fn annotate_line(&mut self, line: Vec<String>) -> Result<Vec<Cell>, anyhow::Error> {
        let cells = line.into_iter().map(Some).collect::<Vec<_>>();
        let mut sub_lines = self.split_variant(cells);

        for sub_line in sub_lines.iter_mut() {
            for stage in self.stages.iter_mut() {
                let values = stage.annotator.line_annotations(sub_line, &stage.keys)?;
                if values.len() != stage.keys.len() {
                    return Err(Error::contract(format!(
                        "stage [{}] returned {} values for {} columns",
                        &stage.name,
                        values.len(),
                        stage.keys.len()
                    ))
                    .into());
                }
                for (label, value) in stage.labels.iter().zip(values) {
                    let position = self.layout.column_indices[label] - 1;
                    if sub_line.len() <= position {
                        sub_line.resize(position + 1, None);
                    }
                    sub_line[position] = value;
                }
            }
        }

        let joined = self.join_variant(sub_lines);
        Ok(self
            .layout
            .stored_columns_indices
            .iter()
            .map(|i| joined.get(i - 1).cloned().flatten())
            .collect())
    }

    /// Annotate all lines of `reader` into `writer`; comment lines pass unchanged.
    pub fn annotate_file(
        &mut self,
        reader: &mut dyn LineRead,
        writer: &mut dyn LineWrite,
    ) -> Result<(), anyhow::Error> {
        for meta in reader.meta_lines() {
            writer.line_write(&[Some(meta.clone())])?;
        }
        if self.has_header {
            writer.header_write(&self.output_header())?;
        }

        let mut prev = std::time::Instant::now();
        let mut count_lines: usize = 0;
        while let Some(line) = reader.read_line()? {
            if is_comment(&line) {
                writer.line_write(&line.into_iter().map(Some).collect::<Vec<_>>())?;
                continue;
            }
            let annotated = self.annotate_line(line)?;
            writer.line_write(&annotated)?;
            count_lines += 1;

            if prev.elapsed().as_secs() >= 60 {
                tracing::info!("annotated {} lines", count_lines.separate_with_commas());
                prev = std::time::Instant::now();
            }
        }
        tracing::info!("annotated {} lines in total", count_lines.separate_with_commas());
        Ok(())
    }
}
