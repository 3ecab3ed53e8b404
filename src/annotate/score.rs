//! Annotators that look up genomic scores for the variant of a line.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::{
    common::handle_chrom_prefix,
    err::Error,
    scores::{
        aggregate::{self, Aggregator},
        file::{FetchedScores, ScoreFile},
    },
};

use super::{
    variant::{VariantType, VF_ALT, VF_CHROM, VF_POS_BEGIN, VF_POS_END, VF_REF, VF_TYPE},
    Annotator, Cell, StageContext,
};

/// Registry name of the position score annotator.
pub const POSITION_SCORE: &str = "position_score";
/// Registry name of the nucleotide (allele) specific score annotator.
pub const NP_SCORE: &str = "np_score";
/// Registry name of the exact allele score annotator.
pub const ALLELE_SCORE: &str = "allele_score";

/// Stage option overriding the aggregator over positions.
pub const POSITION_AGGREGATOR: &str = "position_aggregator";
/// Stage option overriding the aggregator over the alleles of a position.
pub const NUCLEOTIDE_AGGREGATOR: &str = "nucleotide_aggregator";

/// Variants spanning more bases than this are not annotated.
pub const MAX_VARIANT_LENGTH: i64 = 500_000;

/// 0-based columns of the line describing the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VariantColumns {
    chrom: usize,
    pos_begin: usize,
    pos_end: Option<usize>,
    reference: Option<usize>,
    alternative: Option<usize>,
    variant_type: Option<usize>,
}

impl VariantColumns {
    fn new(ctx: &StageContext) -> Result<Self, Error> {
        let required = |option: &str, default: &str| {
            ctx.column(&ctx.option(option).unwrap_or_else(|| default.to_owned()))
        };
        let optional = |option: &str, default: &str| match ctx.option(option) {
            Some(label) => ctx.column(&label).map(Some),
            None => Ok(ctx.header.iter().rposition(|h| h == default)),
        };
        Ok(Self {
            chrom: required("chrom_column", VF_CHROM)?,
            pos_begin: required("pos_begin_column", VF_POS_BEGIN)?,
            pos_end: optional("pos_end_column", VF_POS_END)?,
            reference: optional("ref_column", VF_REF)?,
            alternative: optional("alt_column", VF_ALT)?,
            variant_type: optional("type_column", VF_TYPE)?,
        })
    }
}

/// The variant of one line as far as score lookup needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Query {
    chrom: String,
    pos_begin: i64,
    pos_end: i64,
    reference: Option<String>,
    alternative: Option<String>,
    variant_type: Option<VariantType>,
}

impl Query {
    fn is_cnv(&self) -> bool {
        self.variant_type == Some(VariantType::Cnv)
    }

    /// Single base change; inferred from the alleles when no type is given.
    fn is_substitution(&self) -> bool {
        match self.variant_type {
            Some(variant_type) => variant_type == VariantType::Substitution,
            None => {
                self.pos_begin == self.pos_end
                    && self.reference.as_ref().map(String::len) == Some(1)
                    && self.alternative.as_ref().map(String::len) == Some(1)
            }
        }
    }

    fn len(&self) -> i64 {
        self.pos_end.saturating_sub(self.pos_begin).saturating_add(1)
    }
}

/// Aggregators given by stage option `option`.
///
/// The option is either one aggregator name applied to all scores or a table
/// of aggregator names by score.
fn aggregator_option(
    ctx: &StageContext,
    option: &str,
    score_names: &[String],
) -> Result<IndexMap<String, Aggregator>, Error> {
    let parse = |value: &toml::Value| -> Result<Aggregator, Error> {
        value
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::config(format!(
                    "stage [{}]: invalid {} {}",
                    ctx.name, option, value
                ))
            })
    };
    match ctx.options.get(option) {
        None => Ok(IndexMap::new()),
        Some(toml::Value::Table(table)) => table
            .iter()
            .map(|(name, value)| {
                if !score_names.contains(name) {
                    return Err(Error::config(format!(
                        "stage [{}]: {} names {} which is not a score, available: {:?}",
                        ctx.name, option, name, score_names
                    )));
                }
                Ok((name.clone(), parse(value)?))
            })
            .collect(),
        Some(value) => {
            let aggregator = parse(value)?;
            Ok(score_names
                .iter()
                .map(|name| (name.clone(), aggregator))
                .collect())
        }
    }
}

/// Fail if the stage sets `option`, which annotator `annotator` does not support.
fn forbid_option(ctx: &StageContext, annotator: &str, option: &str) -> Result<(), Error> {
    if ctx.options.contains_key(option) {
        Err(Error::config(format!(
            "stage [{}]: {} does not support option {}",
            ctx.name, annotator, option
        )))
    } else {
        Ok(())
    }
}

/// Score file access shared by the score annotators.
#[derive(Debug)]
pub struct ScoreAnnotatorBase {
    stage: String,
    score_file: ScoreFile,
    columns: VariantColumns,
    chromosomes: HashSet<String>,
    position_aggregators: IndexMap<String, Aggregator>,
    nucleotide_aggregators: IndexMap<String, Aggregator>,
}

impl ScoreAnnotatorBase {
    pub fn new(ctx: &StageContext) -> Result<Self, anyhow::Error> {
        let path = ctx.path("scores_file")?.ok_or_else(|| {
            Error::config(format!("stage [{}] requires option scores_file", ctx.name))
        })?;
        let conf_path = ctx.path("scores_config_file")?;
        let score_file = ScoreFile::open(&path, conf_path.as_ref())?;

        if let Some(key) = ctx
            .keys
            .iter()
            .find(|key| !score_file.score_names().contains(*key))
        {
            return Err(Error::config(format!(
                "stage [{}] asks for {} which is not a score of {}, available: {:?}",
                ctx.name,
                key,
                path,
                score_file.score_names()
            ))
            .into());
        }
        let chromosomes = score_file.chromosomes().into_iter().collect();
        let position_aggregators = aggregator_option(ctx, POSITION_AGGREGATOR, score_file.score_names())?;
        let nucleotide_aggregators =
            aggregator_option(ctx, NUCLEOTIDE_AGGREGATOR, score_file.score_names())?;

        Ok(Self {
            stage: ctx.name.to_owned(),
            columns: VariantColumns::new(ctx)?,
            score_file,
            chromosomes,
            position_aggregators,
            nucleotide_aggregators,
        })
    }

    /// Aggregator over positions for score `name`; the stage option wins over the score file.
    pub fn position_aggregator(&self, name: &str) -> Aggregator {
        self.position_aggregators
            .get(name)
            .copied()
            .unwrap_or_else(|| self.score_file.position_aggregator(name))
    }

    /// Aggregator over the alleles of one position for score `name`.
    pub fn nucleotide_aggregator(&self, name: &str) -> Aggregator {
        self.nucleotide_aggregators
            .get(name)
            .copied()
            .unwrap_or_else(|| self.score_file.nucleotide_aggregator(name))
    }

    /// Value written when no score is available.
    pub fn sentinel(&self) -> Cell {
        self.score_file.no_score_value().map(str::to_owned)
    }

    fn no_scores(&self, keys: &[String]) -> Vec<Cell> {
        vec![self.sentinel(); keys.len()]
    }

    /// The variant of `line`, `None` if it lies on a chromosome without scores.
    fn query(&self, line: &[Cell]) -> Result<Option<Query>, Error> {
        let cell = |i: usize| line.get(i).and_then(|c| c.as_deref()).filter(|s| !s.is_empty());
        let optional_cell = |i: Option<usize>| i.and_then(cell);

        let chrom = match cell(self.columns.chrom) {
            Some(chrom) => handle_chrom_prefix(self.score_file.chr_prefix(), chrom),
            None => return Ok(None),
        };
        if !self.chromosomes.contains(&chrom) {
            tracing::trace!("[{}] no scores on chromosome {}", &self.stage, &chrom);
            return Ok(None);
        }
        let parse = |column: &str, value: &str| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|e| Error::parse(column, value, e))
        };
        let pos_begin = match cell(self.columns.pos_begin) {
            Some(value) => parse("pos_begin", value)?,
            None => return Ok(None),
        };
        let pos_end = match optional_cell(self.columns.pos_end) {
            Some(value) => parse("pos_end", value)?,
            None => pos_begin,
        };
        if pos_end < pos_begin {
            return Err(Error::parse(
                "pos_end",
                pos_end.to_string(),
                format!("lies before begin {}", pos_begin),
            ));
        }

        Ok(Some(Query {
            chrom,
            pos_begin,
            pos_end,
            reference: optional_cell(self.columns.reference).map(str::to_owned),
            alternative: optional_cell(self.columns.alternative).map(str::to_owned),
            variant_type: optional_cell(self.columns.variant_type).and_then(|t| t.parse().ok()),
        }))
    }

    /// Overlap counts and parsed values of score column `name`.
    fn counted(&self, fetched: &FetchedScores, name: &str) -> Result<Vec<(i64, Option<f64>)>, Error> {
        let values = fetched.get(name).unwrap_or_default();
        fetched
            .count
            .iter()
            .zip(values.iter())
            .map(|(count, value)| -> Result<_, Error> {
                Ok((*count, self.parse_value(name, value)?))
            })
            .collect()
    }

    fn parse_value(&self, name: &str, value: &str) -> Result<Option<f64>, Error> {
        if self.score_file.is_missing(value) {
            Ok(None)
        } else {
            value
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| Error::parse(name, value, e))
        }
    }

    /// The raw value unless it marks a missing score.
    fn raw_value(&self, value: &str) -> Cell {
        if self.score_file.is_missing(value) {
            self.sentinel()
        } else {
            Some(value.to_owned())
        }
    }

    fn render(&self, value: Option<f64>) -> Cell {
        value.map(aggregate::format_value).or_else(|| self.sentinel())
    }

    /// Maximum of each of `keys` over the region of a copy number variant.
    fn highest_scores(&mut self, query: &Query, keys: &[String]) -> Result<Vec<Cell>, Error> {
        let highest = self
            .score_file
            .fetch_highest_scores(&query.chrom, query.pos_begin, query.pos_end)?;
        Ok(keys
            .iter()
            .map(|key| self.render(highest.get(key).copied().flatten()))
            .collect())
    }

    /// Values of the row carrying exactly the alleles of `query`.
    fn allele_scores(&mut self, query: &Query, keys: &[String]) -> Result<Vec<Cell>, Error> {
        let (reference, alternative) = match (&query.reference, &query.alternative) {
            (Some(reference), Some(alternative)) => (reference, alternative),
            _ => return Ok(self.no_scores(keys)),
        };
        let scores = match self.score_file.fetch_allele_scores(
            &query.chrom,
            query.pos_begin,
            reference,
            alternative,
        )? {
            Some(scores) => scores,
            None => return Ok(self.no_scores(keys)),
        };
        Ok(keys
            .iter()
            .map(|key| match scores.get(key) {
                Some(value) => self.raw_value(value),
                None => self.sentinel(),
            })
            .collect())
    }

    fn too_long(&self, query: &Query) -> bool {
        if query.len() > MAX_VARIANT_LENGTH {
            tracing::trace!(
                "[{}] skipping {}:{}-{}, longer than {} bp",
                &self.stage,
                &query.chrom,
                query.pos_begin,
                query.pos_end,
                MAX_VARIANT_LENGTH
            );
            true
        } else {
            false
        }
    }
}

/// Scores given per reference position.
#[derive(Debug)]
pub struct PositionScoreAnnotator {
    base: ScoreAnnotatorBase,
}

impl PositionScoreAnnotator {
    pub fn new(ctx: &StageContext) -> Result<Self, anyhow::Error> {
        forbid_option(ctx, POSITION_SCORE, NUCLEOTIDE_AGGREGATOR)?;
        Ok(Self {
            base: ScoreAnnotatorBase::new(ctx)?,
        })
    }

    fn scores(&mut self, query: &Query, keys: &[String]) -> Result<Vec<Cell>, Error> {
        let base = &mut self.base;
        if query.is_cnv() {
            return base.highest_scores(query, keys);
        }
        if base.too_long(query) {
            return Ok(base.no_scores(keys));
        }
        let fetched = base
            .score_file
            .fetch_scores(&query.chrom, query.pos_begin, query.pos_end)?;
        if fetched.is_empty() {
            return Ok(base.no_scores(keys));
        }

        keys.iter()
            .map(|key| -> Result<Cell, Error> {
                match fetched.get(key) {
                    Some([value]) if query.pos_begin == query.pos_end => Ok(base.raw_value(value)),
                    _ => {
                        let aggregator = base.position_aggregator(key);
                        Ok(base.render(aggregator.aggregate(base.counted(&fetched, key)?)))
                    }
                }
            })
            .collect()
    }
}

impl Annotator for PositionScoreAnnotator {
    fn line_annotations(&mut self, line: &[Cell], keys: &[String]) -> Result<Vec<Cell>, anyhow::Error> {
        Ok(match self.base.query(line)? {
            Some(query) => self.scores(&query, keys)?,
            None => self.base.no_scores(keys),
        })
    }
}

/// Scores given per reference position and alternative allele.
#[derive(Debug)]
pub struct NpScoreAnnotator {
    base: ScoreAnnotatorBase,
}

impl NpScoreAnnotator {
    pub fn new(ctx: &StageContext) -> Result<Self, anyhow::Error> {
        let base = ScoreAnnotatorBase::new(ctx)?;
        if base.score_file.ref_name().is_none() || base.score_file.alt_name().is_none() {
            return Err(Error::config(format!(
                "stage [{}]: score file {:?} configures no ref/alt columns",
                ctx.name,
                base.score_file.path()
            ))
            .into());
        }
        Ok(Self { base })
    }

    fn pos_begin_name(&self) -> &str {
        let score_file = &self.base.score_file;
        &score_file.header()[score_file.columns().pos_begin]
    }

    /// Nucleotide aggregate of each position, then position aggregate over positions.
    fn region(&mut self, query: &Query, keys: &[String]) -> Result<Vec<Cell>, Error> {
        let fetched = self
            .base
            .score_file
            .fetch_scores(&query.chrom, query.pos_begin, query.pos_end)?;
        if fetched.is_empty() {
            return Ok(self.base.no_scores(keys));
        }
        let positions = fetched.get(self.pos_begin_name()).unwrap_or_default().to_vec();

        let base = &self.base;
        keys.iter()
            .map(|key| -> Result<Cell, Error> {
                let mut by_position: IndexMap<&str, (i64, Vec<Option<f64>>)> = IndexMap::new();
                for (position, (count, value)) in positions.iter().zip(base.counted(&fetched, key)?) {
                    let entry = by_position.entry(position.as_str()).or_insert((count, Vec::new()));
                    entry.1.push(value);
                }
                let nucleotide = base.nucleotide_aggregator(key);
                let value = base.position_aggregator(key).aggregate(by_position.into_values().map(
                    |(count, values)| (count, nucleotide.aggregate(values.into_iter().map(|v| (1, v)))),
                ));
                Ok(base.render(value))
            })
            .collect()
    }
}

impl Annotator for NpScoreAnnotator {
    fn line_annotations(&mut self, line: &[Cell], keys: &[String]) -> Result<Vec<Cell>, anyhow::Error> {
        let query = match self.base.query(line)? {
            Some(query) => query,
            None => return Ok(self.base.no_scores(keys)),
        };
        Ok(if query.is_cnv() {
            self.base.highest_scores(&query, keys)?
        } else if self.base.too_long(&query) {
            self.base.no_scores(keys)
        } else if query.is_substitution() {
            self.base.allele_scores(&query, keys)?
        } else {
            self.region(&query, keys)?
        })
    }
}

/// Scores of exactly matching alleles, taken verbatim from the score file.
///
/// The alleles are read from the normalized variant columns unless the stage
/// points `pos_begin_column`, `ref_column` and `alt_column` elsewhere, e.g. at
/// the VCF columns for files keyed by VCF alleles.
#[derive(Debug)]
pub struct AlleleScoreAnnotator {
    base: ScoreAnnotatorBase,
}

impl AlleleScoreAnnotator {
    pub fn new(ctx: &StageContext) -> Result<Self, anyhow::Error> {
        forbid_option(ctx, ALLELE_SCORE, POSITION_AGGREGATOR)?;
        forbid_option(ctx, ALLELE_SCORE, NUCLEOTIDE_AGGREGATOR)?;
        let base = ScoreAnnotatorBase::new(ctx)?;
        if base.score_file.ref_name().is_none() || base.score_file.alt_name().is_none() {
            return Err(Error::config(format!(
                "stage [{}]: score file {:?} configures no ref/alt columns",
                ctx.name,
                base.score_file.path()
            ))
            .into());
        }
        Ok(Self { base })
    }
}

impl Annotator for AlleleScoreAnnotator {
    fn line_annotations(&mut self, line: &[Cell], keys: &[String]) -> Result<Vec<Cell>, anyhow::Error> {
        Ok(match self.base.query(line)? {
            Some(query) if !query.is_cnv() => self.base.allele_scores(&query, keys)?,
            _ => self.base.no_scores(keys),
        })
    }
}

pub fn create_position_score(ctx: &StageContext) -> Result<Box<dyn Annotator>, anyhow::Error> {
    Ok(Box::new(PositionScoreAnnotator::new(ctx)?))
}

pub fn create_np_score(ctx: &StageContext) -> Result<Box<dyn Annotator>, anyhow::Error> {
    Ok(Box::new(NpScoreAnnotator::new(ctx)?))
}

pub fn create_allele_score(ctx: &StageContext) -> Result<Box<dyn Annotator>, anyhow::Error> {
    Ok(Box::new(AlleleScoreAnnotator::new(ctx)?))
}
