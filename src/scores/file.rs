//! Score files: configuration, schema, and fetch operations.

use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;

use crate::{
    common::{handle_chrom_prefix, io::open_read_maybe_gz},
    err::Error,
};

use super::{
    aggregate::Aggregator,
    conf::{ColumnType, ScoreFileConf, ScoreFormat},
    line::{ColumnIndices, ScoreLine},
    tabix::TabixAccess,
};

/// Name of the overlap count column in fetch results.
pub const COUNT: &str = "COUNT";

/// Backend serving score lines for 1-based closed intervals.
pub trait ScoreAccess: std::fmt::Debug {
    /// Lines overlapping the query, with the strategy left to the backend.
    fn fetch(&mut self, chrom: &str, pos_begin: i64, pos_end: i64) -> Result<Vec<ScoreLine>, Error>;

    /// Lines overlapping the query, bypassing any cache.
    fn fetch_direct(&mut self, chrom: &str, pos_begin: i64, pos_end: i64)
        -> Result<Vec<ScoreLine>, Error>;

    /// Chromosome names known to the backend.
    fn contigs(&self) -> Vec<String>;
}

impl ScoreAccess for TabixAccess {
    fn fetch(&mut self, chrom: &str, pos_begin: i64, pos_end: i64) -> Result<Vec<ScoreLine>, Error> {
        TabixAccess::fetch(self, chrom, pos_begin, pos_end)
    }

    fn fetch_direct(
        &mut self,
        chrom: &str,
        pos_begin: i64,
        pos_end: i64,
    ) -> Result<Vec<ScoreLine>, Error> {
        TabixAccess::fetch_direct(self, chrom, pos_begin, pos_end)
    }

    fn contigs(&self) -> Vec<String> {
        TabixAccess::contigs(self)
    }
}

/// Raw values of the lines returned by a fetch, by column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedScores {
    /// Overlap of each line with the query in bp.
    pub count: Vec<i64>,
    /// Values of each schema column.
    pub columns: IndexMap<String, Vec<String>>,
}

impl FetchedScores {
    pub fn len(&self) -> usize {
        self.count.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&[String]> {
        self.columns.get(column).map(Vec::as_slice)
    }
}

/// Score columns of a fetch parsed as floats; `None` marks missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreFrame {
    pub count: Vec<i64>,
    pub scores: IndexMap<String, Vec<Option<f64>>>,
}

impl ScoreFrame {
    pub fn len(&self) -> usize {
        self.count.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count.is_empty()
    }

    /// Pairs of overlap count and value of `column`.
    pub fn counted(&self, column: &str) -> Vec<(i64, Option<f64>)> {
        match self.scores.get(column) {
            Some(values) => self
                .count
                .iter()
                .zip(values.iter())
                .map(|(count, value)| (*count, *value))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Read the column names from the last `#` line at the start of `path`.
fn read_header<P: AsRef<Path>>(path: P) -> Result<Vec<String>, anyhow::Error> {
    let mut reader = open_read_maybe_gz(path.as_ref())?;
    let mut header = None;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        match line.strip_prefix('#') {
            Some(rest) => header = Some(rest.trim_end_matches(&['\n', '\r'][..]).to_owned()),
            None => break,
        }
    }
    header
        .map(|header| header.split('\t').map(|s| s.trim().to_owned()).collect())
        .ok_or_else(|| {
            Error::config(format!(
                "no header configured and no header line in {:?}",
                path.as_ref()
            ))
            .into()
        })
}

/// A score file with its resolved configuration and access backend.
#[derive(Debug)]
pub struct ScoreFile {
    path: PathBuf,
    conf: ScoreFileConf,
    header: Vec<String>,
    schema: IndexMap<String, ColumnType>,
    score_names: Vec<String>,
    columns: ColumnIndices,
    ref_index: Option<usize>,
    alt_index: Option<usize>,
    chr_prefix: bool,
    no_score_value: Option<String>,
    access: Box<dyn ScoreAccess>,
}

impl ScoreFile {
    /// Open the score file at `path`; the configuration defaults to `<path>.conf`.
    #[tracing::instrument]
    pub fn open<P, C>(path: P, conf_path: Option<C>) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path> + std::fmt::Debug,
        C: AsRef<Path> + std::fmt::Debug,
    {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::config(format!("score file {:?} does not exist", path)).into());
        }
        let conf_path = match conf_path {
            Some(conf_path) => conf_path.as_ref().to_path_buf(),
            None => {
                let mut conf_path = path.as_os_str().to_owned();
                conf_path.push(".conf");
                PathBuf::from(conf_path)
            }
        };
        tracing::debug!("loading score file configuration from {:?}", &conf_path);
        let text = std::fs::read_to_string(&conf_path).map_err(|e| {
            Error::config(format!("could not read configuration {:?}: {}", &conf_path, e))
        })?;
        let conf = ScoreFileConf::from_toml(&text)?;
        let header = match &conf.general.header {
            Some(header) => header.to_vec(),
            None => read_header(path)?,
        };

        Self::with_conf(path, conf, header)
    }

    fn with_conf(path: &Path, conf: ScoreFileConf, header: Vec<String>) -> Result<Self, anyhow::Error> {
        let score_names = conf.columns.score.to_vec();
        if score_names.is_empty() {
            return Err(Error::config(format!("no score columns configured for {:?}", path)).into());
        }
        if let Some(name) = conf.schema.keys().find(|name| !header.contains(*name)) {
            return Err(Error::config(format!(
                "schema column {} of {:?} is not in header {:?}",
                name, path, &header
            ))
            .into());
        }
        let schema = header
            .iter()
            .map(|name| {
                let column_type = conf.schema.get(name).cloned().unwrap_or_else(|| {
                    if score_names.contains(name) {
                        ColumnType::Float
                    } else {
                        ColumnType::Str
                    }
                });
                (name.clone(), column_type)
            })
            .collect::<IndexMap<_, _>>();
        if let Some(name) = score_names.iter().find(|name| !schema.contains_key(*name)) {
            return Err(Error::config(format!(
                "score column {} of {:?} is not in schema {:?}",
                name,
                path,
                schema.keys().collect::<Vec<_>>()
            ))
            .into());
        }

        if let Some(name) = conf
            .aggregators
            .keys()
            .find(|name| !score_names.contains(*name))
        {
            return Err(Error::config(format!(
                "aggregators given for {} which is not a score of {:?}",
                name, path
            ))
            .into());
        }

        let index_of = |name: &str| {
            schema.get_index_of(name).ok_or_else(|| {
                Error::config(format!("column {} of {:?} is not in header", name, path))
            })
        };
        let columns = ColumnIndices::new(
            index_of(&conf.columns.chr)?,
            index_of(&conf.columns.pos_begin)?,
            index_of(conf.pos_end())?,
        );
        let ref_index = conf.columns.ref_.as_deref().map(index_of).transpose()?;
        let alt_index = conf.columns.alt.as_deref().map(index_of).transpose()?;
        let no_score_value = conf.no_score_value();
        let chr_prefix = conf.chr_prefix();

        let access: Box<dyn ScoreAccess> = match conf.format() {
            ScoreFormat::Tsv | ScoreFormat::Bedgraph => Box::new(TabixAccess::open(
                path,
                columns,
                no_score_value.clone(),
            )?),
            ScoreFormat::Bigwig => {
                return Err(Error::config(format!(
                    "bigwig backend not available for {:?}",
                    path
                ))
                .into())
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            conf,
            header,
            schema,
            score_names,
            columns,
            ref_index,
            alt_index,
            chr_prefix,
            no_score_value,
            access,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conf(&self) -> &ScoreFileConf {
        &self.conf
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn schema(&self) -> &IndexMap<String, ColumnType> {
        &self.schema
    }

    pub fn score_names(&self) -> &[String] {
        &self.score_names
    }

    pub fn columns(&self) -> &ColumnIndices {
        &self.columns
    }

    pub fn ref_name(&self) -> Option<&str> {
        self.conf.columns.ref_.as_deref()
    }

    pub fn alt_name(&self) -> Option<&str> {
        self.conf.columns.alt.as_deref()
    }

    pub fn chr_prefix(&self) -> bool {
        self.chr_prefix
    }

    pub fn no_score_value(&self) -> Option<&str> {
        self.no_score_value.as_deref()
    }

    /// Aggregator over positions for score `name`, `mean` unless configured.
    pub fn position_aggregator(&self, name: &str) -> Aggregator {
        self.conf
            .aggregators
            .get(name)
            .and_then(|aggregators| aggregators.position)
            .unwrap_or(Aggregator::Mean)
    }

    /// Aggregator over the alleles of a position for score `name`, `max` unless configured.
    pub fn nucleotide_aggregator(&self, name: &str) -> Aggregator {
        self.conf
            .aggregators
            .get(name)
            .and_then(|aggregators| aggregators.nucleotide)
            .unwrap_or(Aggregator::Max)
    }

    /// Chromosome names available in the file.
    pub fn chromosomes(&self) -> Vec<String> {
        self.access.contigs()
    }

    /// Whether `value` stands for a missing score.
    pub fn is_missing(&self, value: &str) -> bool {
        value.is_empty()
            || value.eq_ignore_ascii_case("na")
            || self.no_score_value.as_deref() == Some(value)
    }

    fn collect(&self, lines: Vec<ScoreLine>, pos_begin: i64, pos_end: i64) -> Result<FetchedScores, Error> {
        let mut result = FetchedScores {
            count: Vec::with_capacity(lines.len()),
            columns: self
                .schema
                .keys()
                .map(|name| (name.clone(), Vec::with_capacity(lines.len())))
                .collect(),
        };
        for line in lines {
            let count = pos_end
                .min(line.pos_end())
                .saturating_sub(line.pos_begin().max(pos_begin))
                .saturating_add(1);
            if count < 1 {
                return Err(Error::contract(format!(
                    "score line {}:{}-{} does not overlap query {}-{}",
                    line.chrom(),
                    line.pos_begin(),
                    line.pos_end(),
                    pos_begin,
                    pos_end
                )));
            }
            result.count.push(count);
            for (index, values) in result.columns.values_mut().enumerate() {
                values.push(line.get(index).unwrap_or_default().to_owned());
            }
        }
        Ok(result)
    }

    /// Values of all lines overlapping `chrom:pos_begin-pos_end` with their overlap.
    pub fn fetch_scores(&mut self, chrom: &str, pos_begin: i64, pos_end: i64) -> Result<FetchedScores, Error> {
        let chrom = handle_chrom_prefix(self.chr_prefix, chrom);
        let lines = self.access.fetch(&chrom, pos_begin, pos_end)?;
        self.collect(lines, pos_begin, pos_end)
    }

    /// Like [`Self::fetch_scores`] with the score columns parsed as floats.
    ///
    /// Values are kept as `f64` whatever width the schema declares, so that
    /// aggregates render the same decimals as the score file.
    pub fn fetch_scores_df(&mut self, chrom: &str, pos_begin: i64, pos_end: i64) -> Result<ScoreFrame, Error> {
        let fetched = self.fetch_scores(chrom, pos_begin, pos_end)?;
        self.to_frame(fetched)
    }

    /// Parse the score columns of `fetched`.
    pub fn to_frame(&self, fetched: FetchedScores) -> Result<ScoreFrame, Error> {
        let mut scores = IndexMap::new();
        for name in &self.score_names {
            let values = fetched
                .get(name)
                .unwrap_or_default()
                .iter()
                .map(|value| self.parse_score(name, value))
                .collect::<Result<Vec<_>, _>>()?;
            scores.insert(name.clone(), values);
        }
        Ok(ScoreFrame {
            count: fetched.count,
            scores,
        })
    }

    fn parse_score(&self, name: &str, value: &str) -> Result<Option<f64>, Error> {
        if self.is_missing(value) {
            Ok(None)
        } else {
            value
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| Error::parse(name, value, e))
        }
    }

    /// Maximum of each score column over the lines overlapping the query.
    pub fn fetch_highest_scores(
        &mut self,
        chrom: &str,
        pos_begin: i64,
        pos_end: i64,
    ) -> Result<IndexMap<String, Option<f64>>, Error> {
        let chrom = handle_chrom_prefix(self.chr_prefix, chrom);
        let lines = self.access.fetch_direct(&chrom, pos_begin, pos_end)?;
        let fetched = self.collect(lines, pos_begin, pos_end)?;
        let frame = self.to_frame(fetched)?;
        Ok(self
            .score_names
            .iter()
            .map(|name| {
                let values = frame.scores.get(name).cloned().unwrap_or_default();
                (
                    name.clone(),
                    super::aggregate::max(values),
                )
            })
            .collect())
    }

    /// Score values of the row at `chrom:pos` carrying exactly the given alleles.
    ///
    /// Returns `None` when no such row exists. Fails unless the file configures
    /// reference and alternative columns.
    pub fn fetch_allele_scores(
        &mut self,
        chrom: &str,
        pos: i64,
        reference: &str,
        alternative: &str,
    ) -> Result<Option<IndexMap<String, String>>, Error> {
        if self.ref_index.is_none() || self.alt_index.is_none() {
            return Err(Error::config(format!(
                "score file {:?} configures no ref/alt columns",
                &self.path
            )));
        }
        let fetched = self.fetch_scores(chrom, pos, pos)?;
        let positions = fetched
            .get(&self.header[self.columns.pos_begin])
            .unwrap_or_default();
        let pos = pos.to_string();
        let row = self
            .matching_alleles(&fetched, reference, alternative)
            .into_iter()
            .find(|&row| positions.get(row).map(|p| p.trim()) == Some(pos.as_str()));

        Ok(row.map(|row| {
            self.score_names
                .iter()
                .map(|name| {
                    let value = fetched
                        .get(name)
                        .and_then(|values| values.get(row))
                        .cloned()
                        .unwrap_or_default();
                    (name.clone(), value)
                })
                .collect()
        }))
    }

    /// Rows of `fetched` whose reference and alternative allele match.
    pub fn matching_alleles(&self, fetched: &FetchedScores, reference: &str, alternative: &str) -> Vec<usize> {
        let column = |index: Option<usize>| {
            index
                .and_then(|index| self.schema.get_index(index))
                .and_then(|(name, _)| fetched.get(name))
        };
        match (column(self.ref_index), column(self.alt_index)) {
            (Some(refs), Some(alts)) => (0..fetched.len())
                .filter(|&i| {
                    refs[i].eq_ignore_ascii_case(reference) && alts[i].eq_ignore_ascii_case(alternative)
                })
                .collect(),
            _ => (0..fetched.len()).collect(),
        }
    }
}
