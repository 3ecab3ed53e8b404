//! Sidecar configuration of score files (`<score file>.conf`).

use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{err::Error, scores::aggregate::Aggregator};

/// A list given either as TOML array or as comma-separated string.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(untagged)]
pub enum StringOrList {
    String(String),
    List(Vec<String>),
}

impl StringOrList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StringOrList::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
            StringOrList::List(list) => list.iter().map(|s| s.trim().to_owned()).collect(),
        }
    }
}

impl Default for StringOrList {
    fn default() -> Self {
        StringOrList::List(Vec::new())
    }
}

/// Storage format of the score file.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    Default,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(try_from = "String", into = "String")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum ScoreFormat {
    #[default]
    Tsv,
    Bedgraph,
    #[strum(to_string = "bigwig", serialize = "bw")]
    Bigwig,
}

impl TryFrom<String> for ScoreFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ScoreFormat::from_str(&value).map_err(|_| format!("unknown score file format {:?}", value))
    }
}

impl From<ScoreFormat> for String {
    fn from(value: ScoreFormat) -> Self {
        value.to_string()
    }
}

/// Declared type of a score file column.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Str,
    Float,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Bool,
    List(Box<ColumnType>),
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ColumnType::Str | ColumnType::Bool | ColumnType::List(_))
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(inner) = s.strip_prefix("list(").and_then(|s| s.strip_suffix(')')) {
            return Ok(ColumnType::List(Box::new(inner.parse()?)));
        }
        Ok(match s.as_str() {
            "str" | "string" => ColumnType::Str,
            "float" => ColumnType::Float,
            "int" => ColumnType::Int,
            "int8" => ColumnType::Int8,
            "int16" => ColumnType::Int16,
            "int32" => ColumnType::Int32,
            "int64" => ColumnType::Int64,
            "bool" => ColumnType::Bool,
            _ => return Err(format!("unknown column type {:?}", s)),
        })
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Str => write!(f, "str"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Int => write!(f, "int"),
            ColumnType::Int8 => write!(f, "int8"),
            ColumnType::Int16 => write!(f, "int16"),
            ColumnType::Int32 => write!(f, "int32"),
            ColumnType::Int64 => write!(f, "int64"),
            ColumnType::Bool => write!(f, "bool"),
            ColumnType::List(inner) => write!(f, "list({})", inner),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.to_string()
    }
}

/// The `[general]` table.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(default)]
pub struct GeneralConf {
    /// Column names of the score file, read from the file when absent.
    pub header: Option<StringOrList>,
    /// Value marking a missing score; `na` and `none` mean "no value".
    #[serde(alias = "noscorevalue")]
    pub no_score_value: Option<String>,
    pub format: Option<ScoreFormat>,
    pub chr_prefix: Option<bool>,
}

/// The `[misc]` table.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(default)]
pub struct MiscConf {
    pub format: Option<ScoreFormat>,
    pub chr_prefix: Option<bool>,
}

/// The `[columns]` table naming the special columns.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct ColumnsConf {
    pub chr: String,
    pub pos_begin: String,
    /// Defaults to `pos_begin` for single position scores.
    #[serde(default)]
    pub pos_end: Option<String>,
    #[serde(default, rename = "ref")]
    pub ref_: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    pub score: StringOrList,
}

/// Default reductions of one score column, see [`Aggregator`].
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreAggregators {
    /// Reduces the values of the positions covered by a variant.
    pub position: Option<Aggregator>,
    /// Reduces the alleles of one position in nucleotide specific files.
    pub nucleotide: Option<Aggregator>,
}

/// Configuration of one score file.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct ScoreFileConf {
    #[serde(default)]
    pub general: GeneralConf,
    pub columns: ColumnsConf,
    #[serde(default)]
    pub misc: MiscConf,
    /// Column types; score columns default to `float` and other columns to `str`.
    #[serde(default)]
    pub schema: IndexMap<String, ColumnType>,
    /// Default aggregators by score column.
    #[serde(default)]
    pub aggregators: IndexMap<String, ScoreAggregators>,
}

impl ScoreFileConf {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid score file configuration: {}", e)))
    }

    pub fn format(&self) -> ScoreFormat {
        self.general.format.or(self.misc.format).unwrap_or_default()
    }

    pub fn chr_prefix(&self) -> bool {
        self.general
            .chr_prefix
            .or(self.misc.chr_prefix)
            .unwrap_or(false)
    }

    pub fn pos_end(&self) -> &str {
        self.columns
            .pos_end
            .as_deref()
            .unwrap_or(&self.columns.pos_begin)
    }

    /// The configured missing-score marker, `None` for `na`/`none`.
    pub fn no_score_value(&self) -> Option<String> {
        let value = self.general.no_score_value.as_deref().unwrap_or("na");
        if value.eq_ignore_ascii_case("na") || value.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(value.to_owned())
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn parse_full() -> Result<(), anyhow::Error> {
        let conf = ScoreFileConf::from_toml(
            r#"
            [general]
            header = ["chrom", "pos", "ref", "alt", "cadd_raw", "cadd_phred"]
            no_score_value = "-"
            format = "TSV"

            [columns]
            chr = "chrom"
            pos_begin = "pos"
            ref = "ref"
            alt = "alt"
            score = "cadd_raw, cadd_phred"

            [misc]
            chr_prefix = true

            [schema]
            cadd_raw = "float"
            pos = "int"

            [aggregators.cadd_raw]
            position = "median"
            nucleotide = "min"
            "#,
        )?;

        assert_eq!(
            conf.general.header.as_ref().map(StringOrList::to_vec),
            Some(vec![
                "chrom".to_owned(),
                "pos".to_owned(),
                "ref".to_owned(),
                "alt".to_owned(),
                "cadd_raw".to_owned(),
                "cadd_phred".to_owned()
            ])
        );
        assert_eq!(conf.columns.score.to_vec(), vec!["cadd_raw", "cadd_phred"]);
        assert_eq!(conf.columns.ref_.as_deref(), Some("ref"));
        assert_eq!(conf.pos_end(), "pos");
        assert_eq!(conf.format(), ScoreFormat::Tsv);
        assert!(conf.chr_prefix());
        assert_eq!(conf.no_score_value(), Some(String::from("-")));
        assert_eq!(conf.schema.get("pos"), Some(&ColumnType::Int));
        assert_eq!(
            conf.aggregators.get("cadd_raw"),
            Some(&ScoreAggregators {
                position: Some(Aggregator::Median),
                nucleotide: Some(Aggregator::Min),
            })
        );
        assert_eq!(conf.aggregators.get("cadd_phred"), None);

        Ok(())
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some("na"), None)]
    #[case(Some("NONE"), None)]
    #[case(Some("."), Some("."))]
    fn no_score_value(#[case] configured: Option<&str>, #[case] expected: Option<&str>) {
        let mut conf = ScoreFileConf::from_toml(
            "[columns]\nchr = \"c\"\npos_begin = \"p\"\nscore = [\"s\"]\n",
        )
        .unwrap();
        conf.general.no_score_value = configured.map(str::to_owned);

        assert_eq!(conf.no_score_value().as_deref(), expected);
    }

    #[rstest]
    #[case("tsv", ScoreFormat::Tsv)]
    #[case("bedgraph", ScoreFormat::Bedgraph)]
    #[case("bw", ScoreFormat::Bigwig)]
    #[case("BigWig", ScoreFormat::Bigwig)]
    fn parse_format(#[case] s: &str, #[case] expected: ScoreFormat) {
        assert_eq!(ScoreFormat::from_str(s).unwrap(), expected);
    }

    #[rstest]
    #[case("float", ColumnType::Float)]
    #[case("Int8", ColumnType::Int8)]
    #[case("list(str)", ColumnType::List(Box::new(ColumnType::Str)))]
    fn parse_column_type(#[case] s: &str, #[case] expected: ColumnType) {
        assert_eq!(s.parse::<ColumnType>().unwrap(), expected);
    }

    #[rstest]
    #[case("[aggregators.s]\nposition = \"mode\"\n")]
    #[case("[aggregators.s]\nallele = \"max\"\n")]
    fn invalid_aggregators_fail(#[case] aggregators: &str) {
        let result = ScoreFileConf::from_toml(&format!(
            "[columns]\nchr = \"c\"\npos_begin = \"p\"\nscore = \"s\"\n{}",
            aggregators
        ));

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unknown_column_type_fails() {
        let result = ScoreFileConf::from_toml(
            "[columns]\nchr = \"c\"\npos_begin = \"p\"\nscore = \"s\"\n[schema]\ns = \"complex\"\n",
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
