//! Preannotator that normalizes the variant description of a line.
//!
//! Lines describe variants either VCF-like (chromosome, position, reference
//! and alternative allele columns) or CSHL-like (a `chrom:pos` location and a
//! `sub(A->G)`, `ins(AT)`, `del(3)`, `complex(AC->T)` or `CNV+` variant). Both
//! are mapped onto the virtual `VF:*` columns the score annotators read.

use indexmap::IndexMap;
use regex::Regex;

use crate::{err::Error, scores::conf::StringOrList, scores::region::parse_region_string};

use super::{conf::StageConf, Annotator, Cell, Options, StageContext};

/// Registry name of the preannotator.
pub const NAME: &str = "variant_format";

pub const VF_CHROM: &str = "VF:chrom";
pub const VF_POS_BEGIN: &str = "VF:pos_begin";
pub const VF_POS_END: &str = "VF:pos_end";
pub const VF_REF: &str = "VF:ref";
pub const VF_ALT: &str = "VF:alt";
pub const VF_TYPE: &str = "VF:type";

/// Columns produced by the preannotator, in output order.
pub const COLUMNS: [&str; 6] = [VF_CHROM, VF_POS_BEGIN, VF_POS_END, VF_REF, VF_ALT, VF_TYPE];

pub const CHROM_NAMES: &[&str] = &["CHROM", "#CHROM", "chrom", "chr", "chromosome"];
pub const POSITION_NAMES: &[&str] = &["POS", "pos", "position"];
pub const REF_NAMES: &[&str] = &["REF", "ref", "reference"];
pub const ALT_NAMES: &[&str] = &["ALT", "alt", "alternative"];
pub const LOCATION_NAMES: &[&str] = &["location"];
pub const VARIANT_NAMES: &[&str] = &["variant"];

/// Kind of a normalized variant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum VariantType {
    Substitution,
    Insertion,
    Deletion,
    Complex,
    Cnv,
}

/// A variant mapped onto reference coordinates (1-based, closed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub chrom: String,
    pub pos_begin: i64,
    pub pos_end: i64,
    pub reference: String,
    pub alternative: String,
    pub variant_type: VariantType,
}

/// Normalize allele spelling: upper case, `-` for the empty allele.
fn allele(column: &str, value: &str) -> Result<String, Error> {
    let value = value.trim();
    if value == "-" {
        return Ok(String::new());
    }
    if !value.bytes().all(|b| b.is_ascii_alphabetic() || b == b'*') {
        return Err(Error::parse(column, value, "not a nucleotide sequence"));
    }
    Ok(value.to_ascii_uppercase())
}

fn parse_position(column: &str, value: &str) -> Result<i64, Error> {
    value
        .trim()
        .replace(',', "")
        .parse::<i64>()
        .map_err(|e| Error::parse(column, value, e))
}

impl Variant {
    /// Build from VCF-style columns, trimming the shared allele prefix and suffix.
    pub fn from_vcf(chrom: &str, pos: &str, reference: &str, alternative: &str) -> Result<Self, Error> {
        let pos = parse_position("position", pos)?;
        let reference = allele("reference", reference)?;
        let alternative = allele("alternative", alternative)?;

        let prefix = reference
            .bytes()
            .zip(alternative.bytes())
            .take_while(|(r, a)| r == a)
            .count();
        let (r, a) = (&reference[prefix..], &alternative[prefix..]);
        let suffix = r
            .bytes()
            .rev()
            .zip(a.bytes().rev())
            .take_while(|(r, a)| r == a)
            .count();
        let (r, a) = (&r[..r.len() - suffix], &a[..a.len() - suffix]);
        let pos_begin = pos + prefix as i64;

        let (variant_type, pos_end) = match (r.len(), a.len()) {
            (0, 0) => {
                return Err(Error::parse(
                    "alternative",
                    alternative.as_str(),
                    "same as the reference allele",
                ))
            }
            (1, 1) => (VariantType::Substitution, pos_begin),
            (0, _) => (VariantType::Insertion, pos_begin),
            (n, 0) => (VariantType::Deletion, pos_begin + n as i64 - 1),
            (n, _) => (VariantType::Complex, pos_begin + n as i64 - 1),
        };
        Ok(Variant {
            chrom: chrom.trim().to_owned(),
            pos_begin,
            pos_end,
            reference: r.to_owned(),
            alternative: a.to_owned(),
            variant_type,
        })
    }

    /// Build from a `chrom:pos[-end]` location and a CSHL variant description.
    pub fn from_cshl(location: &str, variant: &str, pattern: &Regex) -> Result<Self, Error> {
        let (chrom, pos, end) = parse_region_string(location)
            .map_err(|_| Error::parse("location", location, "expected chrom:pos[-end]"))?;
        let captures = pattern
            .captures(variant.trim())
            .ok_or_else(|| Error::parse("variant", variant, "unknown variant description"))?;
        let group = |name: &str| captures.name(name).map(|m| m.as_str());

        let (variant_type, pos_end, reference, alternative) =
            if let (Some(r), Some(a)) = (group("sub_ref"), group("sub_alt")) {
                (VariantType::Substitution, pos, allele("variant", r)?, allele("variant", a)?)
            } else if let Some(inserted) = group("ins") {
                (VariantType::Insertion, pos, String::new(), allele("variant", inserted)?)
            } else if let Some(length) = group("del") {
                let length = parse_position("variant", length)?;
                if length < 1 {
                    return Err(Error::parse("variant", variant, "empty deletion"));
                }
                (VariantType::Deletion, pos + length - 1, String::new(), String::new())
            } else if let Some(r) = group("cx_ref") {
                let r = allele("variant", r)?;
                let a = allele("variant", group("cx_alt").unwrap_or_default())?;
                let end = pos + r.len().max(1) as i64 - 1;
                (VariantType::Complex, end, r, a)
            } else {
                (VariantType::Cnv, end.unwrap_or(pos), String::new(), String::new())
            };
        Ok(Variant {
            chrom,
            pos_begin: pos,
            pos_end,
            reference,
            alternative,
            variant_type,
        })
    }

    /// Value of the `VF:*` column `key`.
    pub fn column(&self, key: &str) -> Result<String, Error> {
        Ok(match key {
            VF_CHROM => self.chrom.clone(),
            VF_POS_BEGIN => self.pos_begin.to_string(),
            VF_POS_END => self.pos_end.to_string(),
            VF_REF => self.reference.clone(),
            VF_ALT => self.alternative.clone(),
            VF_TYPE => self.variant_type.to_string(),
            _ => return Err(Error::config(format!("{} provides no column {}", NAME, key))),
        })
    }
}

/// Pattern of CSHL variant descriptions.
pub fn cshl_pattern() -> Result<Regex, Error> {
    Regex::new(concat!(
        r"(?i)^(?:",
        r"sub\((?P<sub_ref>[a-z])->(?P<sub_alt>[a-z])\)",
        r"|ins\((?P<ins>[a-z]+)\)",
        r"|del\((?P<del>\d+)\)",
        r"|comp(?:lex)?\((?P<cx_ref>[a-z]+)->(?P<cx_alt>[a-z]*)\)",
        r"|cnv[+-]?",
        r")$"
    ))
    .map_err(|e| Error::config(format!("invalid variant pattern: {}", e)))
}

/// Stage configuration of the preannotator; all its columns are virtual.
pub fn stage_conf(options: Options) -> StageConf {
    StageConf {
        annotator: NAME.to_owned(),
        options,
        columns: COLUMNS
            .iter()
            .map(|c| (c.to_string(), c.to_string()))
            .collect::<IndexMap<_, _>>(),
        virtuals: Some(StringOrList::List(COLUMNS.iter().map(|c| c.to_string()).collect())),
    }
}

/// Where the variant description is read from, as 0-based column indices.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Vcf {
        chrom: usize,
        pos: usize,
        reference: usize,
        alternative: usize,
    },
    Cshl {
        location: usize,
        variant: usize,
    },
    Undetected,
}

#[derive(Debug)]
pub struct VariantFormatPreannotator {
    source: Source,
    pattern: Regex,
}

/// Column `option` if configured, else the last header column named like one of `names`.
fn find_column(ctx: &StageContext, option: &str, names: &[&str]) -> Result<Option<usize>, Error> {
    if let Some(label) = ctx.option(option) {
        return ctx.column(&label).map(Some);
    }
    Ok(names
        .iter()
        .find_map(|name| ctx.header.iter().rposition(|h| h == name)))
}

impl VariantFormatPreannotator {
    pub fn new(ctx: &StageContext) -> Result<Self, Error> {
        let vcf = (
            find_column(ctx, "chrom_column", CHROM_NAMES)?,
            find_column(ctx, "position_column", POSITION_NAMES)?,
            find_column(ctx, "ref_column", REF_NAMES)?,
            find_column(ctx, "alt_column", ALT_NAMES)?,
        );
        let cshl = (
            find_column(ctx, "location_column", LOCATION_NAMES)?,
            find_column(ctx, "variant_column", VARIANT_NAMES)?,
        );
        let explicit_cshl = ctx.option("location_column").is_some() || ctx.option("variant_column").is_some();

        let source = match (vcf, cshl) {
            ((Some(chrom), Some(pos), Some(reference), Some(alternative)), _) if !explicit_cshl => Source::Vcf {
                chrom,
                pos,
                reference,
                alternative,
            },
            (_, (Some(location), Some(variant))) => Source::Cshl { location, variant },
            _ => {
                tracing::warn!(
                    "stage [{}]: no variant columns found in header {:?}, the VF:* columns stay empty",
                    ctx.name,
                    ctx.header
                );
                Source::Undetected
            }
        };
        tracing::debug!("stage [{}] reads variants from {:?}", ctx.name, &source);

        Ok(Self {
            source,
            pattern: cshl_pattern()?,
        })
    }

    /// Normalized variant of `line`, `None` if any source cell is missing.
    pub fn variant(&self, line: &[Cell]) -> Result<Option<Variant>, Error> {
        let cell = |i: usize| line.get(i).and_then(|c| c.as_deref()).filter(|s| !s.is_empty());
        match self.source {
            Source::Vcf {
                chrom,
                pos,
                reference,
                alternative,
            } => match (cell(chrom), cell(pos), cell(reference), cell(alternative)) {
                (Some(c), Some(p), Some(r), Some(a)) => Variant::from_vcf(c, p, r, a).map(Some),
                _ => Ok(None),
            },
            Source::Cshl { location, variant } => match (cell(location), cell(variant)) {
                (Some(l), Some(v)) => Variant::from_cshl(l, v, &self.pattern).map(Some),
                _ => Ok(None),
            },
            Source::Undetected => Ok(None),
        }
    }
}

impl Annotator for VariantFormatPreannotator {
    fn line_annotations(&mut self, line: &[Cell], keys: &[String]) -> Result<Vec<Cell>, anyhow::Error> {
        match self.variant(line)? {
            Some(variant) => Ok(keys
                .iter()
                .map(|key| variant.column(key).map(Some))
                .collect::<Result<Vec<_>, _>>()?),
            None => Ok(vec![None; keys.len()]),
        }
    }
}

pub fn create(ctx: &StageContext) -> Result<Box<dyn Annotator>, anyhow::Error> {
    Ok(Box::new(VariantFormatPreannotator::new(ctx)?))
}
