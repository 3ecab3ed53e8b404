//! Restriction of processing to a genomic region given as `chrom:start[-end]`.

use std::str::FromStr;

use crate::err::Error;

/// 1-based closed region; `end` is `None` for "from `begin` onward".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub begin: i64,
    pub end: Option<i64>,
}

/// Split a region string into its chromosome and its begin and end positions.
pub fn parse_region_string(region: &str) -> Result<(String, i64, Option<i64>), Error> {
    let (chrom, range) = region
        .split_once(':')
        .filter(|(chrom, _)| !chrom.is_empty())
        .ok_or_else(|| Error::parse("region", region, "expected chrom:start[-end]"))?;
    let parse = |value: &str| {
        value
            .trim()
            .replace(',', "")
            .parse::<i64>()
            .map_err(|e| Error::parse("region", region, e))
    };
    let (begin, end) = match range.split_once('-') {
        Some((begin, end)) => (parse(begin)?, Some(parse(end)?)),
        None => (parse(range)?, None),
    };
    Ok((chrom.to_owned(), begin, end))
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chrom, begin, end) = parse_region_string(s)?;
        if matches!(end, Some(end) if end < begin) {
            return Err(Error::parse("region", s, "end lies before start"));
        }
        Ok(Self { chrom, begin, end })
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}:{}-{}", self.chrom, self.begin, end),
            None => write!(f, "{}:{}", self.chrom, self.begin),
        }
    }
}

impl Region {
    /// Whether the 1-based position `pos` lies within the region.
    pub fn contains_pos(&self, pos: i64) -> bool {
        match self.end {
            Some(end) => self.begin <= pos && pos <= end,
            None => pos >= self.begin,
        }
    }
}

/// Line filter applied to records of a region query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionFilter {
    /// No restriction, every line passes.
    All,
    /// Keep lines whose value in the (0-based) `pos_index` column is in `region`.
    Region { region: Region, pos_index: usize },
}

impl RegionFilter {
    pub fn new(region: Option<Region>, pos_index: usize) -> Self {
        match region {
            Some(region) => RegionFilter::Region { region, pos_index },
            None => RegionFilter::All,
        }
    }

    pub fn contains(&self, line: &[String]) -> Result<bool, Error> {
        match self {
            RegionFilter::All => Ok(true),
            RegionFilter::Region { region, pos_index } => {
                let value = line.get(*pos_index).map(String::as_str).unwrap_or_default();
                let pos = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| Error::parse(format!("column {}", pos_index + 1), value, e))?;
                Ok(region.contains_pos(pos))
            }
        }
    }
}
