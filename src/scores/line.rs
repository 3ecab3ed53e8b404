//! Score file rows and the "no data" sentinel row.

use crate::err::Error;

/// Positions of the chromosome, begin, and end column in a score row (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndices {
    pub chrom: usize,
    pub pos_begin: usize,
    pub pos_end: usize,
}

impl ColumnIndices {
    pub fn new(chrom: usize, pos_begin: usize, pos_end: usize) -> Self {
        Self {
            chrom,
            pos_begin,
            pos_end,
        }
    }
}

/// One row of a sorted score table with parsed coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreLine {
    chrom: String,
    pos_begin: i64,
    pos_end: i64,
    values: Vec<String>,
}

fn parse_pos(values: &[String], index: usize, what: &str) -> Result<i64, Error> {
    let value = values
        .get(index)
        .ok_or_else(|| Error::parse(what, "", format!("row has no column {}", index + 1)))?;
    value.trim().parse::<i64>().map_err(|e| Error::parse(what, value, e))
}

impl ScoreLine {
    /// Build a score line from the raw column `values` of a row.
    pub fn new(columns: &ColumnIndices, values: Vec<String>) -> Result<Self, Error> {
        let chrom = values
            .get(columns.chrom)
            .ok_or_else(|| {
                Error::parse("chrom", "", format!("row has no column {}", columns.chrom + 1))
            })?
            .clone();
        let pos_begin = parse_pos(&values, columns.pos_begin, "pos_begin")?;
        let pos_end = parse_pos(&values, columns.pos_end, "pos_end")?;
        if pos_begin > pos_end {
            return Err(Error::contract(format!(
                "score row {}:{}-{} ends before it begins",
                chrom, pos_begin, pos_end
            )));
        }

        Ok(Self {
            chrom,
            pos_begin,
            pos_end,
            values,
        })
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn pos_begin(&self) -> i64 {
        self.pos_begin
    }

    pub fn pos_end(&self) -> i64 {
        self.pos_end
    }

    /// Raw value of column `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

/// Sentinel standing in for "no score row".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoLine {
    no_score_value: Option<String>,
}

impl NoLine {
    pub fn new(no_score_value: Option<String>) -> Self {
        Self { no_score_value }
    }
}

/// A score row or the sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Data(ScoreLine),
    Empty(NoLine),
}

impl Line {
    pub fn chrom(&self) -> Option<&str> {
        match self {
            Line::Data(line) => Some(line.chrom()),
            Line::Empty(_) => None,
        }
    }

    pub fn pos_begin(&self) -> i64 {
        match self {
            Line::Data(line) => line.pos_begin(),
            Line::Empty(_) => -1,
        }
    }

    pub fn pos_end(&self) -> i64 {
        match self {
            Line::Data(line) => line.pos_end(),
            Line::Empty(_) => -1,
        }
    }

    /// Value of column `index`; the sentinel yields its no-score value.
    pub fn get(&self, index: usize) -> Option<&str> {
        match self {
            Line::Data(line) => line.get(index),
            Line::Empty(no_line) => no_line.no_score_value.as_deref(),
        }
    }

    pub fn as_data(&self) -> Option<&ScoreLine> {
        match self {
            Line::Data(line) => Some(line),
            Line::Empty(_) => None,
        }
    }
}

impl From<ScoreLine> for Line {
    fn from(line: ScoreLine) -> Self {
        Line::Data(line)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn score_line_accessors() -> Result<(), anyhow::Error> {
        let columns = ColumnIndices::new(0, 1, 2);
        let line = ScoreLine::new(&columns, row(&["1", "10", "15", "0.5"]))?;

        assert_eq!(line.chrom(), "1");
        assert_eq!(line.pos_begin(), 10);
        assert_eq!(line.pos_end(), 15);
        assert_eq!(line.get(3), Some("0.5"));
        assert_eq!(line.get(4), None);

        Ok(())
    }

    #[test]
    fn point_score_line_uses_same_column() -> Result<(), anyhow::Error> {
        let columns = ColumnIndices::new(0, 1, 1);
        let line = ScoreLine::new(&columns, row(&["X", "100", "A", "0.1"]))?;

        assert_eq!((line.pos_begin(), line.pos_end()), (100, 100));

        Ok(())
    }

    #[rstest::rstest]
    #[case(&["1", "ten", "15"])]
    #[case(&["1", "10"])]
    fn score_line_bad_position(#[case] values: &[&str]) {
        let columns = ColumnIndices::new(0, 1, 2);
        let err = ScoreLine::new(&columns, row(values)).unwrap_err();

        assert!(matches!(err, Error::Parse { .. }), "{:?}", err);
    }

    #[test]
    fn score_line_inverted_interval() {
        let columns = ColumnIndices::new(0, 1, 2);
        let err = ScoreLine::new(&columns, row(&["1", "20", "10"])).unwrap_err();

        assert!(matches!(err, Error::Contract(_)));
    }

    #[rstest::rstest]
    #[case(None)]
    #[case(Some("-"))]
    fn no_line_returns_sentinel(#[case] no_score_value: Option<&str>) {
        let line = Line::Empty(NoLine::new(no_score_value.map(str::to_owned)));

        assert_eq!(line.chrom(), None);
        assert_eq!(line.pos_begin(), -1);
        assert_eq!(line.pos_end(), -1);
        assert_eq!(line.get(0), no_score_value);
        assert_eq!(line.get(42), no_score_value);
        assert!(line.as_data().is_none());
    }
}
