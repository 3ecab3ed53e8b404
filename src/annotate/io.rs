//! Reading and writing of the tab-separated lines being annotated.

use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
};

use crate::{
    common::{
        handle_chrom_prefix,
        io::{open_read_maybe_gz, open_write_maybe_gz, AtomicWriter},
        noodles::is_tabix,
    },
    err::Error,
    scores::{
        line::ColumnIndices,
        region::{parse_region_string, Region, RegionFilter},
        tabix::{RegionCursor, TabixReader},
    },
};

use super::{
    layout::resolve_column,
    variant::{CHROM_NAMES, LOCATION_NAMES, POSITION_NAMES},
    Cell,
};

/// Source of the lines to annotate.
pub trait LineRead {
    /// Column names of the input, `None` for input without header.
    fn header(&self) -> Option<&[String]>;

    /// Names to resolve columns against; `"1"`..`"n"` for input without header.
    fn column_names(&self) -> Vec<String> {
        self.header().map(<[String]>::to_vec).unwrap_or_default()
    }

    /// `##` meta lines preceding the header, without line ends.
    fn meta_lines(&self) -> &[String] {
        &[]
    }

    /// Next line, `None` at the end of the input.
    fn read_line(&mut self) -> Result<Option<Vec<String>>, anyhow::Error>;
}

/// Sink of the annotated lines.
pub trait LineWrite {
    fn header_write(&mut self, header: &[String]) -> Result<(), anyhow::Error>;

    fn line_write(&mut self, line: &[Cell]) -> Result<(), anyhow::Error>;
}

/// Whether `line` is a comment to pass through unchanged.
pub fn is_comment(line: &[String]) -> bool {
    line.first().map(|first| first.starts_with('#')).unwrap_or(false)
}

fn split_line(line: &str) -> Option<Vec<String>> {
    let line = line.trim_end_matches(&['\n', '\r'][..]);
    if line.is_empty() {
        None
    } else {
        Some(line.split('\t').map(str::to_owned).collect())
    }
}

fn same_chrom(lhs: &str, rhs: &str) -> bool {
    lhs.strip_prefix("chr").unwrap_or(lhs) == rhs.strip_prefix("chr").unwrap_or(rhs)
}

/// Options of the input reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// The input has no header line.
    pub no_header: bool,
    /// Only read lines within this region.
    pub region: Option<Region>,
    pub chrom_column: Option<String>,
    pub position_column: Option<String>,
    pub location_column: Option<String>,
}

/// How the genomic locus of an input line is found.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Locus {
    Columns { chrom: usize, filter: RegionFilter },
    Location(usize),
}

/// Region restriction of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RegionSelect {
    region: Region,
    locus: Locus,
}

impl RegionSelect {
    fn new(options: &ReaderOptions, names: &[String]) -> Result<Option<Self>, Error> {
        let Some(region) = options.region.clone() else {
            return Ok(None);
        };
        let find = |label: &Option<String>, candidates: &[&str]| match label {
            Some(label) => resolve_column(names, label).map(Some),
            None => Ok(candidates
                .iter()
                .find_map(|name| names.iter().rposition(|n| n == name))),
        };
        let locus = match (
            find(&options.chrom_column, CHROM_NAMES)?,
            find(&options.position_column, POSITION_NAMES)?,
            find(&options.location_column, LOCATION_NAMES)?,
        ) {
            (Some(chrom), Some(pos), _) if options.location_column.is_none() => Locus::Columns {
                chrom,
                filter: RegionFilter::new(Some(region.clone()), pos),
            },
            (_, _, Some(location)) => Locus::Location(location),
            _ => {
                tracing::warn!(
                    "ignoring region {}: no chromosome and position columns in {:?}",
                    &region,
                    names
                );
                return Ok(None);
            }
        };
        Ok(Some(Self { region, locus }))
    }

    fn contains(&self, line: &[String]) -> Result<bool, Error> {
        let value = |i: usize| line.get(i).map(String::as_str).unwrap_or_default();
        match &self.locus {
            Locus::Columns { chrom, filter } => {
                Ok(same_chrom(value(*chrom), &self.region.chrom) && filter.contains(line)?)
            }
            Locus::Location(location) => {
                let (chrom, pos, _) = parse_region_string(value(*location))?;
                Ok(same_chrom(&chrom, &self.region.chrom) && self.region.contains_pos(pos))
            }
        }
    }
}

enum Source {
    Stream(Box<dyn BufRead>),
    Tabix {
        reader: TabixReader,
        cursor: Option<RegionCursor>,
    },
}

/// Reader of a tab-separated file; `-` is stdin.
///
/// With a region, bgzip compressed input with a tabix index is queried through
/// the index, other input is scanned and filtered.
pub struct TsvReader {
    path: PathBuf,
    meta: Vec<String>,
    header: Option<Vec<String>>,
    names: Vec<String>,
    source: Source,
    select: Option<RegionSelect>,
    peeked: Option<Vec<String>>,
}

impl TsvReader {
    pub fn open<P: AsRef<Path>>(path: P, options: &ReaderOptions) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let mut stream = open_read_maybe_gz(path)
            .map_err(|e| Error::config(format!("could not open input {:?}: {}", path, e)))?;
        let mut meta = Vec::new();
        let mut first = String::new();
        loop {
            first.clear();
            if stream.read_line(&mut first)? == 0 {
                break;
            }
            match first.trim_end_matches(&['\n', '\r'][..]) {
                line if line.starts_with("##") => meta.push(line.to_owned()),
                _ => break,
            }
        }
        let first = split_line(&first).unwrap_or_default();

        let (header, names, peeked) = if options.no_header {
            let names = (1..=first.len()).map(|i| i.to_string()).collect::<Vec<_>>();
            (None, names, Some(first).filter(|line| !line.is_empty()))
        } else {
            let mut header = first;
            if let Some(name) = header.first_mut() {
                *name = name.trim_start_matches('#').to_owned();
            }
            (Some(header.clone()), header, None)
        };
        let select = RegionSelect::new(options, &names)?;

        let source = match &select {
            Some(RegionSelect {
                region,
                locus: Locus::Columns { chrom, filter },
            }) if path != Path::new("-") && is_tabix(path) => {
                let pos = match filter {
                    RegionFilter::Region { pos_index, .. } => *pos_index,
                    RegionFilter::All => *chrom,
                };
                let mut reader = TabixReader::open(path, ColumnIndices::new(*chrom, pos, pos))?;
                let mut cursor = reader.query(&region.chrom, region.begin, region.end)?;
                if cursor.is_none() {
                    let flipped = handle_chrom_prefix(!region.chrom.starts_with("chr"), &region.chrom);
                    cursor = reader.query(&flipped, region.begin, region.end)?;
                }
                if cursor.is_none() {
                    tracing::warn!("could not find region {} in {:?}", region, path);
                }
                tracing::debug!("reading region {} of {:?} through its index", region, path);
                Source::Tabix { reader, cursor }
            }
            _ => Source::Stream(stream),
        };
        let peeked = match source {
            Source::Stream(_) => peeked,
            Source::Tabix { .. } => None,
        };

        Ok(Self {
            path: path.to_path_buf(),
            meta,
            header,
            names,
            source,
            select,
            peeked,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_raw(&mut self) -> Result<Option<Vec<String>>, anyhow::Error> {
        match &mut self.source {
            Source::Stream(stream) => {
                let mut buf = String::new();
                loop {
                    buf.clear();
                    if stream.read_line(&mut buf)? == 0 {
                        return Ok(None);
                    }
                    if let Some(line) = split_line(&buf) {
                        return Ok(Some(line));
                    }
                }
            }
            Source::Tabix { reader, cursor } => match cursor {
                Some(cursor) => Ok(reader.next_in(cursor)?.map(|line| line.into_values())),
                None => Ok(None),
            },
        }
    }
}

impl LineRead for TsvReader {
    fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    fn meta_lines(&self) -> &[String] {
        &self.meta
    }

    fn column_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn read_line(&mut self) -> Result<Option<Vec<String>>, anyhow::Error> {
        loop {
            let line = match self.peeked.take() {
                Some(line) => line,
                None => match self.next_raw()? {
                    Some(line) => line,
                    None => return Ok(None),
                },
            };
            let selected = match &self.select {
                Some(select) if !is_comment(&line) => select.contains(&line)?,
                _ => true,
            };
            if selected {
                return Ok(Some(line));
            }
        }
    }
}

/// Writer of tab-separated lines with missing values rendered as `missing_value`.
pub struct TsvWriter<W: Write> {
    inner: W,
    missing_value: String,
}

impl<W: Write> TsvWriter<W> {
    pub fn new(inner: W, missing_value: &str) -> Self {
        Self {
            inner,
            missing_value: missing_value.to_owned(),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl TsvWriter<AtomicWriter> {
    /// Open `path` for writing, `-` is stdout; the file appears on [`Self::finish`].
    pub fn open<P: AsRef<Path>>(path: P, missing_value: &str) -> Result<Self, anyhow::Error> {
        Ok(Self::new(open_write_maybe_gz(path)?, missing_value))
    }

    pub fn finish(self) -> Result<(), anyhow::Error> {
        self.inner.finish()
    }
}

impl<W: Write> LineWrite for TsvWriter<W> {
    fn header_write(&mut self, header: &[String]) -> Result<(), anyhow::Error> {
        writeln!(self.inner, "{}", header.join("\t"))?;
        Ok(())
    }

    fn line_write(&mut self, line: &[Cell]) -> Result<(), anyhow::Error> {
        let missing = self.missing_value.as_str();
        let mut first = true;
        for cell in line {
            if !first {
                self.inner.write_all(b"\t")?;
            }
            first = false;
            self.inner
                .write_all(cell.as_deref().unwrap_or(missing).as_bytes())?;
        }
        self.inner.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::common::noodles::test::write_tabix;

    /// Lines held in memory.
    #[derive(Debug, Default)]
    pub struct MemoryReader {
        pub header: Option<Vec<String>>,
        pub lines: VecDeque<Vec<String>>,
    }

    impl MemoryReader {
        pub fn new(header: Option<&[&str]>, lines: &[&[&str]]) -> Self {
            let to_strings = |values: &[&str]| values.iter().map(|s| s.to_string()).collect::<Vec<_>>();
            Self {
                header: header.map(to_strings),
                lines: lines.iter().map(|line| to_strings(line)).collect(),
            }
        }
    }

    impl LineRead for MemoryReader {
        fn header(&self) -> Option<&[String]> {
            self.header.as_deref()
        }

        fn column_names(&self) -> Vec<String> {
            match (&self.header, self.lines.front()) {
                (Some(header), _) => header.clone(),
                (None, Some(line)) => (1..=line.len()).map(|i| i.to_string()).collect(),
                (None, None) => Vec::new(),
            }
        }

        fn read_line(&mut self) -> Result<Option<Vec<String>>, anyhow::Error> {
            Ok(self.lines.pop_front())
        }
    }

    /// Written header and lines, missing values kept as `None`.
    #[derive(Debug, Default)]
    pub struct MemoryWriter {
        pub header: Option<Vec<String>>,
        pub lines: Vec<Vec<Cell>>,
    }

    impl LineWrite for MemoryWriter {
        fn header_write(&mut self, header: &[String]) -> Result<(), anyhow::Error> {
            self.header = Some(header.to_vec());
            Ok(())
        }

        fn line_write(&mut self, line: &[Cell]) -> Result<(), anyhow::Error> {
            self.lines.push(line.to_vec());
            Ok(())
        }
    }

    fn read_all(reader: &mut dyn LineRead) -> Result<Vec<Vec<String>>, anyhow::Error> {
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line()? {
            lines.push(line);
        }
        Ok(lines)
    }

    fn first_column(lines: &[Vec<String>]) -> Vec<&str> {
        lines.iter().map(|line| line[0].as_str()).collect()
    }

    const INPUT: &str = "#chrom\tpos\tref\talt\n1\t5\tA\tC\n## comment\n1\t7\tA\tG\n\n2\t5\tC\tT\n";

    #[test]
    fn read_with_header() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("in.tsv");
        std::fs::write(&path, INPUT)?;

        let mut reader = TsvReader::open(&path, &ReaderOptions::default())?;

        assert_eq!(reader.header(), Some(&["chrom", "pos", "ref", "alt"].map(String::from)[..]));
        let lines = read_all(&mut reader)?;
        assert_eq!(first_column(&lines), vec!["1", "## comment", "1", "2"]);
        Ok(())
    }

    #[test]
    fn read_meta_lines_before_header() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("in.vcf");
        std::fs::write(
            &path,
            "##fileformat=VCFv4.2\n##INFO=<ID=DP,Number=1,Type=Integer>\n#CHROM\tPOS\tREF\tALT\n1\t5\tA\tC\n",
        )?;

        let mut reader = TsvReader::open(&path, &ReaderOptions::default())?;

        assert_eq!(
            reader.meta_lines(),
            &["##fileformat=VCFv4.2", "##INFO=<ID=DP,Number=1,Type=Integer>"].map(String::from)[..]
        );
        assert_eq!(reader.header(), Some(&["CHROM", "POS", "REF", "ALT"].map(String::from)[..]));
        assert_eq!(first_column(&read_all(&mut reader)?), vec!["1"]);
        Ok(())
    }

    #[test]
    fn read_without_header() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("in.tsv");
        std::fs::write(&path, "1\t5\tA\tC\n1\t7\tA\tG\n")?;
        let options = ReaderOptions {
            no_header: true,
            ..Default::default()
        };

        let mut reader = TsvReader::open(&path, &options)?;

        assert_eq!(reader.header(), None);
        assert_eq!(reader.column_names(), vec!["1", "2", "3", "4"]);
        assert_eq!(read_all(&mut reader)?.len(), 2);
        Ok(())
    }

    #[rstest]
    #[case("1:6-7", vec!["## comment", "7"])]
    #[case("1:5", vec!["5", "## comment", "7"])]
    #[case("chr2:1-10", vec!["## comment", "5"])]
    fn read_region_by_scan(#[case] region: &str, #[case] expected: Vec<&str>) -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("in.tsv");
        std::fs::write(&path, INPUT)?;
        let options = ReaderOptions {
            region: Some(region.parse()?),
            ..Default::default()
        };

        let mut reader = TsvReader::open(&path, &options)?;

        let lines = read_all(&mut reader)?;
        let positions = lines
            .iter()
            .map(|line| if is_comment(line) { line[0].as_str() } else { line[1].as_str() })
            .collect::<Vec<_>>();
        assert_eq!(positions, expected);
        Ok(())
    }

    #[test]
    fn read_region_by_location() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("in.tsv");
        std::fs::write(&path, "location\tvariant\n1:5\tsub(A->C)\n1:9\tdel(2)\n2:5\tins(A)\n")?;
        let options = ReaderOptions {
            region: Some("1:6-100".parse()?),
            ..Default::default()
        };

        let mut reader = TsvReader::open(&path, &options)?;

        assert_eq!(first_column(&read_all(&mut reader)?), vec!["1:9"]);
        Ok(())
    }

    #[test]
    fn read_region_through_index() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let lines = (1..=50)
            .map(|i| format!("1\t{}\tA\tC", i * 10))
            .chain(std::iter::once(String::from("2\t10\tA\tC")))
            .collect::<Vec<_>>();
        let mut all = vec!["#chrom\tpos\tref\talt"];
        all.extend(lines.iter().map(String::as_str));
        let path = write_tabix(&tmpdir, "variants", &all, &ColumnIndices::new(0, 1, 1))?;
        let options = ReaderOptions {
            region: Some("1:95-130".parse()?),
            ..Default::default()
        };

        let mut reader = TsvReader::open(&path, &options)?;

        assert_eq!(reader.header(), Some(&["chrom", "pos", "ref", "alt"].map(String::from)[..]));
        let positions = read_all(&mut reader)?
            .into_iter()
            .map(|line| line[1].clone())
            .collect::<Vec<_>>();
        assert_eq!(positions, vec!["100", "110", "120", "130"]);
        Ok(())
    }

    #[test]
    fn write_missing_values() -> Result<(), anyhow::Error> {
        let mut writer = TsvWriter::new(Vec::new(), "NA");

        writer.header_write(&["#chrom".to_owned(), "score".to_owned()])?;
        writer.line_write(&[Some("1".to_owned()), None])?;

        assert_eq!(String::from_utf8(writer.into_inner())?, "#chrom\tscore\n1\tNA\n");
        Ok(())
    }
}
