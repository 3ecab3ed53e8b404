//! Region queries against bgzip/tabix score files and the sequential access cache.

use std::{
    collections::VecDeque,
    fs::File,
    io::BufRead,
    path::{Path, PathBuf},
};

use noodles_bgzf as bgzf;
use noodles_core::region::Interval;
use noodles_csi::{binning_index::index::reference_sequence::bin::Chunk, BinningIndex};
use noodles_tabix as tabix;

use crate::{
    common::noodles::{is_bgzf, tbi_path, to_position},
    err::Error,
};

use super::{
    buffer::{LineBuffer, LineSource},
    line::{ColumnIndices, ScoreLine},
};

/// Distance in bp beyond which the sequential cache is abandoned.
pub const LONG_JUMP_THRESHOLD: i64 = 5000;

/// Open region query, advanced through [`TabixReader::next_in`].
#[derive(Debug)]
pub struct RegionCursor {
    chrom: String,
    begin: i64,
    end: Option<i64>,
    chunks: VecDeque<Chunk>,
    chunk_end: Option<bgzf::VirtualPosition>,
    done: bool,
}

impl RegionCursor {
    pub fn chrom(&self) -> &str {
        &self.chrom
    }
}

/// Sort chunks by start and merge overlapping or adjacent ones.
fn merge_chunks(mut chunks: Vec<Chunk>) -> VecDeque<Chunk> {
    chunks.sort_by_key(|chunk| chunk.start());
    let mut result: VecDeque<Chunk> = VecDeque::with_capacity(chunks.len());
    for chunk in chunks {
        match result.back_mut() {
            Some(last) if chunk.start() <= last.end() => {
                if chunk.end() > last.end() {
                    *last = Chunk::new(last.start(), chunk.end());
                }
            }
            _ => result.push_back(chunk),
        }
    }
    result
}

/// Reader for a bgzip compressed and tabix indexed score table.
pub struct TabixReader {
    path: PathBuf,
    reader: bgzf::Reader<File>,
    index: tabix::Index,
    columns: ColumnIndices,
    buf: String,
}

impl std::fmt::Debug for TabixReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabixReader")
            .field("path", &self.path)
            .field("columns", &self.columns)
            .finish()
    }
}

impl TabixReader {
    /// Open `path`, which must be bgzip compressed and have a `.tbi` next to it.
    #[tracing::instrument(skip(columns))]
    pub fn open<P>(path: P, columns: ColumnIndices) -> Result<Self, Error>
    where
        P: AsRef<Path> + std::fmt::Debug,
    {
        let path = path.as_ref();
        if !is_bgzf(path) {
            return Err(Error::config(format!(
                "score file {:?} is not bgzip compressed",
                path
            )));
        }
        let path_tbi = tbi_path(path);
        if !path_tbi.exists() {
            return Err(Error::config(format!(
                "score file {:?} has no tabix index {:?}",
                path, path_tbi
            )));
        }
        let index = tabix::read(&path_tbi).map_err(|e| {
            Error::config(format!("could not read tabix index {:?}: {}", path_tbi, e))
        })?;
        let reader = File::open(path).map(bgzf::Reader::new)?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            index,
            columns,
            buf: String::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the contigs listed in the index.
    pub fn contigs(&self) -> Vec<String> {
        self.index
            .header()
            .map(|header| {
                header
                    .reference_sequence_names()
                    .iter()
                    .map(|name| String::from_utf8_lossy(AsRef::<[u8]>::as_ref(name)).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn reference_sequence_id(&self, chrom: &str) -> Option<usize> {
        self.index.header().and_then(|header| {
            header
                .reference_sequence_names()
                .iter()
                .position(|name| AsRef::<[u8]>::as_ref(name) == chrom.as_bytes())
        })
    }

    /// Start a query for lines on `chrom` overlapping `[begin, end]`.
    ///
    /// Returns `None` if `chrom` is not in the index.
    pub fn query(
        &mut self,
        chrom: &str,
        begin: i64,
        end: Option<i64>,
    ) -> Result<Option<RegionCursor>, Error> {
        let Some(id) = self.reference_sequence_id(chrom) else {
            return Ok(None);
        };
        let interval = match end {
            Some(end) => Interval::from(to_position(begin)..=to_position(end)),
            None => Interval::from(to_position(begin)..),
        };
        let chunks = self.index.query(id, interval).map_err(|e| {
            Error::contract(format!(
                "index query for {}:{} failed on {:?}: {}",
                chrom, begin, &self.path, e
            ))
        })?;

        Ok(Some(RegionCursor {
            chrom: chrom.to_owned(),
            begin,
            end,
            chunks: merge_chunks(chunks),
            chunk_end: None,
            done: false,
        }))
    }

    /// Next line of the query behind `cursor` in file order.
    pub fn next_in(&mut self, cursor: &mut RegionCursor) -> Result<Option<ScoreLine>, Error> {
        loop {
            if cursor.done {
                return Ok(None);
            }
            let in_chunk = matches!(
                cursor.chunk_end,
                Some(chunk_end) if self.reader.virtual_position() < chunk_end
            );
            if !in_chunk {
                match cursor.chunks.pop_front() {
                    Some(chunk) => {
                        if self.reader.virtual_position() < chunk.start() || cursor.chunk_end.is_none() {
                            self.reader.seek(chunk.start())?;
                        }
                        cursor.chunk_end = Some(chunk.end());
                        continue;
                    }
                    None => {
                        cursor.done = true;
                        return Ok(None);
                    }
                }
            }

            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                cursor.done = true;
                return Ok(None);
            }
            let trimmed = self.buf.trim_end_matches(&['\n', '\r'][..]);
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let fields = trimmed.split('\t').map(str::to_owned).collect();
            let line = ScoreLine::new(&self.columns, fields)?;
            if line.chrom() != cursor.chrom {
                continue;
            }
            if matches!(cursor.end, Some(end) if line.pos_begin() > end) {
                cursor.done = true;
                return Ok(None);
            }
            if line.pos_end() < cursor.begin {
                continue;
            }
            return Ok(Some(line));
        }
    }

    /// All lines on `chrom` overlapping `[begin, end]`; empty for unknown contigs.
    pub fn fetch(&mut self, chrom: &str, begin: i64, end: i64) -> Result<Vec<ScoreLine>, Error> {
        let mut result = Vec::new();
        match self.query(chrom, begin, Some(end))? {
            Some(mut cursor) => {
                while let Some(line) = self.next_in(&mut cursor)? {
                    result.push(line);
                }
            }
            None => tracing::warn!(
                "could not find region {}:{}-{} in {:?}",
                chrom,
                begin,
                end,
                &self.path
            ),
        }
        Ok(result)
    }
}

/// Lines of an open cursor as a [`LineSource`] for the buffer.
struct CursorSource<'a> {
    reader: &'a mut TabixReader,
    cursor: &'a mut RegionCursor,
}

impl LineSource for CursorSource<'_> {
    fn next_line(&mut self) -> Result<Option<ScoreLine>, Error> {
        self.reader.next_in(self.cursor)
    }
}

/// Score file access switching between a sequential cache and direct index queries.
///
/// `last_pos` only decides which strategy serves a query; both return the
/// same lines.
#[derive(Debug)]
pub struct TabixAccess {
    sequential: TabixReader,
    direct: TabixReader,
    cursor: Option<RegionCursor>,
    cursor_chrom: Option<String>,
    buffer: LineBuffer,
    last_pos: i64,
    last_sequential: Option<(i64, i64)>,
    /// Maximal distance to the previous query for point queries to use the cache.
    pub access_switch_threshold: i64,
    /// Maximal forward jump past the cached lines before re-seeking.
    pub long_jump_threshold: i64,
}

impl TabixAccess {
    pub fn open<P>(
        path: P,
        columns: ColumnIndices,
        no_score_value: Option<String>,
    ) -> Result<Self, Error>
    where
        P: AsRef<Path> + std::fmt::Debug,
    {
        Ok(Self {
            sequential: TabixReader::open(path.as_ref(), columns)?,
            direct: TabixReader::open(path.as_ref(), columns)?,
            cursor: None,
            cursor_chrom: None,
            buffer: LineBuffer::new(no_score_value),
            last_pos: 0,
            last_sequential: None,
            access_switch_threshold: LONG_JUMP_THRESHOLD,
            long_jump_threshold: LONG_JUMP_THRESHOLD,
        })
    }

    pub fn contigs(&self) -> Vec<String> {
        self.direct.contigs()
    }

    pub fn last_pos(&self) -> i64 {
        self.last_pos
    }

    /// Lines on `chrom` overlapping the 1-based closed interval `[pos_begin, pos_end]`.
    pub fn fetch(&mut self, chrom: &str, pos_begin: i64, pos_end: i64) -> Result<Vec<ScoreLine>, Error> {
        let is_point = pos_end.saturating_sub(pos_begin) <= 1;
        let distance = pos_begin.saturating_sub(self.last_pos).saturating_abs();
        self.last_pos = pos_end;
        if is_point && distance > self.access_switch_threshold {
            tracing::trace!(
                "direct fetch {}:{}-{} (distance {})",
                chrom,
                pos_begin,
                pos_end,
                distance
            );
            self.fetch_direct(chrom, pos_begin, pos_end)
        } else {
            tracing::trace!("sequential fetch {}:{}-{}", chrom, pos_begin, pos_end);
            self.fetch_sequential(chrom, pos_begin, pos_end)
        }
    }

    /// Clear the buffer and start a new region query at `chrom:pos_begin`.
    pub fn reset(&mut self, chrom: &str, pos_begin: i64) -> Result<(), Error> {
        tracing::debug!(
            "resetting sequential access of {:?} to {}:{}",
            self.sequential.path(),
            chrom,
            pos_begin
        );
        self.buffer.reset();
        self.cursor = self.sequential.query(chrom, pos_begin, None)?;
        if self.cursor.is_none() {
            tracing::warn!(
                "could not find region {}:{} in {:?}",
                chrom,
                pos_begin,
                self.sequential.path()
            );
        }
        self.cursor_chrom = Some(chrom.to_owned());
        Ok(())
    }

    fn needs_reset(&self, chrom: &str, pos_begin: i64) -> bool {
        if self.cursor_chrom.as_deref() != Some(chrom) {
            return true;
        }
        if let Some((last_begin, _)) = self.last_sequential {
            // purged lines cannot be recovered for an earlier start
            if pos_begin < last_begin {
                return true;
            }
        }
        let covered_end = self
            .last_sequential
            .map(|(_, last_end)| last_end)
            .unwrap_or(-1)
            .max(self.buffer.pos_end());
        (!self.buffer.is_empty() && pos_begin < self.buffer.pos_begin())
            || pos_begin.saturating_sub(covered_end) > self.long_jump_threshold
    }

    pub fn fetch_sequential(
        &mut self,
        chrom: &str,
        pos_begin: i64,
        pos_end: i64,
    ) -> Result<Vec<ScoreLine>, Error> {
        if self.needs_reset(chrom, pos_begin) {
            self.reset(chrom, pos_begin)?;
        }
        self.last_sequential = Some((pos_begin, pos_end));
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(Vec::new());
        };

        self.buffer.purge(chrom, pos_begin, pos_end);
        let mut source = CursorSource {
            reader: &mut self.sequential,
            cursor,
        };
        self.buffer.fill(&mut source, chrom, pos_begin, pos_end)?;
        Ok(self.buffer.select_lines(chrom, pos_begin, pos_end))
    }

    pub fn fetch_direct(
        &mut self,
        chrom: &str,
        pos_begin: i64,
        pos_end: i64,
    ) -> Result<Vec<ScoreLine>, Error> {
        self.direct.fetch(chrom, pos_begin, pos_end)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::common::noodles::test::write_tabix;

    fn spans(lines: &[ScoreLine]) -> Vec<(String, i64, i64)> {
        lines
            .iter()
            .map(|l| (l.chrom().to_owned(), l.pos_begin(), l.pos_end()))
            .collect()
    }

    /// Score rows on two chromosomes, including a long interval and a gap.
    fn rows() -> Vec<String> {
        let mut rows = vec![String::from("#chrom\tbegin\tend\tscore")];
        rows.push(String::from("1\t1\t30000\t9.9"));
        for i in 0..400 {
            let begin = 10 + i * 20;
            rows.push(format!("1\t{}\t{}\t{}", begin, begin + 9, i));
        }
        for i in 0..100 {
            let begin = 50_000 + i * 3;
            rows.push(format!("1\t{}\t{}\t{}", begin, begin, i));
        }
        for i in 0..50 {
            let begin = 100 + i * 10;
            rows.push(format!("2\t{}\t{}\t{}", begin, begin + 4, i));
        }
        rows
    }

    fn linear_scan(rows: &[String], chrom: &str, begin: i64, end: i64) -> Vec<(String, i64, i64)> {
        rows.iter()
            .filter(|row| !row.starts_with('#'))
            .map(|row| row.split('\t').map(str::to_owned).collect::<Vec<_>>())
            .filter_map(|fields| {
                let (b, e) = (fields[1].parse::<i64>().ok()?, fields[2].parse::<i64>().ok()?);
                (fields[0] == chrom && b <= end && begin <= e).then(|| (fields[0].clone(), b, e))
            })
            .collect()
    }

    fn score_file(tmpdir: &Path, rows: &[String]) -> Result<PathBuf, anyhow::Error> {
        let rows = rows.iter().map(String::as_str).collect::<Vec<_>>();
        write_tabix(tmpdir, "scores", &rows, &ColumnIndices::new(0, 1, 2))
    }

    fn open_access(tmpdir: &Path, rows: &[String]) -> Result<TabixAccess, anyhow::Error> {
        let path = score_file(tmpdir, rows)?;
        Ok(TabixAccess::open(path, ColumnIndices::new(0, 1, 2), None)?)
    }

    #[test]
    fn open_requires_index() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("plain.tsv");
        std::fs::write(&path, "1\t1\t2\t0.1\n")?;

        let err = TabixReader::open(&path, ColumnIndices::new(0, 1, 2)).unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        Ok(())
    }

    #[test]
    fn contigs_from_index() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let access = open_access(&tmpdir, &rows())?;

        assert_eq!(access.contigs(), vec![String::from("1"), String::from("2")]);
        Ok(())
    }

    #[test]
    fn sequential_matches_linear_scan() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let rows = rows();
        let mut access = open_access(&tmpdir, &rows)?;

        let mut queries = Vec::new();
        for begin in (1..8100).step_by(7) {
            queries.push(("1", begin, begin + (begin % 13)));
        }
        queries.push(("1", 20_000, 20_100));
        queries.push(("1", 50_010, 50_010));
        queries.push(("1", 50_011, 50_040));
        queries.push(("2", 90, 100));
        queries.push(("2", 101, 143));
        queries.push(("2", 1_000, 1_000));

        for (chrom, begin, end) in queries {
            assert_eq!(
                spans(&access.fetch_sequential(chrom, begin, end)?),
                linear_scan(&rows, chrom, begin, end),
                "query {}:{}-{}",
                chrom,
                begin,
                end
            );
        }
        Ok(())
    }

    #[test]
    fn backward_query_resets() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let rows = rows();
        let mut access = open_access(&tmpdir, &rows)?;

        for (begin, end) in [(500, 600), (405, 405), (1000, 1000), (995, 996), (10, 10)] {
            assert_eq!(
                spans(&access.fetch_sequential("1", begin, end)?),
                linear_scan(&rows, "1", begin, end),
                "query 1:{}-{}",
                begin,
                end
            );
        }
        Ok(())
    }

    #[test]
    fn direct_and_sequential_agree() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let rows = rows();
        let path = score_file(&tmpdir, &rows)?;
        let mut direct = TabixAccess::open(&path, ColumnIndices::new(0, 1, 2), None)?;
        direct.access_switch_threshold = -1;
        let mut sequential = TabixAccess::open(&path, ColumnIndices::new(0, 1, 2), None)?;
        sequential.access_switch_threshold = i64::MAX;

        for pos in [5, 10, 19, 20, 7_000, 29_999, 50_000, 50_001, 50_297, 60_000, 1] {
            let expected = linear_scan(&rows, "1", pos, pos);
            assert_eq!(spans(&direct.fetch("1", pos, pos)?), expected, "pos {}", pos);
            assert_eq!(spans(&sequential.fetch("1", pos, pos)?), expected, "pos {}", pos);
        }
        Ok(())
    }

    #[test]
    fn fetch_after_extreme_last_pos() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let rows = rows();
        let mut access = open_access(&tmpdir, &rows)?;

        access.last_pos = i64::MIN;
        assert_eq!(spans(&access.fetch("1", 20, 20)?), linear_scan(&rows, "1", 20, 20));
        access.last_pos = i64::MAX;
        assert_eq!(spans(&access.fetch("1", 5, 5)?), linear_scan(&rows, "1", 5, 5));
        Ok(())
    }

    #[test]
    fn fetch_updates_last_pos() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let mut access = open_access(&tmpdir, &rows())?;

        access.fetch("1", 7_000, 7_000)?;
        assert_eq!(access.last_pos(), 7_000);
        access.fetch("1", 7_010, 7_100)?;
        assert_eq!(access.last_pos(), 7_100);
        Ok(())
    }

    #[tracing_test::traced_test]
    #[test]
    fn unknown_contig_is_empty() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let mut access = open_access(&tmpdir, &rows())?;

        assert!(access.fetch_direct("MT", 1, 10)?.is_empty());
        assert!(access.fetch_sequential("MT", 1, 10)?.is_empty());
        assert!(logs_contain("could not find region MT:1-10"));
        Ok(())
    }
}
