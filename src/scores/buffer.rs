//! Sliding window of score lines for sequential access.

use std::collections::VecDeque;

use crate::err::Error;

use super::line::{Line, NoLine, ScoreLine};

/// Source of score lines in file order, e.g., an open region query.
pub trait LineSource {
    fn next_line(&mut self) -> Result<Option<ScoreLine>, Error>;
}

impl<I> LineSource for I
where
    I: Iterator<Item = ScoreLine>,
{
    fn next_line(&mut self) -> Result<Option<ScoreLine>, Error> {
        Ok(self.next())
    }
}

/// Whether the closed intervals `[b1, e1]` and `[b2, e2]` overlap.
pub fn regions_intersect(b1: i64, e1: i64, b2: i64, e2: i64) -> bool {
    debug_assert!(b1 <= e1, "interval {}-{} is inverted", b1, e1);
    debug_assert!(b2 <= e2, "interval {}-{} is inverted", b2, e2);
    !(e1 < b2 || b1 > e2)
}

/// Score lines of one chromosome, evicted at the front and filled at the back.
#[derive(Debug)]
pub struct LineBuffer {
    lines: VecDeque<ScoreLine>,
    no_line: Line,
}

impl LineBuffer {
    pub fn new(no_score_value: Option<String>) -> Self {
        Self {
            lines: VecDeque::new(),
            no_line: Line::Empty(NoLine::new(no_score_value)),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn append(&mut self, line: ScoreLine) {
        self.lines.push_back(line);
    }

    pub fn pop(&mut self) -> Option<ScoreLine> {
        self.lines.pop_front()
    }

    pub fn reset(&mut self) {
        self.lines.clear();
    }

    /// First line, the sentinel when empty.
    pub fn front(&self) -> Line {
        self.lines
            .front()
            .cloned()
            .map(Line::Data)
            .unwrap_or_else(|| self.no_line.clone())
    }

    /// Last line, the sentinel when empty.
    pub fn back(&self) -> Line {
        self.lines
            .back()
            .cloned()
            .map(Line::Data)
            .unwrap_or_else(|| self.no_line.clone())
    }

    pub fn chrom(&self) -> Option<&str> {
        self.lines.front().map(ScoreLine::chrom)
    }

    pub fn pos_begin(&self) -> i64 {
        self.lines.front().map(ScoreLine::pos_begin).unwrap_or(-1)
    }

    pub fn pos_end(&self) -> i64 {
        self.lines.back().map(ScoreLine::pos_end).unwrap_or(-1)
    }

    /// Drop lines at the front that cannot overlap `[pos_begin, ..]` on `chrom`.
    pub fn purge(&mut self, chrom: &str, pos_begin: i64, _pos_end: i64) {
        while let Some(line) = self.lines.front() {
            if line.chrom() != chrom || line.pos_end() < pos_begin {
                self.lines.pop_front();
            } else {
                break;
            }
        }
    }

    /// Pull lines from `source` until the buffer covers `[pos_begin, pos_end]`.
    ///
    /// Lines ending before `pos_begin` are skipped. The first line beginning
    /// after `pos_end` is kept as well, so that a subsequent query within the
    /// covered range does not touch the source.
    pub fn fill<S>(
        &mut self,
        source: &mut S,
        chrom: &str,
        pos_begin: i64,
        pos_end: i64,
    ) -> Result<(), Error>
    where
        S: LineSource + ?Sized,
    {
        if let Some(back) = self.lines.back() {
            if back.chrom() == chrom && back.pos_begin() > pos_end {
                return Ok(());
            }
        }

        while let Some(line) = source.next_line()? {
            if line.chrom() != chrom {
                return Err(Error::contract(format!(
                    "score line on {} found while reading {}:{}-{}",
                    line.chrom(),
                    chrom,
                    pos_begin,
                    pos_end
                )));
            }
            if line.pos_end() < pos_begin {
                continue;
            }
            let done = line.pos_begin() > pos_end;
            self.lines.push_back(line);
            if done {
                break;
            }
        }

        Ok(())
    }

    /// Buffered lines on `chrom` overlapping `[pos_begin, pos_end]`.
    pub fn select_lines(&self, chrom: &str, pos_begin: i64, pos_end: i64) -> Vec<ScoreLine> {
        self.lines
            .iter()
            .filter(|line| {
                line.chrom() == chrom
                    && regions_intersect(pos_begin, pos_end, line.pos_begin(), line.pos_end())
            })
            .cloned()
            .collect()
    }
}
