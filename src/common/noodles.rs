//! Common utility code for noodles.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufRead, Read, Write},
    path::{Path, PathBuf},
};

use noodles_bgzf as bgzf;
use noodles_core::Position;
use noodles_csi::{self as csi, binning_index::index::reference_sequence::bin::Chunk};
use noodles_tabix as tabix;
use thousands::Separable;

use crate::{
    common::io::open_read_maybe_gz,
    err::Error,
    scores::line::{ColumnIndices, ScoreLine},
};

/// Path of the tabix index that belongs to `path`.
pub fn tbi_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut result = path.as_ref().as_os_str().to_owned();
    result.push(".tbi");
    PathBuf::from(result)
}

/// Check whether the file at `path` starts with a BGZF block header.
pub fn is_bgzf<P: AsRef<Path>>(path: P) -> bool {
    let mut buf = [0u8; 16];
    match File::open(path.as_ref()).and_then(|mut f| f.read_exact(&mut buf)) {
        Ok(()) => buf[0] == 0x1f && buf[1] == 0x8b && buf[3] & 0x04 != 0 && &buf[12..14] == b"BC",
        Err(_) => false,
    }
}

/// Whether `path` is bgzip compressed and has a `.tbi` sidecar.
pub fn is_tabix<P: AsRef<Path>>(path: P) -> bool {
    is_bgzf(path.as_ref()) && tbi_path(path.as_ref()).exists()
}

/// Convert a 1-based coordinate into a noodles position, clamping at 1.
pub fn to_position(pos: i64) -> Position {
    usize::try_from(pos)
        .ok()
        .and_then(Position::new)
        .unwrap_or(Position::MIN)
}

/// Tabix header for a generic TSV file with the given (0-based) columns.
///
/// Positions are 1-based and closed, as in GFF.
pub fn tbi_header(columns: &ColumnIndices) -> csi::binning_index::index::Header {
    csi::binning_index::index::header::Builder::gff()
        .set_reference_sequence_name_index(columns.chrom)
        .set_start_position_index(columns.pos_begin)
        .set_end_position_index(Some(columns.pos_end))
        .set_line_comment_prefix(b'#')
        .build()
}

/// Compress the sorted TSV file at `path_src` to `path_dst` with BGZF and write
/// the tabix index to `<path_dst>.tbi`.
///
/// Lines starting with `#` are copied but not indexed; the remaining lines must
/// be sorted by chromosome and begin position.
#[tracing::instrument(skip(columns))]
pub fn build_tbi<S, D>(path_src: S, path_dst: D, columns: &ColumnIndices) -> Result<(), anyhow::Error>
where
    S: AsRef<Path> + std::fmt::Debug,
    D: AsRef<Path> + std::fmt::Debug,
{
    let mut reader = open_read_maybe_gz(path_src.as_ref())
        .map_err(|e| anyhow::anyhow!("error opening input file for tbi creation: {}", e))?;
    let mut writer = File::create(path_dst.as_ref())
        .map(bgzf::Writer::new)
        .map_err(|e| anyhow::anyhow!("error creating output file for tbi creation: {}", e))?;

    let mut indexer = tabix::index::Indexer::default();
    indexer.set_header(tbi_header(columns));

    let mut line = String::new();
    let mut count_records = 0usize;
    let mut done_chroms = HashSet::new();
    let mut last: Option<(String, i64)> = None;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let start_position = writer.virtual_position();
        writer.write_all(line.as_bytes())?;
        let end_position = writer.virtual_position();

        let trimmed = line.trim_end_matches(&['\n', '\r'][..]);
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields = trimmed.split('\t').map(str::to_owned).collect::<Vec<_>>();
        let record = ScoreLine::new(columns, fields)?;
        match &last {
            Some((chrom, pos_begin)) if chrom == record.chrom() => {
                if record.pos_begin() < *pos_begin {
                    return Err(Error::contract(format!(
                        "input not sorted: {}:{} after {}:{}",
                        record.chrom(),
                        record.pos_begin(),
                        chrom,
                        pos_begin
                    ))
                    .into());
                }
            }
            Some((chrom, _)) => {
                done_chroms.insert(chrom.clone());
                if done_chroms.contains(record.chrom()) {
                    return Err(Error::contract(format!(
                        "input not sorted: chromosome {} is not contiguous",
                        record.chrom()
                    ))
                    .into());
                }
            }
            None => (),
        }
        last = Some((record.chrom().to_owned(), record.pos_begin()));
        indexer
            .add_record(
                record.chrom(),
                to_position(record.pos_begin()),
                to_position(record.pos_end()),
                Chunk::new(start_position, end_position),
            )
            .map_err(|e| {
                Error::contract(format!(
                    "could not index {}:{}-{} (is the input sorted?): {}",
                    record.chrom(),
                    record.pos_begin(),
                    record.pos_end(),
                    e
                ))
            })?;
        count_records += 1;
    }
    writer
        .finish()
        .map_err(|e| anyhow::anyhow!("error finishing bgzf output: {}", e))?;

    let index = indexer.build();
    {
        let mut tbi_writer = File::create(tbi_path(path_dst.as_ref()))
            .map(tabix::Writer::new)
            .map_err(|e| anyhow::anyhow!("error output file for tbi creation: {}", e))?;
        tbi_writer
            .write_index(&index)
            .map_err(|e| anyhow::anyhow!("error writing tabix index: {}", e))?;
    }
    tracing::debug!(
        "indexed {} records into {:?}",
        count_records.separate_with_commas(),
        path_dst
    );

    Ok(())
}

#[cfg(test)]
pub mod test {
    use std::{io::Write, path::PathBuf};

    use crate::scores::line::ColumnIndices;

    /// Write `lines` as a bgzip/tabix score file `name` into `dir`.
    pub fn write_tabix(
        dir: &std::path::Path,
        name: &str,
        lines: &[&str],
        columns: &ColumnIndices,
    ) -> Result<PathBuf, anyhow::Error> {
        let path_src = dir.join(format!("{}.tsv", name));
        {
            let mut f = std::fs::File::create(&path_src)?;
            for line in lines {
                writeln!(f, "{}", line)?;
            }
        }
        let path_dst = dir.join(format!("{}.tsv.gz", name));
        super::build_tbi(&path_src, &path_dst, columns)?;
        Ok(path_dst)
    }

    #[test]
    fn build_tbi() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let columns = ColumnIndices::new(0, 1, 2);
        let path = write_tabix(
            &tmpdir,
            "scores",
            &["#chrom\tbegin\tend\tscore", "1\t10\t15\t0.5", "1\t20\t25\t0.8"],
            &columns,
        )?;

        assert!(super::is_bgzf(&path));
        assert!(super::is_tabix(&path));
        assert!(!super::is_bgzf(tmpdir.join("scores.tsv")));

        Ok(())
    }

    #[test]
    fn build_tbi_header_uses_score_columns() -> Result<(), anyhow::Error> {
        use noodles_csi::{
            binning_index::index::header::{format::CoordinateSystem, Format},
            BinningIndex,
        };

        let tmpdir = temp_testdir::TempDir::default();
        let columns = ColumnIndices::new(1, 3, 4);
        let path = write_tabix(
            &tmpdir,
            "scores",
            &[
                "#score\tchrom\tname\tbegin\tend",
                "0.5\tchr1\ta\t10\t15",
                "0.8\tchr1\tb\t20\t25",
            ],
            &columns,
        )?;

        let index = noodles_tabix::read(super::tbi_path(&path))?;
        let header = index.header().expect("tabix index carries a header");
        assert_eq!(header.format(), Format::Generic(CoordinateSystem::Gff));
        assert_eq!(header.reference_sequence_name_index(), 1);
        assert_eq!(header.start_position_index(), 3);
        assert_eq!(header.end_position_index(), Some(4));
        assert_eq!(header.line_comment_prefix(), b'#');
        let names = header
            .reference_sequence_names()
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(names, vec![String::from("chr1")]);

        Ok(())
    }

    #[test]
    fn build_tbi_rejects_unsorted() {
        let tmpdir = temp_testdir::TempDir::default();
        let columns = ColumnIndices::new(0, 1, 2);
        let result = write_tabix(
            &tmpdir,
            "scores",
            &["1\t20\t25\t0.8", "1\t10\t15\t0.5"],
            &columns,
        );

        assert!(result.is_err());
    }
}
