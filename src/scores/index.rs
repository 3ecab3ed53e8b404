//! Implementation of the `scores index` sub command.

use std::path::PathBuf;

use clap::Parser;

use crate::common::{noodles::build_tbi, trace_rss_now};

use super::line::ColumnIndices;

/// Command line arguments for `scores index` sub command.
#[derive(Parser, Debug)]
#[command(about = "Compress a sorted score table with bgzip and build its tabix index", long_about = None)]
pub struct Args {
    /// Path to the sorted, tab-separated input (plain or gzip).
    #[arg(long, required = true)]
    pub path_input: PathBuf,
    /// Path to the bgzip output, the index is written to `${path_output}.tbi`.
    #[arg(long, required = true)]
    pub path_output: PathBuf,
    /// 1-based number of the chromosome column.
    #[arg(long, default_value_t = 1)]
    pub col_chrom: usize,
    /// 1-based number of the begin position column.
    #[arg(long, default_value_t = 2)]
    pub col_begin: usize,
    /// 1-based number of the end position column, defaults to the begin column.
    #[arg(long)]
    pub col_end: Option<usize>,
}

impl Args {
    fn columns(&self) -> Result<ColumnIndices, anyhow::Error> {
        let to_index = |col: usize| {
            col.checked_sub(1)
                .ok_or_else(|| crate::err::Error::config("column numbers are 1-based"))
        };
        Ok(ColumnIndices::new(
            to_index(self.col_chrom)?,
            to_index(self.col_begin)?,
            to_index(self.col_end.unwrap_or(self.col_begin))?,
        ))
    }
}

/// Main entry point for the `scores index` command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `scores index`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let before_indexing = std::time::Instant::now();
    build_tbi(&args.path_input, &args.path_output, &args.columns()?)?;
    tracing::info!(
        "total time spent indexing {:?}: {:?}",
        &args.path_output,
        before_indexing.elapsed()
    );

    trace_rss_now();
    tracing::info!("All of `scores index` is done. Have a nice day!");
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{common::noodles::is_tabix, scores::tabix::TabixReader};

    #[test]
    fn index_point_scores() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path_input = tmpdir.join("phylop.tsv");
        std::fs::write(&path_input, "#chrom\tpos\tphylop\n1\t5\t0.1\n1\t6\t0.2\n2\t3\t0.3\n")?;
        let args = Args {
            path_input,
            path_output: tmpdir.join("phylop.tsv.gz"),
            col_chrom: 1,
            col_begin: 2,
            col_end: None,
        };

        run(&crate::common::Args::default(), &args)?;

        assert!(is_tabix(&args.path_output));
        let mut reader = TabixReader::open(&args.path_output, args.columns()?)?;
        let lines = reader.fetch("1", 6, 100)?;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].get(2), Some("0.2"));
        Ok(())
    }

    #[test]
    fn zero_column_is_rejected() {
        let args = Args {
            path_input: PathBuf::from("in.tsv"),
            path_output: PathBuf::from("out.tsv.gz"),
            col_chrom: 0,
            col_begin: 2,
            col_end: None,
        };

        assert!(args.columns().is_err());
    }
}
