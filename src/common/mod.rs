//! Common functionality.

use byte_unit::{Byte, UnitType};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod io;
pub mod noodles;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss {
        Ok(rss) => tracing::debug!(
            "RSS now: {:.2}",
            Byte::from_u64(rss).get_appropriate_unit(UnitType::Binary)
        ),
        Err(e) => tracing::trace!("could not determine RSS: {}", e),
    }
}

/// Bring the chromosome name `chrom` into the naming convention of a file.
///
/// With `expect_prefix`, a missing `chr` prefix is added; without it, an
/// existing `chr` prefix is stripped.
pub fn handle_chrom_prefix(expect_prefix: bool, chrom: &str) -> String {
    match (expect_prefix, chrom.strip_prefix("chr")) {
        (true, None) => format!("chr{}", chrom),
        (false, Some(stripped)) => stripped.to_owned(),
        _ => chrom.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case(true, "1", "chr1")]
    #[case(true, "chr1", "chr1")]
    #[case(false, "chr1", "1")]
    #[case(false, "X", "X")]
    fn handle_chrom_prefix(#[case] expect_prefix: bool, #[case] chrom: &str, #[case] expected: &str) {
        assert_eq!(super::handle_chrom_prefix(expect_prefix, chrom), expected);
    }
}
