//! Implementation of the `annotate` sub command.

use std::path::PathBuf;

use clap::Parser;

use crate::{common::trace_rss_now, scores::region::Region};

use super::{
    conf::PipelineConf,
    io::{ReaderOptions, TsvReader, TsvWriter},
    parse_default_option,
    pipeline::{MultiAnnotator, PipelineOptions},
    registry::AnnotatorRegistry,
    Options,
};

/// Command line arguments for `annotate` sub command.
#[derive(Parser, Debug)]
#[command(about = "Annotate a tab-separated variant file with a pipeline of stages", long_about = None)]
pub struct Args {
    /// Path to the pipeline configuration (TOML).
    #[arg(short = 'c', long = "config", required = true)]
    pub path_config: PathBuf,
    /// Path to the input file, `-` for stdin.
    #[arg(default_value = "-")]
    pub path_input: PathBuf,
    /// Path to the output file, `-` for stdout.
    #[arg(default_value = "-")]
    pub path_output: PathBuf,
    /// The input has no header line; columns are addressed by 1-based number.
    #[arg(short = 'H', long = "no-header", default_value_t = false)]
    pub no_header: bool,
    /// Append all stage columns, even when the input already has them.
    #[arg(long, default_value_t = false)]
    pub reannotate: bool,
    /// Only annotate lines within `chrom:begin[-end]`.
    #[arg(long)]
    pub region: Option<Region>,
    /// Column with multiple alleles to annotate one by one.
    #[arg(long)]
    pub split: Option<String>,
    /// Separator of the values in the split column.
    #[arg(long, default_value = ",")]
    pub separator: String,
    /// Stage option defaults as `OPTION:VALUE`.
    #[arg(long = "options", value_delimiter = ',')]
    pub options: Vec<String>,
    /// Do not normalize the variant columns before the configured stages.
    #[arg(long, default_value_t = false)]
    pub skip_preannotators: bool,
    /// Chromosome column of the input.
    #[arg(long)]
    pub chrom_column: Option<String>,
    /// Position column of the input.
    #[arg(long)]
    pub position_column: Option<String>,
    /// Reference allele column of the input.
    #[arg(long)]
    pub ref_column: Option<String>,
    /// Alternative allele column of the input.
    #[arg(long)]
    pub alt_column: Option<String>,
    /// Location (`chrom:pos`) column of the input.
    #[arg(long)]
    pub location_column: Option<String>,
    /// Variant (`sub(A->G)`, ...) column of the input.
    #[arg(long)]
    pub variant_column: Option<String>,
    /// String written for missing values.
    #[arg(long, default_value = "")]
    pub missing_value: String,
}

impl Args {
    fn preannotator_options(&self) -> Options {
        [
            ("chrom_column", &self.chrom_column),
            ("position_column", &self.position_column),
            ("ref_column", &self.ref_column),
            ("alt_column", &self.alt_column),
            ("location_column", &self.location_column),
            ("variant_column", &self.variant_column),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|value| (key.to_owned(), toml::Value::String(value.clone())))
        })
        .collect()
    }

    fn pipeline_options(&self) -> Result<PipelineOptions, anyhow::Error> {
        Ok(PipelineOptions {
            reannotate: self.reannotate,
            split: self.split.clone(),
            separator: self.separator.clone(),
            defaults: self
                .options
                .iter()
                .map(|option| parse_default_option(option))
                .collect::<Result<Vec<_>, _>>()?,
            skip_preannotators: self.skip_preannotators,
            preannotator_options: self.preannotator_options(),
        })
    }

    fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            no_header: self.no_header,
            region: self.region.clone(),
            chrom_column: self.chrom_column.clone(),
            position_column: self.position_column.clone(),
            location_column: self.location_column.clone(),
        }
    }
}

/// Main entry point for the `annotate` command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `annotate`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let conf = PipelineConf::load(&args.path_config)?;
    let options = args.pipeline_options()?;

    let before_annotation = std::time::Instant::now();
    let mut reader = TsvReader::open(&args.path_input, &args.reader_options())?;
    let mut pipeline = MultiAnnotator::for_reader(
        &reader,
        &conf,
        &options,
        &AnnotatorRegistry::with_builtins(),
    )?;
    let mut writer = TsvWriter::open(&args.path_output, &args.missing_value)?;
    pipeline.annotate_file(&mut reader, &mut writer)?;
    writer.finish()?;
    tracing::info!(
        "total time spent annotating: {:?}",
        before_annotation.elapsed()
    );

    trace_rss_now();
    tracing::info!("All of `annotate` is done. Have a nice day!");
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{err::Error, scores::file::test::two_row_score_file};

    fn args(tmpdir: &std::path::Path, input: &str, conf: &str) -> Result<Args, anyhow::Error> {
        let scores = two_row_score_file(tmpdir)?;
        let path_config = tmpdir.join("pipeline.toml");
        std::fs::write(&path_config, conf.replace("SCORES", &scores.to_string_lossy()))?;
        let path_input = tmpdir.join("input.tsv");
        std::fs::write(&path_input, input)?;
        Ok(Args::parse_from([
            String::from("annotate"),
            String::from("-c"),
            path_config.to_string_lossy().into_owned(),
            path_input.to_string_lossy().into_owned(),
            tmpdir.join("out.tsv").to_string_lossy().into_owned(),
        ]))
    }

    const CONF: &str = r#"
        [phylop]
        annotator = "position_score"
        [phylop.options]
        scores_file = "SCORES"
        [phylop.columns]
        score = "phylop"
        "#;

    #[test]
    fn annotate_cshl_input() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let args = args(
            &tmpdir,
            "location\tvariant\n1:12\tsub(A->G)\n1:14\tdel(8)\n1:20-25\tCNV+\n",
            CONF,
        )?;

        run(&crate::common::Args::default(), &args)?;

        assert_eq!(
            std::fs::read_to_string(&args.path_output)?,
            "#location\tvariant\tphylop\n1:12\tsub(A->G)\t0.5\n1:14\tdel(8)\t0.65\n1:20-25\tCNV+\t0.8\n"
        );
        Ok(())
    }

    #[test]
    fn annotate_without_header() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let mut args = args(&tmpdir, "1\t12\tA\tG\n1\t30\tA\tG\n", CONF)?;
        args.no_header = true;
        args.chrom_column = Some("1".into());
        args.position_column = Some("2".into());
        args.ref_column = Some("3".into());
        args.alt_column = Some("4".into());
        args.missing_value = String::from("NA");

        run(&crate::common::Args::default(), &args)?;

        assert_eq!(
            std::fs::read_to_string(&args.path_output)?,
            "1\t12\tA\tG\t0.5\n1\t30\tA\tG\tNA\n"
        );
        Ok(())
    }

    #[test]
    fn default_options() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let mut args = args(&tmpdir, "chrom\tpos\n", CONF)?;
        args.options = vec![String::from("direct:true"), String::from("limit:3")];

        let options = args.pipeline_options()?;

        assert_eq!(
            options.defaults,
            vec![
                (String::from("direct"), toml::Value::Boolean(true)),
                (String::from("limit"), toml::Value::Integer(3)),
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_config() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let mut args = args(&tmpdir, "chrom\tpos\n", CONF)?;
        args.path_config = tmpdir.join("missing.toml");

        let err = run(&crate::common::Args::default(), &args).unwrap_err();

        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
        Ok(())
    }
}
