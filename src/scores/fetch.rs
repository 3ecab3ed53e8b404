//! Implementation of the `scores fetch` sub command.

use std::{io::Write, path::PathBuf};

use clap::Parser;
use serde_json::{Map, Value};

use crate::common::{io::open_write_maybe_gz, trace_rss_now};

use super::{
    aggregate,
    conf::ColumnType,
    file::{FetchedScores, ScoreFile, COUNT},
    region::Region,
};

/// Command line arguments for `scores fetch` sub command.
#[derive(Parser, Debug)]
#[command(about = "Print score file rows overlapping a region", long_about = None)]
pub struct Args {
    /// Path to the bgzip compressed and tabix indexed score file.
    #[arg(long, required = true)]
    pub path_scores: PathBuf,
    /// Path to the score file configuration, defaults to `${path_scores}.conf`.
    #[arg(long)]
    pub path_conf: Option<PathBuf>,
    /// Region to fetch as `chrom:begin[-end]` with 1-based positions.
    #[arg(long, required = true)]
    pub region: Region,
    /// Print the weighted mean and maximum of each score instead of the rows.
    #[arg(long, default_value_t = false)]
    pub aggregate: bool,
    /// Path to the output JSONL file, `-` for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: PathBuf,
}

/// Render the value of a column of `column_type` for JSON output.
fn to_json(score_file: &ScoreFile, column_type: &ColumnType, value: &str) -> Value {
    if score_file.is_missing(value) {
        return Value::Null;
    }
    match column_type {
        ColumnType::Float => value
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_owned())),
        column_type if column_type.is_numeric() => value
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(value.to_owned())),
        ColumnType::Bool => match value.to_ascii_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::String(value.to_owned()),
        },
        _ => Value::String(value.to_owned()),
    }
}

/// One JSON object per fetched row.
fn rows_to_json(score_file: &ScoreFile, fetched: &FetchedScores) -> Vec<Value> {
    (0..fetched.len())
        .map(|i| {
            let mut object = Map::new();
            for (name, values) in &fetched.columns {
                let column_type = score_file
                    .schema()
                    .get(name)
                    .cloned()
                    .unwrap_or(ColumnType::Str);
                object.insert(name.clone(), to_json(score_file, &column_type, &values[i]));
            }
            object.insert(COUNT.to_owned(), Value::from(fetched.count[i]));
            Value::Object(object)
        })
        .collect()
}

fn number_or_null(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Main entry point for the `scores fetch` command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `scores fetch`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let mut score_file = ScoreFile::open(&args.path_scores, args.path_conf.as_ref())?;
    let region = &args.region;
    let pos_end = region.end.unwrap_or(region.begin);
    let fetched = score_file.fetch_scores(&region.chrom, region.begin, pos_end)?;
    tracing::debug!("fetched {} rows for {}", fetched.len(), region);

    let mut writer = open_write_maybe_gz(&args.path_output)?;
    if args.aggregate {
        let frame = score_file.to_frame(fetched)?;
        let highest = score_file.fetch_highest_scores(&region.chrom, region.begin, pos_end)?;
        let mut object = Map::new();
        for name in score_file.score_names() {
            let mut entry = Map::new();
            entry.insert(
                "weighted_mean".to_owned(),
                number_or_null(aggregate::weighted_mean(frame.counted(name))),
            );
            entry.insert(
                "max".to_owned(),
                number_or_null(highest.get(name).copied().flatten()),
            );
            object.insert(name.clone(), Value::Object(entry));
        }
        serde_json::to_writer(&mut writer, &Value::Object(object))?;
        writer.write_all(&[b'\n'])?;
    } else {
        for row in rows_to_json(&score_file, &fetched) {
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(&[b'\n'])?;
        }
    }
    writer.finish()?;

    trace_rss_now();
    tracing::info!("All of `scores fetch` is done. Have a nice day!");
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::scores::file::test::two_row_score_file;

    fn run_fetch(region: &str, aggregate: bool) -> Result<Vec<Value>, anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let args = Args {
            path_scores: two_row_score_file(&tmpdir)?,
            path_conf: None,
            region: region.parse()?,
            aggregate,
            path_output: tmpdir.join("out.jsonl"),
        };
        run(&crate::common::Args::default(), &args)?;

        std::fs::read_to_string(&args.path_output)?
            .lines()
            .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
            .collect()
    }

    #[test]
    fn fetch_rows() -> Result<(), anyhow::Error> {
        let rows = run_fetch("1:14-21", false)?;

        assert_eq!(
            rows,
            vec![
                json!({"chrom": "1", "pos_begin": "10", "pos_end": "15", "score": 0.5, "COUNT": 2}),
                json!({"chrom": "1", "pos_begin": "20", "pos_end": "25", "score": 0.8, "COUNT": 2}),
            ]
        );
        Ok(())
    }

    #[test]
    fn fetch_aggregate() -> Result<(), anyhow::Error> {
        let rows = run_fetch("1:14-21", true)?;

        assert_eq!(rows.len(), 1);
        let max = rows[0]["score"]["max"].as_f64().unwrap_or_default();
        assert!(float_cmp::approx_eq!(f64, max, 0.8, epsilon = 1e-6));
        let mean = rows[0]["score"]["weighted_mean"].as_f64().unwrap_or_default();
        assert!(float_cmp::approx_eq!(f64, mean, 0.65, epsilon = 1e-6));
        Ok(())
    }

    #[test]
    fn fetch_empty_region() -> Result<(), anyhow::Error> {
        assert_eq!(run_fetch("1:100", false)?, Vec::<Value>::new());
        assert_eq!(
            run_fetch("1:100", true)?,
            vec![json!({"score": {"weighted_mean": null, "max": null}})]
        );
        Ok(())
    }
}
