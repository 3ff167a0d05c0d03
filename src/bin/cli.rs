#![cfg(not(tarpaulin_include))]

use chrono::Local;
use clap::Parser;
use gridtodash::pipeline::{self, Dataset, PipelineContext, Selections};
use gridtodash::report::format_amount;
use log::info;
use std::path::PathBuf;
use std::time::Instant;

/// Build a PDF report from a CSV or Excel file
#[derive(Debug, Parser)]
#[command(name = "gridtodash-cli")]
struct CliArgs {
    /// Input file (.csv, .xlsx, .xls, .ods)
    file: PathBuf,

    /// Column to sum and average; defaults to the first numeric column
    #[arg(long)]
    metrics: Option<String>,

    /// Column labelling the bars; defaults to the first column
    #[arg(long)]
    label: Option<String>,

    /// Column ranking the bars; defaults to the metrics column
    #[arg(long)]
    value: Option<String>,

    /// Columns shown in the report, comma separated; defaults to all
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    #[arg(long, env = "GRIDTODASH_REPORT_TITLE", default_value = "GridToDash Professional Report")]
    title: String,

    #[arg(long, env = "GRIDTODASH_APP_NAME", default_value = "GridToDash")]
    app_name: String,

    /// Where to write the PDF; defaults to the suggested report name
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Also write the chart PNG here
    #[arg(long)]
    chart: Option<PathBuf>,
}

fn selections(args: &CliArgs, dataset: &Dataset) -> gridtodash::Result<Selections> {
    let defaults = Selections::defaults(&dataset.columns)?;
    let metrics_column = args.metrics.clone().unwrap_or(defaults.metrics_column);
    let selections = Selections {
        value_column: args.value.clone().unwrap_or_else(|| metrics_column.clone()),
        metrics_column,
        label_column: args.label.clone().unwrap_or(defaults.label_column),
        report_columns: if args.columns.is_empty() {
            defaults.report_columns
        } else {
            args.columns.clone()
        },
    };
    selections.validate(dataset)?;
    Ok(selections)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let start = Instant::now();
    let args = CliArgs::parse();

    let bytes = std::fs::read(&args.file)?;
    let filename = args.file.to_string_lossy().to_string();
    let dataset = Dataset::from_upload(&bytes, &filename)?;

    let ctx = PipelineContext {
        app_name: args.app_name.clone(),
        report_title: args.title.clone(),
        selections: selections(&args, &dataset)?,
    };

    let metrics = pipeline::metrics(&dataset, &ctx)?;
    println!("Total Records: {}", metrics.row_count);
    println!("Total Sum:     {}", format_amount(metrics.total));
    println!(
        "Average Value: {}",
        metrics.average.map(format_amount).unwrap_or_else(|| "n/a".to_string())
    );

    let chart = pipeline::chart(&dataset, &ctx)?;
    if !chart.dropped_series.is_empty() {
        eprintln!("Warning: chart omits series {}", chart.dropped_series.join(", "));
    }
    if let Some(path) = &args.chart {
        std::fs::write(path, &chart.png)?;
        println!("Chart written to {}", path.display());
    }

    let report = pipeline::generate_with_chart(&dataset, &ctx, &chart, Local::now().naive_local())?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&report.filename));
    std::fs::write(&output, &report.pdf)?;
    println!("Report written to {}", output.display());

    info!("done in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
