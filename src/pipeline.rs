use crate::columns::{ColumnSet, classify};
use crate::downloader::{PDF_MIME, suggested_filename, to_pdf};
use crate::error::{ReportError, Result};
use crate::graph::{self, RenderedChart};
use crate::loader::load;
use crate::metrics::{self, MetricsResult};
use crate::report::{ReportOptions, compose};
use crate::table::Table;
use chrono::NaiveDateTime;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A loaded and classified upload
#[derive(Clone, Debug)]
pub struct Dataset {
    pub table: Table,
    pub columns: ColumnSet,
    pub source_name: String,
}

impl Dataset {
    /// Loads `bytes` and infers its numeric columns
    ///
    /// # Arguments
    /// * `bytes` - Uploaded file content
    /// * `filename` - Uploaded file name; its extension picks the parser
    ///
    /// # Errors
    /// * [`ReportError::EmptyInput`], [`ReportError::Load`] from the loader
    /// * [`ReportError::NoNumericColumns`] if nothing can be measured or charted
    ///
    /// # Examples
    /// ```
    /// use gridtodash::pipeline::Dataset;
    ///
    /// let dataset = Dataset::from_upload(b"region,sales\nN,100\n", "sales.csv").unwrap();
    /// assert_eq!(dataset.columns.numeric, vec!["sales"]);
    /// ```
    pub fn from_upload(bytes: &[u8], filename: &str) -> Result<Self> {
        let table = load(bytes, filename)?;
        let columns = classify(&table)?;
        info!(
            "loaded {}: {} rows, {} columns ({} numeric)",
            filename,
            table.row_count(),
            columns.all.len(),
            columns.numeric.len()
        );
        Ok(Dataset {
            table,
            columns,
            source_name: filename.to_string(),
        })
    }
}

/// The user's column choices for one dataset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selections {
    pub metrics_column: String,
    pub label_column: String,
    pub value_column: String,
    pub report_columns: Vec<String>,
}

impl Selections {
    /// First numeric column for the figures and bars, first column for the
    /// labels, every column in the report.
    pub fn defaults(columns: &ColumnSet) -> Result<Self> {
        let first_numeric = columns
            .numeric
            .first()
            .cloned()
            .ok_or(ReportError::NoNumericColumns)?;
        let first = columns
            .all
            .first()
            .cloned()
            .ok_or(ReportError::EmptyInput)?;

        Ok(Selections {
            metrics_column: first_numeric.clone(),
            label_column: first,
            value_column: first_numeric,
            report_columns: columns.all.clone(),
        })
    }

    /// Checks every choice against the dataset's columns.
    ///
    /// # Errors
    /// * [`ReportError::InvalidSelection`] naming the first offending choice
    pub fn validate(&self, dataset: &Dataset) -> Result<()> {
        let columns = &dataset.columns;
        if !columns.is_numeric(&self.metrics_column) {
            return Err(ReportError::InvalidSelection(format!(
                "metrics column '{}' is not a numeric column",
                self.metrics_column
            )));
        }
        if !columns.is_numeric(&self.value_column) {
            return Err(ReportError::InvalidSelection(format!(
                "value column '{}' is not a numeric column",
                self.value_column
            )));
        }
        if !columns.contains(&self.label_column) {
            return Err(ReportError::InvalidSelection(format!(
                "unknown label column '{}'",
                self.label_column
            )));
        }
        if self.report_columns.is_empty() {
            return Err(ReportError::InvalidSelection(
                "at least one report column must be selected".to_string(),
            ));
        }
        if let Some(unknown) = self.report_columns.iter().find(|c| !columns.contains(c)) {
            return Err(ReportError::InvalidSelection(format!(
                "unknown report column '{}'",
                unknown
            )));
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = self.report_columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(ReportError::InvalidSelection(format!(
                "report column '{}' is selected twice",
                repeated
            )));
        }
        Ok(())
    }

    /// Numeric report columns, drawn as the series of a grouped chart.
    ///
    /// Falls back to every numeric column when no report column is numeric.
    pub fn chart_series(&self, columns: &ColumnSet) -> Vec<String> {
        let series: Vec<String> = self
            .report_columns
            .iter()
            .filter(|c| columns.is_numeric(c))
            .cloned()
            .collect();
        if series.is_empty() {
            columns.numeric.clone()
        } else {
            series
        }
    }
}

/// Wording and choices for one pipeline run
#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub app_name: String,
    pub report_title: String,
    pub selections: Selections,
}

impl PipelineContext {
    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            title: self.report_title.clone(),
            app_name: self.app_name.clone(),
        }
    }
}

/// A finished report and what went into it
#[derive(Clone, Debug)]
pub struct GeneratedReport {
    pub pdf: Vec<u8>,
    pub filename: String,
    pub mime: &'static str,
    pub metrics: MetricsResult,
    pub dropped_series: Vec<String>,
}

/// Figures for the selected metrics column.
pub fn metrics(dataset: &Dataset, ctx: &PipelineContext) -> Result<MetricsResult> {
    ctx.selections.validate(dataset)?;
    metrics::compute(&dataset.table, &ctx.selections.metrics_column)
}

/// Renders the chart for the current selections.
pub fn chart(dataset: &Dataset, ctx: &PipelineContext) -> Result<RenderedChart> {
    let selections = &ctx.selections;
    selections.validate(dataset)?;
    graph::render(
        &dataset.table,
        &selections.label_column,
        &selections.value_column,
        &selections.chart_series(&dataset.columns),
    )
}

/// Runs the whole pipeline: figures, chart and PDF.
///
/// # Arguments
/// * `dataset` - Loaded upload
/// * `ctx` - Selections and report wording
/// * `now` - Local time stamped on the pages and in the filename
pub fn generate(dataset: &Dataset, ctx: &PipelineContext, now: NaiveDateTime) -> Result<GeneratedReport> {
    let rendered = chart(dataset, ctx)?;
    generate_with_chart(dataset, ctx, &rendered, now)
}

/// Like [`generate`], reusing a chart that was already rendered.
pub fn generate_with_chart(
    dataset: &Dataset,
    ctx: &PipelineContext,
    chart: &RenderedChart,
    now: NaiveDateTime,
) -> Result<GeneratedReport> {
    let metrics = metrics(dataset, ctx)?;
    let report_table = dataset.table.select(&ctx.selections.report_columns)?;

    let document = compose(&report_table, &metrics, &chart.png, &ctx.report_options(), now)?;
    let pdf = to_pdf(&document)?;
    let filename = suggested_filename(&ctx.app_name, now);

    info!(
        "generated {} ({} bytes, {} page(s)) from {}",
        filename,
        pdf.len(),
        document.pages.len(),
        dataset.source_name
    );

    Ok(GeneratedReport {
        pdf,
        filename,
        mime: PDF_MIME,
        metrics,
        dropped_series: chart.dropped_series.clone(),
    })
}
