/*!
# GridToDash

Turns an uploaded spreadsheet (CSV or Excel) into key metrics, a ranked bar
chart and a downloadable PDF report.

## Overview

A signed-in user uploads a file, picks the columns to measure, rank and label,
and downloads a paginated A4 report. The same pipeline is available from the
command line through the `gridtodash-cli` binary.

## Architecture

### Report Pipeline
- **Loader** - Parses CSV or the first sheet of a workbook into a [`Table`]
- **Column Classifier** - Separates numeric columns from the rest
- **Metrics Calculator** - Row count, total and average of one column
- **Chart Renderer** - Top-100 bar chart (single or grouped series) as PNG
- **Report Composer** - Lays out metrics, chart and a data preview on A4 pages
- **Downloader** - Writes the laid-out report as PDF bytes

### Web Layer (feature `web`)
- **Technologies**: Rust, axum, tokio
- Account backends behind one `AuthProvider` trait (local JSON file or Convex)
- Cookie sessions holding each user's upload and column choices
- Password recovery codes sent by mail

## Modules

- **table**: In-memory table model and number parsing
- **loader**: CSV and workbook loading
- **columns**: Numeric column inference
- **metrics**: Sum, count and mean of a column
- **graph**: Chart selection and rendering
- **report**: Page layout of the PDF report
- **downloader**: PDF output and download naming
- **pipeline**: Dataset, selections and end-to-end report generation
- **error**: Pipeline error type
- **config**: Server settings
- **login**: Authentication providers and handlers
- **session**: Session store and authentication middleware
- **mailer**: Recovery mail delivery
- **app**: Routing and data endpoints

## REST API Endpoints

- `/api/login`, `/api/signup`, `/api/logout` - Account access
- `/api/password/forgot`, `/api/password/reset` - Password recovery
- `/api/data/upload` - Loads a file into the session
- `/api/data/preview` - First rows of the report columns
- `/api/data/selections` - Updates column choices
- `/api/data/metrics` - Current figures
- `/api/data/chart` - Chart PNG
- `/api/data/report` - PDF report download
*/

pub mod columns;
pub mod downloader;
pub mod error;
pub mod graph;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod mailer;
#[cfg(feature = "web")]
pub mod session;

/// Re-export the pipeline's main types to make it easier to use
pub use columns::{ColumnSet, classify};
pub use downloader::{PDF_MIME, suggested_filename, to_pdf};
pub use error::{ReportError, Result};
pub use graph::{RenderedChart, render};
pub use loader::{load, load_path};
pub use metrics::{MetricsResult, compute};
pub use pipeline::{Dataset, GeneratedReport, PipelineContext, Selections, generate, generate_with_chart};
pub use report::{ReportDocument, ReportOptions, compose};
pub use table::{Cell, Column, Table};
