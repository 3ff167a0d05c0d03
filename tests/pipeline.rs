use chrono::NaiveDate;
use gridtodash::graph::{ChartSpec, RenderedChart, prepare};
use gridtodash::pipeline::{self, Dataset, PipelineContext, Selections};
use gridtodash::report::PREVIEW_ROWS;
use gridtodash::{ReportError, compute};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use std::io::Cursor;

const SALES: &[u8] = b"region,sales\nN,100\nS,300\nE,200\n";

fn context(dataset: &Dataset) -> PipelineContext {
    PipelineContext {
        app_name: "GridToDash".to_string(),
        report_title: "GridToDash Professional Report".to_string(),
        selections: Selections::defaults(&dataset.columns).unwrap(),
    }
}

// Stand-in for a rendered chart so the test does not depend on system fonts.
fn fake_chart(entries: usize) -> RenderedChart {
    let image = RgbImage::from_pixel(300, 150, image::Rgb([5, 150, 105]));
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut png, ImageOutputFormat::Png)
        .unwrap();
    RenderedChart {
        png: png.into_inner(),
        width: 300,
        height: 150,
        entries,
        dropped_series: vec![],
    }
}

#[test]
fn region_sales_scenario() {
    let dataset = Dataset::from_upload(SALES, "sales.csv").unwrap();
    assert_eq!(dataset.columns.numeric, vec!["sales"]);

    let ctx = context(&dataset);
    let metrics = pipeline::metrics(&dataset, &ctx).unwrap();
    assert_eq!(metrics.row_count, 3);
    assert_eq!(metrics.total, 600.0);
    assert_eq!(metrics.average, Some(200.0));
    assert_eq!(compute(&dataset.table, "sales").unwrap(), metrics);

    let spec = ChartSpec::new(&dataset.table, "region", "sales", &[]).unwrap();
    let data = prepare(&dataset.table, &spec).unwrap();
    assert_eq!(data.labels, vec!["S", "E", "N"]);
}

#[test]
fn report_is_generated_from_upload() {
    let dataset = Dataset::from_upload(SALES, "sales.csv").unwrap();
    let ctx = context(&dataset);
    let now = NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();

    let report = pipeline::generate_with_chart(&dataset, &ctx, &fake_chart(3), now).unwrap();
    assert!(report.pdf.starts_with(b"%PDF"));
    assert_eq!(report.filename, "GridToDash_Report_20240517_093000.pdf");
    assert_eq!(report.mime, "application/pdf");
    assert_eq!(report.metrics.total, 600.0);
}

#[test]
fn report_columns_limit_the_preview() {
    let mut csv = String::from("id,amount,note\n");
    for i in 0..(PREVIEW_ROWS + 20) {
        csv.push_str(&format!("{},{},n{}\n", i, i * 2, i));
    }
    let dataset = Dataset::from_upload(csv.as_bytes(), "many.csv").unwrap();
    let mut ctx = context(&dataset);
    ctx.selections.report_columns = vec!["amount".to_string()];

    let now = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let report = pipeline::generate_with_chart(&dataset, &ctx, &fake_chart(100), now).unwrap();
    assert!(report.pdf.starts_with(b"%PDF"));
}

#[test]
fn zero_byte_csv_is_empty_input() {
    let err = Dataset::from_upload(b"", "empty.csv").unwrap_err();
    assert!(matches!(err, ReportError::EmptyInput));
}

#[test]
fn text_only_table_has_no_numeric_columns() {
    let err = Dataset::from_upload(b"id,name\na1,Ann\nb2,Bo\n", "people.csv").unwrap_err();
    assert!(matches!(err, ReportError::NoNumericColumns));
}

#[test]
fn invalid_selection_is_reported() {
    let dataset = Dataset::from_upload(SALES, "sales.csv").unwrap();
    let mut ctx = context(&dataset);
    ctx.selections.metrics_column = "region".to_string();
    let err = pipeline::metrics(&dataset, &ctx).unwrap_err();
    assert!(matches!(err, ReportError::InvalidSelection(_)));
}

#[test]
fn generate_renders_chart_and_pdf() {
    let csv = b"region,sales,units\nN,100,4\nS,300,9\nE,200,1\nW,50,7\n";
    let dataset = Dataset::from_upload(csv, "regions.csv").unwrap();
    let ctx = context(&dataset);
    let now = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();

    let chart = pipeline::chart(&dataset, &ctx).unwrap();
    assert_eq!(&chart.png[..8], b"\x89PNG\r\n\x1a\n");
    assert_eq!(chart.entries, 4);

    let report = pipeline::generate(&dataset, &ctx, now).unwrap();
    assert!(report.pdf.starts_with(b"%PDF"));
    assert!(report.pdf.len() < 1_000_000, "pdf is {} bytes", report.pdf.len());
    assert_eq!(report.filename, "GridToDash_Report_20240601_120000.pdf");
    assert_eq!(report.metrics.total, 650.0);
    assert!(report.dropped_series.is_empty());
}
