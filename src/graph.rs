use crate::columns::is_numeric_column;
use crate::error::{ReportError, Result, chart_err};
use crate::table::{Table, format_number};
use image::{DynamicImage, ImageOutputFormat, RgbImage, imageops};
use log::{debug, warn};
use plotters::prelude::*;
use std::cmp::Ordering;
use std::io::Cursor;

/// Most rows a chart ever shows
pub const MAX_CHART_ROWS: usize = 100;

/// Most series a grouped chart draws; further series are dropped
pub const MAX_SERIES: usize = 5;

/// Raster resolution, in pixels per canvas unit
pub const DPI: f64 = 150.0;

const CANVAS_WIDTH_UNITS: f64 = 12.0;
const CROP_PADDING: u32 = 15;

const NAVY: RGBColor = RGBColor(0x1E, 0x3A, 0x5F);
const BAR_EDGE: RGBColor = RGBColor(0x04, 0x78, 0x57);
const SERIES_COLORS: [RGBColor; MAX_SERIES] = [
    RGBColor(0x05, 0x96, 0x69),
    RGBColor(0x0E, 0xA5, 0xE9),
    RGBColor(0x8B, 0x5C, 0xF6),
    RGBColor(0xF5, 0x9E, 0x0B),
    RGBColor(0xEC, 0x48, 0x99),
];

/// What to plot
///
/// Built and validated by [`ChartSpec::new`]; consumed by [`render_spec`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChartSpec {
    /// Column whose values label the bars
    pub label_column: String,

    /// Column that ranks the rows (and is plotted when there is a single series)
    pub value_column: String,

    /// Series drawn side by side in a grouped chart, at most [`MAX_SERIES`]
    pub series: Vec<String>,

    /// Series that were requested but exceed [`MAX_SERIES`]
    pub dropped_series: Vec<String>,

    /// `min(100, row count)`
    pub row_limit: usize,
}

impl ChartSpec {
    /// Validates the axis selection against `table`
    ///
    /// # Arguments
    /// * `table` - Table the chart is drawn from
    /// * `label_column` - Any column; its string form labels the bars
    /// * `value_column` - Numeric column used for ranking
    /// * `series` - Numeric columns for a grouped chart; only the first five are kept
    ///
    /// # Errors
    /// * [`ReportError::ChartRender`] if the table is empty, a column is unknown,
    ///   or the value/series columns are not numeric
    pub fn new(
        table: &Table,
        label_column: &str,
        value_column: &str,
        series: &[String],
    ) -> Result<Self> {
        if table.row_count() == 0 {
            return Err(ReportError::ChartRender("table has no rows".to_string()));
        }
        if table.column(label_column).is_none() {
            return Err(ReportError::ChartRender(format!(
                "unknown label column '{}'",
                label_column
            )));
        }
        require_numeric(table, value_column)?;
        for name in series {
            require_numeric(table, name)?;
        }

        let keep = series.len().min(MAX_SERIES);
        let dropped_series = series[keep..].to_vec();
        if !dropped_series.is_empty() {
            warn!(
                "chart shows at most {} series, dropping {}",
                MAX_SERIES,
                dropped_series.join(", ")
            );
        }

        Ok(ChartSpec {
            label_column: label_column.to_string(),
            value_column: value_column.to_string(),
            series: series[..keep].to_vec(),
            dropped_series,
            row_limit: table.row_count().min(MAX_CHART_ROWS),
        })
    }

    pub fn is_grouped(&self) -> bool {
        self.series.len() > 1
    }

    pub fn title(&self, entries: usize) -> String {
        format!(
            "{} by {} ({} entries)",
            self.label_column, self.value_column, entries
        )
    }

    /// Canvas height in units; the width is always 12.
    pub fn height_units(&self) -> f64 {
        (6.0 + self.row_limit as f64 / 20.0).min(12.0)
    }

    /// Canvas size in pixels before cropping.
    pub fn canvas_size(&self) -> (u32, u32) {
        (
            (CANVAS_WIDTH_UNITS * DPI).round() as u32,
            (self.height_units() * DPI).round() as u32,
        )
    }
}

fn require_numeric(table: &Table, name: &str) -> Result<()> {
    match table.column(name) {
        None => Err(ReportError::ChartRender(format!("unknown column '{}'", name))),
        Some(column) if !is_numeric_column(column) => Err(ReportError::ChartRender(format!(
            "column '{}' is not numeric",
            name
        ))),
        Some(_) => Ok(()),
    }
}

/// Data points ready to draw, already ranked
#[derive(Clone, Debug, PartialEq)]
pub struct ChartData {
    /// Indices of the selected rows in the source table, in drawing order
    pub rows: Vec<usize>,
    pub labels: Vec<String>,
    /// One entry per drawn series: name and one value per selected row
    pub series: Vec<(String, Vec<Option<f64>>)>,
}

/// Indices of the `limit` rows with the largest `value_column`, largest first
///
/// Rows without a value are not ranked. Equal values keep their table order.
pub fn select_top_rows(table: &Table, value_column: &str, limit: usize) -> Result<Vec<usize>> {
    let column = table
        .column(value_column)
        .ok_or_else(|| ReportError::ChartRender(format!("unknown column '{}'", value_column)))?;

    let mut ranked: Vec<(usize, f64)> = column
        .numbers()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(limit);

    Ok(ranked.into_iter().map(|(i, _)| i).collect())
}

/// Picks the rows and values `spec` asks for.
pub fn prepare(table: &Table, spec: &ChartSpec) -> Result<ChartData> {
    let rows = select_top_rows(table, &spec.value_column, spec.row_limit)?;
    if rows.is_empty() {
        return Err(ReportError::ChartRender(format!(
            "column '{}' has no values to plot",
            spec.value_column
        )));
    }

    let label_column = table
        .column(&spec.label_column)
        .ok_or_else(|| ReportError::ChartRender(format!("unknown column '{}'", spec.label_column)))?;
    let labels = rows
        .iter()
        .map(|&r| label_column.cells[r].to_string())
        .collect();

    let plotted: Vec<&String> = if spec.is_grouped() {
        spec.series.iter().collect()
    } else {
        vec![&spec.value_column]
    };

    let mut series = Vec::with_capacity(plotted.len());
    for name in plotted {
        let column = table
            .column(name)
            .ok_or_else(|| ReportError::ChartRender(format!("unknown column '{}'", name)))?;
        let values: Vec<Option<f64>> = rows.iter().map(|&r| column.cells[r].as_number()).collect();
        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ReportError::ChartRender(format!(
                "column '{}' holds a value too large to plot",
                name
            )));
        }
        series.push((name.clone(), values));
    }

    Ok(ChartData {
        rows,
        labels,
        series,
    })
}

/// An encoded chart image
#[derive(Clone, Debug)]
pub struct RenderedChart {
    /// PNG bytes, cropped to the drawn content
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Number of rows drawn
    pub entries: usize,
    pub dropped_series: Vec<String>,
}

/// Renders a bar chart of the top rows of `table`
///
/// With more than one series the chart is grouped: one cluster per row, one
/// colored bar per series and a legend. Otherwise `value_column` is drawn as a
/// single series.
///
/// # Arguments
/// * `table` - Source table
/// * `label_column` - Column used for the X labels
/// * `value_column` - Column used for ranking and for a single-series chart
/// * `series` - Numeric columns of a grouped chart
///
/// # Returns
/// * A Result containing the PNG image or a [`ReportError::ChartRender`]
///
/// # Examples
/// ```no_run
/// use gridtodash::graph::render;
/// use gridtodash::loader::load;
///
/// let table = load(b"region,sales\nN,100\nS,300\n", "sales.csv").unwrap();
/// let chart = render(&table, "region", "sales", &[]).unwrap();
/// println!("{} bytes, {} entries", chart.png.len(), chart.entries);
/// ```
pub fn render(
    table: &Table,
    label_column: &str,
    value_column: &str,
    series: &[String],
) -> Result<RenderedChart> {
    let spec = ChartSpec::new(table, label_column, value_column, series)?;
    render_spec(table, &spec)
}

/// Renders an already validated [`ChartSpec`].
pub fn render_spec(table: &Table, spec: &ChartSpec) -> Result<RenderedChart> {
    let data = prepare(table, spec)?;
    debug!(
        "rendering chart '{}' with {} series",
        spec.title(data.rows.len()),
        data.series.len()
    );

    let image = draw(spec, &data)?;
    let cropped = crop_to_content(&image, CROP_PADDING);
    let (width, height) = cropped.dimensions();

    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(cropped)
        .write_to(&mut png, ImageOutputFormat::Png)
        .map_err(chart_err)?;

    Ok(RenderedChart {
        png: png.into_inner(),
        width,
        height,
        entries: data.rows.len(),
        dropped_series: spec.dropped_series.clone(),
    })
}

// Font size in pixels for a size given in points.
fn pt(points: f64) -> f64 {
    points * DPI / 72.0
}

fn draw(spec: &ChartSpec, data: &ChartData) -> Result<RgbImage> {
    let (width, height) = spec.canvas_size();
    let mut buffer = vec![255u8; width as usize * height as usize * 3];

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let entries = data.labels.len();
        let groups = data.series.len();
        let bar_width = 0.8 / groups as f64;
        let cluster_center = bar_width * (groups - 1) as f64 / 2.0;
        let x_range = -0.5..(entries as f64 - 0.5 + bar_width * (groups - 1) as f64);
        let (y_min, y_max) = value_bounds(&data.series);
        if !(y_min.is_finite() && y_max.is_finite()) {
            return Err(ReportError::ChartRender(
                "value range is too wide to plot".to_string(),
            ));
        }

        let tick_font = pt(9.0);
        let step = tick_font * 0.42;
        let label_area = label_area_size(&data.labels, step, height);

        let mut chart = ChartBuilder::on(&root)
            .caption(
                spec.title(entries),
                ("sans-serif", pt(12.0))
                    .into_font()
                    .style(FontStyle::Bold)
                    .color(&NAVY),
            )
            .margin(20u32)
            .x_label_area_size(label_area)
            .y_label_area_size(pt(40.0) as u32)
            .build_cartesian_2d(x_range, y_min..y_max)
            .map_err(chart_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(TRANSPARENT)
            .bold_line_style(BLACK.mix(0.3))
            .x_label_formatter(&|_| String::new())
            .y_label_formatter(&|v| format_number((v * 100.0).round() / 100.0))
            .y_label_style(("sans-serif", tick_font))
            .x_desc(spec.label_column.as_str())
            .y_desc(spec.value_column.as_str())
            .axis_desc_style(("sans-serif", pt(10.0)))
            .draw()
            .map_err(chart_err)?;

        for (i, (name, values)) in data.series.iter().enumerate() {
            let color = SERIES_COLORS[i % SERIES_COLORS.len()];
            let offset = i as f64 * bar_width;
            let half = bar_width / 2.0;

            let bars = values.iter().enumerate().filter_map(move |(x, v)| {
                v.map(|v| {
                    let center = x as f64 + offset;
                    Rectangle::new([(center - half, 0.0), (center + half, v)], color.filled())
                })
            });
            let annotation = chart.draw_series(bars).map_err(chart_err)?;

            if groups > 1 {
                annotation
                    .label(name.as_str())
                    .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 16, y + 6)], color.filled()));
            } else {
                let edges = values.iter().enumerate().filter_map(|(x, v)| {
                    v.map(|v| {
                        let center = x as f64;
                        Rectangle::new(
                            [(center - half, 0.0), (center + half, v)],
                            BAR_EDGE.stroke_width(1),
                        )
                    })
                });
                chart.draw_series(edges).map_err(chart_err)?;
            }
        }

        if groups > 1 {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .label_font(("sans-serif", pt(8.0)))
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK.mix(0.3))
                .draw()
                .map_err(chart_err)?;
        }

        // X labels run at 45 degrees, ending under their tick.
        let style = ("sans-serif", tick_font).into_font().color(&BLACK);
        let max_chars = ((label_area as f64 - tick_font) / step).max(1.0) as usize;
        for (i, label) in data.labels.iter().enumerate() {
            let (tick_x, tick_y) = chart.backend_coord(&(i as f64 + cluster_center, y_min));
            let chars: Vec<char> = label.chars().take(max_chars).collect();
            let len = chars.len();
            for (k, ch) in chars.iter().enumerate() {
                let from_end = (len - 1 - k) as f64;
                let x = tick_x - ((from_end + 1.0) * step) as i32;
                let y = tick_y + 6 + (from_end * step) as i32;
                root.draw(&Text::new(ch.to_string(), (x, y), style.clone()))
                    .map_err(chart_err)?;
            }
        }

        root.present().map_err(chart_err)?;
    }

    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| ReportError::ChartRender("pixel buffer does not match canvas".to_string()))
}

// Y range covering every value and zero, with headroom above the tallest bar.
fn value_bounds(series: &[(String, Vec<Option<f64>>)]) -> (f64, f64) {
    let values = series.iter().flat_map(|(_, v)| v.iter().flatten().copied());
    let (min, max) = values.fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = if max > min { max - min } else { 1.0 };
    let low = if min < 0.0 { min - span * 0.05 } else { 0.0 };
    (low, max + span * 0.05)
}

fn label_area_size(labels: &[String], step: f64, canvas_height: u32) -> u32 {
    let longest = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let wanted = longest as f64 * step + pt(9.0) + pt(10.0) * 2.0;
    let cap = canvas_height as f64 * 0.35;
    wanted.clamp(pt(30.0), cap) as u32
}

/// Trims the white border around the drawn content, keeping `pad` pixels of margin.
pub fn crop_to_content(image: &RgbImage, pad: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0 == [255, 255, 255] {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    match bounds {
        None => image.clone(),
        Some((x0, y0, x1, y1)) => {
            let left = x0.saturating_sub(pad);
            let top = y0.saturating_sub(pad);
            let right = (x1 + pad).min(width - 1);
            let bottom = (y1 + pad).min(height - 1);
            imageops::crop_imm(image, left, top, right - left + 1, bottom - top + 1).to_image()
        }
    }
}
