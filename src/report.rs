use crate::error::{ReportError, Result, compose_err};
use crate::metrics::MetricsResult;
use crate::table::Table;
use chrono::NaiveDateTime;
use image::{DynamicImage, GenericImageView};
use log::debug;

pub const PAGE_WIDTH: f64 = 210.0;
pub const PAGE_HEIGHT: f64 = 297.0;
pub const MARGIN: f64 = 10.0;
pub const CONTENT_WIDTH: f64 = PAGE_WIDTH - 2.0 * MARGIN;

/// Content may not extend below this line; the footer sits under it.
pub const PAGE_BREAK_Y: f64 = PAGE_HEIGHT - 20.0;

/// Most data rows printed in the preview table
pub const PREVIEW_ROWS: usize = 100;

const CONTENT_TOP: f64 = 35.0;
const FOOTER_Y: f64 = PAGE_HEIGHT - 15.0;
const HEADER_ROW_HEIGHT: f64 = 7.0;
const DATA_ROW_HEIGHT: f64 = 6.0;
const HEADING_HEIGHT: f64 = 10.0;
const MAX_COLUMN_WIDTH: f64 = 22.0;
const TABLE_WIDTH: f64 = 195.0;
const HEADER_CHARS: usize = 10;
const CELL_CHARS: usize = 12;

const PT_TO_MM: f64 = 25.4 / 72.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

pub const NAVY: Color = Color(30, 58, 95);
pub const BLACK: Color = Color(0, 0, 0);
pub const WHITE: Color = Color(255, 255, 255);
pub const GRAY: Color = Color(128, 128, 128);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    Italic,
}

/// A line of text inside a box, measured in millimetres from the top-left page corner.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlock {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
    /// Font size in points
    pub size: f64,
    pub face: Face,
    pub color: Color,
    pub align: Align,
    pub fill: Option<Color>,
    pub border: bool,
}

/// Where the chart image goes, in millimetres.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBlock {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Text(TextBlock),
    Image(ImageBlock),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub blocks: Vec<Block>,
}

impl Page {
    /// All text on the page, in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        self.blocks.iter().filter_map(|b| match b {
            Block::Text(t) => Some(t.text.as_str()),
            Block::Image(_) => None,
        })
    }
}

/// A laid-out report, ready to be written as PDF by [`crate::downloader::to_pdf`].
#[derive(Clone, Debug)]
pub struct ReportDocument {
    pub title: String,
    pub pages: Vec<Page>,
    /// Decoded chart, placed by the page's [`Block::Image`]
    pub chart: DynamicImage,
}

/// Fixed report wording
#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub title: String,
    pub app_name: String,
}

impl ReportOptions {
    pub fn footer(&self) -> String {
        format!("Generated by {} - Professional Automation", self.app_name)
    }
}

/// Lays out the report pages
///
/// The document holds, in order: the key metrics, the list of column names,
/// the chart and a preview table of at most [`PREVIEW_ROWS`] rows of `table`.
/// Every page carries the title, the generation time and the footer.
///
/// # Arguments
/// * `table` - Rows and columns to preview; usually the user's report columns
/// * `metrics` - Figures for the metrics block
/// * `chart_png` - Encoded chart image
/// * `options` - Title and application name
/// * `generated_at` - Local time printed in the page header
///
/// # Errors
/// * [`ReportError::Compose`] if the chart cannot be decoded or the table has no columns
pub fn compose(
    table: &Table,
    metrics: &MetricsResult,
    chart_png: &[u8],
    options: &ReportOptions,
    generated_at: NaiveDateTime,
) -> Result<ReportDocument> {
    if table.column_count() == 0 {
        return Err(ReportError::Compose("report has no columns".to_string()));
    }
    let chart = image::load_from_memory(chart_png).map_err(compose_err)?;

    let mut layout = Layout::new(options, generated_at);

    layout.metrics(metrics);
    layout.column_list(table);
    layout.chart(&chart, table.row_count().min(PREVIEW_ROWS));
    layout.preview(table);

    debug!("composed report with {} page(s)", layout.pages.len());

    Ok(ReportDocument {
        title: options.title.clone(),
        pages: layout.pages,
        chart,
    })
}

struct Layout<'a> {
    options: &'a ReportOptions,
    stamp: String,
    pages: Vec<Page>,
    y: f64,
}

impl<'a> Layout<'a> {
    fn new(options: &'a ReportOptions, generated_at: NaiveDateTime) -> Self {
        let mut layout = Layout {
            options,
            stamp: format!("Report Generated: {}", generated_at.format("%Y-%m-%d %H:%M")),
            pages: Vec::new(),
            y: CONTENT_TOP,
        };
        layout.new_page();
        layout
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        let title = self.options.title.clone();
        let stamp = self.stamp.clone();
        let footer = self.options.footer();

        self.push(TextBlock {
            size: 16.0,
            face: Face::Bold,
            color: NAVY,
            align: Align::Center,
            ..text(MARGIN, 10.0, CONTENT_WIDTH, 10.0, title)
        });
        self.push(TextBlock {
            size: 9.0,
            align: Align::Right,
            ..text(MARGIN, 21.0, CONTENT_WIDTH, 6.0, stamp)
        });
        self.push(TextBlock {
            size: 8.0,
            face: Face::Italic,
            color: GRAY,
            align: Align::Center,
            ..text(MARGIN, FOOTER_Y, CONTENT_WIDTH, 10.0, footer)
        });

        self.y = CONTENT_TOP;
    }

    fn push(&mut self, block: TextBlock) {
        self.push_block(Block::Text(block));
    }

    fn push_block(&mut self, block: Block) {
        if let Some(page) = self.pages.last_mut() {
            page.blocks.push(block);
        }
    }

    /// Starts a new page unless `height` more millimetres fit on this one.
    fn reserve(&mut self, height: f64) -> bool {
        if self.y + height > PAGE_BREAK_Y {
            self.new_page();
            true
        } else {
            false
        }
    }

    fn heading(&mut self, label: String) {
        let y = self.y;
        self.push(TextBlock {
            size: 14.0,
            face: Face::Bold,
            color: NAVY,
            ..text(MARGIN, y, CONTENT_WIDTH, HEADING_HEIGHT, label)
        });
        self.y += HEADING_HEIGHT;
    }

    fn metrics(&mut self, metrics: &MetricsResult) {
        self.heading("Key Metrics".to_string());
        self.y += 5.0;

        let average = metrics
            .average
            .map(format_amount)
            .unwrap_or_else(|| "n/a".to_string());
        let fields = [
            format!("Total Records: {}", metrics.row_count),
            format!("Total Sum: {}", format_amount(metrics.total)),
            format!("Average Value: {}", average),
        ];

        let y = self.y;
        for (i, field) in fields.into_iter().enumerate() {
            self.push(TextBlock {
                size: 11.0,
                ..text(MARGIN + 60.0 * i as f64, y, 60.0, 8.0, field)
            });
        }
        self.y += 8.0 + 10.0;
    }

    fn column_list(&mut self, table: &Table) {
        let listing = format!("Columns in data: {}", table.column_names().join(", "));
        let lines = wrap_text(&listing, CONTENT_WIDTH, 12.0, Face::Bold);

        self.reserve(8.0 * lines.len() as f64);
        for line in lines {
            self.reserve(8.0);
            let y = self.y;
            self.push(TextBlock {
                size: 12.0,
                face: Face::Bold,
                ..text(MARGIN, y, CONTENT_WIDTH, 8.0, line)
            });
            self.y += 8.0;
        }
        self.y += 5.0;
    }

    fn chart(&mut self, chart: &DynamicImage, entries: usize) {
        let (pixel_width, pixel_height) = chart.dimensions();
        let max_height = PAGE_BREAK_Y - CONTENT_TOP - HEADING_HEIGHT;
        let (width, height) = fit_image(pixel_width, pixel_height, CONTENT_WIDTH, max_height);

        self.reserve(HEADING_HEIGHT + height);
        self.heading(format!("Chart ({} Entries)", entries));

        let x = MARGIN + (CONTENT_WIDTH - width) / 2.0;
        let y = self.y;
        self.push_block(Block::Image(ImageBlock {
            x,
            y,
            width,
            height,
        }));
        self.y += height + 10.0;
    }

    fn preview(&mut self, table: &Table) {
        let rows = table.row_count().min(PREVIEW_ROWS);
        let column_width = MAX_COLUMN_WIDTH.min(TABLE_WIDTH / table.column_count() as f64);
        let headers: Vec<String> = table
            .column_names()
            .iter()
            .map(|name| truncate(name, HEADER_CHARS))
            .collect();

        self.reserve(HEADING_HEIGHT + HEADER_ROW_HEIGHT + DATA_ROW_HEIGHT);
        self.heading(format!("Data Preview (first {} rows)", rows));
        self.header_row(&headers, column_width);

        for r in 0..rows {
            if self.reserve(DATA_ROW_HEIGHT) {
                self.header_row(&headers, column_width);
            }
            let y = self.y;
            for (c, cell) in table.row(r).enumerate() {
                self.push(TextBlock {
                    size: 7.0,
                    align: Align::Center,
                    border: true,
                    ..text(
                        MARGIN + column_width * c as f64,
                        y,
                        column_width,
                        DATA_ROW_HEIGHT,
                        truncate(&cell.to_string(), CELL_CHARS),
                    )
                });
            }
            self.y += DATA_ROW_HEIGHT;
        }
    }

    fn header_row(&mut self, headers: &[String], column_width: f64) {
        let y = self.y;
        for (c, header) in headers.iter().enumerate() {
            self.push(TextBlock {
                size: 7.0,
                face: Face::Bold,
                color: WHITE,
                align: Align::Center,
                fill: Some(NAVY),
                border: true,
                ..text(
                    MARGIN + column_width * c as f64,
                    y,
                    column_width,
                    HEADER_ROW_HEIGHT,
                    header.clone(),
                )
            });
        }
        self.y += HEADER_ROW_HEIGHT;
    }
}

// Plain left-aligned black 10 pt text, the base every block is built from.
fn text(x: f64, y: f64, width: f64, height: f64, text: String) -> TextBlock {
    TextBlock {
        x,
        y,
        width,
        height,
        text,
        size: 10.0,
        face: Face::Regular,
        color: BLACK,
        align: Align::Left,
        fill: None,
        border: false,
    }
}

/// Scales an image of `pixel_width` x `pixel_height` to `max_width` mm wide,
/// shrinking it further when it would be taller than `max_height`.
pub fn fit_image(pixel_width: u32, pixel_height: u32, max_width: f64, max_height: f64) -> (f64, f64) {
    if pixel_width == 0 || pixel_height == 0 {
        return (max_width, 0.0);
    }
    let ratio = pixel_height as f64 / pixel_width as f64;
    let height = max_width * ratio;
    if height <= max_height {
        (max_width, height)
    } else {
        (max_height / ratio, max_height)
    }
}

/// Formats an amount with two decimals and thousands separators.
///
/// # Examples
/// ```
/// use gridtodash::report::format_amount;
///
/// assert_eq!(format_amount(1234567.891), "1,234,567.89");
/// assert_eq!(format_amount(-0.5), "-0.50");
/// ```
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, group_thousands(whole), fraction)
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Keeps at most `max` characters of `s`.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Approximate width in millimetres of `text` set in Helvetica.
pub fn text_width(text: &str, size: f64, face: Face) -> f64 {
    let units: u32 = text.chars().map(glyph_width).sum();
    let bold = if face == Face::Bold { 1.05 } else { 1.0 };
    units as f64 / 1000.0 * size * PT_TO_MM * bold
}

// Helvetica advance widths in 1/1000 em, grouped by shape.
fn glyph_width(ch: char) -> u32 {
    match ch {
        'i' | 'j' | 'l' | '\'' | '|' => 222,
        ' ' | '.' | ',' | ':' | ';' | '!' | 'f' | 't' | 'I' | '/' | '[' | ']' => 278,
        'r' | '(' | ')' | '-' => 333,
        'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' | 'J' => 500,
        'm' => 833,
        'w' => 722,
        'M' => 833,
        'W' => 944,
        '@' => 1015,
        'A'..='Z' => 667,
        _ => 556,
    }
}

/// Breaks `text` into lines no wider than `width` mm, at spaces where possible.
pub fn wrap_text(text: &str, width: f64, size: f64, face: Face) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split(' ') {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width(&candidate, size, face) <= width || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
