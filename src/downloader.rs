use crate::error::{Result, compose_err};
use crate::report::{
    self, Align, Block, Color, Face, ImageBlock, PAGE_HEIGHT, PAGE_WIDTH, ReportDocument, TextBlock,
};
use chrono::NaiveDateTime;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, ColorBits, ColorSpace, Image, ImageFilter, ImageTransform, ImageXObject,
    IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Px, Rect, Rgb,
};

/// MIME type of the generated report
pub const PDF_MIME: &str = "application/pdf";

/// Resolution the chart is embedded at
const IMAGE_DPI: f64 = 150.0;

/// JPEG quality of the embedded chart
const JPEG_QUALITY: u8 = 90;

const PT_TO_MM: f64 = 25.4 / 72.0;

/// Suggested download name for a report generated at `now`
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use gridtodash::downloader::suggested_filename;
///
/// let now = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(14, 30, 5).unwrap();
/// assert_eq!(suggested_filename("GridToDash", now), "GridToDash_Report_20240309_143005.pdf");
/// ```
pub fn suggested_filename(app_name: &str, now: NaiveDateTime) -> String {
    format!("{}_Report_{}.pdf", app_name, now.format("%Y%m%d_%H%M%S"))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference) -> Result<Self> {
        Ok(Fonts {
            regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(compose_err)?,
            bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(compose_err)?,
            italic: doc.add_builtin_font(BuiltinFont::HelveticaOblique).map_err(compose_err)?,
        })
    }

    fn get(&self, face: Face) -> &IndirectFontRef {
        match face {
            Face::Regular => &self.regular,
            Face::Bold => &self.bold,
            Face::Italic => &self.italic,
        }
    }
}

/// Convert a laid-out report to PDF format
///
/// This function writes every page of `document` into a single in-memory PDF:
/// - text blocks with their font, color, alignment, fill and border
/// - the chart image, embedded from memory as a JPEG stream
///
/// # Arguments
/// * `document` - Report produced by [`crate::report::compose`]
///
/// # Returns
/// * `Result<Vec<u8>>` - PDF file content as bytes or a [`crate::ReportError::Compose`]
pub fn to_pdf(document: &ReportDocument) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        document.title.as_str(),
        Mm(PAGE_WIDTH as f32),
        Mm(PAGE_HEIGHT as f32),
        "Layer 1",
    );
    let fonts = Fonts::load(&doc)?;
    let chart = chart_xobject(&document.chart)?;

    for (index, page) in document.pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_index, layer_index) =
                doc.add_page(Mm(PAGE_WIDTH as f32), Mm(PAGE_HEIGHT as f32), "Layer 1");
            doc.get_page(page_index).get_layer(layer_index)
        };

        for block in &page.blocks {
            match block {
                Block::Text(text) => draw_text(&layer, &fonts, text),
                Block::Image(placement) => draw_image(&layer, &chart, placement),
            }
        }
    }

    doc.save_to_bytes().map_err(compose_err)
}

// PDF space starts at the bottom-left corner.
fn flip(y: f64) -> Mm {
    Mm((PAGE_HEIGHT - y) as f32)
}

fn pdf_color(color: Color) -> printpdf::Color {
    let Color(r, g, b) = color;
    printpdf::Color::Rgb(Rgb::new(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        None,
    ))
}

fn draw_text(layer: &PdfLayerReference, fonts: &Fonts, block: &TextBlock) {
    if block.fill.is_some() || block.border {
        let rect = Rect::new(
            Mm(block.x as f32),
            flip(block.y + block.height),
            Mm((block.x + block.width) as f32),
            flip(block.y),
        );
        let mode = match block.fill {
            Some(fill) => {
                layer.set_fill_color(pdf_color(fill));
                if block.border {
                    PaintMode::FillStroke
                } else {
                    PaintMode::Fill
                }
            }
            None => PaintMode::Stroke,
        };
        layer.set_outline_color(pdf_color(report::BLACK));
        layer.set_outline_thickness(0.5);
        layer.add_rect(rect.with_mode(mode));
    }

    if block.text.is_empty() {
        return;
    }

    let padding = 1.0;
    let width = report::text_width(&block.text, block.size, block.face);
    let x = match block.align {
        Align::Left => block.x + padding,
        Align::Center => block.x + (block.width - width) / 2.0,
        Align::Right => block.x + block.width - width - padding,
    };
    let baseline = block.y + block.height / 2.0 + block.size * PT_TO_MM * 0.35;

    layer.set_fill_color(pdf_color(block.color));
    layer.use_text(
        block.text.as_str(),
        block.size as f32,
        Mm(x as f32),
        flip(baseline),
        fonts.get(block.face),
    );
}

// Raw RGB pixels would be stored uncompressed, so the chart goes in as a DCT stream.
fn chart_xobject(chart: &DynamicImage) -> Result<ImageXObject> {
    let rgb = chart.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(compose_err)?;

    Ok(ImageXObject {
        width: Px(rgb.width() as usize),
        height: Px(rgb.height() as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: jpeg,
        image_filter: Some(ImageFilter::DCT),
        smask: None,
        clipping_bbox: None,
    })
}

fn draw_image(layer: &PdfLayerReference, chart: &ImageXObject, placement: &ImageBlock) {
    let natural_width = chart.width.0 as f64 / IMAGE_DPI * 25.4;
    let natural_height = chart.height.0 as f64 / IMAGE_DPI * 25.4;
    if natural_width == 0.0 || natural_height == 0.0 {
        return;
    }

    Image::from(chart.clone()).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(placement.x as f32)),
            translate_y: Some(flip(placement.y + placement.height)),
            scale_x: Some((placement.width / natural_width) as f32),
            scale_y: Some((placement.height / natural_height) as f32),
            dpi: Some(IMAGE_DPI as f32),
            ..Default::default()
        },
    );
}
