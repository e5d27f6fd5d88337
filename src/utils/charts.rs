//! SVG Chart Generator for Training Results
//!
//! Generates the training-history charts and the grid of sample
//! predictions as standalone SVG files.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};

use crate::inference::PredictionSet;
use crate::training::History;
use crate::utils::error::{PlantHealthError, Result};

/// Chart styling constants
const CHART_WIDTH: f64 = 600.0;
const CHART_HEIGHT: f64 = 450.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 70.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_PRIMARY: &str = "#3498db";
const COLOR_SECONDARY: &str = "#e67e22";
const COLOR_CORRECT: &str = "#27ae60";
const COLOR_WRONG: &str = "#e74c3c";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// Grid layout for the prediction figure
pub const GRID_SIDE: usize = 4;
const CELL_SIZE: f64 = 180.0;
const CELL_TITLE: f64 = 40.0;
const CELL_PADDING: f64 = 10.0;

/// A data series for line charts
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub values: Vec<f64>,
    pub color: String,
}

impl DataSeries {
    fn new(name: &str, values: &[f64], color: &str) -> Self {
        Self {
            name: name.to_string(),
            values: values.to_vec(),
            color: color.to_string(),
        }
    }
}

/// Write the accuracy and loss curves side by side into one SVG
pub fn plot_history(history: &History, output_path: &Path) -> Result<()> {
    if history.is_empty() {
        return Err(PlantHealthError::InvalidInput(
            "cannot plot an empty history".to_string(),
        ));
    }

    let accuracy = line_chart(
        "Model Accuracy",
        "Epochs",
        "Accuracy",
        &[
            DataSeries::new("Train Accuracy", &history.accuracy, COLOR_PRIMARY),
            DataSeries::new("Validation Accuracy", &history.val_accuracy, COLOR_SECONDARY),
        ],
        Some((0.0, 1.0)),
    );
    let loss = line_chart(
        "Model Loss",
        "Epochs",
        "Loss",
        &[
            DataSeries::new("Train Loss", &history.loss, COLOR_PRIMARY),
            DataSeries::new("Validation Loss", &history.val_loss, COLOR_SECONDARY),
        ],
        None,
    );

    let mut svg = svg_header(CHART_WIDTH * 2.0, CHART_HEIGHT);
    svg.push_str(&format!(r#"<g>{}</g>"#, accuracy));
    svg.push_str(&format!(
        r#"<g transform="translate({} 0)">{}</g>"#,
        CHART_WIDTH, loss
    ));
    svg.push_str("</svg>");

    write_svg(output_path, &svg)
}

/// Line chart body without the outer `<svg>` element
///
/// Epochs are drawn 1-based; `y_range` fixes the axis, otherwise it spans
/// zero to the largest value.
fn line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    y_range: Option<(f64, f64)>,
) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let num_epochs = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    let (y_min, y_max) = y_range.unwrap_or_else(|| {
        let max = series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .filter(|v| v.is_finite())
            .fold(0.0f64, f64::max);
        (0.0, if max > 0.0 { max * 1.1 } else { 1.0 })
    });

    let x_of = |epoch: usize| {
        if num_epochs <= 1 {
            MARGIN_LEFT + plot_width / 2.0
        } else {
            MARGIN_LEFT + (epoch as f64 / (num_epochs - 1) as f64) * plot_width
        }
    };
    let y_of = |value: f64| {
        let clamped = value.clamp(y_min, y_max);
        MARGIN_TOP + plot_height - ((clamped - y_min) / (y_max - y_min)) * plot_height
    };

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));

    // Title
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    // Grid lines
    for i in 0..=5 {
        let y = MARGIN_TOP + plot_height - (i as f64 / 5.0) * plot_height;
        let value = y_min + (i as f64 / 5.0) * (y_max - y_min);

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.2}</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, value
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));

    // Axis labels
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 20.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0, escape_xml(y_label)
    ));

    // Epoch ticks
    let tick_step = num_epochs.div_ceil(10).max(1);
    for epoch in (0..num_epochs).step_by(tick_step) {
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
            x_of(epoch), MARGIN_TOP + plot_height + 20.0, COLOR_TEXT, epoch + 1
        ));
    }

    for series_data in series {
        if series_data.values.is_empty() {
            continue;
        }

        let path: Vec<String> = series_data
            .values
            .iter()
            .enumerate()
            .map(|(epoch, &v)| {
                let cmd = if epoch == 0 { "M" } else { "L" };
                format!("{} {:.2} {:.2}", cmd, x_of(epoch), y_of(v))
            })
            .collect();

        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            path.join(" "),
            series_data.color
        ));

        for (epoch, &v) in series_data.values.iter().enumerate() {
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                x_of(epoch), y_of(v), series_data.color
            ));
        }
    }

    // Legend
    let mut legend_y = MARGIN_TOP + 10.0;
    for series_data in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 170.0, legend_y, series_data.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 150.0, legend_y + 12.0, COLOR_TEXT, escape_xml(&series_data.name)
        ));
        legend_y += 25.0;
    }

    svg
}

/// Write a 4x4 grid of the first 16 test images with true and predicted classes
///
/// Titles are green when the prediction matches the label, red otherwise.
pub fn render_prediction_grid(
    predictions: &PredictionSet,
    class_names: &[String],
    output_path: &Path,
) -> Result<()> {
    let count = predictions.len().min(GRID_SIDE * GRID_SIDE);
    let cell_height = CELL_SIZE + CELL_TITLE + CELL_PADDING;
    let width = GRID_SIDE as f64 * (CELL_SIZE + CELL_PADDING) + CELL_PADDING;
    let height = GRID_SIDE as f64 * cell_height + CELL_PADDING;

    let mut svg = svg_header(width, height);
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        width, height
    ));

    for idx in 0..count {
        let row = idx / GRID_SIDE;
        let col = idx % GRID_SIDE;
        let x = CELL_PADDING + col as f64 * (CELL_SIZE + CELL_PADDING);
        let y = CELL_PADDING + row as f64 * cell_height;

        let label = predictions.labels[idx];
        let predicted = predictions.predictions[idx];
        let color = if label == predicted { COLOR_CORRECT } else { COLOR_WRONG };

        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="13" fill="{}">True: {}</text>"#,
            x + CELL_SIZE / 2.0, y + 15.0, color, escape_xml(&class_name(class_names, label))
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="13" fill="{}">Pred: {}</text>"#,
            x + CELL_SIZE / 2.0, y + 32.0, color, escape_xml(&class_name(class_names, predicted))
        ));

        let png = encode_png(&predictions.images[idx], predictions.image_size)?;
        svg.push_str(&format!(
            r#"<image x="{}" y="{}" width="{}" height="{}" href="data:image/png;base64,{}"/>"#,
            x,
            y + CELL_TITLE,
            CELL_SIZE,
            CELL_SIZE,
            STANDARD.encode(png)
        ));
    }

    svg.push_str("</svg>");
    write_svg(output_path, &svg)
}

fn class_name(class_names: &[String], label: u8) -> String {
    class_names
        .get(label as usize)
        .cloned()
        .unwrap_or_else(|| label.to_string())
}

/// Encode a CHW image with values in [0, 1] as PNG
fn encode_png(chw: &[f32], image_size: usize) -> Result<Vec<u8>> {
    let plane = image_size * image_size;
    if chw.len() != 3 * plane {
        return Err(PlantHealthError::InvalidInput(format!(
            "expected {} values for a {}x{} image, got {}",
            3 * plane,
            image_size,
            image_size,
            chw.len()
        )));
    }

    let side = image_size as u32;
    let img = RgbImage::from_fn(side, side, |x, y| {
        let offset = y as usize * image_size + x as usize;
        let channel = |c: usize| (chw[c * plane + offset].clamp(0.0, 1.0) * 255.0).round() as u8;
        image::Rgb([channel(0), channel(1), channel(2)])
    });

    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| PlantHealthError::Serialization(format!("PNG encoding failed: {}", e)))?;
    Ok(bytes.into_inner())
}

fn svg_header(width: f64, height: f64) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        width, height, width, height
    )
}

fn write_svg(output_path: &Path, svg: &str) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output_path, svg)?;
    Ok(())
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
