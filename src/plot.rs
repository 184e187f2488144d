// plot.rs
// Description: Confusion matrix heatmap rendered to a PNG.
//              True classes run down the rows, predictions across the columns. Cells are
//              shaded on a white to blue ramp by their row percentage and annotated with the
//              raw count and, when normalizing, the percentage. Drawing goes through a
//              plotters bitmap backend over an in-memory RGB buffer; the image crate encodes it.
// History:
// - 2026-10-17: Add heatmap rendering and saving.
// - 2026-10-19: Draw cells and text with plotters instead of a fixed glyph table.

use std::path::{Path, PathBuf};

use image::RgbImage;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::MetricsError;
use crate::metrics::ConfusionMatrix;

const CELL_PX: i32 = 120;
const MARGIN_LEFT: i32 = 150;
const MARGIN_TOP: i32 = 70;
const MARGIN_RIGHT: i32 = 30;
const MARGIN_BOTTOM: i32 = 90;

const FONT_FAMILY: &str = "sans-serif";
const FONT_TITLE: u32 = 26;
const FONT_LABEL: u32 = 18;
const FONT_CELL: u32 = 17;

// Colour scale limits on percentages.
const D_VMIN: f64 = -5.0;
const D_VMAX: f64 = 80.0;
const I_WHITE_TEXT_ABOVE: u64 = 500;

const BLUES_LOW: [u8; 3] = [247, 251, 255];
const BLUES_HIGH: [u8; 3] = [8, 48, 107];

#[derive(Clone, Debug, PartialEq)]
pub struct HeatmapOptions {
    pub v_target_names: Vec<String>,
    pub s_title: String,
    pub b_normalize: bool,
    pub p_output: PathBuf,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        Self {
            v_target_names: vec!["Wake".to_string(), "SWS".to_string(), "REM".to_string()],
            s_title: "Confusion Matrix (3-Class)".to_string(),
            b_normalize: true,
            p_output: PathBuf::from("confusion_matrix.png"),
        }
    }
}

fn heatmap_size(i_n_classes: usize) -> (u32, u32) {
    let i_n = i_n_classes as i32;
    (
        (MARGIN_LEFT + i_n * CELL_PX + MARGIN_RIGHT) as u32,
        (MARGIN_TOP + i_n * CELL_PX + MARGIN_BOTTOM) as u32,
    )
}

pub fn render_confusion_heatmap(cm: &ConfusionMatrix, opts: &HeatmapOptions) -> Result<RgbImage, MetricsError> {
    let (i_width, i_height) = heatmap_size(cm.n_classes());
    let mut v_buf = vec![0u8; (i_width * i_height * 3) as usize];
    draw_heatmap(&mut v_buf, (i_width, i_height), cm, opts)?;
    RgbImage::from_raw(i_width, i_height, v_buf)
        .ok_or_else(|| MetricsError::Render("heatmap_buffer_size_mismatch".to_string()))
}

fn draw_heatmap(
    v_buf: &mut [u8],
    size: (u32, u32),
    cm: &ConfusionMatrix,
    opts: &HeatmapOptions,
) -> Result<(), MetricsError> {
    let root = BitMapBackend::with_buffer(v_buf, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let i_n = cm.n_classes() as i32;
    let a_counts = cm.counts();
    let a_norm = cm.normalized();
    let i_grid_bottom = MARGIN_TOP + i_n * CELL_PX;

    draw_label(&root, &opts.s_title, (size.0 as i32 / 2, 28), FONT_TITLE, &BLACK, HPos::Center)?;
    draw_label(&root, "True label", (10, MARGIN_TOP - 16), FONT_LABEL, &BLACK, HPos::Left)?;

    for i_t in 0..i_n {
        for i_p in 0..i_n {
            let i_count = a_counts[[i_t as usize, i_p as usize]];
            let d_pct = a_norm[[i_t as usize, i_p as usize]] * 100.0;
            let x0 = MARGIN_LEFT + i_p * CELL_PX;
            let y0 = MARGIN_TOP + i_t * CELL_PX;
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + CELL_PX - 1, y0 + CELL_PX - 1)],
                blues(d_pct).filled(),
            ))
            .map_err(render_error)?;

            let color = if i_count > I_WHITE_TEXT_ABOVE { WHITE } else { BLACK };
            let i_cx = x0 + CELL_PX / 2;
            let i_cy = y0 + CELL_PX / 2;
            if opts.b_normalize {
                draw_label(&root, &format_thousands(i_count), (i_cx, i_cy - 12), FONT_CELL, &color, HPos::Center)?;
                draw_label(&root, &format!("{:.2}%", d_pct), (i_cx, i_cy + 12), FONT_CELL, &color, HPos::Center)?;
            } else {
                draw_label(&root, &format_thousands(i_count), (i_cx, i_cy), FONT_CELL, &color, HPos::Center)?;
            }
        }
    }

    for i_c in 0..i_n {
        let s_name = class_name(opts, i_c as usize);
        let y = MARGIN_TOP + i_c * CELL_PX + CELL_PX / 2;
        draw_label(&root, &s_name, (10, y), FONT_LABEL, &BLACK, HPos::Left)?;
        let x = MARGIN_LEFT + i_c * CELL_PX + CELL_PX / 2;
        draw_label(&root, &s_name, (x, i_grid_bottom + 20), FONT_LABEL, &BLACK, HPos::Center)?;
    }
    draw_label(
        &root,
        "Predictions",
        (MARGIN_LEFT + i_n * CELL_PX / 2, i_grid_bottom + 60),
        FONT_LABEL,
        &BLACK,
        HPos::Center,
    )?;

    root.present().map_err(render_error)?;
    Ok(())
}

fn draw_label(
    root: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    s_text: &str,
    pos: (i32, i32),
    i_size: u32,
    color: &RGBColor,
    h_pos: HPos,
) -> Result<(), MetricsError> {
    let style = (FONT_FAMILY, i_size)
        .into_font()
        .color(color)
        .pos(Pos::new(h_pos, VPos::Center));
    root.draw(&Text::new(s_text.to_string(), pos, style))
        .map_err(render_error)
}

fn render_error<E: std::fmt::Display>(e: E) -> MetricsError {
    MetricsError::Render(e.to_string())
}

/// Renders and saves the heatmap, creating parent directories. Returns the written path.
pub fn plot_confusion_matrix(cm: &ConfusionMatrix, opts: &HeatmapOptions) -> Result<PathBuf, MetricsError> {
    let img = render_confusion_heatmap(cm, opts)?;
    ensure_parent_dir(&opts.p_output)?;
    img.save(&opts.p_output)?;
    Ok(opts.p_output.clone())
}

fn ensure_parent_dir(p_path: &Path) -> Result<(), MetricsError> {
    if let Some(p_parent) = p_path.parent() {
        if !p_parent.as_os_str().is_empty() {
            std::fs::create_dir_all(p_parent)?;
        }
    }
    Ok(())
}

fn class_name(opts: &HeatmapOptions, i_c: usize) -> String {
    opts.v_target_names
        .get(i_c)
        .cloned()
        .unwrap_or_else(|| i_c.to_string())
}

pub(crate) fn blues(d_value: f64) -> RGBColor {
    let d_t = ((d_value - D_VMIN) / (D_VMAX - D_VMIN)).clamp(0.0, 1.0);
    let mix = |i_k: usize| -> u8 {
        let d_lo = BLUES_LOW[i_k] as f64;
        let d_hi = BLUES_HIGH[i_k] as f64;
        (d_lo + (d_hi - d_lo) * d_t).round() as u8
    };
    RGBColor(mix(0), mix(1), mix(2))
}

pub(crate) fn format_thousands(i_value: u64) -> String {
    let s_digits = i_value.to_string();
    let mut s_out = String::with_capacity(s_digits.len() + s_digits.len() / 3);
    for (i_idx, ch) in s_digits.chars().enumerate() {
        if i_idx > 0 && (s_digits.len() - i_idx) % 3 == 0 {
            s_out.push(',');
        }
        s_out.push(ch);
    }
    s_out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::array;

    fn sample_matrix() -> ConfusionMatrix {
        ConfusionMatrix::from_counts(array![[900, 100, 0], [10, 80, 10], [0, 0, 0]]).unwrap()
    }

    fn rgb(color: RGBColor) -> Rgb<u8> {
        Rgb([color.0, color.1, color.2])
    }

    #[test]
    fn test_thousands_separator() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_blues_ramp_is_clamped() {
        assert_eq!(rgb(blues(-50.0)), Rgb(BLUES_LOW));
        assert_eq!(rgb(blues(100.0)), Rgb(BLUES_HIGH));
        assert!(blues(60.0).0 < blues(10.0).0);
    }

    #[test]
    fn test_render_dimensions_and_shading() {
        let img = render_confusion_heatmap(&sample_matrix(), &HeatmapOptions::default()).unwrap();
        assert_eq!((img.width(), img.height()), heatmap_size(3));
        assert_eq!(img.width(), (MARGIN_LEFT + 3 * CELL_PX + MARGIN_RIGHT) as u32);

        // cell corners stay clear of the centred annotations
        let cell_px = |i_t: i32, i_p: i32| {
            *img.get_pixel((MARGIN_LEFT + i_p * CELL_PX + 2) as u32, (MARGIN_TOP + i_t * CELL_PX + 2) as u32)
        };
        assert_eq!(cell_px(0, 0), rgb(blues(90.0)));
        assert_eq!(cell_px(1, 1), rgb(blues(80.0)));
        assert_eq!(cell_px(2, 2), rgb(blues(0.0)));
        assert_eq!(*img.get_pixel(1, 1), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_class_names_keep_their_case() {
        let cm = ConfusionMatrix::from_counts(array![[3, 1], [0, 4]]).unwrap();
        let names = |v: [&str; 2]| HeatmapOptions {
            v_target_names: v.iter().map(|s| s.to_string()).collect(),
            ..HeatmapOptions::default()
        };
        let img_mixed = render_confusion_heatmap(&cm, &names(["Wake", "rem"])).unwrap();
        let img_upper = render_confusion_heatmap(&cm, &names(["WAKE", "REM"])).unwrap();
        assert_eq!(img_mixed.dimensions(), img_upper.dimensions());
        assert_ne!(img_mixed.as_raw(), img_upper.as_raw());
    }

    #[test]
    fn test_plot_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let opts = HeatmapOptions {
            p_output: dir.path().join("nested").join("cm.png"),
            ..HeatmapOptions::default()
        };
        let p_saved = plot_confusion_matrix(&sample_matrix(), &opts).unwrap();
        assert!(p_saved.exists());
        let img = image::open(&p_saved).unwrap().to_rgb8();
        assert_eq!(img.width(), heatmap_size(3).0);
    }
}
