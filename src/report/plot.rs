use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::info;
use plotters::prelude::*;

use super::curves::{align_curves, load_runs, Curve};
use crate::color::generate_palette;
use crate::config::{PlotSpec, ReportConfig};
use crate::error::{Error, Result};

/// Number of runs a comparison plot takes.
pub const REQUIRED_RUNS: usize = 3;

/// Font used for every chart text element, bundled so rendering needs no
/// system fonts.
const CHART_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
const CHART_FONT_FAMILY: &str = "sans-serif";

/// Register the bundled font with plotters once per process.
fn ensure_chart_font() -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED.get_or_init(|| {
        plotters::style::register_font(CHART_FONT_FAMILY, FontStyle::Normal, CHART_FONT).is_ok()
    });
    if ok {
        Ok(())
    } else {
        Err(Error::Plot("bundled chart font could not be parsed".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Comparison plots
// ---------------------------------------------------------------------------

/// Draw one overlay chart per configured plot from exactly three exported
/// tables, writing them under `out_dir`. Returns the written paths.
///
/// Every run must contain every plotted tag; nothing is written otherwise.
pub fn plot_runs(paths: &[PathBuf], out_dir: &Path, config: &ReportConfig) -> Result<Vec<PathBuf>> {
    if paths.len() != REQUIRED_RUNS {
        return Err(Error::InvalidArgument(format!(
            "provide exactly {REQUIRED_RUNS} tables to compare, got {}",
            paths.len()
        )));
    }

    let runs = load_runs(paths)?;
    let charts = config
        .plots
        .iter()
        .map(|spec| Ok((spec, align_curves(&runs, &spec.tag)?)))
        .collect::<Result<Vec<_>>>()?;

    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::with_capacity(charts.len());
    for (spec, curves) in charts {
        let out_file = out_dir.join(&spec.file_name);
        render_chart(&curves, spec, (config.plot_width, config.plot_height), &out_file)?;
        info!("saved {} chart to {}", spec.tag, out_file.display());
        written.push(out_file);
    }
    Ok(written)
}

/// Render `curves` as one line chart and save it as PNG.
pub fn render_chart(curves: &[Curve], spec: &PlotSpec, size: (u32, u32), out_file: &Path) -> Result<()> {
    ensure_chart_font()?;
    let (width, height) = size;
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(buffer.as_mut_slice(), size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_error)?;

        let (x_range, y_range) = axis_bounds(curves);
        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} vs Epoch", spec.label), (CHART_FONT_FAMILY, 18))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .map_err(plot_error)?;

        chart
            .configure_mesh()
            .x_desc("Epoch")
            .y_desc(spec.label.as_str())
            .draw()
            .map_err(plot_error)?;

        for (curve, color) in curves.iter().zip(generate_palette(curves.len())) {
            let points = curve
                .points
                .iter()
                .filter(|(_, v)| v.is_finite())
                .map(|&(step, v)| (step as f64, v));
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(2)))
                .map_err(plot_error)?
                .label(curve.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_error)?;

        root.present().map_err(plot_error)?;
    }

    let img = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| Error::Plot(format!("bad image buffer for {width}x{height}")))?;
    img.save_with_format(out_file, image::ImageFormat::Png)?;
    Ok(())
}

/// Axis ranges covering every finite point, with a little headroom on y.
pub fn axis_bounds(curves: &[Curve]) -> (Range<f64>, Range<f64>) {
    let finite = || {
        curves
            .iter()
            .flat_map(|c| c.points.iter())
            .filter(|(_, v)| v.is_finite())
    };
    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(step, v) in finite() {
        x_min = x_min.min(step as f64);
        x_max = x_max.max(step as f64);
        y_min = y_min.min(v);
        y_max = y_max.max(v);
    }
    if x_min > x_max {
        return (0.0..1.0, 0.0..1.0);
    }

    if x_max - x_min < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    let pad = if y_max - y_min < f64::EPSILON {
        y_max.abs().max(1.0) * 0.05
    } else {
        (y_max - y_min) * 0.05
    };
    (x_min..x_max, (y_min - pad)..(y_max + pad))
}

fn plot_error(e: impl std::fmt::Display) -> Error {
    Error::Plot(e.to_string())
}
