//! PNG rendering of activity traces and phase-averaged pulse responses.
//!
//! Only consumes the numeric tables produced by [`crate::stim`].
use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;

use crate::stim::{PhaseAverage, PulseMarker, StimError};

/// Canvas size and colours shared by the trace and phase-average plots.
///
/// `palette` is cycled over phases; the first entry also colours the trace.
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
        }
    }
}

fn y_bounds<'a>(values: impl Iterator<Item = &'a f32>) -> (f32, f32) {
    let (y_min, y_max) = values.fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if y_min > y_max || (y_max - y_min).abs() < f32::EPSILON {
        (y_min.min(0.0) - 1.0, y_max.max(0.0) + 1.0)
    } else {
        (y_min, y_max)
    }
}

/// One activity row with a vertical marker at every pulse frame.
pub fn render_trace_png(
    trace: &[f32],
    markers: &[PulseMarker],
    style: PlotStyle,
) -> Result<Vec<u8>, StimError> {
    if trace.is_empty() {
        return Err(StimError::Plot("activity trace has no frames".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (y_lo, y_hi) = y_bounds(trace.iter());
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption("Activity", ("sans-serif", 20).into_font().color(&WHITE))
            .set_label_area_size(LabelAreaPosition::Left, 45)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(0f32..trace.len() as f32, y_lo..y_hi)?;
        chart
            .configure_mesh()
            .light_line_style(&WHITE.mix(0.1))
            .draw()?;
        let pulse_color = RGBColor(255, 0, 0).mix(0.5);
        chart.draw_series(markers.iter().map(|m| {
            let x = m.frame as f32;
            PathElement::new(vec![(x, y_lo), (x, y_hi)], pulse_color)
        }))?;
        let color = style.palette[0];
        let series = trace.iter().enumerate().map(|(i, v)| (i as f32, *v));
        chart.draw_series(LineSeries::new(series, &color))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

/// One panel per cell, one line per phase, pulse onset at t = 0.
///
/// `time_axis` gives the offset in seconds of each window sample and
/// `cells` labels the panels in the order of the averages' cell axis.
pub fn render_phase_averages_png(
    averages: &[PhaseAverage],
    time_axis: &[f64],
    cells: &[usize],
    style: PlotStyle,
) -> Result<Vec<u8>, StimError> {
    let Some(first) = averages.first() else {
        return Err(StimError::Plot("no phase averages to draw".into()));
    };
    let (num_cells, width) = first.mean.dim();
    if num_cells == 0 || width != time_axis.len() || width < 2 {
        return Err(StimError::Plot(format!(
            "phase averages of {num_cells} cells x {width} frames do not fit a {}-point time axis",
            time_axis.len()
        )));
    }
    let panel_height = style.height.max(120);
    let height = panel_height * num_cells as u32;
    let mut buffer = vec![0u8; (style.width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let panels = root.split_evenly((num_cells, 1));
        let t0 = time_axis[0] as f32;
        let t1 = time_axis[width - 1] as f32;
        for (row, panel) in panels.iter().enumerate() {
            let values: Vec<f32> = averages
                .iter()
                .flat_map(|a| a.mean.row(row).to_vec())
                .collect();
            let (y_lo, y_hi) = y_bounds(values.iter());
            let label = cells
                .get(row)
                .map(|c| format!("Cell {c}"))
                .unwrap_or_else(|| format!("Cell #{row}"));
            let mut chart = ChartBuilder::on(panel)
                .margin(10)
                .caption(label, ("sans-serif", 16).into_font().color(&WHITE))
                .set_label_area_size(LabelAreaPosition::Left, 45)
                .set_label_area_size(LabelAreaPosition::Bottom, 30)
                .build_cartesian_2d(t0..t1, y_lo..y_hi)?;
            chart
                .configure_mesh()
                .light_line_style(&WHITE.mix(0.1))
                .draw()?;
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(0.0f32, y_lo), (0.0f32, y_hi)],
                RGBColor(255, 0, 255).mix(0.8).stroke_width(2),
            )))?;
            for (idx, average) in averages.iter().enumerate() {
                let color = style.palette[idx % style.palette.len()];
                let mean_row = average.mean.row(row);
                let series = time_axis
                    .iter()
                    .zip(mean_row.iter())
                    .map(|(&t, &v)| (t as f32, v));
                chart
                    .draw_series(LineSeries::new(series, color.stroke_width(2)))?
                    .label(format!("Phase = {}", average.phase_from_peak()))
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
            }
            if row == 0 {
                chart
                    .configure_series_labels()
                    .border_style(&WHITE.mix(0.2))
                    .background_style(&style.background)
                    .draw()?;
            }
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, height)
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, StimError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| StimError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
