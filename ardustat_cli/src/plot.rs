use std::ops::Range;
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ardustat::{AnalysisResult, Trace};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};

const CHART_SIZE: (u32, u32) = (1280, 760);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    fn extension(self) -> &'static str {
        match self {
            ChartKind::Png => "png",
            ChartKind::Svg => "svg",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Line,
    Points,
}

#[derive(Clone, Debug)]
pub struct ChartSeries {
    pub label: Option<&'static str>,
    pub points: Vec<(f64, f64)>,
    pub color: RGBColor,
    pub marker: Marker,
}

#[derive(Clone, Debug)]
pub struct ChartSpec {
    /// Short name used in output file names.
    pub name: &'static str,
    pub title: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub series: Vec<ChartSeries>,
}

impl ChartSpec {
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.is_empty())
    }
}

const TRACE_COLOR: RGBColor = RGBColor(31, 119, 180);
const DISCHARGE_COLOR: RGBColor = RGBColor(31, 119, 180);
const CHARGE_COLOR: RGBColor = RGBColor(255, 127, 14);

pub fn voltage_chart(trace: &Trace, source: &str) -> ChartSpec {
    ChartSpec {
        name: "voltage",
        title: format!("Voltage v. Time - {}", source),
        x_label: "Time (h)",
        y_label: "Voltage (V)",
        series: vec![ChartSeries {
            label: None,
            points: zip_points(trace.time().iter(), trace.voltage().iter()),
            color: TRACE_COLOR,
            marker: Marker::Line,
        }],
    }
}

pub fn current_chart(trace: &Trace, source: &str) -> ChartSpec {
    ChartSpec {
        name: "current",
        title: format!("Current v. Time - {}", source),
        x_label: "Time (h)",
        y_label: "Current (mA)",
        series: vec![ChartSeries {
            label: None,
            points: zip_points(trace.time().iter(), trace.current().iter()),
            color: TRACE_COLOR,
            marker: Marker::Line,
        }],
    }
}

pub fn capacity_chart(result: &AnalysisResult, source: &str) -> ChartSpec {
    ChartSpec {
        name: "capacity",
        title: format!("Capacity v. Time - {}", source),
        x_label: "Cycle",
        y_label: "Capacity (mAh)",
        series: per_cycle_series(&result.discharge_capacity, &result.charge_capacity),
    }
}

pub fn power_chart(result: &AnalysisResult, source: &str) -> ChartSpec {
    ChartSpec {
        name: "power",
        title: format!("Power v. Time - {}", source),
        x_label: "Cycle",
        y_label: "Power (mWh)",
        series: per_cycle_series(&result.discharge_power, &result.charge_power),
    }
}

/// The four diagnostic charts for one analysed log.
pub fn all_charts(trace: &Trace, result: &AnalysisResult, source: &str) -> Vec<ChartSpec> {
    vec![
        voltage_chart(trace, source),
        current_chart(trace, source),
        capacity_chart(result, source),
        power_chart(result, source),
    ]
}

fn per_cycle_series(discharge: &[f64], charge: &[f64]) -> Vec<ChartSeries> {
    vec![
        ChartSeries {
            label: Some("Discharge"),
            points: cycle_points(discharge),
            color: DISCHARGE_COLOR,
            marker: Marker::Points,
        },
        ChartSeries {
            label: Some("Charge"),
            points: cycle_points(charge),
            color: CHARGE_COLOR,
            marker: Marker::Points,
        },
    ]
}

fn zip_points<'a>(
    xs: impl Iterator<Item = &'a f64>,
    ys: impl Iterator<Item = &'a f64>,
) -> Vec<(f64, f64)> {
    xs.copied().zip(ys.copied()).collect()
}

/// Values plotted against their zero-based cycle number.
pub fn cycle_points(values: &[f64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(idx, v)| (idx as f64, *v))
        .collect()
}

/// `<dir>/<stem>_<chart>.<ext>`
pub fn chart_path(dir: &Path, stem: &str, chart: &str, kind: ChartKind) -> PathBuf {
    dir.join(format!("{}_{}.{}", stem, chart, kind.extension()))
}

/// Axis range covering every finite value with a little headroom.
pub fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let span = max - min;
    if span <= f64::EPSILON {
        return (min - 0.5)..(max + 0.5);
    }
    let pad = span * 0.05;
    (min - pad)..(max + pad)
}

/// Render `spec` to `path`, turning backend panics into errors.
pub fn render_chart_guard(spec: &ChartSpec, path: &Path, kind: ChartKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_chart(spec, path, kind).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart(spec: &ChartSpec, path: &Path, kind: ChartKind) -> Result<()> {
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
            draw_chart(root, spec)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
            draw_chart(root, spec)
        }
    }
}

fn draw_chart<DB>(root: DrawingArea<DB, plotters::coord::Shift>, spec: &ChartSpec) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let points = spec.series.iter().flat_map(|s| s.points.iter());
    let x_range = padded_range(points.clone().map(|p| p.0));
    let y_range = padded_range(points.map(|p| p.1));

    let title_font = FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Normal);
    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);

    let mut chart = ChartBuilder::on(&root)
        .caption(&spec.title, title_font)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(spec.x_label)
        .y_desc(spec.y_label)
        .axis_desc_style(axis_font.clone())
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    for series in &spec.series {
        let color = series.color;
        let drawn = match series.marker {
            Marker::Line => chart.draw_series(LineSeries::new(
                series.points.iter().copied(),
                color.stroke_width(2),
            ))?,
            Marker::Points => chart.draw_series(
                series
                    .points
                    .iter()
                    .map(|&p| Circle::new(p, 5, color.filled())),
            )?,
        };
        if let Some(label) = series.label {
            drawn
                .label(label)
                .legend(move |(x, y)| Circle::new((x + 10, y), 5, color.filled()));
        }
    }

    if spec.series.iter().any(|s| s.label.is_some()) {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.7))
            .border_style(&BLACK.mix(0.3))
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;
    }

    root.present()?;
    Ok(())
}
