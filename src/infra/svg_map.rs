//! Plain SVG rendering of occurrence maps and thermal range charts.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::constants::{SCIENTIFIC_NAME, TEMP_MAX, TEMP_MIN};
use crate::domain::{OccurrencePoint, Table};

const MAP_WIDTH: f64 = 1080.0;
const MAP_HEIGHT: f64 = 540.0;
const MAP_MARGIN: f64 = 20.0;
const GRATICULE_STEP: i32 = 30;
const LEGEND_ROW: f64 = 18.0;

const CHART_WIDTH: f64 = 900.0;
const CHART_LABEL_WIDTH: f64 = 240.0;
const CHART_BAR_HEIGHT: f64 = 16.0;
const CHART_ROW: f64 = 26.0;
const CHART_TICK_STEP: f64 = 5.0;
const CHART_MAX_TICKS: usize = 40;
/// Water temperatures outside this band are treated as bad data
const PLAUSIBLE_TEMPERATURE: std::ops::RangeInclusive<f64> = -10.0..=60.0;

const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd",
    "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Colour for the `index`-th species, cycling through the palette
pub fn palette_colour(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// Equirectangular projection of (`longitude`, `latitude`) into map pixels
pub fn project(longitude: f64, latitude: f64) -> (f64, f64) {
    let x = MAP_MARGIN + (longitude + 180.0) / 360.0 * MAP_WIDTH;
    let y = MAP_MARGIN + (90.0 - latitude) / 180.0 * MAP_HEIGHT;
    (x, y)
}

/// Species in order of first appearance
fn species_order(points: &[OccurrencePoint]) -> Vec<&str> {
    let mut seen = Vec::new();
    for point in points {
        if !seen.contains(&point.scientific_name.as_str()) {
            seen.push(point.scientific_name.as_str());
        }
    }
    seen
}

/// World map with one dot per occurrence, coloured per species, a 30 degree
/// graticule and a legend below the map
pub fn render_occurrence_map(points: &[OccurrencePoint]) -> String {
    let species = species_order(points);
    let colour_of: HashMap<&str, &str> = species
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, palette_colour(i)))
        .collect();

    let legend_height = species.len() as f64 * LEGEND_ROW + MAP_MARGIN;
    let width = MAP_WIDTH + 2.0 * MAP_MARGIN;
    let height = MAP_HEIGHT + 2.0 * MAP_MARGIN + legend_height;

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
        w = width,
        h = height
    );
    svg.push_str(&format!(
        "<rect x=\"{m}\" y=\"{m}\" width=\"{}\" height=\"{}\" fill=\"#eef5fb\" stroke=\"#555\"/>\n",
        MAP_WIDTH,
        MAP_HEIGHT,
        m = MAP_MARGIN
    ));

    svg.push_str("<g stroke=\"#bbb\" stroke-width=\"0.5\">\n");
    for lon in (-180..=180).step_by(GRATICULE_STEP as usize) {
        let (x, top) = project(lon as f64, 90.0);
        let (_, bottom) = project(lon as f64, -90.0);
        svg.push_str(&format!(
            "<line x1=\"{x:.1}\" y1=\"{top:.1}\" x2=\"{x:.1}\" y2=\"{bottom:.1}\"/>\n"
        ));
    }
    for lat in (-90..=90).step_by(GRATICULE_STEP as usize) {
        let (left, y) = project(-180.0, lat as f64);
        let (right, _) = project(180.0, lat as f64);
        svg.push_str(&format!(
            "<line x1=\"{left:.1}\" y1=\"{y:.1}\" x2=\"{right:.1}\" y2=\"{y:.1}\"/>\n"
        ));
    }
    svg.push_str("</g>\n");

    svg.push_str("<g fill-opacity=\"0.7\">\n");
    for point in points {
        let (x, y) = project(point.longitude, point.latitude);
        let colour = colour_of
            .get(point.scientific_name.as_str())
            .copied()
            .unwrap_or(PALETTE[0]);
        svg.push_str(&format!(
            "<circle cx=\"{x:.2}\" cy=\"{y:.2}\" r=\"2.5\" fill=\"{colour}\"/>\n"
        ));
    }
    svg.push_str("</g>\n");

    let legend_top = MAP_HEIGHT + 2.0 * MAP_MARGIN;
    svg.push_str("<g font-family=\"sans-serif\" font-size=\"12\">\n");
    for (i, name) in species.iter().enumerate() {
        let y = legend_top + i as f64 * LEGEND_ROW;
        let count = points.iter().filter(|p| p.scientific_name == *name).count();
        svg.push_str(&format!(
            "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"5\" fill=\"{}\"/>\n",
            MAP_MARGIN + 5.0,
            y + 5.0,
            palette_colour(i)
        ));
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-style=\"italic\">{} ({})</text>\n",
            MAP_MARGIN + 16.0,
            y + 9.0,
            escape(name),
            count
        ));
    }
    svg.push_str("</g>\n</svg>\n");
    svg
}

/// Temperature range of one species
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalRange {
    pub scientific_name: String,
    pub min: f64,
    pub max: f64,
}

/// Species with both temperature bounds, in table order. Rows missing a
/// bound or carrying a bound outside the plausible band are skipped.
pub fn thermal_ranges(traits: &Table) -> Vec<ThermalRange> {
    traits
        .iter()
        .filter_map(|row| {
            let name = row.get(SCIENTIFIC_NAME).as_text()?;
            match (row.get(TEMP_MIN).as_f64(), row.get(TEMP_MAX).as_f64()) {
                (Some(min), Some(max))
                    if !PLAUSIBLE_TEMPERATURE.contains(&min) || !PLAUSIBLE_TEMPERATURE.contains(&max) =>
                {
                    warn!(species = %name, min, max, "Implausible thermal range, skipped from chart");
                    None
                }
                (Some(min), Some(max)) => Some(ThermalRange {
                    scientific_name: name,
                    min: min.min(max),
                    max: min.max(max),
                }),
                _ => {
                    debug!(species = %name, "Thermal range incomplete, skipped from chart");
                    None
                }
            }
        })
        .collect()
}

/// Horizontal bar chart of temperature ranges, one bar per species.
/// `None` when no species has both bounds.
pub fn render_thermal_ranges(traits: &Table) -> Option<String> {
    let ranges = thermal_ranges(traits);
    if ranges.is_empty() {
        return None;
    }

    let low = ranges.iter().map(|r| r.min).fold(f64::INFINITY, f64::min);
    let high = ranges.iter().map(|r| r.max).fold(f64::NEG_INFINITY, f64::max);
    let axis_min = (low / CHART_TICK_STEP).floor() * CHART_TICK_STEP;
    let mut axis_max = (high / CHART_TICK_STEP).ceil() * CHART_TICK_STEP;
    if axis_max <= axis_min {
        axis_max = axis_min + CHART_TICK_STEP;
    }

    let plot_left = CHART_LABEL_WIDTH;
    let plot_width = CHART_WIDTH - CHART_LABEL_WIDTH - MAP_MARGIN;
    let scale = |t: f64| plot_left + (t - axis_min) / (axis_max - axis_min) * plot_width;
    let plot_bottom = MAP_MARGIN + ranges.len() as f64 * CHART_ROW;
    let height = plot_bottom + 3.0 * MAP_MARGIN;

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
        w = CHART_WIDTH,
        h = height
    );
    svg.push_str("<g font-family=\"sans-serif\" font-size=\"12\">\n");

    let tick_count = (((axis_max - axis_min) / CHART_TICK_STEP).round() as usize).min(CHART_MAX_TICKS);
    for step in 0..=tick_count {
        let tick = axis_min + step as f64 * CHART_TICK_STEP;
        let x = scale(tick);
        svg.push_str(&format!(
            "<line x1=\"{x:.1}\" y1=\"{:.1}\" x2=\"{x:.1}\" y2=\"{plot_bottom:.1}\" stroke=\"#ddd\"/>\n",
            MAP_MARGIN
        ));
        svg.push_str(&format!(
            "<text x=\"{x:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{}</text>\n",
            plot_bottom + 16.0,
            tick
        ));
    }
    svg.push_str(&format!(
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">Temperature (°C)</text>\n",
        plot_left + plot_width / 2.0,
        plot_bottom + 38.0
    ));

    for (i, range) in ranges.iter().enumerate() {
        let y = MAP_MARGIN + i as f64 * CHART_ROW;
        let x = scale(range.min);
        let width = (scale(range.max) - x).max(1.0);
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-style=\"italic\">{}</text>\n",
            plot_left - 8.0,
            y + CHART_BAR_HEIGHT - 3.0,
            escape(&range.scientific_name)
        ));
        svg.push_str(&format!(
            "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{width:.1}\" height=\"{CHART_BAR_HEIGHT}\" fill=\"{}\"/>\n",
            palette_colour(i)
        ));
    }
    svg.push_str("</g>\n</svg>\n");
    Some(svg)
}
