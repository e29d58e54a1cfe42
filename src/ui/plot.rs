use std::collections::BTreeMap;

use eframe::egui::{self, Align, Align2, Color32, FontId, Layout, Sense, Stroke, Ui};
use egui_plot::{Legend, Plot, PlotPoints, Points, Polygon};

use mcs_tools::data::source::FileStamp;
use mcs_tools::preprocess::{RadianceGrid, SectionPoint};
use mcs_tools::{RecordSet, Value};

use crate::color::ColorScale;
use crate::state::{AppState, ORBIT_COLUMN};

const COLORBAR_STOPS: usize = 64;

fn placeholder(ui: &mut Ui, text: &str) {
    ui.centered_and_justified(|ui: &mut Ui| {
        ui.heading(text);
    });
}

// ---------------------------------------------------------------------------
// Radiance panel (central panel)
// ---------------------------------------------------------------------------

/// Render the time × detector radiance mesh of the selected channel.
pub fn radiance_plot(ui: &mut Ui, state: &AppState) {
    let Some(grid) = state.grid.as_ref().filter(|g| !g.is_empty()) else {
        placeholder(ui, "Pick a window and press Load  (or File → Open L1B…)");
        return;
    };
    let scale = state.color_scale();

    ui.with_layout(Layout::right_to_left(Align::Min), |ui: &mut Ui| {
        colorbar(ui, &scale);
        mesh_plot(ui, grid, &scale);
    });
}

/// Cell edges along x: midpoints between neighbours, padded at both ends.
fn cell_edges(x: &[f64]) -> Vec<f64> {
    match x {
        [] => Vec::new(),
        [only] => vec![only - 0.5, only + 0.5],
        _ => {
            let mut edges = Vec::with_capacity(x.len() + 1);
            edges.push(x[0] - (x[1] - x[0]) / 2.0);
            edges.extend(x.windows(2).map(|w| (w[0] + w[1]) / 2.0));
            let n = x.len();
            edges.push(x[n - 1] + (x[n - 1] - x[n - 2]) / 2.0);
            edges
        }
    }
}

fn mesh_plot(ui: &mut Ui, grid: &RadianceGrid, scale: &ColorScale) {
    let start = FileStamp::containing(grid.times[0]).datetime();
    let minutes: Vec<f64> = grid
        .times
        .iter()
        .map(|t| (*t - start).num_milliseconds() as f64 / 60_000.0)
        .collect();
    let edges = cell_edges(&minutes);
    let detectors = grid.detectors.clone();

    Plot::new("radiance_plot")
        .x_axis_label(format!("Minutes since {}", start.format("%Y-%m-%d %H:%M")))
        .y_axis_label(format!("{} detector (by altitude)", grid.channel))
        .y_axis_formatter(move |mark, _range| {
            let i = mark.value.round();
            if (mark.value - i).abs() > 1e-6 || i < 0.0 {
                return String::new();
            }
            detectors
                .get(i as usize)
                .map(|d| d.to_string())
                .unwrap_or_default()
        })
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for (t, row) in grid.values.iter().enumerate() {
                let (x0, x1) = (edges[t], edges[t + 1]);
                for (d, value) in row.iter().enumerate() {
                    let color = scale.color_for(*value);
                    if color == Color32::TRANSPARENT {
                        continue;
                    }
                    let (y0, y1) = (d as f64 - 0.5, d as f64 + 0.5);
                    let cell = PlotPoints::new(vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]]);
                    plot_ui.polygon(
                        Polygon::new(cell)
                            .fill_color(color)
                            .stroke(Stroke::new(0.0, color)),
                    );
                }
            }
        });
}

fn colorbar(ui: &mut Ui, scale: &ColorScale) {
    let (rect, _) = ui.allocate_exact_size(egui::vec2(80.0, ui.available_height()), Sense::hover());
    let painter = ui.painter_at(rect);
    let bar = egui::Rect::from_min_max(
        egui::pos2(rect.left() + 6.0, rect.top() + 12.0),
        egui::pos2(rect.left() + 22.0, rect.bottom() - 12.0),
    );

    let step = bar.height() / COLORBAR_STOPS as f32;
    for (i, (_, color)) in scale.stops(COLORBAR_STOPS).into_iter().enumerate() {
        let bottom = bar.bottom() - i as f32 * step;
        let cell = egui::Rect::from_min_max(
            egui::pos2(bar.left(), bottom - step),
            egui::pos2(bar.right(), bottom),
        );
        painter.rect_filled(cell, 0.0, color);
    }

    let text_color = ui.visuals().text_color();
    for (frac, y) in [(0.0, bar.bottom()), (0.5, bar.center().y), (1.0, bar.top())] {
        let value = scale.min + (scale.max - scale.min) * frac;
        painter.text(
            egui::pos2(bar.right() + 4.0, y),
            Align2::LEFT_CENTER,
            format!("{value:.2}"),
            FontId::monospace(11.0),
            text_color,
        );
    }
}

// ---------------------------------------------------------------------------
// Profile locations
// ---------------------------------------------------------------------------

/// Render DDR1 profile locations and, once an orbit is picked, its
/// latitude × altitude section underneath.
pub fn profile_plot(ui: &mut Ui, state: &AppState) {
    let Some(profiles) = &state.profiles else {
        placeholder(ui, "Pick a window and press Load");
        return;
    };
    let height = ui.available_height();
    if state.section.is_none() {
        location_plot(ui, state, profiles, height);
        return;
    }
    location_plot(ui, state, profiles, height * 0.45);
    ui.separator();
    section_plot(ui, state);
}

fn location_plot(ui: &mut Ui, state: &AppState, profiles: &RecordSet, height: f32) {
    let mut by_orbit: BTreeMap<Value, Vec<[f64; 2]>> = BTreeMap::new();
    for &idx in &state.visible_indices {
        let lon = profiles.get(idx, "Profile_lon").and_then(Value::as_f64);
        let lat = profiles.get(idx, "Profile_lat").and_then(Value::as_f64);
        let orbit = profiles.get(idx, ORBIT_COLUMN).cloned().unwrap_or(Value::Null);
        if let (Some(lon), Some(lat)) = (lon, lat) {
            by_orbit.entry(orbit).or_default().push([lon, lat]);
        }
    }

    Plot::new("profile_plot")
        .height(height)
        .legend(Legend::default())
        .x_axis_label("Longitude (°E)")
        .y_axis_label("Latitude (°N)")
        .include_x(-180.0)
        .include_x(180.0)
        .include_y(-90.0)
        .include_y(90.0)
        .data_aspect(1.0)
        .show(ui, |plot_ui| {
            for (orbit, points) in by_orbit {
                let color = state
                    .color_map
                    .as_ref()
                    .map(|cm| cm.color_for(&orbit))
                    .unwrap_or(Color32::LIGHT_BLUE);
                plot_ui.points(
                    Points::new(PlotPoints::from(points))
                        .name(format!("orbit {orbit}"))
                        .color(color)
                        .radius(2.5),
                );
            }
        });
}

/// Colour buckets of a section; points of one bucket share a series.
const SECTION_BUCKETS: usize = 32;

/// Section points grouped into colour buckets over their value range.
fn section_buckets(points: &[SectionPoint]) -> (ColorScale, Vec<Vec<[f64; 2]>>) {
    let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        (lo.min(p.value), hi.max(p.value))
    });
    let scale = if lo <= hi {
        ColorScale::new(lo, hi)
    } else {
        ColorScale::new(0.0, 1.0)
    };
    let mut buckets = vec![Vec::new(); SECTION_BUCKETS];
    for p in points {
        let b = (scale.fraction(p.value) * (SECTION_BUCKETS - 1) as f64).round() as usize;
        buckets[b].push([p.lat, p.alt]);
    }
    (scale, buckets)
}

/// Latitude × altitude scatter of the selected half orbit, coloured by the
/// chosen quantity.
fn section_plot(ui: &mut Ui, state: &AppState) {
    let points = state.section_points();
    let side = if state.section_daytime { "day" } else { "night" };
    let orbit = state.section_orbit.map(|o| o.to_string()).unwrap_or_default();
    if points.is_empty() {
        placeholder(ui, &format!("No {side} {} retrievals for orbit {orbit}", state.section_quantity));
        return;
    }
    let (scale, buckets) = section_buckets(&points);
    ui.label(format!("Orbit {orbit}, {side}, {}", state.section_quantity));

    ui.with_layout(Layout::right_to_left(Align::Min), |ui: &mut Ui| {
        colorbar(ui, &scale);
        Plot::new("section_plot")
            .x_axis_label("Latitude (°N)")
            .y_axis_label("Altitude (km)")
            .show(ui, |plot_ui| {
                for (i, bucket) in buckets.into_iter().enumerate() {
                    if bucket.is_empty() {
                        continue;
                    }
                    let value = scale.min + (scale.max - scale.min) * i as f64 / (SECTION_BUCKETS - 1) as f64;
                    plot_ui.points(
                        Points::new(PlotPoints::from(bucket))
                            .color(scale.color_for(Some(value)))
                            .radius(3.0),
                    );
                }
            });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_bracket_every_cell() {
        assert_eq!(cell_edges(&[0.0, 1.0, 3.0]), vec![-0.5, 0.5, 2.0, 4.0]);
        assert_eq!(cell_edges(&[2.0]), vec![1.5, 2.5]);
        assert!(cell_edges(&[]).is_empty());
    }

    #[test]
    fn section_points_fill_end_buckets() {
        let points = [
            SectionPoint { lat: 0.0, alt: 0.0, value: 150.0 },
            SectionPoint { lat: 1.0, alt: 2.0, value: 200.0 },
            SectionPoint { lat: 2.0, alt: 4.0, value: 250.0 },
        ];
        let (scale, buckets) = section_buckets(&points);
        assert_eq!((scale.min, scale.max), (150.0, 250.0));
        assert_eq!(buckets.len(), SECTION_BUCKETS);
        assert_eq!(buckets[0], vec![[0.0, 0.0]]);
        assert_eq!(buckets[SECTION_BUCKETS - 1], vec![[2.0, 4.0]]);
        assert_eq!(buckets.iter().map(Vec::len).sum::<usize>(), 3);
    }
}
