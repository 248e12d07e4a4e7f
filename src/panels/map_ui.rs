//! Position maps drawn from [`MapCanvas`] render instructions.
//!
//! There is no tile background; lon/lat are plotted directly inside the map
//! boundaries. Each slot can additionally be popped out into its own window.

use egui::{Color32, Ui};
use egui_phosphor::regular::{ARROW_SQUARE_OUT, MAP_TRIFOLD};
use egui_plot::{Legend, Plot, PlotBounds, Points};

use super::panel_trait::{Panel, PanelState};
use crate::app::{MapSlotId, PageMessage, QcPage};
use crate::config::MapBoundaries;
use crate::data::map_overlay::MapCanvas;

/// Colour scale used for value scatters (low → high).
const SCALE: [[u8; 3]; 5] = [
    [68, 1, 84],
    [59, 82, 139],
    [33, 145, 140],
    [94, 201, 98],
    [253, 231, 37],
];

/// Number of colour steps a value scatter is drawn with.
const COLOR_BINS: usize = 16;

/// Map `t` in `[0, 1]` onto [`SCALE`].
pub fn scale_color(t: f64) -> Color32 {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let pos = t * (SCALE.len() - 1) as f64;
    let i = (pos.floor() as usize).min(SCALE.len() - 2);
    let f = pos - i as f64;
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
    let (a, b) = (SCALE[i], SCALE[i + 1]);
    Color32::from_rgb(lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2]))
}

fn draw_canvas(ui: &mut Ui, id: &str, canvas: &MapCanvas, height: f32) {
    if !canvas.title.is_empty() {
        ui.strong(&canvas.title);
    }
    let bounds = canvas.boundaries.unwrap_or_default();
    Plot::new(id)
        .legend(Legend::default())
        .data_aspect(1.0)
        .height(height)
        .x_axis_label("Longitude")
        .y_axis_label("Latitude")
        .show(ui, |plot_ui| {
            plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                [bounds.lon_min, bounds.lat_min],
                [bounds.lon_max, bounds.lat_max],
            ));
            for layer in &canvas.markers {
                plot_ui.points(
                    Points::new(layer.name.clone(), layer.points.clone())
                        .color(layer.color)
                        .shape(layer.marker)
                        .radius(layer.size),
                );
            }
            for layer in &canvas.scatter {
                let range = layer.color_range;
                let span = if range.span() > 0.0 { range.span() } else { 1.0 };
                let mut bins: Vec<Vec<[f64; 2]>> = vec![Vec::new(); COLOR_BINS];
                for p in &layer.points {
                    let t = ((p[2] - range.minimum()) / span).clamp(0.0, 1.0);
                    let bin = ((t * COLOR_BINS as f64) as usize).min(COLOR_BINS - 1);
                    bins[bin].push([p[0], p[1]]);
                }
                for (i, points) in bins.into_iter().enumerate() {
                    if points.is_empty() {
                        continue;
                    }
                    let t = (i as f64 + 0.5) / COLOR_BINS as f64;
                    plot_ui.points(Points::new("", points).color(scale_color(t)).radius(3.0));
                }
            }
            if let Some(h) = &canvas.hover {
                plot_ui.points(
                    Points::new(h.name.clone(), h.points.clone())
                        .color(h.color)
                        .shape(h.marker)
                        .radius(h.size),
                );
            }
        });
    for layer in &canvas.scatter {
        ui.horizontal(|ui| {
            ui.label(format!("{:.2}", layer.color_range.minimum()));
            for i in 0..=10 {
                ui.colored_label(scale_color(i as f64 / 10.0), "■");
            }
            ui.label(format!("{:.2}", layer.color_range.maximum()));
            if !layer.colorbar_title.is_empty() {
                ui.weak(&layer.colorbar_title);
            }
        });
    }
}

/// Primary (positions) and secondary (value scatter) maps.
pub struct MapPanel {
    pub state: PanelState,
    bounds: MapBoundaries,
    bounds_dirty: bool,
}

impl Default for MapPanel {
    fn default() -> Self {
        Self {
            state: PanelState::new("Map", MAP_TRIFOLD),
            bounds: MapBoundaries::default(),
            bounds_dirty: false,
        }
    }
}

impl MapPanel {
    fn slot(
        &self,
        ui: &mut Ui,
        slot: MapSlotId,
        main: Option<&MapCanvas>,
        popout_open: bool,
        out: &mut Vec<PageMessage>,
    ) {
        let (name, id) = match slot {
            MapSlotId::Primary => ("Positions", "qc_map_primary"),
            MapSlotId::Secondary => ("Values", "qc_map_secondary"),
        };
        ui.horizontal(|ui| {
            ui.strong(name);
            if main.is_some() {
                if ui.small_button("Hide").clicked() {
                    out.push(PageMessage::CloseMap { slot, popout: false });
                }
            } else if ui.small_button("Show").clicked() {
                out.push(PageMessage::OpenMap { slot, popout: false });
            }
            if !popout_open
                && ui
                    .small_button(ARROW_SQUARE_OUT)
                    .on_hover_text("Open in a window")
                    .clicked()
            {
                out.push(PageMessage::OpenMap { slot, popout: true });
            }
        });
        if let Some(canvas) = main {
            draw_canvas(ui, id, canvas, 220.0);
        }
    }

    /// Pop-out windows; shown regardless of the panel's own visibility.
    pub fn show_popouts(&self, ctx: &egui::Context, page: &QcPage, out: &mut Vec<PageMessage>) {
        let popouts = [
            (MapSlotId::Primary, "Positions", page.maps.primary_popout.as_ref()),
            (MapSlotId::Secondary, "Values", page.maps.secondary_popout.as_ref()),
        ];
        for (slot, title, canvas) in popouts {
            let Some(canvas) = canvas else {
                continue;
            };
            let mut open = true;
            egui::Window::new(format!("{MAP_TRIFOLD} {title}"))
                .open(&mut open)
                .default_size([520.0, 460.0])
                .show(ctx, |ui| {
                    draw_canvas(ui, &format!("{title}_popout"), canvas, 400.0);
                });
            if !open {
                out.push(PageMessage::CloseMap { slot, popout: true });
            }
        }
    }
}

impl Panel for MapPanel {
    fn state(&self) -> &PanelState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        self.slot(
            ui,
            MapSlotId::Primary,
            page.maps.primary.as_ref(),
            page.maps.primary_popout.is_some(),
            out,
        );
        ui.separator();
        self.slot(
            ui,
            MapSlotId::Secondary,
            page.maps.secondary.as_ref(),
            page.maps.secondary_popout.is_some(),
            out,
        );

        ui.separator();
        if !self.bounds_dirty {
            self.bounds = page.map_boundaries;
        }
        ui.collapsing("Boundaries", |ui| {
            egui::Grid::new("map_bounds").num_columns(4).show(ui, |ui| {
                let b = &mut self.bounds;
                let mut changed = false;
                ui.label("lon");
                changed |= ui.add(egui::DragValue::new(&mut b.lon_min).speed(0.1)).changed();
                changed |= ui.add(egui::DragValue::new(&mut b.lon_max).speed(0.1)).changed();
                ui.end_row();
                ui.label("lat");
                changed |= ui.add(egui::DragValue::new(&mut b.lat_min).speed(0.1)).changed();
                changed |= ui.add(egui::DragValue::new(&mut b.lat_max).speed(0.1)).changed();
                ui.end_row();
                self.bounds_dirty |= changed;
            });
            if ui
                .add_enabled(self.bounds_dirty, egui::Button::new("Apply"))
                .clicked()
            {
                self.bounds_dirty = false;
                out.push(PageMessage::SetMapBoundaries(self.bounds));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_color_covers_the_ends() {
        assert_eq!(scale_color(0.0), Color32::from_rgb(68, 1, 84));
        assert_eq!(scale_color(1.0), Color32::from_rgb(253, 231, 37));
        assert_eq!(scale_color(-3.0), scale_color(0.0));
        assert_eq!(scale_color(f64::NAN), scale_color(0.0));
    }
}
