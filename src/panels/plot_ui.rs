//! Main parameter plot: flag series, background files, drawn range.
//!
//! In select mode a primary-button drag draws the flag range instead of
//! panning. Pan/zoom results go back to the page as `PlotBoundsChanged`, bounds
//! the page wants applied arrive through [`PlotPanel::apply_bounds`].

use egui::{Color32, Ui};
use egui_phosphor::regular::{ARROWS_OUT, CHART_SCATTER, ERASER, SELECTION};
use egui_plot::{Legend, Plot, PlotPoint, Points, Polygon};

use super::panel_trait::{Panel, PanelState};
use crate::app::{PageMessage, QcPage};
use crate::config::PageKind;
use crate::data::plot::Series;

pub struct PlotPanel {
    pub state: PanelState,
    /// Primary drag draws a flag range.
    pub select_mode: bool,
    pending_x: Option<[f64; 2]>,
    pending_y: Option<[f64; 2]>,
    drag_start: Option<PlotPoint>,
    drag_now: Option<PlotPoint>,
    last_hover: Option<f64>,
}

impl Default for PlotPanel {
    fn default() -> Self {
        Self {
            state: PanelState::new("Plot", CHART_SCATTER),
            select_mode: true,
            pending_x: None,
            pending_y: None,
            drag_start: None,
            drag_now: None,
            last_hover: None,
        }
    }
}

impl PlotPanel {
    /// Bounds (plot coordinates) to apply on the next frame.
    pub fn apply_bounds(&mut self, x: Option<[f64; 2]>, y: Option<[f64; 2]>) {
        if x.is_some() {
            self.pending_x = x;
        }
        if y.is_some() {
            self.pending_y = y;
        }
    }

    fn toolbar(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        ui.horizontal(|ui| {
            ui.toggle_value(&mut self.select_mode, format!("{SELECTION} Select range"))
                .on_hover_text("Drag on the plot to select records to flag");
            if ui
                .add_enabled(
                    page.selection.range_spec().is_some(),
                    egui::Button::new(format!("{ERASER} Clear range")),
                )
                .clicked()
            {
                out.push(PageMessage::ClearRange);
            }
            if ui.button(format!("{ARROWS_OUT} Zoom to data")).clicked() {
                out.push(PageMessage::ZoomToData);
            }
            ui.separator();
            ui.strong(&page.plot.title);
        });
    }
}

fn draw_series(plot_ui: &mut egui_plot::PlotUi<'_>, s: &Series, legend: bool) {
    if s.points.is_empty() {
        return;
    }
    let name = if legend { s.name.clone() } else { String::new() };
    plot_ui.points(
        Points::new(name, s.points.clone())
            .radius(s.size)
            .shape(s.marker)
            .color(s.color),
    );
}

fn format_time(t: f64) -> String {
    chrono::DateTime::from_timestamp(t.round() as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d\n%H:%M").to_string())
        .unwrap_or_default()
}

impl Panel for PlotPanel {
    fn state(&self) -> &PanelState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        self.toolbar(ui, page, out);
        let model = &page.plot;
        let kind = page.config.page;
        let show_legend = page.config.features.legend;
        let mut plot = Plot::new("qc_main_plot")
            .allow_drag(!self.select_mode)
            .allow_boxed_zoom(false)
            .show_grid(page.config.features.grid)
            .x_axis_label(model.x_label.clone())
            .y_axis_label(model.y_label.clone());
        if show_legend {
            plot = plot.legend(Legend::default());
        }
        plot = match kind {
            PageKind::Profile => plot.y_axis_formatter(|y, _range| format!("{}", -y.value)),
            PageKind::TimeSeries => plot.x_axis_formatter(|x, _range| format_time(x.value)),
        };

        let select_mode = self.select_mode;
        let resp = plot.show(ui, |plot_ui| {
            if let Some([lo, hi]) = self.pending_x.take() {
                plot_ui.set_plot_bounds_x(lo..=hi);
            }
            if let Some([lo, hi]) = self.pending_y.take() {
                plot_ui.set_plot_bounds_y(lo..=hi);
            }

            for s in &model.background {
                draw_series(plot_ui, s, false);
            }
            if let Some(r) = &model.reference {
                draw_series(plot_ui, r, show_legend);
            }
            for s in &model.series {
                draw_series(plot_ui, s, show_legend);
            }

            if let Some(spec) = page.selection.range_spec() {
                let (a, v) = (spec.axis_range, spec.value_range);
                let corners = match kind {
                    PageKind::Profile => [
                        [v.minimum(), -a.minimum()],
                        [v.maximum(), -a.minimum()],
                        [v.maximum(), -a.maximum()],
                        [v.minimum(), -a.maximum()],
                    ],
                    PageKind::TimeSeries => [
                        [a.minimum(), v.minimum()],
                        [a.maximum(), v.minimum()],
                        [a.maximum(), v.maximum()],
                        [a.minimum(), v.maximum()],
                    ],
                };
                plot_ui.polygon(
                    Polygon::new("Selected range", corners.to_vec())
                        .fill_color(Color32::from_rgba_unmultiplied(255, 200, 0, 40)),
                );
            }

            let pointer = plot_ui.pointer_coordinate();
            let r = plot_ui.response().clone();
            if select_mode {
                if r.drag_started_by(egui::PointerButton::Primary) {
                    self.drag_start = pointer;
                }
                if r.dragged_by(egui::PointerButton::Primary) {
                    self.drag_now = pointer;
                }
            }
            if let (Some(a), Some(b)) = (self.drag_start, self.drag_now) {
                plot_ui.polygon(
                    Polygon::new(
                        "",
                        vec![[a.x, a.y], [b.x, a.y], [b.x, b.y], [a.x, b.y]],
                    )
                    .fill_color(Color32::from_rgba_unmultiplied(255, 255, 255, 25)),
                );
            }

            let scrolled = r.hovered() && r.ctx.input(|i| i.raw_scroll_delta != egui::Vec2::ZERO);
            let panned = !select_mode && r.dragged_by(egui::PointerButton::Primary);
            (scrolled || panned, r.drag_stopped(), pointer)
        });

        let (bounds_changed, drag_stopped, pointer) = resp.inner;
        if drag_stopped {
            if let (Some(a), Some(b)) = (self.drag_start.take(), self.drag_now.take()) {
                out.push(PageMessage::RangeDrawn {
                    x: [a.x, b.x],
                    y: [a.y, b.y],
                });
            }
        }
        if bounds_changed {
            let b = resp.transform.bounds();
            let (min, max) = (b.min(), b.max());
            if min.iter().chain(max.iter()).all(|v| v.is_finite()) {
                out.push(PageMessage::PlotBoundsChanged {
                    x: [min[0], max[0]],
                    y: [min[1], max[1]],
                });
            }
        }

        if kind == PageKind::TimeSeries {
            let hover = pointer.map(|p| p.x);
            if hover != self.last_hover {
                self.last_hover = hover;
                out.push(PageMessage::MapHover(hover));
            }
        }
    }
}
