use egui::Ui;
use egui_phosphor::regular::{ARROW_COUNTER_CLOCKWISE, RULER};

use super::panel_trait::{Panel, PanelState};
use crate::app::{AxisState, PageMessage, PageOption, QcPage};
use crate::data::axis::AxisId;

/// Text buffers of one axis; follows the page while not being edited.
#[derive(Default)]
struct AxisEdit {
    min: String,
    max: String,
    editing: bool,
}

impl AxisEdit {
    fn follow(&mut self, state: &AxisState) {
        if !self.editing {
            self.min.clone_from(&state.entry.min_text);
            self.max.clone_from(&state.entry.max_text);
        }
    }
}

/// Min/max range entries for the value and depth/time axes.
pub struct AxisPanel {
    pub state: PanelState,
    value: AxisEdit,
    depth_time: AxisEdit,
}

impl Default for AxisPanel {
    fn default() -> Self {
        Self {
            state: PanelState::new("Axes", RULER),
            value: AxisEdit::default(),
            depth_time: AxisEdit::default(),
        }
    }
}

fn axis_row(ui: &mut Ui, label: &str, axis: AxisId, edit: &mut AxisEdit, out: &mut Vec<PageMessage>) {
    ui.label(label);
    let w = if axis.is_time() { 140.0 } else { 70.0 };
    let a = ui.add(egui::TextEdit::singleline(&mut edit.min).desired_width(w));
    let b = ui.add(egui::TextEdit::singleline(&mut edit.max).desired_width(w));
    edit.editing = a.has_focus() || b.has_focus();
    let enter = (a.lost_focus() || b.lost_focus()) && ui.input(|i| i.key_pressed(egui::Key::Enter));
    if ui.button("Apply").clicked() || enter {
        edit.editing = false;
        out.push(PageMessage::ApplyRangeText {
            axis,
            min: edit.min.clone(),
            max: edit.max.clone(),
        });
    }
    if ui
        .button(ARROW_COUNTER_CLOCKWISE)
        .on_hover_text("Restore the stored range")
        .clicked()
    {
        out.push(PageMessage::RestoreStoredRange(axis));
    }
    ui.end_row();
}

impl Panel for AxisPanel {
    fn state(&self) -> &PanelState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        self.value.follow(&page.value_axis);
        self.depth_time.follow(&page.depth_time_axis);

        egui::Grid::new("axis_grid").num_columns(5).show(ui, |ui| {
            ui.label("");
            ui.label("min");
            ui.label("max");
            ui.end_row();
            axis_row(ui, "Value", page.value_axis.axis(), &mut self.value, out);
            let dt = page.depth_time_axis.axis();
            let label = if dt.is_time() { "Time" } else { "Depth" };
            axis_row(ui, label, dt, &mut self.depth_time, out);
        });

        let mut zoom = page.options.zoom_to_data;
        if ui
            .checkbox(&mut zoom, "Zoom to data on parameter update")
            .changed()
        {
            out.push(PageMessage::SetOption(PageOption::ZoomToData, zoom));
        }
    }
}
