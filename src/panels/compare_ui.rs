use egui::{Color32, Ui};
use egui_phosphor::regular::SCALES;
use egui_plot::{Legend, Line, Plot, Points};

use super::panel_trait::{Panel, PanelState};
use crate::app::{PageMessage, PageOption, QcPage};

/// Reference file selection and the primary-vs-reference scatter.
pub struct ComparePanel {
    pub state: PanelState,
}

impl Default for ComparePanel {
    fn default() -> Self {
        Self {
            state: PanelState::new("Compare", SCALES),
        }
    }
}

impl ComparePanel {
    fn selectors(&self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        let sel = &page.selection;
        let current_ref = sel
            .current_ref_file_id()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "-".to_string());
        egui::ComboBox::from_label("Reference")
            .selected_text(current_ref)
            .show_ui(ui, |ui| {
                if ui
                    .selectable_label(sel.current_ref_file_id().is_none(), "-")
                    .clicked()
                {
                    out.push(PageMessage::SelectRefFile(None));
                }
                for f in &page.reference_files {
                    if ui
                        .selectable_label(sel.current_ref_file_id() == Some(f), f.as_str())
                        .clicked()
                    {
                        out.push(PageMessage::SelectRefFile(Some(f.clone())));
                    }
                }
            });

        let current_par = sel.compare_selection().unwrap_or("-").to_string();
        egui::ComboBox::from_label("Compare parameter")
            .selected_text(current_par)
            .show_ui(ui, |ui| {
                for p in sel.parameter_list() {
                    if ui
                        .selectable_label(sel.compare_selection() == Some(p.as_str()), p)
                        .clicked()
                    {
                        out.push(PageMessage::SelectCompareParameter(Some(p.clone())));
                    }
                }
            });

        let mut show = page.options.show_reference;
        if ui
            .checkbox(&mut show, "Show reference data in profile plot")
            .changed()
        {
            out.push(PageMessage::SetOption(PageOption::ShowReference, show));
        }
    }
}

impl Panel for ComparePanel {
    fn state(&self) -> &PanelState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        self.selectors(ui, page, out);
        let Some(view) = &page.compare_view else {
            ui.weak("Select a reference file and a parameter");
            return;
        };
        if let Some(span) = view.time_span {
            let fmt = |t: f64| {
                chrono::DateTime::from_timestamp(t.round() as i64, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default()
            };
            ui.label(format!("{} .. {}", fmt(span.minimum()), fmt(span.maximum())));
        }
        let ref_flags = page.reference_flags();
        Plot::new("qc_compare_plot")
            .legend(Legend::default())
            .data_aspect(1.0)
            .x_axis_label(format!("Reference {}", view.parameter))
            .y_axis_label(view.parameter.clone())
            .height(ui.available_height().max(200.0))
            .show(ui, |plot_ui| {
                for (code, points) in &view.groups {
                    let (color, shape, size) = ref_flags
                        .and_then(|f| f.style(code))
                        .map(|s| (s.color, s.marker, s.size))
                        .unwrap_or((Color32::GRAY, egui_plot::MarkerShape::Circle, 3.0));
                    plot_ui.points(
                        Points::new(format!("Flag {code}"), points.clone())
                            .color(color)
                            .shape(shape)
                            .radius(size),
                    );
                }
                if let Some([a, b]) = view.correlation_line {
                    plot_ui.line(
                        Line::new("1:1", vec![a, b]).color(page.config.colors.correlation_line),
                    );
                }
            });
    }
}
