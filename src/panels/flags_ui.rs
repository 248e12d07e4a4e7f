use egui::Ui;
use egui_phosphor::regular::FLAG;
use egui_plot::MarkerShape;

use super::panel_trait::{Panel, PanelState};
use crate::app::{FlagTarget, PageMessage, QcPage};
use crate::data::flags::{FlagSelection, FlagStyle};

const MARKERS: [MarkerShape; 6] = [
    MarkerShape::Circle,
    MarkerShape::Square,
    MarkerShape::Diamond,
    MarkerShape::Cross,
    MarkerShape::Plus,
    MarkerShape::Up,
];

/// Flag buttons for the drawn range, plus visibility and look per flag.
pub struct FlagsPanel {
    pub state: PanelState,
    show_styles: bool,
}

impl Default for FlagsPanel {
    fn default() -> Self {
        Self {
            state: PanelState::new("Flags", FLAG),
            show_styles: false,
        }
    }
}

/// Visibility and style rows for one flag selection.
fn style_rows(
    ui: &mut Ui,
    id: &str,
    target: FlagTarget,
    flags: &FlagSelection,
    show_styles: bool,
    out: &mut Vec<PageMessage>,
) {
    egui::Grid::new(id).num_columns(4).show(ui, |ui| {
        for entry in flags.entries() {
            let mut included = entry.style.included;
            let label = if entry.description.is_empty() {
                entry.code.to_string()
            } else {
                format!("{} {}", entry.code, entry.description)
            };
            if ui.checkbox(&mut included, label).changed() {
                out.push(PageMessage::SetFlagIncluded {
                    target,
                    code: entry.code.clone(),
                    included,
                });
            }
            if show_styles {
                let mut style: FlagStyle = entry.style.clone();
                let mut changed = ui.color_edit_button_srgba(&mut style.color).changed();
                egui::ComboBox::from_id_salt((id, entry.code.as_str()))
                    .width(80.0)
                    .selected_text(format!("{:?}", style.marker))
                    .show_ui(ui, |ui| {
                        for m in MARKERS {
                            changed |= ui
                                .selectable_value(&mut style.marker, m, format!("{m:?}"))
                                .changed();
                        }
                    });
                changed |= ui
                    .add(egui::DragValue::new(&mut style.size).range(0.5..=20.0).speed(0.1))
                    .changed();
                if changed {
                    out.push(PageMessage::SetFlagStyle {
                        target,
                        code: entry.code.clone(),
                        style,
                    });
                }
            }
            ui.end_row();
        }
    });
}

impl Panel for FlagsPanel {
    fn state(&self) -> &PanelState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        let Some(flags) = page.current_flags() else {
            ui.weak("Select a file to flag its data");
            return;
        };

        ui.label(format!("Flag selected range ({}):", flags.profile()));
        let has_range = page.selection.range_spec().is_some();
        ui.horizontal_wrapped(|ui| {
            for entry in flags.entries() {
                let button = egui::Button::new(
                    egui::RichText::new(entry.code.as_str()).color(entry.style.color).strong(),
                );
                if ui
                    .add_enabled(has_range, button)
                    .on_hover_text(&entry.description)
                    .clicked()
                {
                    out.push(PageMessage::FlagRange(entry.code.clone()));
                }
            }
        });

        ui.separator();
        ui.horizontal(|ui| {
            ui.strong("Show flags");
            ui.checkbox(&mut self.show_styles, "Edit styles");
        });
        style_rows(ui, "flag_styles_current", FlagTarget::Current, flags, self.show_styles, out);

        if let Some(reference) = page.reference_flags() {
            ui.separator();
            ui.strong(format!("Reference flags ({})", reference.profile()));
            style_rows(
                ui,
                "flag_styles_reference",
                FlagTarget::Reference,
                reference,
                self.show_styles,
                out,
            );
        }
    }
}
