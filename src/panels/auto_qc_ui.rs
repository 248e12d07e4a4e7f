use std::collections::BTreeMap;

use egui::Ui;
use egui_phosphor::regular::{GEAR, PLAY};

use super::panel_trait::{Panel, PanelState};
use crate::app::{PageMessage, PageOption, QcPage};
use crate::persistence::{load_value, sections};
use crate::session::QcOptions;

/// Routine selection, per-routine options (JSON) and the run button.
pub struct AutoQcPanel {
    pub state: PanelState,
    /// Options text per routine, loaded from the preferences on first show.
    options_text: BTreeMap<String, String>,
    errors: BTreeMap<String, String>,
}

impl Default for AutoQcPanel {
    fn default() -> Self {
        Self {
            state: PanelState::new("Automatic QC", GEAR),
            options_text: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }
}

/// Parse an options editor's text; an empty editor means no options.
pub fn parse_options(text: &str) -> Result<QcOptions, String> {
    if text.trim().is_empty() {
        return Ok(QcOptions::new());
    }
    serde_json::from_str::<QcOptions>(text).map_err(|e| format!("invalid options: {e}"))
}

impl Panel for AutoQcPanel {
    fn state(&self) -> &PanelState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        if page.qc_routines.is_empty() {
            ui.weak("No QC routines available");
            return;
        }
        for routine in &page.qc_routines {
            let mut selected = page.selected_routines.contains(routine);
            ui.horizontal(|ui| {
                if ui.checkbox(&mut selected, routine).changed() {
                    out.push(PageMessage::ToggleRoutine {
                        routine: routine.clone(),
                        selected,
                    });
                }
            });
            if !selected {
                continue;
            }
            let text = self.options_text.entry(routine.clone()).or_insert_with(|| {
                load_value::<QcOptions>(page.preferences(), sections::QC_OPTIONS, routine)
                    .and_then(|o| serde_json::to_string_pretty(&o).ok())
                    .unwrap_or_default()
            });
            ui.indent(routine, |ui| {
                ui.add(
                    egui::TextEdit::multiline(text)
                        .code_editor()
                        .desired_rows(3)
                        .hint_text(r#"{"parameters": ["TEMP"], "max": 25}"#),
                );
                if ui.button("Save options").clicked() {
                    match parse_options(text) {
                        Ok(options) => {
                            self.errors.remove(routine);
                            out.push(PageMessage::SetQcOptions {
                                routine: routine.clone(),
                                options,
                            });
                        }
                        Err(e) => {
                            self.errors.insert(routine.clone(), e);
                        }
                    }
                }
                if let Some(e) = self.errors.get(routine) {
                    ui.colored_label(ui.visuals().error_fg_color, e);
                }
            });
        }

        ui.separator();
        let mut all = page.options.run_on_all_files;
        if ui.checkbox(&mut all, "Run on all files").changed() {
            out.push(PageMessage::SetOption(PageOption::RunOnAllFiles, all));
        }
        let busy = page.progress.is_busy();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!busy, egui::Button::new(format!("{PLAY} Run")))
                .clicked()
            {
                out.push(PageMessage::RunAutomaticQc);
            }
            if busy {
                ui.spinner();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_text_parses_to_map() {
        let o = parse_options(r#"{"parameters": ["TEMP"], "max": 25}"#).unwrap();
        assert_eq!(o["max"], serde_json::json!(25));
        assert!(parse_options("  ").unwrap().is_empty());
        assert!(parse_options("[1, 2]").is_err());
    }
}
