use egui::Ui;
use egui_phosphor::regular::{EXPORT, FLOPPY_DISK};

use super::panel_trait::{Panel, PanelState};
use crate::app::{PageMessage, QcPage};

/// Saving files with their current flags.
pub struct ExportPanel {
    pub state: PanelState,
}

impl Default for ExportPanel {
    fn default() -> Self {
        Self {
            state: PanelState::new("Export", EXPORT),
        }
    }
}

impl Panel for ExportPanel {
    fn state(&self) -> &PanelState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        let directory = page.export_directory();
        let current = page.selection.current_file_id().cloned();
        let busy = page.progress.is_busy();

        ui.add_enabled_ui(!busy, |ui| {
            if ui
                .add_enabled(current.is_some(), egui::Button::new(format!("{FLOPPY_DISK} Save file…")))
                .on_hover_text("Save the current file with its flags")
                .clicked()
            {
                let mut dialog = rfd::FileDialog::new().add_filter("Data", &["txt", "tsv"]);
                if let Some(dir) = &directory {
                    dialog = dialog.set_directory(dir);
                }
                if let Some(id) = &current {
                    dialog = dialog.set_file_name(format!("{id}.txt"));
                }
                if let Some(path) = dialog.save_file() {
                    out.push(PageMessage::SaveFile(path));
                }
            }

            let any = !page.selection.file_list().is_empty();
            if ui
                .add_enabled(any, egui::Button::new(format!("{FLOPPY_DISK} Save all files (filtered)…")))
                .on_hover_text("Save every file of the file list into one directory")
                .clicked()
            {
                let mut dialog = rfd::FileDialog::new();
                if let Some(dir) = &directory {
                    dialog = dialog.set_directory(dir);
                }
                if let Some(dir) = dialog.pick_folder() {
                    out.push(PageMessage::SaveAllFiles(dir));
                }
            }
        });

        if let Some(dir) = directory {
            ui.weak(format!("Last export: {}", dir.display()));
        }
    }
}
