use std::path::PathBuf;

use egui::Ui;
use egui_phosphor::regular::{FOLDER_OPEN, TRASH};

use super::panel_trait::{Panel, PanelState};
use crate::app::{PageMessage, QcPage};
use crate::session::{FileId, LoadRequest};

/// Loading, selecting and removing data files; parameter selection.
pub struct FilesPanel {
    pub state: PanelState,
    /// Sampling type given to the next loaded file.
    pub load_sampling_type: String,
    /// Settings profile name or YAML path for the next loaded file.
    pub load_settings: String,
    pub reload: bool,
    platform_depth: String,
}

impl Default for FilesPanel {
    fn default() -> Self {
        Self {
            state: PanelState::new("Files", FOLDER_OPEN),
            load_sampling_type: String::new(),
            load_settings: String::new(),
            reload: false,
            platform_depth: String::new(),
        }
    }
}

impl FilesPanel {
    fn render_load(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        egui::Grid::new("load_grid").num_columns(2).show(ui, |ui| {
            ui.label("Sampling type:");
            ui.text_edit_singleline(&mut self.load_sampling_type);
            ui.end_row();
            ui.label("Settings:");
            ui.text_edit_singleline(&mut self.load_settings)
                .on_hover_text("Profile name or path to a YAML settings file");
            ui.end_row();
            ui.label("Platform depth [m]:");
            if ui.text_edit_singleline(&mut self.platform_depth).changed() {
                out.push(PageMessage::SetPlatformDepth(self.platform_depth.clone()));
            }
            ui.end_row();
        });
        if self.platform_depth.is_empty() && !page.platform_depth.is_empty() {
            self.platform_depth = page.platform_depth.clone();
        }
        ui.horizontal(|ui| {
            ui.checkbox(&mut self.reload, "Reload");
            let can_load = !self.load_sampling_type.trim().is_empty();
            if ui
                .add_enabled(can_load, egui::Button::new(format!("{FOLDER_OPEN} Load file…")))
                .clicked()
            {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Data", &["txt", "tsv"])
                    .pick_file()
                {
                    out.push(PageMessage::LoadFile(self.request(path)));
                }
            }
        });
    }

    fn request(&self, data_file_path: PathBuf) -> LoadRequest {
        LoadRequest {
            sampling_type: self.load_sampling_type.trim().to_string(),
            data_file_path,
            settings_file: self.load_settings.trim().to_string(),
            reload: self.reload,
            ..Default::default()
        }
    }

    fn render_files(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        let sel = &page.selection;
        let current_type = sel.current_sampling_type().unwrap_or("All").to_string();
        egui::ComboBox::from_label("Sampling type")
            .selected_text(current_type)
            .show_ui(ui, |ui| {
                if ui
                    .selectable_label(sel.current_sampling_type().is_none(), "All")
                    .clicked()
                {
                    out.push(PageMessage::SelectSamplingType(None));
                }
                for st in &page.sampling_types {
                    if ui
                        .selectable_label(sel.current_sampling_type() == Some(st.as_str()), st)
                        .clicked()
                    {
                        out.push(PageMessage::SelectSamplingType(Some(st.clone())));
                    }
                }
            });

        if sel.file_list().is_empty() {
            ui.weak("No files loaded");
            return;
        }
        egui::ScrollArea::vertical()
            .id_salt("file_list")
            .max_height(220.0)
            .show(ui, |ui| {
                for (st, id) in sel.file_list() {
                    ui.horizontal(|ui| {
                        let selected = sel.current_file_id() == Some(id);
                        if ui.selectable_label(selected, id.label(st)).clicked() && !selected {
                            out.push(PageMessage::SelectFile(Some(id.clone())));
                        }
                        if ui.small_button(TRASH).on_hover_text("Remove file").clicked() {
                            out.push(PageMessage::RemoveFile(id.clone()));
                        }
                    });
                }
            });
    }

    fn render_parameters(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        let sel = &page.selection;
        let current = sel.current_parameter().unwrap_or("-").to_string();
        ui.add_enabled_ui(!sel.parameter_list().is_empty(), |ui| {
            egui::ComboBox::from_label("Parameter")
                .selected_text(current)
                .show_ui(ui, |ui| {
                    for p in sel.parameter_list() {
                        if ui
                            .selectable_label(sel.current_parameter() == Some(p.as_str()), p)
                            .clicked()
                        {
                            out.push(PageMessage::SelectParameter(Some(p.clone())));
                        }
                    }
                });
        });
    }
}

impl Panel for FilesPanel {
    fn state(&self) -> &PanelState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>) {
        self.render_load(ui, page, out);
        ui.separator();
        self.render_files(ui, page, out);
        ui.separator();
        self.render_parameters(ui, page, out);
    }
}

/// Preselect `file_id` from a `<sampling_type>: <id>` label typed elsewhere.
pub fn select_by_label(label: &str) -> PageMessage {
    PageMessage::SelectFile(Some(FileId::from_label(label)).filter(|f| !f.is_empty()))
}
