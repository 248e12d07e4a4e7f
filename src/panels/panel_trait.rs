use downcast_rs::{impl_downcast, Downcast};
use egui::{Context, Ui};

use crate::app::{PageMessage, QcPage};

#[derive(Debug, Clone, Copy, Default)]
pub struct PanelState {
    pub title: &'static str,
    pub icon: Option<&'static str>,
    pub visible: bool,
    pub detached: bool,
    pub request_focus: bool,
}

impl PanelState {
    pub fn new(title: &'static str, icon: &'static str) -> Self {
        Self {
            title,
            icon: Some(icon),
            visible: true,
            detached: false,
            request_focus: false,
        }
    }
}

/// A dockable part of the page.
///
/// Panels read the page and push [`PageMessage`]s; they never change the page
/// directly. Widget-local state (text being typed, open combo boxes) stays in
/// the panel.
pub trait Panel: Downcast {
    fn state(&self) -> &PanelState;
    fn state_mut(&mut self) -> &mut PanelState;

    fn title(&self) -> &'static str {
        self.state().title
    }

    fn icon_only(&self) -> Option<&'static str> {
        self.state().icon
    }

    fn title_and_icon(&self) -> String {
        match self.icon_only() {
            Some(icon) => format!("{icon} {}", self.title()),
            None => self.title().to_string(),
        }
    }

    fn render_panel(&mut self, ui: &mut Ui, page: &QcPage, out: &mut Vec<PageMessage>);

    /// Render as a floating window; closing it hides and re-docks the panel.
    fn show_detached_dialog(&mut self, ctx: &Context, page: &QcPage, out: &mut Vec<PageMessage>) {
        let mut open = true;
        let title = self.title_and_icon();
        egui::Window::new(title)
            .id(egui::Id::new(("detached_panel", self.title())))
            .open(&mut open)
            .default_width(320.0)
            .show(ctx, |ui| self.render_panel(ui, page, out));
        if !open {
            let st = self.state_mut();
            st.visible = false;
            st.detached = false;
        }
    }
}

impl_downcast!(Panel);
