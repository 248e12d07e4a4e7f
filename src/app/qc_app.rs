//! Standalone application wrapper for the QC page.
//!
//! [`QcApp`] owns a [`QcPage`] and the panels that show it, and implements
//! [`eframe::App`]. Each frame it:
//!
//! 1. picks up a finished background QC run ([`QcPage::poll`]),
//! 2. hands bounds the page wants applied to the plot panel,
//! 3. renders the side dock, the plot, the status line, map pop-outs and
//!    notices, collecting the [`PageMessage`]s panels push,
//! 4. dispatches those messages against the page.

use std::time::Duration;

use eframe::egui;
use egui::containers::scroll_area::ScrollBarVisibility;

use crate::config::PageKind;
use crate::controllers::StatusStyle;
use crate::panels::{
    AutoQcPanel, AxisPanel, ComparePanel, ExportPanel, FilesPanel, FlagsPanel, MapPanel, Panel,
    PlotPanel,
};

use super::{NoticeLevel, PageMessage, QcPage};

// ─────────────────────────────────────────────────────────────────────────────
// QcApp
// ─────────────────────────────────────────────────────────────────────────────

pub struct QcApp {
    pub page: QcPage,
    /// Tabs of the left dock; one is shown at a time.
    pub(crate) side_panels: Vec<Box<dyn Panel>>,
    /// Panels sharing the central area (the plot).
    pub(crate) central_panels: Vec<Box<dyn Panel>>,
    /// Messages queued from outside the UI, dispatched on the next frame.
    queued: Vec<PageMessage>,
    started: bool,
}

impl QcApp {
    /// Build the app and the panels enabled by the page's feature flags.
    pub fn new(page: QcPage) -> Self {
        let features = page.config.features.clone();
        let mut side_panels: Vec<Box<dyn Panel>> = vec![
            Box::new(FilesPanel::default()),
            Box::new(AxisPanel::default()),
            Box::new(FlagsPanel::default()),
        ];
        if features.compare {
            side_panels.push(Box::new(ComparePanel::default()));
        }
        if features.automatic_qc {
            side_panels.push(Box::new(AutoQcPanel::default()));
        }
        if features.map {
            side_panels.push(Box::new(MapPanel::default()));
        }
        side_panels.push(Box::new(ExportPanel::default()));
        for p in side_panels.iter_mut().skip(1) {
            p.state_mut().visible = false;
        }
        Self {
            page,
            side_panels,
            central_panels: vec![Box::new(PlotPanel::default())],
            queued: Vec::new(),
            started: false,
        }
    }

    /// Queue a message to be dispatched on the next frame.
    pub fn queue(&mut self, msg: PageMessage) {
        self.queued.push(msg);
    }

    /// Run [`QcPage::startup`] (once) and dispatch queued messages.
    pub fn process_queued(&mut self) {
        if !self.started {
            self.started = true;
            self.page.startup();
        }
        for msg in std::mem::take(&mut self.queued) {
            self.page.dispatch(msg);
        }
    }

    /// Hand bounds written to the page's plot axes over to the plot panel.
    fn apply_pending_bounds(&mut self) {
        let value = self.page.value_axis.plot.take_pending();
        let depth_time = self.page.depth_time_axis.plot.take_pending();
        if value.is_none() && depth_time.is_none() {
            return;
        }
        let (x, y) = match self.page.config.page {
            PageKind::Profile => (value, depth_time),
            PageKind::TimeSeries => (depth_time, value),
        };
        if let Some(plot) = self.plot_panel_mut() {
            plot.apply_bounds(x, y);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────────

    fn render_side_dock(&mut self, ctx: &egui::Context, out: &mut Vec<PageMessage>) {
        let mut list = std::mem::take(&mut self.side_panels);
        let page = &self.page;
        egui::SidePanel::left("qc_side_dock")
            .resizable(true)
            .default_width(340.0)
            .min_width(220.0)
            .show(ctx, |ui| render_tabs(ui, &mut list, page, out));
        for p in list.iter_mut() {
            if p.state().visible && p.state().detached {
                p.show_detached_dialog(ctx, page, out);
            }
        }
        self.side_panels = list;
    }

    fn render_central(&mut self, ctx: &egui::Context, out: &mut Vec<PageMessage>) {
        let page = &self.page;
        let list = &mut self.central_panels;
        egui::CentralPanel::default().show(ctx, |ui| {
            for p in list.iter_mut() {
                if p.state().visible {
                    p.render_panel(ui, page, out);
                }
            }
        });
    }

    fn render_status_line(&self, ctx: &egui::Context) {
        let info = self.page.status.current();
        egui::TopBottomPanel::bottom("qc_status_line")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    let color = match info.style {
                        StatusStyle::Normal => ui.visuals().text_color(),
                        StatusStyle::Warning => ui.visuals().warn_fg_color,
                        StatusStyle::Red => ui.visuals().error_fg_color,
                    };
                    ui.colored_label(color, &info.text);
                    if self.page.progress.is_busy() {
                        ui.spinner();
                    }
                });
            });
    }

    /// One window per pending notice; closing it dismisses the notice.
    fn render_notices(&self, ctx: &egui::Context, out: &mut Vec<PageMessage>) {
        // Dismiss from the back so earlier indices stay valid.
        let mut dismissed = Vec::new();
        for (i, notice) in self.page.notices.iter().enumerate() {
            let icon = match notice.level {
                NoticeLevel::Info => egui_phosphor::regular::INFO,
                NoticeLevel::Warning => egui_phosphor::regular::WARNING,
                NoticeLevel::Error => egui_phosphor::regular::WARNING_OCTAGON,
            };
            let mut open = true;
            let mut ok = false;
            egui::Window::new(format!("{icon} {}", notice.title))
                .id(egui::Id::new(("qc_notice", i)))
                .open(&mut open)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 24.0 * i as f32))
                .show(ctx, |ui| {
                    ui.label(&notice.text);
                    ui.add_space(6.0);
                    ok = ui.button("OK").clicked();
                });
            if !open || ok {
                dismissed.push(i);
            }
        }
        for i in dismissed.into_iter().rev() {
            out.push(PageMessage::DismissNotice(i));
        }
    }
}

/// Tab strip with "Pop out"/"Hide" actions, followed by the active panel.
fn render_tabs(
    ui: &mut egui::Ui,
    list: &mut [Box<dyn Panel>],
    page: &QcPage,
    out: &mut Vec<PageMessage>,
) {
    let mut clicked: Option<usize> = None;
    ui.horizontal_wrapped(|ui| {
        for (i, p) in list.iter().enumerate() {
            let active = p.state().visible && !p.state().detached;
            if ui
                .selectable_label(active, p.icon_only().unwrap_or(p.title()))
                .on_hover_text(p.title())
                .clicked()
            {
                clicked = Some(i);
            }
        }
    });
    if let Some(focus) = list.iter().position(|p| p.state().request_focus) {
        clicked = clicked.or(Some(focus));
        list[focus].state_mut().request_focus = false;
    }
    if let Some(ci) = clicked {
        for (i, p) in list.iter_mut().enumerate() {
            let st = p.state_mut();
            if i == ci {
                st.visible = true;
                st.detached = false;
            } else if !st.detached {
                st.visible = false;
            }
        }
    }

    let Some(active) = list
        .iter_mut()
        .find(|p| p.state().visible && !p.state().detached)
    else {
        ui.weak("All panels are hidden or popped out");
        return;
    };
    ui.separator();
    ui.horizontal(|ui| {
        ui.strong(active.title_and_icon());
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.small_button("Hide").clicked() {
                active.state_mut().visible = false;
            }
            if ui.small_button("Pop out").clicked() {
                active.state_mut().detached = true;
            }
        });
    });
    ui.separator();
    if active.state().visible && !active.state().detached {
        egui::ScrollArea::vertical()
            .scroll_bar_visibility(ScrollBarVisibility::VisibleWhenNeeded)
            .auto_shrink([false, false])
            .show(ui, |ui| active.render_panel(ui, page, out));
    }
}

impl eframe::App for QcApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_queued();
        self.page.poll();
        self.apply_pending_bounds();

        let mut out = Vec::new();
        self.render_status_line(ctx);
        self.render_side_dock(ctx, &mut out);
        self.render_central(ctx, &mut out);
        if let Some(maps) = self.map_panel() {
            maps.show_popouts(ctx, &self.page, &mut out);
        }
        self.render_notices(ctx, &mut out);

        #[cfg(feature = "dispatch_debug")]
        if !out.is_empty() {
            tracing::debug!("frame produced {} message(s)", out.len());
        }
        for msg in out {
            self.page.dispatch(msg);
        }

        // Keep polling while a background run is active.
        let delay = if self.page.progress.is_busy() { 100 } else { 250 };
        ctx.request_repaint_after(Duration::from_millis(delay));
    }
}
