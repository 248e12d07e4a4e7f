//! Top-level entry point for running the QC page as a native window.

use eframe::egui;
use tracing::info;

use crate::config::QcConfig;
use crate::persistence::UserPreferences;
use crate::session::SessionHandle;

use super::{PageMessage, QcApp, QcPage};

/// Launch the QC page in a native window.
///
/// `initial` messages (typically file loads and a selection) are dispatched
/// on the first frame, after the page has restored its options. The call
/// blocks until the window is closed.
pub fn run_qc_app(
    mut config: QcConfig,
    session: SessionHandle,
    prefs: Box<dyn UserPreferences>,
    initial: Vec<PageMessage>,
) -> eframe::Result<()> {
    let title = config.title.clone();
    let mut opts = config
        .native_options
        .take()
        .unwrap_or_else(eframe::NativeOptions::default);

    // Bigger default window unless the caller chose a size.
    if opts.viewport.inner_size.is_none() {
        opts.viewport = opts
            .viewport
            .clone()
            .with_inner_size(egui::vec2(1400.0, 900.0));
    }

    let mut app = QcApp::new(QcPage::new(config, session, prefs));
    for msg in initial {
        app.queue(msg);
    }
    info!("opening '{title}'");

    eframe::run_native(
        &title,
        opts,
        Box::new(|cc| {
            // Phosphor icons are used in panel tabs and buttons.
            let mut fonts = egui::FontDefinitions::default();
            egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);
            cc.egui_ctx.set_fonts(fonts);
            Ok(Box::new(app))
        }),
    )
}
