//! Dockable panels of the QC page.
//!
//! | Panel            | Shows |
//! | ---------------- | ----- |
//! | [`FilesPanel`]   | Loading, file list, sampling type and parameter |
//! | [`PlotPanel`]    | Main value/depth or value/time plot |
//! | [`AxisPanel`]    | Range entries of both axes |
//! | [`FlagsPanel`]   | Flag buttons and per-flag visibility/style |
//! | [`ComparePanel`] | Reference file selection and comparison scatter |
//! | [`AutoQcPanel`]  | Automatic QC routines |
//! | [`MapPanel`]     | Position and value maps |
//! | [`ExportPanel`]  | Saving files with their flags |

pub mod auto_qc_ui;
pub mod axis_ui;
pub mod compare_ui;
pub mod export_ui;
pub mod files_ui;
pub mod flags_ui;
pub mod map_ui;
pub mod panel_trait;
pub mod plot_ui;

pub use auto_qc_ui::AutoQcPanel;
pub use axis_ui::AxisPanel;
pub use compare_ui::ComparePanel;
pub use export_ui::ExportPanel;
pub use files_ui::FilesPanel;
pub use flags_ui::FlagsPanel;
pub use map_ui::MapPanel;
pub use panel_trait::{Panel, PanelState};
pub use plot_ui::PlotPanel;
