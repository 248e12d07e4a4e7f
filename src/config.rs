//! Configuration types for the QC page.

use serde::{Deserialize, Serialize};

use crate::controllers::StatusController;
use crate::events::EventController;

// ─────────────────────────────────────────────────────────────────────────────
// Page kind
// ─────────────────────────────────────────────────────────────────────────────

/// What the main plot shows on its vertical/horizontal axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum PageKind {
    /// Value against depth; the depth axis grows downwards.
    #[default]
    Profile,
    /// Value against time (ferrybox, fixed platforms).
    TimeSeries,
}

impl PageKind {
    /// Preference key prefix for this page.
    pub fn key(&self) -> &'static str {
        match self {
            PageKind::Profile => "profile",
            PageKind::TimeSeries => "timeseries",
        }
    }

    /// Name of the data field on the depth/time axis.
    pub fn axis_field(&self) -> &'static str {
        match self {
            PageKind::Profile => "depth",
            PageKind::TimeSeries => "time",
        }
    }
}

impl std::str::FromStr for PageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "profile" => Ok(PageKind::Profile),
            "timeseries" | "time-series" | "time_series" => Ok(PageKind::TimeSeries),
            other => Err(format!("unknown page kind '{other}'")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feature flags
// ─────────────────────────────────────────────────────────────────────────────

/// Toggle optional panels. All default to `true`.
#[derive(Clone, Debug)]
pub struct FeatureFlags {
    /// Show the position map(s).
    pub map: bool,
    /// Show the reference-file comparison panel.
    pub compare: bool,
    /// Show the automatic QC panel.
    pub automatic_qc: bool,
    /// Show the plot legend.
    pub legend: bool,
    /// Show the plot grid.
    pub grid: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            map: true,
            compare: true,
            automatic_qc: true,
            legend: true,
            grid: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Map boundaries
// ─────────────────────────────────────────────────────────────────────────────

/// Visible lon/lat window of the maps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapBoundaries {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl Default for MapBoundaries {
    fn default() -> Self {
        Self {
            lon_min: 9.0,
            lon_max: 31.0,
            lat_min: 53.0,
            lat_max: 66.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Colours
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed colours used by plots and maps (flag colours come from the settings profile).
#[derive(Clone, Debug)]
pub struct PlotColors {
    /// Other loaded files drawn behind the current one.
    pub background_data: egui::Color32,
    /// Reference file in the profile plot.
    pub reference_data: egui::Color32,
    /// 1:1 line in the comparison scatter.
    pub correlation_line: egui::Color32,
    /// Whole ferrybox track.
    pub track_base: egui::Color32,
    /// Ferrybox track inside the time range.
    pub track_highlight: egui::Color32,
    pub fixed_platform: egui::Color32,
    pub ctd_station: egui::Color32,
    /// Hover marker on the map.
    pub hover: egui::Color32,
}

impl Default for PlotColors {
    fn default() -> Self {
        Self {
            background_data: egui::Color32::from_gray(200),
            reference_data: egui::Color32::from_rgb(148, 103, 189),
            correlation_line: egui::Color32::from_rgb(127, 127, 127),
            track_base: egui::Color32::from_rgb(31, 119, 180),
            track_highlight: egui::Color32::from_rgb(214, 39, 40),
            fixed_platform: egui::Color32::from_rgb(44, 160, 44),
            ctd_station: egui::Color32::from_rgb(31, 119, 180),
            hover: egui::Color32::from_rgb(255, 127, 14),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controllers sub-config
// ─────────────────────────────────────────────────────────────────────────────

/// Optional programmatic controllers attached to the page.
#[derive(Clone, Default)]
pub struct Controllers {
    pub status: Option<StatusController>,
    pub event: Option<EventController>,
}

// ─────────────────────────────────────────────────────────────────────────────
// QcConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration for the QC page.
///
/// | Field                    | Purpose |
/// |--------------------------|---------|
/// | `page`                   | Profile or time-series page |
/// | `features`               | Toggle optional panels |
/// | `colors`                 | Fixed plot and map colours |
/// | `map_boundaries`         | Default map window (overridden by user preferences) |
/// | `compare_sampling_types` | Sampling types offered as comparison references |
/// | `controllers`            | Programmatic interaction handles |
#[derive(Clone)]
pub struct QcConfig {
    /// Native window title.
    pub title: String,
    pub page: PageKind,
    pub features: FeatureFlags,
    pub colors: PlotColors,
    pub map_boundaries: MapBoundaries,
    pub compare_sampling_types: Vec<String>,
    /// Half width (s) of the window searched for the map hover marker.
    pub hover_window_s: f64,
    /// Default of the "zoom to data on parameter update" option.
    pub zoom_to_data_default: bool,
    /// Optional eframe native-window options.
    pub native_options: Option<eframe::NativeOptions>,
    pub controllers: Controllers,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            title: "Sensor QC".to_string(),
            page: PageKind::default(),
            features: FeatureFlags::default(),
            colors: PlotColors::default(),
            map_boundaries: MapBoundaries::default(),
            compare_sampling_types: vec!["PhysicalChemical".to_string()],
            hover_window_s: 3600.0,
            zoom_to_data_default: true,
            native_options: None,
            controllers: Controllers::default(),
        }
    }
}

impl QcConfig {
    pub fn for_page(page: PageKind) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }
}
