//! Per-user preference store.
//!
//! Preferences are opaque JSON values filed under `section/key`. The
//! coordinators never know where they end up: [`JsonPreferences`] writes
//! through to a JSON file on every change, [`MemoryPreferences`] keeps them in
//! memory. This module also provides the serializable mirror types for styles
//! that cannot derive serde traits themselves (egui `Color32`, egui_plot
//! `MarkerShape`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::data::flags::FlagStyle;
use crate::error::PreferencesError;

/// Section names used by the page.
pub mod sections {
    /// Stored axis ranges, keyed by `<page>/<axis>`.
    pub const AXIS_RANGE: &str = "axis_range";
    /// Flag styles, keyed by settings profile name.
    pub const FLAG_STYLES: &str = "flag_styles";
    /// Options per automatic QC routine.
    pub const QC_OPTIONS: &str = "qc_options";
    /// Last selected parameter per page.
    pub const PARAMETER_PRIORITY: &str = "parameter_priority";
    /// Boolean page options.
    pub const OPTIONS: &str = "options";
    /// Map boundaries.
    pub const MAP: &str = "map";
    /// Remembered directories, e.g. where files were last exported.
    pub const PATHS: &str = "paths";
}

type Store = BTreeMap<String, BTreeMap<String, Value>>;

/// Where user settings are read from and written to.
pub trait UserPreferences: Send {
    fn get(&self, section: &str, key: &str) -> Option<Value>;

    /// Store a value; file-backed stores persist before returning.
    fn set(&mut self, section: &str, key: &str, value: Value) -> Result<(), PreferencesError>;

    fn remove(&mut self, section: &str, key: &str) -> Result<(), PreferencesError>;
}

/// Typed read of a stored value. Values that do not deserialize are ignored.
pub fn load_value<T: DeserializeOwned>(
    prefs: &dyn UserPreferences,
    section: &str,
    key: &str,
) -> Option<T> {
    let value = prefs.get(section, key)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("ignoring stored {section}/{key}: {e}");
            None
        }
    }
}

/// Typed write of a value.
pub fn store_value<T: Serialize>(
    prefs: &mut dyn UserPreferences,
    section: &str,
    key: &str,
    value: &T,
) -> Result<(), PreferencesError> {
    prefs.set(section, key, serde_json::to_value(value)?)
}

// ---------- In-memory store ----------

#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    store: Store,
    /// Number of successful `set` calls.
    pub writes: usize,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserPreferences for MemoryPreferences {
    fn get(&self, section: &str, key: &str) -> Option<Value> {
        self.store.get(section)?.get(key).cloned()
    }

    fn set(&mut self, section: &str, key: &str, value: Value) -> Result<(), PreferencesError> {
        self.store
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.writes += 1;
        Ok(())
    }

    fn remove(&mut self, section: &str, key: &str) -> Result<(), PreferencesError> {
        if let Some(s) = self.store.get_mut(section) {
            s.remove(key);
        }
        Ok(())
    }
}

// ---------- File-backed store ----------

/// Preferences kept in one pretty-printed JSON file per user.
#[derive(Debug, Clone)]
pub struct JsonPreferences {
    path: PathBuf,
    store: Store,
}

impl JsonPreferences {
    /// Default location: `<config dir>/sensor-qc/<user>.json`.
    pub fn default_path(user: &str) -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-qc")
            .join(format!("{user}.json"))
    }

    /// Open the store at `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferencesError> {
        let path = path.into();
        let store = if path.exists() {
            let txt = std::fs::read_to_string(&path)?;
            if txt.trim().is_empty() {
                Store::new()
            } else {
                serde_json::from_str(&txt)?
            }
        } else {
            Store::new()
        };
        debug!("user preferences at {}", path.display());
        Ok(Self { path, store })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let txt = serde_json::to_string_pretty(&self.store)?;
        std::fs::write(&self.path, txt)?;
        Ok(())
    }
}

impl UserPreferences for JsonPreferences {
    fn get(&self, section: &str, key: &str) -> Option<Value> {
        self.store.get(section)?.get(key).cloned()
    }

    fn set(&mut self, section: &str, key: &str, value: Value) -> Result<(), PreferencesError> {
        self.store
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, section: &str, key: &str) -> Result<(), PreferencesError> {
        let removed = self
            .store
            .get_mut(section)
            .and_then(|s| s.remove(key))
            .is_some();
        if removed {
            self.flush()?;
        }
        Ok(())
    }
}

// ---------- Serializable mirror types ----------

/// Serializable version of egui_plot::MarkerShape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerMarkerShape {
    Circle,
    Square,
    Diamond,
    Cross,
    Plus,
    Asterisk,
    Up,
    Down,
    Left,
    Right,
}

impl From<egui_plot::MarkerShape> for SerMarkerShape {
    fn from(m: egui_plot::MarkerShape) -> Self {
        use egui_plot::MarkerShape;
        match m {
            MarkerShape::Circle => SerMarkerShape::Circle,
            MarkerShape::Square => SerMarkerShape::Square,
            MarkerShape::Diamond => SerMarkerShape::Diamond,
            MarkerShape::Cross => SerMarkerShape::Cross,
            MarkerShape::Plus => SerMarkerShape::Plus,
            MarkerShape::Asterisk => SerMarkerShape::Asterisk,
            MarkerShape::Up => SerMarkerShape::Up,
            MarkerShape::Down => SerMarkerShape::Down,
            MarkerShape::Left => SerMarkerShape::Left,
            MarkerShape::Right => SerMarkerShape::Right,
        }
    }
}

impl From<SerMarkerShape> for egui_plot::MarkerShape {
    fn from(m: SerMarkerShape) -> Self {
        use egui_plot::MarkerShape;
        match m {
            SerMarkerShape::Circle => MarkerShape::Circle,
            SerMarkerShape::Square => MarkerShape::Square,
            SerMarkerShape::Diamond => MarkerShape::Diamond,
            SerMarkerShape::Cross => MarkerShape::Cross,
            SerMarkerShape::Plus => MarkerShape::Plus,
            SerMarkerShape::Asterisk => MarkerShape::Asterisk,
            SerMarkerShape::Up => MarkerShape::Up,
            SerMarkerShape::Down => MarkerShape::Down,
            SerMarkerShape::Left => MarkerShape::Left,
            SerMarkerShape::Right => MarkerShape::Right,
        }
    }
}

/// Serializable version of FlagStyle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagStyleSerde {
    pub color_rgba: [u8; 4],
    pub marker: SerMarkerShape,
    pub size: f32,
    pub included: bool,
}

impl From<&FlagStyle> for FlagStyleSerde {
    fn from(s: &FlagStyle) -> Self {
        Self {
            color_rgba: [s.color.r(), s.color.g(), s.color.b(), s.color.a()],
            marker: s.marker.into(),
            size: s.size,
            included: s.included,
        }
    }
}

impl FlagStyleSerde {
    /// Convert back to a FlagStyle.
    pub fn into_style(self) -> FlagStyle {
        FlagStyle {
            color: egui::Color32::from_rgba_unmultiplied(
                self.color_rgba[0],
                self.color_rgba[1],
                self.color_rgba[2],
                self.color_rgba[3],
            ),
            marker: self.marker.into(),
            size: self.size,
            included: self.included,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_store_roundtrips_typed_values() {
        let mut prefs = MemoryPreferences::new();
        store_value(&mut prefs, sections::OPTIONS, "zoom", &true).unwrap();
        assert_eq!(load_value::<bool>(&prefs, sections::OPTIONS, "zoom"), Some(true));
        assert_eq!(load_value::<bool>(&prefs, sections::OPTIONS, "other"), None);
        prefs.set(sections::OPTIONS, "bad", json!("text")).unwrap();
        assert_eq!(load_value::<bool>(&prefs, sections::OPTIONS, "bad"), None);
        assert_eq!(prefs.writes, 2);
    }

    #[test]
    fn marker_mirror_covers_all_shapes() {
        for m in egui_plot::MarkerShape::all() {
            let back: egui_plot::MarkerShape = SerMarkerShape::from(m).into();
            assert_eq!(back, m);
        }
    }
}
