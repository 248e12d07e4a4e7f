//! Flag styles and flag visibility.
//!
//! A [`FlagSelection`] is built from a sampling-type settings profile and
//! overlaid with the user's stored styles. Every change is persisted before
//! the caller redraws.

use std::collections::{BTreeMap, BTreeSet};

use egui::Color32;
use egui_plot::MarkerShape;
use tracing::debug;

use crate::error::{QcError, Result};
use crate::persistence::{load_value, sections, store_value, FlagStyleSerde, UserPreferences};
use crate::session::{FileId, FlagCode, FlagDef, SamplingSettings};

/// How records with one flag are drawn, and whether they are drawn at all.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagStyle {
    pub color: Color32,
    pub marker: MarkerShape,
    pub size: f32,
    pub included: bool,
}

impl FlagStyle {
    pub fn from_def(def: &FlagDef) -> Self {
        Self {
            color: Color32::from_rgb(def.color[0], def.color[1], def.color[2]),
            marker: def.marker.into(),
            size: def.size,
            included: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagEntry {
    pub code: FlagCode,
    pub description: String,
    pub style: FlagStyle,
}

/// Flag styles of one settings profile.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagSelection {
    profile: String,
    entries: Vec<FlagEntry>,
    revision: u64,
}

impl FlagSelection {
    /// Build from `settings`, applying any styles stored for the profile.
    pub fn from_settings(settings: &SamplingSettings, prefs: &dyn UserPreferences) -> Self {
        let stored: BTreeMap<String, FlagStyleSerde> =
            load_value(prefs, sections::FLAG_STYLES, &settings.name).unwrap_or_default();
        let entries = settings
            .flags
            .iter()
            .map(|def| FlagEntry {
                code: def.code.clone(),
                description: def.description.clone(),
                style: stored
                    .get(def.code.as_str())
                    .cloned()
                    .map(FlagStyleSerde::into_style)
                    .unwrap_or_else(|| FlagStyle::from_def(def)),
            })
            .collect();
        Self {
            profile: settings.name.clone(),
            entries,
            revision: 0,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn entries(&self) -> &[FlagEntry] {
        &self.entries
    }

    /// Bumped on every change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn style(&self, code: &FlagCode) -> Option<&FlagStyle> {
        self.entries.iter().find(|e| &e.code == code).map(|e| &e.style)
    }

    pub fn is_included(&self, code: &FlagCode) -> bool {
        self.style(code).map_or(false, |s| s.included)
    }

    pub fn included_codes(&self) -> BTreeSet<FlagCode> {
        self.entries
            .iter()
            .filter(|e| e.style.included)
            .map(|e| e.code.clone())
            .collect()
    }

    fn entry_mut(&mut self, code: &FlagCode) -> Result<&mut FlagEntry> {
        let profile = self.profile.clone();
        self.entries
            .iter_mut()
            .find(|e| &e.code == code)
            .ok_or_else(|| {
                QcError::missing("Unknown flag", format!("flag {code} is not defined in {profile}"))
            })
    }

    /// Show or hide records with `code`. Returns whether anything changed.
    pub fn set_included(
        &mut self,
        code: &FlagCode,
        included: bool,
        prefs: &mut dyn UserPreferences,
    ) -> Result<bool> {
        let entry = self.entry_mut(code)?;
        if entry.style.included == included {
            return Ok(false);
        }
        entry.style.included = included;
        self.commit(prefs)?;
        Ok(true)
    }

    /// Replace the style of `code`. Returns whether anything changed.
    pub fn set_style(
        &mut self,
        code: &FlagCode,
        style: FlagStyle,
        prefs: &mut dyn UserPreferences,
    ) -> Result<bool> {
        let entry = self.entry_mut(code)?;
        if entry.style == style {
            return Ok(false);
        }
        entry.style = style;
        self.commit(prefs)?;
        Ok(true)
    }

    fn commit(&mut self, prefs: &mut dyn UserPreferences) -> Result<()> {
        self.revision += 1;
        let stored: BTreeMap<String, FlagStyleSerde> = self
            .entries
            .iter()
            .map(|e| (e.code.0.clone(), FlagStyleSerde::from(&e.style)))
            .collect();
        store_value(prefs, sections::FLAG_STYLES, &self.profile, &stored)?;
        debug!("flag styles of {} saved (revision {})", self.profile, self.revision);
        Ok(())
    }
}

/// Flag selections keyed by settings profile name.
///
/// A selection is built the first time a profile is needed and rebuilt when a
/// file switches to another profile.
#[derive(Debug, Default)]
pub struct FlagStyleCache {
    by_profile: BTreeMap<String, FlagSelection>,
    associations: BTreeMap<FileId, String>,
    stale: BTreeSet<String>,
    builds: usize,
}

impl FlagStyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The selection for `file_id`, which currently uses `settings`.
    pub fn get_or_build(
        &mut self,
        file_id: &FileId,
        settings: &SamplingSettings,
        prefs: &dyn UserPreferences,
    ) -> &mut FlagSelection {
        let name = settings.name.clone();
        let prev = self.associations.insert(file_id.clone(), name.clone());
        if matches!(&prev, Some(p) if p != &name) {
            self.stale.insert(name.clone());
        }
        let rebuild = self.stale.remove(&name) || !self.by_profile.contains_key(&name);
        if rebuild {
            let mut selection = FlagSelection::from_settings(settings, prefs);
            if let Some(old) = self.by_profile.get(&name) {
                selection.revision = old.revision + 1;
            }
            self.builds += 1;
            debug!("built flag selection for profile {name}");
            self.by_profile.insert(name.clone(), selection);
        }
        self.by_profile
            .entry(name)
            .or_insert_with(|| FlagSelection::from_settings(settings, prefs))
    }

    /// The selection a file was last associated with, if built.
    pub fn for_file(&self, file_id: &FileId) -> Option<&FlagSelection> {
        self.by_profile.get(self.associations.get(file_id)?)
    }

    pub fn for_file_mut(&mut self, file_id: &FileId) -> Option<&mut FlagSelection> {
        let name = self.associations.get(file_id)?;
        self.by_profile.get_mut(name)
    }

    /// Mark a profile for rebuilding on next use.
    pub fn invalidate(&mut self, profile: &str) {
        self.stale.insert(profile.to_string());
    }

    pub fn forget_file(&mut self, file_id: &FileId) {
        self.associations.remove(file_id);
    }

    /// Number of selections built so far.
    pub fn builds(&self) -> usize {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPreferences;

    #[test]
    fn style_changes_are_persisted_and_reloaded() {
        let settings = SamplingSettings::standard("ctd");
        let mut prefs = MemoryPreferences::new();
        let mut sel = FlagSelection::from_settings(&settings, &prefs);
        let bad = FlagCode::new("4");
        assert!(sel.set_included(&bad, false, &mut prefs).unwrap());
        assert!(!sel.set_included(&bad, false, &mut prefs).unwrap());
        assert_eq!(sel.revision(), 1);
        assert_eq!(prefs.writes, 1);

        let reloaded = FlagSelection::from_settings(&settings, &prefs);
        assert!(!reloaded.is_included(&bad));
        assert!(reloaded.is_included(&FlagCode::new("1")));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let settings = SamplingSettings::standard("ctd");
        let mut prefs = MemoryPreferences::new();
        let mut sel = FlagSelection::from_settings(&settings, &prefs);
        assert!(sel.set_included(&FlagCode::new("X"), false, &mut prefs).is_err());
    }

    #[test]
    fn cache_builds_once_per_profile_and_rebuilds_on_association_change() {
        let prefs = MemoryPreferences::new();
        let ctd = SamplingSettings::standard("ctd");
        let other = SamplingSettings::standard("bottle");
        let mut cache = FlagStyleCache::new();
        let a = FileId::new("a");
        let b = FileId::new("b");
        cache.get_or_build(&a, &ctd, &prefs);
        cache.get_or_build(&b, &ctd, &prefs);
        cache.get_or_build(&a, &ctd, &prefs);
        assert_eq!(cache.builds(), 1);

        cache.get_or_build(&a, &other, &prefs);
        assert_eq!(cache.builds(), 2);
        assert_eq!(cache.for_file(&a).map(|s| s.profile()), Some("bottle"));

        cache.invalidate("ctd");
        let rev = cache.get_or_build(&b, &ctd, &prefs).revision();
        assert_eq!(cache.builds(), 3);
        assert_eq!(rev, 1);
    }
}
