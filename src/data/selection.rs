//! The page's current selection.
//!
//! Setters enforce the selection invariants and report whether anything
//! actually changed, so re-selecting the current value is a no-op.

use std::collections::BTreeSet;

use crate::data::axis::AxisRange;
use crate::data::flagging::RangeSpec;
use crate::error::{QcError, ReferenceFileError, Result};
use crate::session::{FileId, FlagCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

impl Change {
    pub fn changed(self) -> bool {
        self == Change::Changed
    }

    fn from_bool(b: bool) -> Self {
        if b {
            Change::Changed
        } else {
            Change::Unchanged
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    current_file_id: Option<FileId>,
    current_ref_file_id: Option<FileId>,
    current_sampling_type: Option<String>,
    current_parameter: Option<String>,
    file_list: Vec<(String, FileId)>,
    parameter_list: Vec<String>,
    depth_or_time_range: Option<AxisRange>,
    value_range: Option<AxisRange>,
    selected_flags: BTreeSet<FlagCode>,
    compare_selection: Option<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Getters ─────────────────────────────────────────────────────────

    pub fn current_file_id(&self) -> Option<&FileId> {
        self.current_file_id.as_ref()
    }

    pub fn current_ref_file_id(&self) -> Option<&FileId> {
        self.current_ref_file_id.as_ref()
    }

    pub fn current_sampling_type(&self) -> Option<&str> {
        self.current_sampling_type.as_deref()
    }

    pub fn current_parameter(&self) -> Option<&str> {
        self.current_parameter.as_deref()
    }

    /// Files offered in the file picker, as `(sampling_type, file_id)`.
    pub fn file_list(&self) -> &[(String, FileId)] {
        &self.file_list
    }

    pub fn parameter_list(&self) -> &[String] {
        &self.parameter_list
    }

    pub fn depth_or_time_range(&self) -> Option<AxisRange> {
        self.depth_or_time_range
    }

    pub fn value_range(&self) -> Option<AxisRange> {
        self.value_range
    }

    pub fn selected_flags(&self) -> &BTreeSet<FlagCode> {
        &self.selected_flags
    }

    pub fn compare_selection(&self) -> Option<&str> {
        self.compare_selection.as_deref()
    }

    /// Sampling type of the current file.
    pub fn current_file_sampling_type(&self) -> Option<&str> {
        let id = self.current_file_id.as_ref()?;
        self.file_list
            .iter()
            .find(|(_, f)| f == id)
            .map(|(st, _)| st.as_str())
    }

    /// The drawn flag range, if both parts are present.
    pub fn range_spec(&self) -> Option<RangeSpec> {
        Some(RangeSpec {
            axis_range: self.depth_or_time_range?,
            value_range: self.value_range?,
        })
    }

    // ── Setters ─────────────────────────────────────────────────────────

    /// Restrict the sampling-type filter. Files of other types are dropped from
    /// the file list on the next [`set_file_list`](Self::set_file_list).
    pub fn set_sampling_type(&mut self, sampling_type: Option<String>) -> Change {
        let sampling_type = sampling_type.filter(|s| !s.trim().is_empty());
        let changed = self.current_sampling_type != sampling_type;
        self.current_sampling_type = sampling_type;
        Change::from_bool(changed)
    }

    /// Replace the offered files; a current or reference file that is no
    /// longer offered is deselected.
    pub fn set_file_list(&mut self, files: Vec<(String, FileId)>) -> Change {
        let files: Vec<_> = match &self.current_sampling_type {
            Some(st) => files.into_iter().filter(|(t, _)| t == st).collect(),
            None => files,
        };
        let mut changed = files != self.file_list;
        self.file_list = files;
        if let Some(id) = &self.current_file_id {
            if !self.file_list.iter().any(|(_, f)| f == id) {
                self.clear_file();
                changed = true;
            }
        }
        Change::from_bool(changed)
    }

    /// Select the primary file. Selecting the current reference clears the reference.
    pub fn set_current_file(&mut self, file_id: Option<FileId>) -> Result<Change> {
        let file_id = file_id.filter(|f| !f.is_empty());
        if file_id == self.current_file_id {
            return Ok(Change::Unchanged);
        }
        if let Some(id) = &file_id {
            if !self.file_list.iter().any(|(_, f)| f == id) {
                return Err(QcError::missing(
                    "Unknown file",
                    format!("{id} is not in the file list"),
                ));
            }
        }
        if file_id.is_some() && file_id == self.current_ref_file_id {
            self.current_ref_file_id = None;
        }
        self.current_file_id = file_id;
        self.depth_or_time_range = None;
        self.value_range = None;
        Ok(Change::Changed)
    }

    /// Select the reference file; it must differ from the primary file.
    pub fn set_ref_file(&mut self, file_id: Option<FileId>) -> Result<Change> {
        let file_id = file_id.filter(|f| !f.is_empty());
        if file_id == self.current_ref_file_id {
            return Ok(Change::Unchanged);
        }
        if let Some(id) = &file_id {
            if Some(id) == self.current_file_id.as_ref() {
                return Err(ReferenceFileError::InvalidPair(id.clone()).into());
            }
        }
        self.current_ref_file_id = file_id;
        Ok(Change::Changed)
    }

    /// Replace the parameter list; a current parameter no longer listed is cleared.
    pub fn set_parameter_list(&mut self, parameters: Vec<String>) -> Change {
        let mut changed = parameters != self.parameter_list;
        self.parameter_list = parameters;
        if let Some(p) = &self.current_parameter {
            if !self.parameter_list.contains(p) {
                self.current_parameter = None;
                changed = true;
            }
        }
        if let Some(p) = &self.compare_selection {
            if !self.parameter_list.contains(p) {
                self.compare_selection = None;
            }
        }
        Change::from_bool(changed)
    }

    /// Select a parameter; it must be in the parameter list.
    pub fn set_parameter(&mut self, parameter: Option<String>) -> Result<Change> {
        let parameter = parameter.filter(|p| !p.trim().is_empty());
        if parameter == self.current_parameter {
            return Ok(Change::Unchanged);
        }
        if let Some(p) = &parameter {
            if !self.parameter_list.contains(p) {
                return Err(QcError::missing(
                    "Unknown parameter",
                    format!("{p} is not available for the current file"),
                ));
            }
        }
        self.current_parameter = parameter;
        self.depth_or_time_range = None;
        self.value_range = None;
        Ok(Change::Changed)
    }

    pub fn set_compare_selection(&mut self, parameter: Option<String>) -> Result<Change> {
        let parameter = parameter.filter(|p| !p.trim().is_empty());
        if parameter == self.compare_selection {
            return Ok(Change::Unchanged);
        }
        if let Some(p) = &parameter {
            if !self.parameter_list.contains(p) {
                return Err(QcError::missing(
                    "Unknown parameter",
                    format!("{p} is not available for comparison"),
                ));
            }
        }
        self.compare_selection = parameter;
        Ok(Change::Changed)
    }

    pub fn set_selected_flags(&mut self, flags: BTreeSet<FlagCode>) -> Change {
        let changed = flags != self.selected_flags;
        self.selected_flags = flags;
        Change::from_bool(changed)
    }

    /// Store a drawn flag range (depth/time part and value part).
    pub fn set_flag_ranges(&mut self, axis_range: AxisRange, value_range: AxisRange) -> Change {
        let changed = self.depth_or_time_range != Some(axis_range)
            || self.value_range != Some(value_range);
        self.depth_or_time_range = Some(axis_range);
        self.value_range = Some(value_range);
        Change::from_bool(changed)
    }

    pub fn clear_flag_ranges(&mut self) -> Change {
        let changed = self.depth_or_time_range.is_some() || self.value_range.is_some();
        self.depth_or_time_range = None;
        self.value_range = None;
        Change::from_bool(changed)
    }

    fn clear_file(&mut self) {
        self.current_file_id = None;
        self.current_parameter = None;
        self.parameter_list.clear();
        self.compare_selection = None;
        self.depth_or_time_range = None;
        self.value_range = None;
    }

    /// Forget a removed file everywhere it is referenced.
    pub fn remove_file(&mut self, file_id: &FileId) -> Change {
        let mut changed = false;
        let before = self.file_list.len();
        self.file_list.retain(|(_, f)| f != file_id);
        changed |= before != self.file_list.len();
        if self.current_file_id.as_ref() == Some(file_id) {
            self.clear_file();
            changed = true;
        }
        if self.current_ref_file_id.as_ref() == Some(file_id) {
            self.current_ref_file_id = None;
            changed = true;
        }
        Change::from_bool(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SelectionState {
        let mut s = SelectionState::new();
        s.set_file_list(vec![
            ("CTD".into(), FileId::new("a")),
            ("PhysicalChemical".into(), FileId::new("b")),
        ]);
        s
    }

    #[test]
    fn reselecting_is_unchanged() {
        let mut s = state();
        assert!(s.set_current_file(Some(FileId::new("a"))).unwrap().changed());
        assert!(!s.set_current_file(Some(FileId::new("a"))).unwrap().changed());
    }

    #[test]
    fn parameter_must_be_listed() {
        let mut s = state();
        s.set_parameter_list(vec!["TEMP".into()]);
        assert!(s.set_parameter(Some("PSAL".into())).is_err());
        assert!(s.set_parameter(Some("TEMP".into())).unwrap().changed());
        s.set_parameter_list(vec!["DOXY".into()]);
        assert_eq!(s.current_parameter(), None);
    }

    #[test]
    fn sampling_type_filter_drops_current_file() {
        let mut s = state();
        s.set_current_file(Some(FileId::new("a"))).unwrap();
        s.set_sampling_type(Some("PhysicalChemical".into()));
        let all = vec![
            ("CTD".into(), FileId::new("a")),
            ("PhysicalChemical".into(), FileId::new("b")),
        ];
        assert!(s.set_file_list(all).changed());
        assert_eq!(s.file_list().len(), 1);
        assert_eq!(s.current_file_id(), None);
    }
}
