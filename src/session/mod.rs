//! Session facade: the data layer the QC coordinators read from and write to.
//!
//! The session owns every loaded dataset, their flags, sampling-type settings
//! and the matching of two datasets. Coordinators only see it through the
//! [`Session`] trait; [`MemorySession`] is the in-process implementation used
//! by the application and the tests.

pub mod memory;
pub mod routines;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{QcError, SessionError};
use crate::persistence::SerMarkerShape;

pub use memory::{Dataset, MemorySession};
pub use routines::{QcRoutine, RoutineCatalog};

/// Lookup key of one loaded dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Parse a display label like `"Ferrybox CMEMS: 20180101_ferrybox"`.
    ///
    /// Labels without a sampling-type prefix are taken as the id itself.
    pub fn from_label(label: &str) -> Self {
        Self(label.rsplit(':').next().unwrap_or("").trim().to_string())
    }

    /// Display label `<sampling_type>: <id>`.
    pub fn label(&self, sampling_type: &str) -> String {
        format!("{}: {}", sampling_type, self.0)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A quality flag as defined by a sampling-type settings profile ("0", "1", "4", "B", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagCode(pub String);

impl FlagCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FlagCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlagCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One flag entry of a settings profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDef {
    pub code: FlagCode,
    #[serde(default)]
    pub description: String,
    #[serde(default = "FlagDef::default_color")]
    pub color: [u8; 3],
    #[serde(default = "FlagDef::default_marker")]
    pub marker: SerMarkerShape,
    #[serde(default = "FlagDef::default_size")]
    pub size: f32,
}

impl FlagDef {
    fn default_color() -> [u8; 3] {
        [127, 127, 127]
    }

    fn default_marker() -> SerMarkerShape {
        SerMarkerShape::Circle
    }

    fn default_size() -> f32 {
        3.0
    }

    pub fn new(code: &str, description: &str, color: [u8; 3]) -> Self {
        Self {
            code: FlagCode::new(code),
            description: description.to_string(),
            color,
            marker: Self::default_marker(),
            size: Self::default_size(),
        }
    }
}

/// Sampling-type settings profile: which flags exist and how they look by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSettings {
    pub name: String,
    pub flags: Vec<FlagDef>,
    /// Flag assigned to records nobody has looked at yet.
    #[serde(default = "SamplingSettings::default_unflagged")]
    pub unflagged: FlagCode,
    /// Flagging a parameter also flags these (same mask).
    #[serde(default)]
    pub dependent_parameters: BTreeMap<String, Vec<String>>,
    /// Columns a data file must provide for this profile.
    #[serde(default)]
    pub mandatory_columns: Vec<String>,
}

impl SamplingSettings {
    fn default_unflagged() -> FlagCode {
        FlagCode::new("0")
    }

    /// The SeaDataNet-style default profile.
    pub fn standard(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flags: vec![
                FlagDef::new("0", "No quality control", [127, 127, 127]),
                FlagDef::new("1", "Good value", [44, 160, 44]),
                FlagDef::new("2", "Probably good value", [31, 119, 180]),
                FlagDef::new("3", "Probably bad value", [255, 127, 14]),
                FlagDef::new("4", "Bad value", [214, 39, 40]),
                FlagDef::new("9", "Missing value", [0, 0, 0]),
            ],
            unflagged: Self::default_unflagged(),
            dependent_parameters: BTreeMap::new(),
            mandatory_columns: Vec::new(),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, SessionError> {
        serde_yaml::from_str(text)
            .map_err(|e| SessionError::InvalidOption(format!("settings profile: {e}")))
    }

    pub fn flag_codes(&self) -> impl Iterator<Item = &FlagCode> {
        self.flags.iter().map(|f| &f.code)
    }

    pub fn has_flag(&self, code: &FlagCode) -> bool {
        self.flags.iter().any(|f| &f.code == code)
    }

    pub fn dependents_of(&self, parameter: &str) -> &[String] {
        self.dependent_parameters
            .get(parameter)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Row filter applied before data is returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOptions {
    /// Inclusive lower time bound (unix seconds).
    pub time_start: Option<f64>,
    /// Inclusive upper time bound (unix seconds).
    pub time_end: Option<f64>,
}

impl FilterOptions {
    pub fn time(time_start: f64, time_end: f64) -> Self {
        Self {
            time_start: Some(time_start),
            time_end: Some(time_end),
        }
    }

    pub fn accepts_time(&self, t: f64) -> bool {
        self.time_start.map_or(true, |s| t >= s) && self.time_end.map_or(true, |e| t <= e)
    }
}

/// Masking of parameter values by flag: values whose flag is not included come back as NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskOptions {
    pub include_flags: Option<BTreeSet<FlagCode>>,
}

impl MaskOptions {
    pub fn include(flags: impl IntoIterator<Item = FlagCode>) -> Self {
        Self {
            include_flags: Some(flags.into_iter().collect()),
        }
    }

    pub fn admits(&self, flag: &FlagCode) -> bool {
        self.include_flags.as_ref().map_or(true, |set| set.contains(flag))
    }
}

/// Column-oriented result of [`Session::get_data`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataColumns {
    columns: BTreeMap<String, Vec<f64>>,
}

impl DataColumns {
    pub fn insert(&mut self, field: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(field.into(), values);
    }

    pub fn get(&self, field: &str) -> Result<&[f64], SessionError> {
        self.columns
            .get(field)
            .map(|v| v.as_slice())
            .ok_or_else(|| SessionError::InvalidParameter(field.to_string()))
    }

    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, |v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the session knows about one loaded dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub file_id: FileId,
    pub sampling_type: String,
    pub station_name: Option<String>,
    pub file_path: Option<PathBuf>,
    pub settings: Arc<SamplingSettings>,
}

/// Row-aligned join of two datasets. Columns are named `<field>_<file_id>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeTable {
    pub primary: FileId,
    pub reference: FileId,
    columns: BTreeMap<String, Vec<f64>>,
    flags: BTreeMap<String, Vec<FlagCode>>,
}

impl MergeTable {
    pub fn new(primary: FileId, reference: FileId) -> Self {
        Self {
            primary,
            reference,
            columns: BTreeMap::new(),
            flags: BTreeMap::new(),
        }
    }

    pub fn column_name(field: &str, file_id: &FileId) -> String {
        format!("{}_{}", field, file_id)
    }

    pub fn insert_column(&mut self, field: &str, file_id: &FileId, values: Vec<f64>) {
        self.columns.insert(Self::column_name(field, file_id), values);
    }

    pub fn insert_flags(&mut self, field: &str, file_id: &FileId, flags: Vec<FlagCode>) {
        self.flags.insert(Self::column_name(field, file_id), flags);
    }

    pub fn column(&self, field: &str, file_id: &FileId) -> Option<&[f64]> {
        self.columns
            .get(&Self::column_name(field, file_id))
            .map(|v| v.as_slice())
    }

    pub fn flags(&self, field: &str, file_id: &FileId) -> Option<&[FlagCode]> {
        self.flags
            .get(&Self::column_name(field, file_id))
            .map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, |v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Matching parameters used for a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchInfo {
    pub primary: FileId,
    pub reference: FileId,
    pub max_time_diff_s: f64,
    pub max_depth_diff_m: f64,
}

/// Arguments of [`Session::load_file`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadRequest {
    pub sampling_type: String,
    pub data_file_path: PathBuf,
    /// Name of a registered settings profile or path to a YAML profile.
    pub settings_file: String,
    pub reload: bool,
    pub root_directory: Option<PathBuf>,
    /// Extra keyword arguments, e.g. `depth` for fixed platforms.
    pub options: BTreeMap<String, String>,
}

/// Options passed to a QC routine, as stored per user and routine.
pub type QcOptions = BTreeMap<String, serde_json::Value>;

/// The contract the coordinators require from the data layer.
pub trait Session: Send {
    fn sampling_types(&self) -> BTreeSet<String>;

    fn file_ids(&self, sampling_type: &str) -> Vec<FileId>;

    fn parameters(&self, file_id: &FileId) -> Result<Vec<String>, SessionError>;

    /// Columns `fields` of `file_id`, filtered by `filter` and masked by `mask`.
    fn get_data(
        &self,
        file_id: &FileId,
        fields: &[&str],
        filter: &FilterOptions,
        mask: &MaskOptions,
    ) -> Result<DataColumns, SessionError>;

    /// Current flag of every record of `parameter`.
    fn flags(&self, file_id: &FileId, parameter: &str) -> Result<Vec<FlagCode>, SessionError>;

    /// Set `flag` on every record where `mask` is true. Returns the number of records flagged.
    fn flag_data(
        &mut self,
        file_id: &FileId,
        parameter: &str,
        mask: &[bool],
        flag: &FlagCode,
    ) -> Result<usize, SessionError>;

    fn dataset(&self, file_id: &FileId) -> Result<DatasetInfo, SessionError>;

    fn unit(&self, file_id: &FileId, parameter: &str) -> Option<String>;

    fn merge_data(&mut self, file_id: &FileId, ref_file_id: &FileId) -> Result<MergeTable, SessionError>;

    fn match_info(&self, file_id: &FileId, ref_file_id: &FileId) -> Result<MatchInfo, SessionError>;

    /// Ids of the automatic QC routines the session can run.
    fn qc_routines(&self) -> Vec<String>;

    fn run_automatic_qc(
        &mut self,
        file_ids: &[FileId],
        routine: &str,
        options: &QcOptions,
    ) -> Result<(), SessionError>;

    fn remove_file(&mut self, file_id: &FileId) -> Result<(), SessionError>;

    fn load_file(&mut self, request: &LoadRequest) -> Result<FileId, SessionError>;

    /// Write `file_id`, flags included, to `path` in the format `load_file` reads.
    fn save_file(&self, file_id: &FileId, _path: &Path) -> Result<(), SessionError> {
        Err(SessionError::MethodNotImplemented(format!("save_file for {file_id}")))
    }

    /// Re-associate a loaded file with another settings profile.
    fn set_settings(
        &mut self,
        file_id: &FileId,
        _settings: Arc<SamplingSettings>,
    ) -> Result<(), SessionError> {
        Err(SessionError::MethodNotImplemented(format!(
            "set_settings for {file_id}"
        )))
    }

    /// All loaded files as `(sampling_type, file_id)` pairs.
    fn loaded_files(&self) -> Vec<(String, FileId)> {
        let mut out = Vec::new();
        for sampling_type in self.sampling_types() {
            for file_id in self.file_ids(&sampling_type) {
                out.push((sampling_type.clone(), file_id));
            }
        }
        out
    }
}

/// Shared handle to the session, used by the page and the background worker.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Box<dyn Session>>>,
}

impl SessionHandle {
    pub fn new(session: impl Session + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(session))),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&dyn Session) -> R) -> crate::error::Result<R> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| QcError::Internal("session lock poisoned".to_string()))?;
        Ok(f(guard.as_ref()))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut dyn Session) -> R) -> crate::error::Result<R> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| QcError::Internal("session lock poisoned".to_string()))?;
        Ok(f(guard.as_mut()))
    }
}
