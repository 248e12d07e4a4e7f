//! In-memory session: datasets loaded from tab-separated files.
//!
//! File format: a header row followed by one row per record. Columns `time`
//! (`%Y-%m-%d %H:%M:%S`), `lat`, `lon`, `depth` and an optional `station`
//! are positional; every other column is a parameter. A header cell like
//! `TEMP [degC]` carries the unit. `Q_<parameter>` columns hold flags.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::error::{MissingArgument, SessionError};

use super::{
    DataColumns, DatasetInfo, FileId, FilterOptions, FlagCode, LoadRequest, MaskOptions,
    MatchInfo, MergeTable, QcOptions, QcRoutine, RoutineCatalog, SamplingSettings, Session,
};

const POSITION_FIELDS: [&str; 4] = ["time", "lat", "lon", "depth"];

/// Parse a timestamp as written in data files and range entries.
pub fn parse_timestamp(text: &str) -> Option<f64> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let text = text.trim();
    FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .map(|dt| dt.and_utc().timestamp() as f64)
    })
}

/// One loaded data file.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub file_id: FileId,
    pub sampling_type: String,
    pub station_name: Option<String>,
    pub file_path: Option<PathBuf>,
    pub settings: Arc<SamplingSettings>,
    pub time: Vec<f64>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub depth: Vec<f64>,
    pub parameters: BTreeMap<String, Vec<f64>>,
    pub flags: BTreeMap<String, Vec<FlagCode>>,
    pub units: BTreeMap<String, String>,
}

impl Dataset {
    pub fn new(file_id: FileId, sampling_type: &str, settings: Arc<SamplingSettings>) -> Self {
        Self {
            file_id,
            sampling_type: sampling_type.to_string(),
            station_name: None,
            file_path: None,
            settings,
            time: Vec::new(),
            lat: Vec::new(),
            lon: Vec::new(),
            depth: Vec::new(),
            parameters: BTreeMap::new(),
            flags: BTreeMap::new(),
            units: BTreeMap::new(),
        }
    }

    pub fn with_positions(mut self, time: Vec<f64>, lat: Vec<f64>, lon: Vec<f64>, depth: Vec<f64>) -> Self {
        self.time = time;
        self.lat = lat;
        self.lon = lon;
        self.depth = depth;
        self
    }

    /// Add a parameter column; every record starts unflagged.
    pub fn with_parameter(mut self, name: &str, values: Vec<f64>) -> Self {
        let flags = vec![self.settings.unflagged.clone(); values.len()];
        self.parameters.insert(name.to_string(), values);
        self.flags.insert(name.to_string(), flags);
        self
    }

    pub fn with_unit(mut self, parameter: &str, unit: &str) -> Self {
        self.units.insert(parameter.to_string(), unit.to_string());
        self
    }

    pub fn with_station(mut self, station: &str) -> Self {
        self.station_name = Some(station.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Position, parameter and flag columns all have `len()` entries.
    pub fn check_lengths(&self) -> Result<(), SessionError> {
        let n = self.len();
        let positions = [("lat", &self.lat), ("lon", &self.lon), ("depth", &self.depth)];
        let columns = positions
            .into_iter()
            .map(|(name, col)| (name, col.len()))
            .chain(self.parameters.iter().map(|(name, col)| (name.as_str(), col.len())))
            .chain(self.flags.iter().map(|(name, col)| (name.as_str(), col.len())));
        for (name, len) in columns {
            if len != n {
                return Err(SessionError::Other(format!(
                    "{}: column {name} has {len} values for {n} records",
                    self.file_id
                )));
            }
        }
        Ok(())
    }

    pub fn column(&self, field: &str) -> Option<&[f64]> {
        match field {
            "time" => Some(&self.time),
            "lat" => Some(&self.lat),
            "lon" => Some(&self.lon),
            "depth" => Some(&self.depth),
            other => self.parameters.get(other).map(|v| v.as_slice()),
        }
    }

    /// Parse a tab-separated data file.
    ///
    /// `platform_depth` fills the depth column of files that have none; fixed
    /// platforms without either fail with a missing depth argument.
    pub fn parse_tsv(
        file_id: FileId,
        sampling_type: &str,
        settings: Arc<SamplingSettings>,
        text: &str,
        platform_depth: Option<f64>,
    ) -> Result<Self, SessionError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header_line = lines
            .next()
            .ok_or_else(|| SessionError::Other(format!("{file_id}: empty data file")))?;

        let mut names = Vec::new();
        let mut units = BTreeMap::new();
        for cell in header_line.split('\t') {
            let cell = cell.trim();
            match (cell.find('['), cell.ends_with(']')) {
                (Some(open), true) => {
                    let name = cell[..open].trim().to_string();
                    units.insert(name.clone(), cell[open + 1..cell.len() - 1].trim().to_string());
                    names.push(name);
                }
                _ => names.push(cell.to_string()),
            }
        }

        for required in settings.mandatory_columns.iter().map(|s| s.as_str()).chain(["time"]) {
            if !names.iter().any(|n| n == required) {
                return Err(SessionError::InvalidParameter(required.to_string()));
            }
        }
        for name in &names {
            if let Some(par) = name.strip_prefix("Q_") {
                if !names.iter().any(|n| n == par) {
                    return Err(SessionError::QcFieldError(name.clone()));
                }
            }
        }

        let mut numeric: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut flag_cols: BTreeMap<&str, Vec<FlagCode>> = BTreeMap::new();
        let mut station = None;
        for (row, line) in lines.enumerate() {
            let cells: Vec<&str> = line.split('\t').collect();
            for (col, name) in names.iter().enumerate() {
                let raw = cells.get(col).map(|c| c.trim()).unwrap_or("");
                if name == "station" {
                    if station.is_none() && !raw.is_empty() {
                        station = Some(raw.to_string());
                    }
                } else if let Some(par) = name.strip_prefix("Q_") {
                    let flag = if raw.is_empty() {
                        settings.unflagged.clone()
                    } else {
                        FlagCode::new(raw)
                    };
                    if !settings.has_flag(&flag) {
                        return Err(SessionError::QcFieldError(format!(
                            "{name} row {}: unknown flag {flag}",
                            row + 1
                        )));
                    }
                    flag_cols.entry(par).or_default().push(flag);
                } else {
                    let value = if name == "time" {
                        parse_timestamp(raw)
                    } else if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                        Some(f64::NAN)
                    } else {
                        raw.parse::<f64>().ok()
                    };
                    let value = value.ok_or_else(|| {
                        SessionError::Other(format!("{name} row {}: cannot parse '{raw}'", row + 1))
                    })?;
                    numeric.entry(name.as_str()).or_default().push(value);
                }
            }
        }

        let time = numeric.remove("time").unwrap_or_default();
        let n = time.len();
        let depth = match numeric.remove("depth") {
            Some(d) => d,
            None => match platform_depth {
                Some(d) => vec![d; n],
                None if is_fixed_platform(sampling_type) => {
                    return Err(SessionError::MissingInputArgument(MissingArgument::Depth))
                }
                None => vec![f64::NAN; n],
            },
        };
        let lat = numeric.remove("lat").unwrap_or_else(|| vec![f64::NAN; n]);
        let lon = numeric.remove("lon").unwrap_or_else(|| vec![f64::NAN; n]);

        let mut dataset = Dataset::new(file_id, sampling_type, settings).with_positions(time, lat, lon, depth);
        dataset.station_name = station;
        for (name, values) in numeric {
            let flags = flag_cols
                .remove(name)
                .unwrap_or_else(|| vec![dataset.settings.unflagged.clone(); values.len()]);
            dataset.parameters.insert(name.to_string(), values);
            dataset.flags.insert(name.to_string(), flags);
        }
        for (name, unit) in units {
            if dataset.parameters.contains_key(&name) {
                dataset.units.insert(name, unit);
            }
        }
        Ok(dataset)
    }
}

impl Dataset {
    /// Render in the format [`Dataset::parse_tsv`] reads, flags included.
    pub fn to_tsv(&self) -> String {
        let mut header: Vec<String> = POSITION_FIELDS.iter().map(|f| f.to_string()).collect();
        if self.station_name.is_some() {
            header.push("station".to_string());
        }
        for name in self.parameters.keys() {
            header.push(match self.units.get(name) {
                Some(unit) => format!("{name} [{unit}]"),
                None => name.clone(),
            });
            header.push(format!("Q_{name}"));
        }

        let mut out = header.join("\t");
        out.push('\n');
        for row in 0..self.len() {
            let mut cells = vec![
                format_time(self.time[row]),
                format_value(self.lat[row]),
                format_value(self.lon[row]),
                format_value(self.depth[row]),
            ];
            if let Some(station) = &self.station_name {
                cells.push(station.clone());
            }
            for (name, values) in &self.parameters {
                cells.push(format_value(values[row]));
                cells.push(
                    self.flags
                        .get(name)
                        .map(|f| f[row].to_string())
                        .unwrap_or_default(),
                );
            }
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }
}

fn format_time(t: f64) -> String {
    if !t.is_finite() {
        return String::new();
    }
    chrono::DateTime::from_timestamp(t as i64, 0)
        .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

fn is_fixed_platform(sampling_type: &str) -> bool {
    sampling_type.to_lowercase().contains("fixed platform")
}

/// Session holding every dataset in memory.
pub struct MemorySession {
    datasets: BTreeMap<FileId, Dataset>,
    profiles: BTreeMap<String, Arc<SamplingSettings>>,
    routines: RoutineCatalog,
    /// Maximum time difference (s) for two records to match.
    pub max_time_diff_s: f64,
    /// Maximum depth difference (m) for two records to match.
    pub max_depth_diff_m: f64,
    merge_count: usize,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    pub fn new() -> Self {
        Self {
            datasets: BTreeMap::new(),
            profiles: BTreeMap::new(),
            routines: RoutineCatalog::builtin(),
            max_time_diff_s: 3600.0,
            max_depth_diff_m: 2.0,
            merge_count: 0,
        }
    }

    /// Add or replace a dataset. Every column must have one value per record.
    pub fn insert_dataset(&mut self, dataset: Dataset) -> Result<(), SessionError> {
        dataset.check_lengths()?;
        self.datasets.insert(dataset.file_id.clone(), dataset);
        Ok(())
    }

    pub fn register_profile(&mut self, settings: SamplingSettings) {
        self.profiles.insert(settings.name.clone(), Arc::new(settings));
    }

    pub fn register_routine(&mut self, routine: Box<dyn QcRoutine>) {
        self.routines.register(routine);
    }

    pub fn routines_mut(&mut self) -> &mut RoutineCatalog {
        &mut self.routines
    }

    pub fn dataset_ref(&self, file_id: &FileId) -> Option<&Dataset> {
        self.datasets.get(file_id)
    }

    /// Number of merges computed so far.
    pub fn merge_count(&self) -> usize {
        self.merge_count
    }

    fn get(&self, file_id: &FileId) -> Result<&Dataset, SessionError> {
        self.datasets
            .get(file_id)
            .ok_or_else(|| SessionError::UnknownFile(file_id.clone()))
    }

    fn get_mut(&mut self, file_id: &FileId) -> Result<&mut Dataset, SessionError> {
        self.datasets
            .get_mut(file_id)
            .ok_or_else(|| SessionError::UnknownFile(file_id.clone()))
    }

    fn resolve_settings(&self, request: &LoadRequest) -> Result<Arc<SamplingSettings>, SessionError> {
        let name = request.settings_file.trim();
        if name.is_empty() {
            return Ok(Arc::new(SamplingSettings::standard(&request.sampling_type)));
        }
        if let Some(p) = self.profiles.get(name) {
            return Ok(p.clone());
        }
        let mut path = PathBuf::from(name);
        if path.is_relative() {
            if let Some(root) = &request.root_directory {
                path = root.join(path);
            }
        }
        let text = read_text(&path)?;
        Ok(Arc::new(SamplingSettings::from_yaml(&text)?))
    }

    /// Find the reference row matching each primary row: closest depth, then closest time.
    fn match_rows(&self, primary: &Dataset, reference: &Dataset) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..primary.len() {
            let mut best: Option<(f64, f64, usize)> = None;
            for j in 0..reference.len() {
                let dt = (primary.time[i] - reference.time[j]).abs();
                if !(dt <= self.max_time_diff_s) {
                    continue;
                }
                let dd = (primary.depth[i] - reference.depth[j]).abs();
                let dd = if dd.is_nan() { 0.0 } else { dd };
                if dd > self.max_depth_diff_m {
                    continue;
                }
                if best.map_or(true, |(bd, bt, _)| (dd, dt) < (bd, bt)) {
                    best = Some((dd, dt, j));
                }
            }
            if let Some((_, _, j)) = best {
                pairs.push((i, j));
            }
        }
        pairs
    }
}

fn read_text(path: &Path) -> Result<String, SessionError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SessionError::MissingPath(path.display().to_string()),
        _ => SessionError::Other(format!("{}: {e}", path.display())),
    })
}

fn add_to_merge(table: &mut MergeTable, dataset: &Dataset, rows: &[usize]) {
    let pick = |col: &[f64]| rows.iter().map(|&r| col[r]).collect::<Vec<_>>();
    for field in POSITION_FIELDS {
        if let Some(col) = dataset.column(field) {
            table.insert_column(field, &dataset.file_id, pick(col));
        }
    }
    for (name, values) in &dataset.parameters {
        table.insert_column(name, &dataset.file_id, pick(values));
        if let Some(flags) = dataset.flags.get(name) {
            table.insert_flags(
                name,
                &dataset.file_id,
                rows.iter().map(|&r| flags[r].clone()).collect(),
            );
        }
    }
}

impl Session for MemorySession {
    fn sampling_types(&self) -> BTreeSet<String> {
        self.datasets.values().map(|d| d.sampling_type.clone()).collect()
    }

    fn file_ids(&self, sampling_type: &str) -> Vec<FileId> {
        self.datasets
            .values()
            .filter(|d| d.sampling_type == sampling_type)
            .map(|d| d.file_id.clone())
            .collect()
    }

    fn parameters(&self, file_id: &FileId) -> Result<Vec<String>, SessionError> {
        Ok(self.get(file_id)?.parameters.keys().cloned().collect())
    }

    fn get_data(
        &self,
        file_id: &FileId,
        fields: &[&str],
        filter: &FilterOptions,
        mask: &MaskOptions,
    ) -> Result<DataColumns, SessionError> {
        let ds = self.get(file_id)?;
        let rows: Vec<usize> = (0..ds.len()).filter(|&i| filter.accepts_time(ds.time[i])).collect();
        let mut out = DataColumns::default();
        for &field in fields {
            let col = ds
                .column(field)
                .ok_or_else(|| SessionError::InvalidParameter(field.to_string()))?;
            let flags = ds.flags.get(field);
            let values = rows
                .iter()
                .map(|&i| match flags {
                    Some(f) if !mask.admits(&f[i]) => f64::NAN,
                    _ => col[i],
                })
                .collect();
            out.insert(field, values);
        }
        Ok(out)
    }

    fn flags(&self, file_id: &FileId, parameter: &str) -> Result<Vec<FlagCode>, SessionError> {
        self.get(file_id)?
            .flags
            .get(parameter)
            .cloned()
            .ok_or_else(|| SessionError::InvalidParameter(parameter.to_string()))
    }

    fn flag_data(
        &mut self,
        file_id: &FileId,
        parameter: &str,
        mask: &[bool],
        flag: &FlagCode,
    ) -> Result<usize, SessionError> {
        let ds = self.get_mut(file_id)?;
        if !ds.settings.has_flag(flag) {
            return Err(SessionError::InvalidOption(format!("unknown flag {flag}")));
        }
        let flags = ds
            .flags
            .get_mut(parameter)
            .ok_or_else(|| SessionError::InvalidParameter(parameter.to_string()))?;
        if flags.len() != mask.len() {
            return Err(SessionError::InvalidOption(format!(
                "mask length {} does not match {} records",
                mask.len(),
                flags.len()
            )));
        }
        let mut n = 0;
        for (f, _) in flags.iter_mut().zip(mask).filter(|(_, m)| **m) {
            *f = flag.clone();
            n += 1;
        }
        debug!("flagged {n} records of {file_id}/{parameter} as {flag}");
        Ok(n)
    }

    fn dataset(&self, file_id: &FileId) -> Result<DatasetInfo, SessionError> {
        let ds = self.get(file_id)?;
        Ok(DatasetInfo {
            file_id: ds.file_id.clone(),
            sampling_type: ds.sampling_type.clone(),
            station_name: ds.station_name.clone(),
            file_path: ds.file_path.clone(),
            settings: ds.settings.clone(),
        })
    }

    fn unit(&self, file_id: &FileId, parameter: &str) -> Option<String> {
        self.datasets.get(file_id)?.units.get(parameter).cloned()
    }

    fn merge_data(&mut self, file_id: &FileId, ref_file_id: &FileId) -> Result<MergeTable, SessionError> {
        let primary = self.get(file_id)?;
        let reference = self.get(ref_file_id)?;
        let pairs = self.match_rows(primary, reference);
        let (p_rows, r_rows): (Vec<usize>, Vec<usize>) = pairs.into_iter().unzip();
        let mut table = MergeTable::new(file_id.clone(), ref_file_id.clone());
        add_to_merge(&mut table, primary, &p_rows);
        add_to_merge(&mut table, reference, &r_rows);
        self.merge_count += 1;
        debug!("merged {file_id} with {ref_file_id}: {} matched rows", p_rows.len());
        Ok(table)
    }

    fn match_info(&self, file_id: &FileId, ref_file_id: &FileId) -> Result<MatchInfo, SessionError> {
        self.get(file_id)?;
        self.get(ref_file_id)?;
        Ok(MatchInfo {
            primary: file_id.clone(),
            reference: ref_file_id.clone(),
            max_time_diff_s: self.max_time_diff_s,
            max_depth_diff_m: self.max_depth_diff_m,
        })
    }

    fn qc_routines(&self) -> Vec<String> {
        self.routines.ids()
    }

    fn run_automatic_qc(
        &mut self,
        file_ids: &[FileId],
        routine: &str,
        options: &QcOptions,
    ) -> Result<(), SessionError> {
        // Routines work on copies; nothing is committed unless every file passes.
        let mut staged = Vec::with_capacity(file_ids.len());
        for id in file_ids {
            staged.push(self.get(id)?.clone());
        }
        let routine = self.routines.get(routine)?;
        for ds in staged.iter_mut() {
            routine.run(ds, options)?;
            ds.check_lengths()?;
        }
        for ds in staged {
            self.datasets.insert(ds.file_id.clone(), ds);
        }
        Ok(())
    }

    fn remove_file(&mut self, file_id: &FileId) -> Result<(), SessionError> {
        self.datasets
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| SessionError::UnknownFile(file_id.clone()))
    }

    fn load_file(&mut self, request: &LoadRequest) -> Result<FileId, SessionError> {
        let path = match &request.root_directory {
            Some(root) if request.data_file_path.is_relative() => root.join(&request.data_file_path),
            _ => request.data_file_path.clone(),
        };
        let file_id = path
            .file_stem()
            .map(|s| FileId::new(s.to_string_lossy()))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SessionError::MissingPath(path.display().to_string()))?;
        if self.datasets.contains_key(&file_id) && !request.reload {
            return Ok(file_id);
        }
        let settings = self.resolve_settings(request)?;
        let text = read_text(&path)?;
        let platform_depth = match request.options.get("depth") {
            Some(d) => Some(d.trim().parse::<f64>().map_err(|_| {
                SessionError::InvalidOption(format!("depth '{d}' is not a number"))
            })?),
            None => None,
        };
        let mut dataset = Dataset::parse_tsv(
            file_id.clone(),
            &request.sampling_type,
            settings,
            &text,
            platform_depth,
        )?;
        dataset.file_path = Some(path);
        info!(
            "loaded {} ({}, {} records, {} parameters)",
            file_id,
            request.sampling_type,
            dataset.len(),
            dataset.parameters.len()
        );
        self.insert_dataset(dataset)?;
        Ok(file_id)
    }

    fn save_file(&self, file_id: &FileId, path: &Path) -> Result<(), SessionError> {
        let dataset = self.get(file_id)?;
        dataset.check_lengths()?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(SessionError::MissingInputArgument(MissingArgument::SaveDirectory));
            }
        }
        std::fs::write(path, dataset.to_tsv())
            .map_err(|e| SessionError::Other(format!("{}: {e}", path.display())))?;
        info!("saved {file_id} to {}", path.display());
        Ok(())
    }

    fn set_settings(
        &mut self,
        file_id: &FileId,
        settings: Arc<SamplingSettings>,
    ) -> Result<(), SessionError> {
        self.get_mut(file_id)?.settings = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FERRYBOX: &str = "time\tlat\tlon\tTEMP [degC]\tQ_TEMP\n\
2018-01-01 00:00:00\t57.0\t11.0\t5.0\t1\n\
2018-01-01 00:01:00\t57.1\t11.1\t5.5\t\n\
2018-01-01 00:02:00\t57.2\t11.2\tNaN\t4\n";

    fn settings() -> Arc<SamplingSettings> {
        Arc::new(SamplingSettings::standard("ferrybox"))
    }

    #[test]
    fn parses_tsv_with_units_and_flags() {
        let ds = Dataset::parse_tsv(FileId::new("fb"), "Ferrybox CMEMS", settings(), FERRYBOX, None).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.units.get("TEMP").map(|s| s.as_str()), Some("degC"));
        let flags: Vec<&str> = ds.flags["TEMP"].iter().map(|f| f.as_str()).collect();
        assert_eq!(flags, vec!["1", "0", "4"]);
        assert!(ds.parameters["TEMP"][2].is_nan());
        assert!(ds.depth.iter().all(|d| d.is_nan()));
        assert_eq!(ds.time[1] - ds.time[0], 60.0);
    }

    #[test]
    fn fixed_platform_without_depth_needs_argument() {
        let err = Dataset::parse_tsv(FileId::new("fp"), "Fixed platforms", settings(), FERRYBOX, None)
            .unwrap_err();
        assert_eq!(err, SessionError::MissingInputArgument(MissingArgument::Depth));
        let ds = Dataset::parse_tsv(FileId::new("fp"), "Fixed platforms", settings(), FERRYBOX, Some(3.0))
            .unwrap();
        assert_eq!(ds.depth, vec![3.0; 3]);
    }

    #[test]
    fn orphan_flag_column_is_a_qc_field_error() {
        let text = "time\tQ_DOXY\n2018-01-01 00:00:00\t1\n";
        let err = Dataset::parse_tsv(FileId::new("x"), "CTD", settings(), text, None).unwrap_err();
        assert_eq!(err, SessionError::QcFieldError("Q_DOXY".to_string()));
    }

    #[test]
    fn get_data_filters_time_and_masks_flags() {
        let mut session = MemorySession::new();
        session.insert_dataset(
            Dataset::parse_tsv(FileId::new("fb"), "Ferrybox CMEMS", settings(), FERRYBOX, None).unwrap(),
        ).unwrap();
        let id = FileId::new("fb");
        let t0 = parse_timestamp("2018-01-01 00:00:00").unwrap();
        let data = session
            .get_data(
                &id,
                &["time", "TEMP"],
                &FilterOptions::time(t0, t0 + 60.0),
                &MaskOptions::include([FlagCode::new("1")]),
            )
            .unwrap();
        assert_eq!(data.len(), 2);
        let temp = data.get("TEMP").unwrap();
        assert_eq!(temp[0], 5.0);
        assert!(temp[1].is_nan());
        assert!(matches!(
            session.get_data(&id, &["DOXY"], &FilterOptions::default(), &MaskOptions::default()),
            Err(SessionError::InvalidParameter(_))
        ));
    }

    #[test]
    fn merge_matches_nearest_depth_within_time_window() {
        let s = settings();
        let mut session = MemorySession::new();
        session.insert_dataset(
            Dataset::new(FileId::new("ctd"), "CTD SHARK", s.clone())
                .with_positions(vec![0.0; 3], vec![57.0; 3], vec![11.0; 3], vec![1.0, 5.0, 10.0])
                .with_parameter("TEMP", vec![10.0, 9.0, 8.0]),
        ).unwrap();
        session.insert_dataset(
            Dataset::new(FileId::new("bottle"), "PhysicalChemical", s)
                .with_positions(vec![600.0, 600.0], vec![57.0; 2], vec![11.0; 2], vec![0.5, 9.0])
                .with_parameter("TEMP", vec![10.2, 7.9]),
        ).unwrap();
        let table = session
            .merge_data(&FileId::new("ctd"), &FileId::new("bottle"))
            .unwrap();
        assert_eq!(session.merge_count(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("TEMP", &FileId::new("ctd")), Some(&[10.0, 8.0][..]));
        assert_eq!(table.column("TEMP", &FileId::new("bottle")), Some(&[10.2, 7.9][..]));
    }

    #[test]
    fn load_file_reports_missing_path() {
        let mut session = MemorySession::new();
        let err = session
            .load_file(&LoadRequest {
                sampling_type: "CTD".into(),
                data_file_path: PathBuf::from("/definitely/not/here.txt"),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingPath(_)));
    }

    #[test]
    fn short_column_is_rejected_on_insert() {
        let mut session = MemorySession::new();
        let mut ds = Dataset::new(FileId::new("ctd"), "CTD", settings())
            .with_positions(vec![0.0; 3], vec![57.0; 3], vec![11.0; 3], vec![1.0, 2.0, 3.0])
            .with_parameter("TEMP", vec![10.0, 9.0, 8.0]);
        ds.parameters.insert("SALT".to_string(), vec![35.0]);
        assert!(matches!(session.insert_dataset(ds), Err(SessionError::Other(_))));
        assert!(session.loaded_files().is_empty());
    }

    #[test]
    fn failed_routine_leaves_every_file_unchanged() {
        let mut session = MemorySession::new();
        for name in ["a", "b"] {
            session
                .insert_dataset(
                    Dataset::new(FileId::new(name), "CTD", settings())
                        .with_positions(vec![0.0; 2], vec![57.0; 2], vec![11.0; 2], vec![1.0, 2.0])
                        .with_parameter("TEMP", vec![5.0, 9.0]),
                )
                .unwrap();
        }
        session
            .datasets
            .get_mut(&FileId::new("b"))
            .unwrap()
            .parameters
            .remove("TEMP");
        session.datasets.get_mut(&FileId::new("b")).unwrap().flags.remove("TEMP");

        let options: QcOptions =
            serde_json::from_value(serde_json::json!({"parameters": ["TEMP"], "max": 6.0})).unwrap();
        let ids = [FileId::new("a"), FileId::new("b")];
        let err = session.run_automatic_qc(&ids, "range_check", &options).unwrap_err();
        assert!(matches!(err, SessionError::InvalidParameter(_)));
        let flags: Vec<String> = session
            .flags(&ids[0], "TEMP")
            .unwrap()
            .iter()
            .map(|f| f.to_string())
            .collect();
        assert!(flags.iter().all(|f| f != "4"), "{flags:?}");
    }

    #[test]
    fn saved_file_reads_back_with_flags() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MemorySession::new();
        let ds = Dataset::parse_tsv(FileId::new("fb"), "Ferrybox CMEMS", settings(), FERRYBOX, None)
            .unwrap()
            .with_station("Skagerrak");
        session.insert_dataset(ds).unwrap();
        let id = FileId::new("fb");
        session
            .flag_data(&id, "TEMP", &[false, true, false], &FlagCode::new("3"))
            .unwrap();

        let path = dir.path().join("fb.txt");
        session.save_file(&id, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("time\tlat\tlon\tdepth\tstation\tTEMP [degC]\tQ_TEMP\n"));

        let back = Dataset::parse_tsv(id.clone(), "Ferrybox CMEMS", settings(), &text, None).unwrap();
        let before = session.dataset_ref(&id).unwrap();
        assert_eq!(back.time, before.time);
        assert_eq!(back.lat, before.lat);
        assert_eq!(back.lon, before.lon);
        assert!(back.depth.iter().all(|d| d.is_nan()));
        assert_eq!(back.station_name.as_deref(), Some("Skagerrak"));
        assert_eq!(back.units, before.units);
        assert_eq!(back.flags, before.flags);
        let flags: Vec<&str> = back.flags["TEMP"].iter().map(|f| f.as_str()).collect();
        assert_eq!(flags, vec!["1", "3", "4"]);
        assert_eq!(back.parameters["TEMP"][..2], before.parameters["TEMP"][..2]);
        assert!(back.parameters["TEMP"][2].is_nan());
    }

    #[test]
    fn save_into_missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MemorySession::new();
        session
            .insert_dataset(
                Dataset::parse_tsv(FileId::new("fb"), "Ferrybox CMEMS", settings(), FERRYBOX, None).unwrap(),
            )
            .unwrap();
        let err = session
            .save_file(&FileId::new("fb"), &dir.path().join("gone").join("fb.txt"))
            .unwrap_err();
        assert_eq!(err, SessionError::MissingInputArgument(MissingArgument::SaveDirectory));
        assert!(matches!(
            session.save_file(&FileId::new("nope"), &dir.path().join("x.txt")),
            Err(SessionError::UnknownFile(_))
        ));
    }
}
