//! Automatic QC routines run by [`MemorySession`](super::MemorySession).
//!
//! A routine works on one dataset at a time and reads its settings from the
//! per-user option map. Routines whose implementation could not be loaded can
//! still be registered; running them reports an import failure.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{MissingArgument, SessionError};

use super::{Dataset, FlagCode, QcOptions};

/// One pluggable automatic QC check.
pub trait QcRoutine: Send {
    fn id(&self) -> &str;

    fn run(&self, dataset: &mut Dataset, options: &QcOptions) -> Result<(), SessionError>;
}

/// The routines a session can run, by id.
#[derive(Default)]
pub struct RoutineCatalog {
    routines: BTreeMap<String, Box<dyn QcRoutine>>,
    unavailable: BTreeMap<String, String>,
}

impl RoutineCatalog {
    /// Catalog with the built-in checks.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        catalog.register(Box::new(RangeCheck));
        catalog.register(Box::new(SpikeCheck));
        catalog.register(Box::new(MissingValueCheck));
        catalog
    }

    pub fn register(&mut self, routine: Box<dyn QcRoutine>) {
        let id = routine.id().to_string();
        self.unavailable.remove(&id);
        self.routines.insert(id, routine);
    }

    /// Advertise a routine whose implementation is missing.
    pub fn register_unavailable(&mut self, id: &str, detail: &str) {
        self.routines.remove(id);
        self.unavailable.insert(id.to_string(), detail.to_string());
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .routines
            .keys()
            .chain(self.unavailable.keys())
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn get(&self, id: &str) -> Result<&dyn QcRoutine, SessionError> {
        if let Some(r) = self.routines.get(id) {
            return Ok(r.as_ref());
        }
        let detail = self
            .unavailable
            .get(id)
            .cloned()
            .unwrap_or_else(|| "no such routine".to_string());
        Err(SessionError::ImportFailure {
            routine: id.to_string(),
            detail,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Option helpers
// ─────────────────────────────────────────────────────────────────────────────

/// The `parameters` option: a non-empty list of parameter names.
pub fn parameter_list(options: &QcOptions) -> Result<Vec<String>, SessionError> {
    let list: Vec<String> = options
        .get("parameters")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();
    if list.is_empty() {
        return Err(SessionError::MissingInputArgument(
            MissingArgument::ParameterList,
        ));
    }
    Ok(list)
}

/// The optional `save_directory` option; must name an existing directory when set.
pub fn save_directory(options: &QcOptions) -> Result<Option<PathBuf>, SessionError> {
    let Some(value) = options.get("save_directory") else {
        return Ok(None);
    };
    let dir = value.as_str().map(PathBuf::from).filter(|p| p.is_dir());
    match dir {
        Some(d) => Ok(Some(d)),
        None => Err(SessionError::MissingInputArgument(
            MissingArgument::SaveDirectory,
        )),
    }
}

fn number(options: &QcOptions, key: &str) -> Result<Option<f64>, SessionError> {
    match options.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| SessionError::InvalidOption(format!("{key} must be a number"))),
    }
}

fn flag_option(
    dataset: &Dataset,
    options: &QcOptions,
    default: &str,
) -> Result<FlagCode, SessionError> {
    let flag = options
        .get("flag")
        .and_then(|v| v.as_str())
        .map(FlagCode::new)
        .unwrap_or_else(|| FlagCode::new(default));
    if !dataset.settings.has_flag(&flag) {
        return Err(SessionError::InvalidOption(format!(
            "flag {flag} is not defined in settings {}",
            dataset.settings.name
        )));
    }
    Ok(flag)
}

fn apply_flags(
    dataset: &mut Dataset,
    parameter: &str,
    flag: &FlagCode,
    hit: impl Fn(usize, &[f64]) -> bool,
) -> Result<usize, SessionError> {
    let values = dataset
        .parameters
        .get(parameter)
        .ok_or_else(|| SessionError::InvalidParameter(parameter.to_string()))?
        .clone();
    let flags = dataset
        .flags
        .get_mut(parameter)
        .ok_or_else(|| SessionError::QcFieldError(format!("Q_{parameter}")))?;
    let mut n = 0;
    for (i, f) in flags.iter_mut().enumerate() {
        if hit(i, &values) {
            *f = flag.clone();
            n += 1;
        }
    }
    Ok(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in routines
// ─────────────────────────────────────────────────────────────────────────────

/// Flags values outside `[min, max]`.
pub struct RangeCheck;

impl QcRoutine for RangeCheck {
    fn id(&self) -> &str {
        "range_check"
    }

    fn run(&self, dataset: &mut Dataset, options: &QcOptions) -> Result<(), SessionError> {
        let parameters = parameter_list(options)?;
        let save_dir = save_directory(options)?;
        let min = number(options, "min")?;
        let max = number(options, "max")?;
        if min.is_none() && max.is_none() {
            return Err(SessionError::InvalidOption(
                "range_check needs min and/or max".to_string(),
            ));
        }
        let lo = min.unwrap_or(f64::NEG_INFINITY);
        let hi = max.unwrap_or(f64::INFINITY);
        let flag = flag_option(dataset, options, "4")?;

        let mut report = String::new();
        for parameter in &parameters {
            let n = apply_flags(dataset, parameter, &flag, |i, v| {
                !v[i].is_nan() && (v[i] < lo || v[i] > hi)
            })?;
            report.push_str(&format!("{parameter}\t{n}\n"));
        }
        if let Some(dir) = save_dir {
            let path = dir.join(format!("{}_range_check.txt", dataset.file_id));
            std::fs::write(&path, report)
                .map_err(|e| SessionError::Other(format!("{}: {e}", path.display())))?;
        }
        Ok(())
    }
}

/// Flags single-point spikes whose deviation from the neighbour mean exceeds `threshold`.
pub struct SpikeCheck;

impl QcRoutine for SpikeCheck {
    fn id(&self) -> &str {
        "spike_check"
    }

    fn run(&self, dataset: &mut Dataset, options: &QcOptions) -> Result<(), SessionError> {
        let parameters = parameter_list(options)?;
        let threshold = number(options, "threshold")?.ok_or_else(|| {
            SessionError::InvalidOption("spike_check needs a threshold".to_string())
        })?;
        let flag = flag_option(dataset, options, "3")?;
        for parameter in &parameters {
            apply_flags(dataset, parameter, &flag, |i, v| {
                if i == 0 || i + 1 >= v.len() {
                    return false;
                }
                let (prev, cur, next) = (v[i - 1], v[i], v[i + 1]);
                let spike = (cur - (prev + next) / 2.0).abs() - ((next - prev) / 2.0).abs();
                spike > threshold
            })?;
        }
        Ok(())
    }
}

/// Flags NaN values as missing.
pub struct MissingValueCheck;

impl QcRoutine for MissingValueCheck {
    fn id(&self) -> &str {
        "missing_value"
    }

    fn run(&self, dataset: &mut Dataset, options: &QcOptions) -> Result<(), SessionError> {
        let parameters = parameter_list(options)?;
        let flag = flag_option(dataset, options, "9")?;
        for parameter in &parameters {
            apply_flags(dataset, parameter, &flag, |i, v| v[i].is_nan())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FileId, SamplingSettings};
    use serde_json::json;
    use std::sync::Arc;

    fn dataset(values: Vec<f64>) -> Dataset {
        let n = values.len();
        Dataset::new(
            FileId::new("f"),
            "Ferrybox CMEMS",
            Arc::new(SamplingSettings::standard("ferrybox")),
        )
        .with_positions(
            (0..n).map(|i| i as f64 * 60.0).collect(),
            vec![57.0; n],
            vec![11.0; n],
            vec![4.0; n],
        )
        .with_parameter("TEMP", values)
    }

    fn opts(v: serde_json::Value) -> QcOptions {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn range_check_flags_outside_values() {
        let mut ds = dataset(vec![1.0, 5.0, 12.0, f64::NAN]);
        RangeCheck
            .run(&mut ds, &opts(json!({"parameters": ["TEMP"], "min": 0.0, "max": 10.0})))
            .unwrap();
        let flags: Vec<&str> = ds.flags["TEMP"].iter().map(|f| f.as_str()).collect();
        assert_eq!(flags, vec!["0", "0", "4", "0"]);
    }

    #[test]
    fn missing_parameter_list_is_tagged() {
        let mut ds = dataset(vec![1.0]);
        let err = RangeCheck.run(&mut ds, &opts(json!({"max": 1.0}))).unwrap_err();
        assert_eq!(
            err,
            SessionError::MissingInputArgument(MissingArgument::ParameterList)
        );
    }

    #[test]
    fn bad_save_directory_is_tagged() {
        let mut ds = dataset(vec![1.0]);
        let err = RangeCheck
            .run(
                &mut ds,
                &opts(json!({"parameters": ["TEMP"], "max": 1.0, "save_directory": "/nonexistent/dir/x"})),
            )
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::MissingInputArgument(MissingArgument::SaveDirectory)
        );
    }

    #[test]
    fn unknown_parameter_is_invalid() {
        let mut ds = dataset(vec![1.0]);
        let err = MissingValueCheck
            .run(&mut ds, &opts(json!({"parameters": ["DOXY"]})))
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidParameter("DOXY".to_string()));
    }

    #[test]
    fn spike_check_flags_isolated_peak() {
        let mut ds = dataset(vec![10.0, 10.1, 15.0, 10.2, 10.3]);
        SpikeCheck
            .run(&mut ds, &opts(json!({"parameters": ["TEMP"], "threshold": 2.0})))
            .unwrap();
        let flags: Vec<&str> = ds.flags["TEMP"].iter().map(|f| f.as_str()).collect();
        assert_eq!(flags, vec!["0", "0", "3", "0", "0"]);
    }

    #[test]
    fn unavailable_routine_reports_import_failure() {
        let mut catalog = RoutineCatalog::builtin();
        catalog.register_unavailable("gradient_check", "module not installed");
        assert!(catalog.ids().contains(&"gradient_check".to_string()));
        match catalog.get("gradient_check") {
            Err(SessionError::ImportFailure { routine, detail }) => {
                assert_eq!(routine, "gradient_check");
                assert_eq!(detail, "module not installed");
            }
            _ => panic!("expected import failure"),
        }
        assert!(matches!(
            catalog.get("nope"),
            Err(SessionError::ImportFailure { .. })
        ));
    }
}
