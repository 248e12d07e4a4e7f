//! Comparison of a file against a reference file.
//!
//! Merging two files is expensive, so merged tables are cached per
//! `(primary, reference)` pair and reused until the reference flag selection
//! changes or one of the files is unloaded. Per-parameter views are derived
//! from the cached table.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::data::axis::AxisRange;
use crate::error::{QcError, ReferenceFileError, Result};
use crate::session::{FileId, FlagCode, MergeTable, Session};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergeKey {
    pub primary: FileId,
    pub reference: FileId,
}

/// A merged table plus the bounds derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub table: MergeTable,
    /// Per parameter, extent of both files' values.
    pub value_bounds: BTreeMap<String, AxisRange>,
    /// Extent of the primary file's matched times.
    pub time_bounds: Option<AxisRange>,
}

impl MergeResult {
    pub fn from_table(table: MergeTable, parameters: &[String]) -> Self {
        let mut value_bounds = BTreeMap::new();
        for p in parameters {
            let a = table
                .column(p, &table.primary)
                .and_then(|c| AxisRange::from_values(c));
            let b = table
                .column(p, &table.reference)
                .and_then(|c| AxisRange::from_values(c));
            let bounds = match (a, b) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                (a, b) => a.or(b),
            };
            if let Some(bounds) = bounds {
                value_bounds.insert(p.clone(), bounds);
            }
        }
        let time_bounds = table
            .column("time", &table.primary)
            .and_then(|c| AxisRange::from_values(c));
        Self {
            table,
            value_bounds,
            time_bounds,
        }
    }
}

/// Scatter of primary against reference values for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonView {
    pub parameter: String,
    /// `[reference value, primary value]` pairs grouped by the reference flag.
    pub groups: Vec<(FlagCode, Vec<[f64; 2]>)>,
    /// End points of the 1:1 line.
    pub correlation_line: Option<[[f64; 2]; 2]>,
    pub time_span: Option<AxisRange>,
}

/// Reference files that may be offered for `primary`.
pub fn reference_candidates(
    session: &dyn Session,
    allowed_sampling_types: &[String],
    primary: Option<&FileId>,
) -> Vec<FileId> {
    session
        .loaded_files()
        .into_iter()
        .filter(|(st, _)| allowed_sampling_types.iter().any(|a| a == st))
        .map(|(_, id)| id)
        .filter(|id| Some(id) != primary)
        .collect()
}

struct CacheEntry {
    ref_flag_revision: u64,
    result: MergeResult,
}

#[derive(Default)]
pub struct ComparisonCache {
    entries: BTreeMap<MergeKey, CacheEntry>,
    computations: usize,
}

impl ComparisonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of merges computed through this cache.
    pub fn computations(&self) -> usize {
        self.computations
    }

    /// Validate the pair and return the (possibly cached) merge result.
    pub fn get_comparison(
        &mut self,
        session: &mut dyn Session,
        primary: Option<&FileId>,
        reference: Option<&FileId>,
        ref_flag_revision: u64,
    ) -> Result<&MergeResult> {
        let primary = primary
            .filter(|p| !p.is_empty())
            .ok_or_else(|| QcError::missing("No file selected", "select a file to compare"))?;
        let reference = reference
            .filter(|r| !r.is_empty())
            .ok_or(ReferenceFileError::NotSelected)?;
        if primary == reference {
            return Err(ReferenceFileError::InvalidPair(reference.clone()).into());
        }
        if session.dataset(reference).is_err() {
            return Err(ReferenceFileError::NotLoaded(reference.clone()).into());
        }

        let key = MergeKey {
            primary: primary.clone(),
            reference: reference.clone(),
        };
        let fresh = self
            .entries
            .get(&key)
            .is_some_and(|e| e.ref_flag_revision == ref_flag_revision);
        if !fresh {
            let table = session.merge_data(primary, reference)?;
            let mut parameters = session.parameters(primary)?;
            parameters.retain(|p| table.column(p, reference).is_some());
            self.computations += 1;
            debug!(
                "merged {} with {} ({} rows)",
                primary,
                reference,
                table.len()
            );
            self.entries.insert(
                key.clone(),
                CacheEntry {
                    ref_flag_revision,
                    result: MergeResult::from_table(table, &parameters),
                },
            );
        }
        self.entries
            .get(&key)
            .map(|e| &e.result)
            .ok_or_else(|| QcError::Internal("comparison cache entry vanished".to_string()))
    }

    /// Drop every entry involving `file_id`.
    pub fn discard_file(&mut self, file_id: &FileId) {
        self.entries
            .retain(|k, _| &k.primary != file_id && &k.reference != file_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Derive the view of `parameter` from a cached merge, without merging again.
pub fn comparison_view(
    result: &MergeResult,
    parameter: &str,
    visible_ref_flags: &BTreeSet<FlagCode>,
) -> Result<ComparisonView> {
    let table = &result.table;
    let missing = || {
        QcError::missing(
            "Parameter not comparable",
            format!("{parameter} is not present in both files"),
        )
    };
    let primary = table.column(parameter, &table.primary).ok_or_else(missing)?;
    let reference = table.column(parameter, &table.reference).ok_or_else(missing)?;
    let ref_flags = table.flags(parameter, &table.reference);

    let mut groups: BTreeMap<FlagCode, Vec<[f64; 2]>> = BTreeMap::new();
    for (i, (&p, &r)) in primary.iter().zip(reference).enumerate() {
        if !p.is_finite() || !r.is_finite() {
            continue;
        }
        let flag = ref_flags
            .and_then(|f| f.get(i))
            .cloned()
            .unwrap_or_default();
        if ref_flags.is_some() && !visible_ref_flags.contains(&flag) {
            continue;
        }
        groups.entry(flag).or_default().push([r, p]);
    }

    let correlation_line = result
        .value_bounds
        .get(parameter)
        .map(|b| [[b.minimum(), b.minimum()], [b.maximum(), b.maximum()]]);
    Ok(ComparisonView {
        parameter: parameter.to_string(),
        groups: groups.into_iter().collect(),
        correlation_line,
        time_span: result.time_bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> MergeResult {
        let a = FileId::new("ctd");
        let b = FileId::new("bottle");
        let mut t = MergeTable::new(a.clone(), b.clone());
        t.insert_column("TEMP", &a, vec![1.0, 2.0, 3.0]);
        t.insert_column("TEMP", &b, vec![1.1, f64::NAN, 2.9]);
        t.insert_flags(
            "TEMP",
            &b,
            vec![FlagCode::new("1"), FlagCode::new("1"), FlagCode::new("4")],
        );
        t.insert_column("time", &a, vec![10.0, 20.0, 30.0]);
        MergeResult::from_table(t, &["TEMP".to_string()])
    }

    #[test]
    fn view_groups_by_visible_reference_flag() {
        let r = result();
        assert_eq!(r.value_bounds["TEMP"], AxisRange::new(1.0, 3.0));
        assert_eq!(r.time_bounds, Some(AxisRange::new(10.0, 30.0)));

        let visible: BTreeSet<FlagCode> = [FlagCode::new("1")].into_iter().collect();
        let view = comparison_view(&r, "TEMP", &visible).unwrap();
        assert_eq!(view.groups, vec![(FlagCode::new("1"), vec![[1.1, 1.0]])]);
        assert_eq!(view.correlation_line, Some([[1.0, 1.0], [3.0, 3.0]]));
        assert!(comparison_view(&r, "PSAL", &visible).is_err());
    }
}
