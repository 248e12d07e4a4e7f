//! Flagging of a drawn range.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::data::axis::AxisRange;
use crate::data::selection::SelectionState;
use crate::error::{QcError, Result};
use crate::session::{FileId, FilterOptions, FlagCode, MaskOptions, Session};

/// A rectangle drawn on the plot: depth/time part and value part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSpec {
    pub axis_range: AxisRange,
    pub value_range: AxisRange,
}

/// What a flag operation did.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagOutcome {
    pub file_id: FileId,
    pub parameter: String,
    pub flag: FlagCode,
    pub flagged: usize,
    /// Dependent parameters flagged with the same mask, with their counts.
    pub dependents: Vec<(String, usize)>,
    /// Plots bound to this file must be redrawn.
    pub redraw: FileId,
}

/// Records inside `spec` (inclusive) whose current flag is visible.
pub fn range_mask(
    axis_values: &[f64],
    values: &[f64],
    flags: &[FlagCode],
    spec: &RangeSpec,
    visible: &BTreeSet<FlagCode>,
) -> Vec<bool> {
    axis_values
        .iter()
        .zip(values)
        .zip(flags)
        .map(|((&a, &v), f)| {
            spec.axis_range.contains(a) && spec.value_range.contains(v) && visible.contains(f)
        })
        .collect()
}

/// Apply `flag` to every visible record of `parameter` inside the drawn range.
///
/// Fails with [`QcError::NoRangeSelection`] when nothing is drawn. On success
/// the drawn range is cleared.
pub fn flag_selection(
    session: &mut dyn Session,
    selection: &mut SelectionState,
    axis_field: &str,
    visible: &BTreeSet<FlagCode>,
    flag: &FlagCode,
) -> Result<FlagOutcome> {
    let file_id = selection
        .current_file_id()
        .cloned()
        .ok_or_else(|| QcError::missing("No file selected", "select a file to flag"))?;
    let parameter = selection
        .current_parameter()
        .map(str::to_string)
        .ok_or_else(|| QcError::missing("No parameter selected", "select a parameter to flag"))?;
    let spec = selection.range_spec().ok_or(QcError::NoRangeSelection)?;
    debug!("flag {file_id}/{parameter} as {flag} in {:?}", spec);

    let data = session.get_data(
        &file_id,
        &[axis_field, parameter.as_str()],
        &FilterOptions::default(),
        &MaskOptions::default(),
    )?;
    let flags = session.flags(&file_id, &parameter)?;
    let mask = range_mask(
        data.get(axis_field)?,
        data.get(&parameter)?,
        &flags,
        &spec,
        visible,
    );
    let flagged = session.flag_data(&file_id, &parameter, &mask, flag)?;

    let settings = session.dataset(&file_id)?.settings;
    let available = session.parameters(&file_id)?;
    let mut dependents = Vec::new();
    for dep in settings.dependents_of(&parameter) {
        if !available.contains(dep) {
            warn!("dependent parameter {dep} of {parameter} not in {file_id}");
            continue;
        }
        let n = session.flag_data(&file_id, dep, &mask, flag)?;
        dependents.push((dep.clone(), n));
    }

    selection.clear_flag_ranges();
    info!("flagged {flagged} records of {file_id}/{parameter} as {flag}");
    Ok(FlagOutcome {
        redraw: file_id.clone(),
        file_id,
        parameter,
        flag: flag.clone(),
        flagged,
        dependents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_is_inclusive_and_respects_visibility() {
        let spec = RangeSpec {
            axis_range: AxisRange::new(1.0, 3.0),
            value_range: AxisRange::new(10.0, 20.0),
        };
        let visible: BTreeSet<FlagCode> = [FlagCode::new("0")].into_iter().collect();
        let flags = vec![
            FlagCode::new("0"),
            FlagCode::new("0"),
            FlagCode::new("4"),
            FlagCode::new("0"),
            FlagCode::new("0"),
        ];
        let mask = range_mask(
            &[1.0, 3.0, 2.0, 2.0, 4.0],
            &[10.0, 20.0, 15.0, f64::NAN, 15.0],
            &flags,
            &spec,
            &visible,
        );
        assert_eq!(mask, vec![true, true, false, false, false]);
    }
}
