//! Batch runner for automatic QC routines.
//!
//! Routines run one after another, each once on all target files. How a
//! failure is handled depends on its kind: a routine lacking its parameter
//! list or save directory is skipped with a warning, a routine that cannot be
//! loaded is skipped, and anything else aborts the batch.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::error::{MissingArgument, SessionError};
use crate::session::{FileId, QcOptions, SessionHandle};

/// What to run and on which files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QcRoutineRequest {
    pub target_file_ids: Vec<FileId>,
    pub routine_ids: Vec<String>,
    /// Stored options per routine id.
    pub options: BTreeMap<String, QcOptions>,
}

impl QcRoutineRequest {
    pub fn new(target_file_ids: Vec<FileId>, routine_ids: Vec<String>) -> Self {
        Self {
            target_file_ids,
            routine_ids,
            options: BTreeMap::new(),
        }
    }

    /// Look up the stored options of every routine.
    pub fn with_options(mut self, option_lookup: impl Fn(&str) -> QcOptions) -> Self {
        for id in &self.routine_ids {
            self.options.insert(id.clone(), option_lookup(id));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QcRunOutcome {
    Success,
    /// Recoverable: the routine was skipped with this warning.
    MissingArgument(String),
    InvalidParameter(String),
    ImportFailure(String),
    UnknownFailure(String),
}

impl QcRunOutcome {
    fn classify(routine: &str, err: SessionError) -> Self {
        match err {
            SessionError::MissingInputArgument(MissingArgument::ParameterList) => {
                QcRunOutcome::MissingArgument(format!("Select parameters for routine {routine}"))
            }
            SessionError::MissingInputArgument(MissingArgument::SaveDirectory) => {
                QcRunOutcome::MissingArgument(format!("Invalid save directory for routine {routine}"))
            }
            SessionError::MissingInputArgument(other) => QcRunOutcome::UnknownFailure(format!(
                "routine {routine} is missing input argument: {other}"
            )),
            SessionError::InvalidParameter(p) => {
                QcRunOutcome::InvalidParameter(format!("routine {routine}: invalid parameter {p}"))
            }
            SessionError::ImportFailure { detail, .. } => {
                QcRunOutcome::ImportFailure(format!("routine {routine} could not be loaded: {detail}"))
            }
            other => QcRunOutcome::UnknownFailure(format!("routine {routine}: {other}")),
        }
    }

    /// The batch stops after this outcome.
    pub fn aborts(&self) -> bool {
        matches!(
            self,
            QcRunOutcome::InvalidParameter(_) | QcRunOutcome::UnknownFailure(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutineReport {
    pub routine: String,
    pub outcome: QcRunOutcome,
}

/// Consolidated result of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub files: Vec<FileId>,
    pub reports: Vec<RoutineReport>,
    pub aborted: Option<String>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| r.outcome == QcRunOutcome::Success)
            .map(|r| r.routine.as_str())
            .collect()
    }

    /// Warnings and skipped routines, in run order.
    pub fn warnings(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter_map(|r| match &r.outcome {
                QcRunOutcome::MissingArgument(w) | QcRunOutcome::ImportFailure(w) => {
                    Some(w.as_str())
                }
                _ => None,
            })
            .collect()
    }

    pub fn any_success(&self) -> bool {
        !self.succeeded().is_empty()
    }

    /// Number of times `routine` was attempted.
    pub fn attempts(&self, routine: &str) -> usize {
        self.reports.iter().filter(|r| r.routine == routine).count()
    }

    /// One message for the user.
    pub fn to_text(&self) -> String {
        let mut lines = vec![format!("Files processed: {}", self.files.len())];
        let ok = self.succeeded();
        lines.push(if ok.is_empty() {
            "No routine succeeded".to_string()
        } else {
            format!("Succeeded: {}", ok.join(", "))
        });
        for w in self.warnings() {
            lines.push(format!("Warning: {w}"));
        }
        if let Some(reason) = &self.aborted {
            lines.push(format!("Aborted: {reason}"));
        }
        lines.join("\n")
    }
}

/// Run every routine of `request` in order.
///
/// The session is locked for one routine at a time, so the page can read it
/// between routines.
pub fn run_batch(session: &SessionHandle, request: &QcRoutineRequest) -> BatchSummary {
    let mut summary = BatchSummary {
        files: request.target_file_ids.clone(),
        ..Default::default()
    };
    let empty = QcOptions::new();
    for routine in &request.routine_ids {
        let options = request.options.get(routine).unwrap_or(&empty);
        info!(
            "running {routine} on {} file(s)",
            request.target_file_ids.len()
        );
        let ran = session.with_mut(|s| s.run_automatic_qc(&request.target_file_ids, routine, options));
        let outcome = match ran {
            Ok(Ok(())) => QcRunOutcome::Success,
            Ok(Err(e)) => QcRunOutcome::classify(routine, e),
            Err(e) => QcRunOutcome::UnknownFailure(format!("routine {routine}: {e}")),
        };
        match &outcome {
            QcRunOutcome::Success => {}
            QcRunOutcome::MissingArgument(w) | QcRunOutcome::ImportFailure(w) => warn!("{w}"),
            QcRunOutcome::InvalidParameter(e) | QcRunOutcome::UnknownFailure(e) => {
                error!("automatic QC aborted: {e} (files {:?}, options {:?})", request.target_file_ids, options);
                summary.aborted = Some(e.clone());
            }
        }
        let stop = outcome.aborts();
        summary.reports.push(RoutineReport {
            routine: routine.clone(),
            outcome,
        });
        if stop {
            break;
        }
    }
    info!(
        "automatic QC done: {} succeeded, {} warnings",
        summary.succeeded().len(),
        summary.warnings().len()
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_recovery_policy() {
        let c = |e| QcRunOutcome::classify("r", e);
        assert!(!c(SessionError::MissingInputArgument(MissingArgument::ParameterList)).aborts());
        assert!(!c(SessionError::MissingInputArgument(MissingArgument::SaveDirectory)).aborts());
        assert!(c(SessionError::MissingInputArgument(MissingArgument::Depth)).aborts());
        assert!(c(SessionError::InvalidParameter("X".into())).aborts());
        assert!(!c(SessionError::ImportFailure {
            routine: "r".into(),
            detail: "gone".into()
        })
        .aborts());
        assert!(c(SessionError::Other("disk full".into())).aborts());
    }

    #[test]
    fn summary_text_lists_everything() {
        let summary = BatchSummary {
            files: vec![FileId::new("a"), FileId::new("b")],
            reports: vec![
                RoutineReport {
                    routine: "range_check".into(),
                    outcome: QcRunOutcome::Success,
                },
                RoutineReport {
                    routine: "spike_check".into(),
                    outcome: QcRunOutcome::MissingArgument("Select parameters".into()),
                },
            ],
            aborted: None,
        };
        let text = summary.to_text();
        assert!(text.contains("Files processed: 2"));
        assert!(text.contains("Succeeded: range_check"));
        assert!(text.contains("Warning: Select parameters"));
        assert!(summary.any_success());
    }
}
