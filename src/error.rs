//! Error types for the session boundary and the QC coordinators.
//!
//! The session reports failures as a closed set of tagged variants
//! ([`SessionError`]); the coordinators wrap them into the user-facing
//! taxonomy of [`QcError`]. Only the page controller turns a `QcError` into
//! something the user sees.

use thiserror::Error;

use crate::session::FileId;

/// Result type used by the coordinators and the page controller.
pub type Result<T> = std::result::Result<T, QcError>;

/// Which required input a session operation was missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingArgument {
    /// A QC routine needs a list of parameters and none was configured.
    ParameterList,
    /// A QC routine needs an output directory and the configured one is unusable.
    SaveDirectory,
    /// Fixed-platform files need the platform depth.
    Depth,
    /// Anything else; carries the name reported by the session.
    Other(String),
}

impl std::fmt::Display for MissingArgument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingArgument::ParameterList => write!(f, "parameter list"),
            MissingArgument::SaveDirectory => write!(f, "save directory"),
            MissingArgument::Depth => write!(f, "depth"),
            MissingArgument::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Failures produced by a [`Session`](crate::session::Session) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("missing input argument: {0}")]
    MissingInputArgument(MissingArgument),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("missing path: {0}")]
    MissingPath(String),

    #[error("QC field error: {0}")]
    QcFieldError(String),

    #[error("could not load QC routine {routine}: {detail}")]
    ImportFailure { routine: String, detail: String },

    #[error("method not implemented: {0}")]
    MethodNotImplemented(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("unknown file id: {0}")]
    UnknownFile(FileId),

    #[error("{0}")]
    Other(String),
}

/// Why a comparison could not start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceFileError {
    #[error("no reference file selected")]
    NotSelected,

    #[error("reference file {0} is the file being compared")]
    InvalidPair(FileId),

    #[error("reference file {0} is not loaded")]
    NotLoaded(FileId),
}

/// Coordinator-level failures, grouped by how the page reacts to them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QcError {
    /// No file/parameter/range selected; informational.
    #[error("{title}: {detail}")]
    UserInputMissing { title: String, detail: String },

    /// A flag operation was requested without a drawn range.
    #[error("no range selected")]
    NoRangeSelection,

    #[error("reference file: {0}")]
    ReferenceFile(#[from] ReferenceFileError),

    #[error("session error: {0}")]
    SessionData(#[from] SessionError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QcError {
    pub fn missing(title: impl Into<String>, detail: impl Into<String>) -> Self {
        QcError::UserInputMissing {
            title: title.into(),
            detail: detail.into(),
        }
    }
}

/// A background operation was requested while another one still runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{running} is still running")]
pub struct BusyError {
    pub running: String,
}

/// Failures of the user preference store.
#[derive(Error, Debug)]
pub enum PreferencesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PreferencesError> for QcError {
    fn from(e: PreferencesError) -> Self {
        QcError::Internal(format!("could not persist user preferences: {e}"))
    }
}
