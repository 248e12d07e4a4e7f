//! Messages panels send to the page, and notices the page shows back.

use std::path::PathBuf;

use crate::config::MapBoundaries;
use crate::data::axis::AxisId;
use crate::data::flags::FlagStyle;
use crate::session::{FileId, FlagCode, LoadRequest, QcOptions};

/// Which file's flag selection a flag message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget {
    Current,
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSlotId {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOption {
    ZoomToData,
    ShowReference,
    RunOnAllFiles,
}

/// Everything the user can ask the page to do.
#[derive(Debug, Clone, PartialEq)]
pub enum PageMessage {
    // ── Files ───────────────────────────────────────────────────────────
    LoadFile(LoadRequest),
    RemoveFile(FileId),
    SelectSamplingType(Option<String>),
    SelectFile(Option<FileId>),
    SelectRefFile(Option<FileId>),
    SelectParameter(Option<String>),
    SelectCompareParameter(Option<String>),
    SetPlatformDepth(String),
    /// Save the current file to this path.
    SaveFile(PathBuf),
    /// Save every file of the file list into this directory.
    SaveAllFiles(PathBuf),

    // ── Plot / ranges ───────────────────────────────────────────────────
    /// A rectangle drawn on the plot, in plot coordinates.
    RangeDrawn { x: [f64; 2], y: [f64; 2] },
    ClearRange,
    /// The plot was panned or zoomed, in plot coordinates.
    PlotBoundsChanged { x: [f64; 2], y: [f64; 2] },
    /// Min/max typed into a range entry.
    ApplyRangeText { axis: AxisId, min: String, max: String },
    /// Restore the stored range of an axis.
    RestoreStoredRange(AxisId),
    ZoomToData,

    // ── Flags ───────────────────────────────────────────────────────────
    FlagRange(FlagCode),
    SetFlagIncluded {
        target: FlagTarget,
        code: FlagCode,
        included: bool,
    },
    SetFlagStyle {
        target: FlagTarget,
        code: FlagCode,
        style: FlagStyle,
    },

    // ── Automatic QC ────────────────────────────────────────────────────
    ToggleRoutine { routine: String, selected: bool },
    SetQcOptions { routine: String, options: QcOptions },
    RunAutomaticQc,

    // ── Maps ────────────────────────────────────────────────────────────
    OpenMap { slot: MapSlotId, popout: bool },
    CloseMap { slot: MapSlotId, popout: bool },
    MapHover(Option<f64>),
    SetMapBoundaries(MapBoundaries),

    // ── Misc ────────────────────────────────────────────────────────────
    SetOption(PageOption, bool),
    DismissNotice(usize),
}

/// What the page does with a message while automatic QC is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhileBusy {
    /// Handle it now; it does not read the session.
    Handle,
    /// Hold it back and handle it once the batch has finished.
    Defer,
    /// Drop it.
    Skip,
}

impl PageMessage {
    pub fn while_busy(&self) -> WhileBusy {
        match self {
            PageMessage::SetPlatformDepth(_)
            | PageMessage::RangeDrawn { .. }
            | PageMessage::ClearRange
            | PageMessage::CloseMap { .. }
            | PageMessage::ToggleRoutine { .. }
            | PageMessage::SetQcOptions { .. }
            | PageMessage::RunAutomaticQc
            | PageMessage::DismissNotice(_) => WhileBusy::Handle,
            PageMessage::MapHover(_) => WhileBusy::Skip,
            _ => WhileBusy::Defer,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            PageMessage::LoadFile(_) => "LoadFile",
            PageMessage::RemoveFile(_) => "RemoveFile",
            PageMessage::SelectSamplingType(_) => "SelectSamplingType",
            PageMessage::SelectFile(_) => "SelectFile",
            PageMessage::SelectRefFile(_) => "SelectRefFile",
            PageMessage::SelectParameter(_) => "SelectParameter",
            PageMessage::SelectCompareParameter(_) => "SelectCompareParameter",
            PageMessage::SetPlatformDepth(_) => "SetPlatformDepth",
            PageMessage::SaveFile(_) => "SaveFile",
            PageMessage::SaveAllFiles(_) => "SaveAllFiles",
            PageMessage::RangeDrawn { .. } => "RangeDrawn",
            PageMessage::ClearRange => "ClearRange",
            PageMessage::PlotBoundsChanged { .. } => "PlotBoundsChanged",
            PageMessage::ApplyRangeText { .. } => "ApplyRangeText",
            PageMessage::RestoreStoredRange(_) => "RestoreStoredRange",
            PageMessage::ZoomToData => "ZoomToData",
            PageMessage::FlagRange(_) => "FlagRange",
            PageMessage::SetFlagIncluded { .. } => "SetFlagIncluded",
            PageMessage::SetFlagStyle { .. } => "SetFlagStyle",
            PageMessage::ToggleRoutine { .. } => "ToggleRoutine",
            PageMessage::SetQcOptions { .. } => "SetQcOptions",
            PageMessage::RunAutomaticQc => "RunAutomaticQc",
            PageMessage::OpenMap { .. } => "OpenMap",
            PageMessage::CloseMap { .. } => "CloseMap",
            PageMessage::MapHover(_) => "MapHover",
            PageMessage::SetMapBoundaries(_) => "SetMapBoundaries",
            PageMessage::SetOption(..) => "SetOption",
            PageMessage::DismissNotice(_) => "DismissNotice",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message box the page wants to show.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub text: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            text: text.into(),
        }
    }
}
