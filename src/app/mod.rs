//! The QC page: its state, its dispatcher and the eframe wrapper around it.
//!
//! | Sub-module        | Responsibility |
//! | ----------------- | -------------- |
//! | [`messages`]      | [`PageMessage`] panels send, [`Notice`]s the page shows |
//! | [`update`]        | Message dispatch and the handler per message |
//! | [`panel_helpers`] | Locating concrete panels behind `Box<dyn Panel>` |
//! | [`qc_app`]        | Standalone [`QcApp`] (eframe) wrapper |
//! | [`run`]           | Top-level [`run_qc_app()`] entry point |
//!
//! [`QcPage`] owns the selection, the caches and the axis synchronizers;
//! there is no global state. Panels only read it and push messages.

pub mod messages;
mod panel_helpers;
mod qc_app;
mod run;
mod update;

pub use messages::{FlagTarget, MapSlotId, Notice, NoticeLevel, PageMessage, PageOption, WhileBusy};
pub use qc_app::QcApp;
pub use run::run_qc_app;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, error, info};

use crate::config::{MapBoundaries, QcConfig};
use crate::controllers::{ProgressController, StatusController, StatusStyle};
use crate::data::auto_qc::BatchSummary;
use crate::data::axis::{
    AxisHolders, AxisId, AxisRange, AxisSync, PlotAxis, RangeEntry, RangeSource, SyncOutcome,
    UserRange,
};
use crate::data::comparison::{comparison_view, reference_candidates, ComparisonCache, ComparisonView};
use crate::data::flags::{FlagSelection, FlagStyleCache};
use crate::data::map_overlay::{self, MapCanvas, MapContext, MapSlot, MapTarget, MapTargets};
use crate::data::plot::{build_plot, PlotModel, PlotRequest};
use crate::data::selection::SelectionState;
use crate::error::{QcError, Result, SessionError};
use crate::events::{EventController, EventKind, QcEvent};
use crate::persistence::{load_value, sections, UserPreferences};
use crate::session::{FileId, SessionHandle};

// ─────────────────────────────────────────────────────────────────────────────
// Axis state
// ─────────────────────────────────────────────────────────────────────────────

/// One synchronized axis: authoritative value, plot holder and range entry.
/// The user-preference holder is built on demand from the page's store.
pub struct AxisState {
    pub sync: AxisSync,
    pub plot: PlotAxis,
    pub entry: RangeEntry,
    key: String,
}

impl AxisState {
    fn new(axis: AxisId, page_key: &str) -> Self {
        Self {
            sync: AxisSync::new(axis),
            plot: PlotAxis::new(axis),
            entry: RangeEntry::new(axis),
            key: format!("{}/{}", page_key, axis.name()),
        }
    }

    pub fn axis(&self) -> AxisId {
        self.sync.axis
    }

    /// Preference key of the stored range.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn sync(
        &mut self,
        prefs: &mut dyn UserPreferences,
        source: RangeSource,
        extent: Option<AxisRange>,
        propagate: bool,
    ) -> Result<SyncOutcome> {
        let mut user = UserRange::new(prefs, self.key.clone());
        self.sync.sync(
            source,
            AxisHolders {
                plot: &mut self.plot,
                user: &mut user,
                widget: &mut self.entry,
            },
            extent,
            propagate,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Page options and map widgets
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PageOptions {
    pub zoom_to_data: bool,
    pub show_reference: bool,
    pub run_on_all_files: bool,
}

/// The four map widgets; `None` means closed.
#[derive(Debug, Clone, Default)]
pub struct MapViews {
    pub primary: Option<MapCanvas>,
    pub primary_popout: Option<MapCanvas>,
    pub secondary: Option<MapCanvas>,
    pub secondary_popout: Option<MapCanvas>,
}

impl MapViews {
    fn targets(&mut self) -> MapTargets<'_> {
        MapTargets {
            primary: MapSlot {
                main: self.primary.as_mut().map(|c| c as &mut dyn MapTarget),
                popout: self.primary_popout.as_mut().map(|c| c as &mut dyn MapTarget),
            },
            secondary: MapSlot {
                main: self.secondary.as_mut().map(|c| c as &mut dyn MapTarget),
                popout: self.secondary_popout.as_mut().map(|c| c as &mut dyn MapTarget),
            },
        }
    }

    fn slot_mut(&mut self, slot: MapSlotId, popout: bool) -> &mut Option<MapCanvas> {
        match (slot, popout) {
            (MapSlotId::Primary, false) => &mut self.primary,
            (MapSlotId::Primary, true) => &mut self.primary_popout,
            (MapSlotId::Secondary, false) => &mut self.secondary,
            (MapSlotId::Secondary, true) => &mut self.secondary_popout,
        }
    }
}

/// Which parts of the page [`QcPage::update_page`] refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOptions {
    pub file_list: bool,
    pub parameter_list: bool,
    pub plot: bool,
    pub maps: bool,
    pub compare: bool,
}

impl UpdateOptions {
    pub fn all() -> Self {
        Self {
            file_list: true,
            parameter_list: true,
            plot: true,
            maps: true,
            compare: true,
        }
    }

    pub fn renderers() -> Self {
        Self {
            plot: true,
            maps: true,
            compare: true,
            ..Default::default()
        }
    }
}

/// Preference key of the "zoom to data on parameter update" option.
pub const ZOOM_TO_DATA_KEY: &str = "zoom_to_data_on_parameter_update";
/// Preference key of the last export directory.
pub const EXPORT_DIRECTORY_KEY: &str = "export_directory";

type BatchSlot = Arc<Mutex<Option<BatchSummary>>>;

// ─────────────────────────────────────────────────────────────────────────────
// QcPage
// ─────────────────────────────────────────────────────────────────────────────

/// The QC workflow coordinator of one page.
pub struct QcPage {
    pub config: QcConfig,
    pub(crate) session: SessionHandle,
    pub(crate) prefs: Box<dyn UserPreferences>,

    // ── Selection and caches ─────────────────────────────────────────────
    pub selection: SelectionState,
    /// Sampling types of every loaded file.
    pub sampling_types: Vec<String>,
    /// Loaded files that may serve as comparison reference.
    pub reference_files: Vec<FileId>,
    pub flag_styles: FlagStyleCache,
    pub comparison: ComparisonCache,
    /// Value axis of the main plot.
    pub value_axis: AxisState,
    /// Depth (profile) or time (time series) axis of the main plot.
    pub depth_time_axis: AxisState,

    // ── Render instructions ──────────────────────────────────────────────
    pub plot: PlotModel,
    pub compare_view: Option<ComparisonView>,
    pub maps: MapViews,

    // ── Options ──────────────────────────────────────────────────────────
    pub options: PageOptions,
    pub map_boundaries: MapBoundaries,
    /// Routine ids the session offers.
    pub qc_routines: Vec<String>,
    pub selected_routines: BTreeSet<String>,
    /// Entered platform depth, used when a fixed-platform file lacks one.
    pub platform_depth: String,

    // ── Feedback ─────────────────────────────────────────────────────────
    pub notices: Vec<Notice>,
    pub status: StatusController,
    pub progress: ProgressController,
    events: Option<EventController>,
    batch_result: BatchSlot,
    worker: Option<JoinHandle<()>>,
    /// Messages held back while automatic QC runs.
    deferred: Vec<PageMessage>,
}

impl QcPage {
    pub fn new(
        mut config: QcConfig,
        session: SessionHandle,
        prefs: Box<dyn UserPreferences>,
    ) -> Self {
        let page_key = config.page.key();
        let depth_or_time = match config.page {
            crate::config::PageKind::Profile => AxisId::Depth,
            crate::config::PageKind::TimeSeries => AxisId::Time,
        };
        let status = config.controllers.status.take().unwrap_or_default();
        let events = config.controllers.event.take();
        let mut maps = MapViews::default();
        if config.features.map {
            maps.primary = Some(MapCanvas::default());
            maps.secondary = Some(MapCanvas::default());
        }
        Self {
            options: PageOptions {
                zoom_to_data: config.zoom_to_data_default,
                show_reference: false,
                run_on_all_files: false,
            },
            map_boundaries: config.map_boundaries,
            value_axis: AxisState::new(AxisId::Value, page_key),
            depth_time_axis: AxisState::new(depth_or_time, page_key),
            progress: ProgressController::new(status.clone()),
            status,
            events,
            config,
            session,
            prefs,
            selection: SelectionState::new(),
            sampling_types: Vec::new(),
            reference_files: Vec::new(),
            flag_styles: FlagStyleCache::new(),
            comparison: ComparisonCache::new(),
            plot: PlotModel::default(),
            compare_view: None,
            maps,
            qc_routines: Vec::new(),
            selected_routines: BTreeSet::new(),
            platform_depth: String::new(),
            notices: Vec::new(),
            batch_result: Arc::new(Mutex::new(None)),
            worker: None,
            deferred: Vec::new(),
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn preferences(&self) -> &dyn UserPreferences {
        self.prefs.as_ref()
    }

    /// Directory files were last saved to.
    pub fn export_directory(&self) -> Option<PathBuf> {
        load_value(self.prefs.as_ref(), sections::PATHS, EXPORT_DIRECTORY_KEY)
    }

    /// Restore user options and fill every widget.
    pub fn startup(&mut self) {
        if let Some(b) = load_value::<MapBoundaries>(self.prefs.as_ref(), sections::MAP, "boundaries") {
            self.map_boundaries = b;
        }
        if let Some(z) = load_value::<bool>(self.prefs.as_ref(), sections::OPTIONS, ZOOM_TO_DATA_KEY) {
            self.options.zoom_to_data = z;
        }
        match self.session.with(|s| s.qc_routines()) {
            Ok(r) => self.qc_routines = r,
            Err(e) => self.report(e),
        }
        self.update_page(UpdateOptions::all());
        self.status
            .update_help_information("Select a file to start", StatusStyle::Normal);
        info!("{} page started", self.config.page.key());
    }

    /// Refresh the parts named in `opts`; failures become notices.
    pub fn update_page(&mut self, opts: UpdateOptions) {
        if let Err(e) = self.refresh(opts) {
            self.report(e);
        }
    }

    pub(crate) fn refresh(&mut self, opts: UpdateOptions) -> Result<()> {
        debug!("update page {:?}", opts);
        if opts.file_list {
            let (files, types) = self
                .session
                .with(|s| (s.loaded_files(), s.sampling_types()))?;
            self.sampling_types = types.into_iter().collect();
            self.selection.set_file_list(files);
        }
        let allowed = &self.config.compare_sampling_types;
        let primary = self.selection.current_file_id();
        self.reference_files = self
            .session
            .with(|s| reference_candidates(s, allowed, primary))?;
        if opts.parameter_list {
            self.refresh_parameter_list()?;
        }
        self.ensure_flag_selection()?;
        if opts.plot {
            self.refresh_plot()?;
        }
        if opts.compare && self.config.features.compare {
            self.refresh_compare()?;
        }
        if opts.maps && self.config.features.map {
            self.refresh_maps()?;
        }
        Ok(())
    }

    fn refresh_parameter_list(&mut self) -> Result<()> {
        let Some(file_id) = self.selection.current_file_id().cloned() else {
            self.selection.set_parameter_list(Vec::new());
            return Ok(());
        };
        let parameters = self.session.with(|s| s.parameters(&file_id))??;
        self.selection.set_parameter_list(parameters);
        if self.selection.current_parameter().is_none() {
            let key = self.config.page.key();
            if let Some(p) = load_value::<String>(self.prefs.as_ref(), sections::PARAMETER_PRIORITY, key) {
                if self.selection.parameter_list().contains(&p) {
                    self.selection.set_parameter(Some(p))?;
                }
            }
        }
        Ok(())
    }

    /// Make sure the current and reference files have their flag selections.
    ///
    /// A reference that is no longer loaded is left alone; the comparison
    /// reports it.
    fn ensure_flag_selection(&mut self) -> Result<()> {
        if let Some(file_id) = self.selection.current_file_id().cloned() {
            let settings = self.session.with(|s| s.dataset(&file_id))??.settings;
            let included = self
                .flag_styles
                .get_or_build(&file_id, &settings, self.prefs.as_ref())
                .included_codes();
            self.selection.set_selected_flags(included);
        }
        if let Some(ref_id) = self.selection.current_ref_file_id().cloned() {
            if let Ok(info) = self.session.with(|s| s.dataset(&ref_id))? {
                self.flag_styles
                    .get_or_build(&ref_id, &info.settings, self.prefs.as_ref());
            }
        }
        Ok(())
    }

    pub fn current_flags(&self) -> Option<&FlagSelection> {
        self.flag_styles.for_file(self.selection.current_file_id()?)
    }

    pub fn reference_flags(&self) -> Option<&FlagSelection> {
        self.flag_styles.for_file(self.selection.current_ref_file_id()?)
    }

    fn refresh_plot(&mut self) -> Result<()> {
        let (Some(file_id), Some(parameter)) = (
            self.selection.current_file_id().cloned(),
            self.selection.current_parameter().map(str::to_string),
        ) else {
            self.plot = PlotModel::default();
            return Ok(());
        };
        let Some(flags) = self.flag_styles.for_file(&file_id) else {
            return Err(QcError::Internal(format!("no flag selection for {file_id}")));
        };
        let same_type: Vec<FileId> = match self.selection.current_file_sampling_type() {
            Some(st) => self
                .selection
                .file_list()
                .iter()
                .filter(|(t, _)| t == st)
                .map(|(_, f)| f.clone())
                .collect(),
            None => Vec::new(),
        };
        let reference = if self.options.show_reference {
            self.selection.current_ref_file_id()
        } else {
            None
        };
        let req = PlotRequest {
            page: self.config.page,
            file_id: &file_id,
            parameter: &parameter,
            flags,
            colors: &self.config.colors,
            background_files: &same_type,
            reference,
        };
        self.plot = self.session.with(|s| build_plot(s, &req))??;
        Ok(())
    }

    fn refresh_compare(&mut self) -> Result<()> {
        let (Some(primary), Some(reference), Some(parameter)) = (
            self.selection.current_file_id().cloned(),
            self.selection.current_ref_file_id().cloned(),
            self.selection.compare_selection().map(str::to_string),
        ) else {
            self.compare_view = None;
            return Ok(());
        };
        let (revision, visible) = match self.flag_styles.for_file(&reference) {
            Some(sel) => (sel.revision(), sel.included_codes()),
            None => (0, BTreeSet::new()),
        };
        let comparison = &mut self.comparison;
        let view = self.session.with_mut(|s| -> Result<ComparisonView> {
            let merged = comparison.get_comparison(s, Some(&primary), Some(&reference), revision)?;
            comparison_view(merged, &parameter, &visible)
        })??;
        self.compare_view = Some(view);
        self.emit(QcEvent::new(EventKind::COMPARISON_UPDATED));
        Ok(())
    }

    pub(crate) fn refresh_maps(&mut self) -> Result<()> {
        let time_range = match self.depth_time_axis.axis() {
            AxisId::Time => self.depth_time_axis.sync.current(),
            _ => None,
        };
        let visible = self.selection.selected_flags().clone();
        let ctx = MapContext {
            boundaries: self.map_boundaries,
            colors: &self.config.colors,
            time_range,
            value_range: self.value_axis.sync.current(),
            visible_flags: &visible,
        };
        let selection = &self.selection;
        let mut targets = self.maps.targets();
        self.session
            .with(|s| map_overlay::refresh(&mut targets, s, selection, &ctx))??;
        self.emit(QcEvent::new(EventKind::MAP_REFRESHED));
        Ok(())
    }

    // ── Feedback ─────────────────────────────────────────────────────────

    pub(crate) fn emit(&self, event: QcEvent) {
        if let Some(ev) = &self.events {
            ev.emit(event);
        }
    }

    /// Turn an error into a notice. Nothing else in the crate shows errors.
    pub fn report(&mut self, err: QcError) {
        let notice = match &err {
            QcError::UserInputMissing { title, detail } => {
                self.status.update_help_information(detail, StatusStyle::Red);
                Notice::new(NoticeLevel::Info, title.clone(), detail.clone())
            }
            QcError::NoRangeSelection => {
                self.status
                    .update_help_information("Draw a range on the plot first", StatusStyle::Red);
                Notice::new(
                    NoticeLevel::Info,
                    "No range selected",
                    "Draw a range on the plot first",
                )
            }
            QcError::ReferenceFile(e) => {
                Notice::new(NoticeLevel::Warning, "Reference file", e.to_string())
            }
            QcError::SessionData(e) => {
                let title = match e {
                    SessionError::MissingPath(_) => "Missing path",
                    SessionError::InvalidParameter(_) => "Invalid parameter",
                    SessionError::QcFieldError(_) => "QC field error",
                    SessionError::MissingInputArgument(_) => "Missing input argument",
                    _ => "Data error",
                };
                Notice::new(NoticeLevel::Warning, title, e.to_string())
            }
            QcError::Internal(detail) => {
                error!("internal error: {detail}");
                self.status
                    .update_help_information("Something went wrong", StatusStyle::Red);
                Notice::new(NoticeLevel::Error, "Internal error", detail.clone())
            }
        };
        debug!("notice: {:?}", notice);
        self.emit({
            let mut ev = QcEvent::new(EventKind::NOTICE);
            ev.notice = Some(crate::events::NoticeMeta {
                title: notice.title.clone(),
                text: notice.text.clone(),
            });
            ev
        });
        self.notices.push(notice);
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}
