//! Message dispatch: one handler per [`PageMessage`].
//!
//! Handlers do their whole unit of work and refresh the render instructions
//! only once it succeeded. The first error ends the handler and is reported
//! by [`QcPage::dispatch`].

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::messages::{FlagTarget, Notice, NoticeLevel, PageMessage, PageOption, WhileBusy};
use super::{AxisState, QcPage, UpdateOptions, EXPORT_DIRECTORY_KEY, ZOOM_TO_DATA_KEY};
use crate::config::{MapBoundaries, PageKind};
use crate::controllers::StatusStyle;
use crate::data::auto_qc::{run_batch, BatchSummary, QcRoutineRequest};
use crate::data::axis::{AxisId, AxisRange, RangeHolder, RangeSource, SyncOutcome};
use crate::data::flagging::flag_selection;
use crate::data::flags::{FlagSelection, FlagStyle};
use crate::data::map_overlay::{hover_marker, MapCanvas};
use crate::error::{MissingArgument, QcError, ReferenceFileError, Result, SessionError};
use crate::events::{EventKind, FlagMeta, QcEvent, QcRunMeta, RangeMeta};
use crate::persistence::{load_value, sections, store_value, UserPreferences};
use crate::session::{FileId, FlagCode, LoadRequest, QcOptions};

/// Padding added around the data extent when zooming to data.
const ZOOM_PADDING: f64 = 0.05;

fn pick_axis<'a>(
    value: &'a mut AxisState,
    depth_time: &'a mut AxisState,
    axis: AxisId,
) -> Option<&'a mut AxisState> {
    if value.axis() == axis {
        Some(value)
    } else if depth_time.axis() == axis {
        Some(depth_time)
    } else {
        None
    }
}

impl QcPage {
    /// Handle one message; errors end up as notices.
    pub fn dispatch(&mut self, msg: PageMessage) {
        if self.progress.is_busy() {
            match msg.while_busy() {
                WhileBusy::Handle => {}
                WhileBusy::Defer => {
                    debug!("defer {} until automatic QC finishes", msg.name());
                    self.defer(msg);
                    return;
                }
                WhileBusy::Skip => return,
            }
        }
        debug!("dispatch {}", msg.name());
        if let Err(e) = self.handle(msg) {
            self.report(e);
        }
    }

    /// Consecutive plot bound changes collapse into the latest one.
    fn defer(&mut self, msg: PageMessage) {
        let replaces_last = matches!(
            (self.deferred.last(), &msg),
            (
                Some(PageMessage::PlotBoundsChanged { .. }),
                PageMessage::PlotBoundsChanged { .. }
            )
        );
        if replaces_last {
            self.deferred.pop();
        }
        self.deferred.push(msg);
    }

    fn handle(&mut self, msg: PageMessage) -> Result<()> {
        match msg {
            PageMessage::LoadFile(request) => self.load_file(request),
            PageMessage::RemoveFile(file_id) => self.remove_file(&file_id),
            PageMessage::SelectSamplingType(st) => {
                if self.selection.set_sampling_type(st).changed() {
                    self.refresh(UpdateOptions::all())?;
                }
                Ok(())
            }
            PageMessage::SelectFile(file_id) => self.select_file(file_id),
            PageMessage::SelectRefFile(file_id) => self.select_ref_file(file_id),
            PageMessage::SelectParameter(p) => self.select_parameter(p),
            PageMessage::SelectCompareParameter(p) => {
                if self.selection.set_compare_selection(p)?.changed() {
                    self.refresh(UpdateOptions {
                        compare: true,
                        ..Default::default()
                    })?;
                }
                Ok(())
            }
            PageMessage::SetPlatformDepth(depth) => {
                self.platform_depth = depth;
                Ok(())
            }
            PageMessage::SaveFile(path) => self.save_file(path),
            PageMessage::SaveAllFiles(dir) => self.save_all_files(dir),
            PageMessage::RangeDrawn { x, y } => self.range_drawn(x, y),
            PageMessage::ClearRange => {
                self.selection.clear_flag_ranges();
                Ok(())
            }
            PageMessage::PlotBoundsChanged { x, y } => self.plot_bounds_changed(x, y),
            PageMessage::ApplyRangeText { axis, min, max } => {
                let state = pick_axis(&mut self.value_axis, &mut self.depth_time_axis, axis)
                    .ok_or_else(|| QcError::Internal(format!("no {} axis on this page", axis.name())))?;
                state.entry.set_text(&min, &max);
                self.sync_axis(axis, RangeSource::Widget, true)?;
                self.after_range_change()
            }
            PageMessage::RestoreStoredRange(axis) => {
                self.sync_axis(axis, RangeSource::User, true)?;
                self.after_range_change()
            }
            PageMessage::ZoomToData => self.zoom_to_data(),
            PageMessage::FlagRange(flag) => self.flag_range(flag),
            PageMessage::SetFlagIncluded {
                target,
                code,
                included,
            } => self.edit_flag(target, &code, |sel, prefs| {
                sel.set_included(&code, included, prefs)
            }),
            PageMessage::SetFlagStyle {
                target,
                code,
                style,
            } => self.set_flag_style(target, code, style),
            PageMessage::ToggleRoutine { routine, selected } => {
                if selected {
                    self.selected_routines.insert(routine);
                } else {
                    self.selected_routines.remove(&routine);
                }
                Ok(())
            }
            PageMessage::SetQcOptions { routine, options } => {
                store_value(self.prefs.as_mut(), sections::QC_OPTIONS, &routine, &options)?;
                Ok(())
            }
            PageMessage::RunAutomaticQc => self.run_automatic_qc(),
            PageMessage::OpenMap { slot, popout } => {
                let canvas = self.maps.slot_mut(slot, popout);
                if canvas.is_none() {
                    *canvas = Some(MapCanvas::default());
                }
                self.refresh_maps()
            }
            PageMessage::CloseMap { slot, popout } => {
                *self.maps.slot_mut(slot, popout) = None;
                Ok(())
            }
            PageMessage::MapHover(time) => self.map_hover(time),
            PageMessage::SetMapBoundaries(b) => self.set_map_boundaries(b),
            PageMessage::SetOption(option, value) => self.set_option(option, value),
            PageMessage::DismissNotice(i) => {
                if i < self.notices.len() {
                    self.notices.remove(i);
                }
                Ok(())
            }
        }
    }

    // ── Files ────────────────────────────────────────────────────────────

    fn load_file(&mut self, mut request: LoadRequest) -> Result<()> {
        if request.data_file_path.as_os_str().is_empty() {
            return Err(SessionError::MissingPath("no data file selected".to_string()).into());
        }
        let file_id = match self.session.with_mut(|s| s.load_file(&request))? {
            Ok(id) => id,
            Err(SessionError::MissingInputArgument(MissingArgument::Depth)) => {
                let depth = self.platform_depth.trim().to_string();
                if depth.is_empty() {
                    return Err(QcError::missing(
                        "Missing platform depth",
                        format!(
                            "{} needs a platform depth; enter it and load again",
                            request.data_file_path.display()
                        ),
                    ));
                }
                warn!(
                    "{} has no depth column, retrying with platform depth {depth}",
                    request.data_file_path.display()
                );
                request.options.insert("depth".to_string(), depth);
                self.session.with_mut(|s| s.load_file(&request))??
            }
            Err(e) => return Err(e.into()),
        };
        info!("loaded {} as {}", request.data_file_path.display(), file_id);
        self.emit(QcEvent::new(EventKind::FILE_LOADED).with_file(&file_id, &request.sampling_type));
        if request.reload {
            self.comparison.discard_file(&file_id);
        }

        self.refresh(UpdateOptions {
            file_list: true,
            ..Default::default()
        })?;
        if self.selection.current_file_id().is_none()
            && self.selection.file_list().iter().any(|(_, f)| f == &file_id)
        {
            return self.select_file(Some(file_id));
        }
        self.refresh(UpdateOptions::renderers())
    }

    fn remove_file(&mut self, file_id: &FileId) -> Result<()> {
        let sampling_type = self.session.with(|s| s.dataset(file_id))??.sampling_type;
        self.session.with_mut(|s| s.remove_file(file_id))??;
        self.selection.remove_file(file_id);
        self.comparison.discard_file(file_id);
        self.flag_styles.forget_file(file_id);
        info!("removed {file_id}");
        self.emit(QcEvent::new(EventKind::FILE_REMOVED).with_file(file_id, &sampling_type));
        self.refresh(UpdateOptions::all())
    }

    fn select_file(&mut self, file_id: Option<FileId>) -> Result<()> {
        if !self.selection.set_current_file(file_id)?.changed() {
            return Ok(());
        }
        self.value_axis.sync.reset();
        self.depth_time_axis.sync.reset();
        self.refresh(UpdateOptions {
            parameter_list: true,
            ..UpdateOptions::renderers()
        })?;
        if let Some(file_id) = self.selection.current_file_id().cloned() {
            let st = self
                .selection
                .current_file_sampling_type()
                .unwrap_or_default()
                .to_string();
            self.emit(QcEvent::new(EventKind::FILE_SELECTED).with_file(&file_id, &st));
            self.status
                .update_help_information(&file_id.label(&st), StatusStyle::Normal);
        }
        if self.selection.current_parameter().is_some() {
            self.apply_parameter_range()?;
        }
        Ok(())
    }

    fn select_ref_file(&mut self, file_id: Option<FileId>) -> Result<()> {
        if let Some(id) = &file_id {
            if Some(id) == self.selection.current_file_id() {
                return Err(ReferenceFileError::InvalidPair(id.clone()).into());
            }
            if !self.reference_files.contains(id) {
                return Err(ReferenceFileError::NotLoaded(id.clone()).into());
            }
        }
        if self.selection.set_ref_file(file_id)?.changed() {
            self.refresh(UpdateOptions::renderers())?;
        }
        Ok(())
    }

    fn select_parameter(&mut self, parameter: Option<String>) -> Result<()> {
        if !self.selection.set_parameter(parameter)?.changed() {
            return Ok(());
        }
        let Some(parameter) = self.selection.current_parameter().map(str::to_string) else {
            self.refresh(UpdateOptions::renderers())?;
            return Ok(());
        };
        store_value(
            self.prefs.as_mut(),
            sections::PARAMETER_PRIORITY,
            self.config.page.key(),
            &parameter,
        )?;
        if self.selection.compare_selection().is_none() {
            self.selection.set_compare_selection(Some(parameter.clone()))?;
        }
        self.refresh(UpdateOptions::renderers())?;
        self.apply_parameter_range()?;
        self.emit(QcEvent::new(EventKind::PARAMETER_SELECTED));
        self.status.update_help_information(
            "Draw a range on the plot and pick a flag",
            StatusStyle::Normal,
        );
        Ok(())
    }

    // ── Ranges ───────────────────────────────────────────────────────────

    fn extent_of(&self, axis: AxisId) -> Option<AxisRange> {
        match axis {
            AxisId::Value => self.plot.extent.1,
            AxisId::Depth | AxisId::Time => self.plot.extent.0,
        }
    }

    fn sync_axis(&mut self, axis: AxisId, source: RangeSource, propagate: bool) -> Result<SyncOutcome> {
        let extent = self.extent_of(axis).map(|r| r.padded(ZOOM_PADDING));
        let state = pick_axis(&mut self.value_axis, &mut self.depth_time_axis, axis)
            .ok_or_else(|| QcError::Internal(format!("no {} axis on this page", axis.name())))?;
        let out = state.sync(self.prefs.as_mut(), source, extent, propagate)?;
        let mut ev = QcEvent::new(EventKind::RANGE_SYNCED);
        ev.range = Some(RangeMeta {
            axis: axis.name().to_string(),
            minimum: out.range.minimum(),
            maximum: out.range.maximum(),
        });
        self.emit(ev);
        Ok(out)
    }

    fn axes(&self) -> [AxisId; 2] {
        [self.value_axis.axis(), self.depth_time_axis.axis()]
    }

    /// Restore the stored ranges, or zoom to data when that option is on.
    fn apply_parameter_range(&mut self) -> Result<()> {
        if self.options.zoom_to_data {
            return self.zoom_to_data();
        }
        for axis in self.axes() {
            if self.extent_of(axis).is_none() {
                continue;
            }
            self.sync_axis(axis, RangeSource::User, true)?;
        }
        self.after_range_change()
    }

    fn zoom_to_data(&mut self) -> Result<()> {
        for axis in self.axes() {
            let Some(extent) = self.extent_of(axis) else {
                continue;
            };
            if let Some(state) = pick_axis(&mut self.value_axis, &mut self.depth_time_axis, axis) {
                state.entry.write(extent.padded(ZOOM_PADDING))?;
            }
            self.sync_axis(axis, RangeSource::Widget, true)?;
        }
        self.after_range_change()
    }

    /// Maps depend on the time and value ranges.
    fn after_range_change(&mut self) -> Result<()> {
        if self.config.features.map {
            self.refresh_maps()?;
        }
        Ok(())
    }

    fn plot_bounds_changed(&mut self, x: [f64; 2], y: [f64; 2]) -> Result<()> {
        let (value, depth_time) = match self.config.page {
            PageKind::Profile => (x, y),
            PageKind::TimeSeries => (y, x),
        };
        self.value_axis.plot.observe(value[0], value[1]);
        self.depth_time_axis.plot.observe(depth_time[0], depth_time[1]);
        for axis in self.axes() {
            self.sync_axis(axis, RangeSource::Plot, true)?;
        }
        self.after_range_change()
    }

    fn range_drawn(&mut self, x: [f64; 2], y: [f64; 2]) -> Result<()> {
        let (axis_range, value_range) = match self.config.page {
            PageKind::Profile => (AxisRange::new(-y[0], -y[1]), AxisRange::new(x[0], x[1])),
            PageKind::TimeSeries => (AxisRange::new(x[0], x[1]), AxisRange::new(y[0], y[1])),
        };
        if self.selection.current_parameter().is_none() {
            return Err(QcError::missing(
                "No parameter selected",
                "select a parameter before drawing a range",
            ));
        }
        self.selection.set_flag_ranges(axis_range, value_range);
        let mut ev = QcEvent::new(EventKind::RANGE_DRAWN);
        ev.range = Some(RangeMeta {
            axis: self.depth_time_axis.axis().name().to_string(),
            minimum: axis_range.minimum(),
            maximum: axis_range.maximum(),
        });
        self.emit(ev);
        self.status
            .update_help_information("Range selected, pick a flag", StatusStyle::Normal);
        Ok(())
    }

    // ── Flags ────────────────────────────────────────────────────────────

    fn flag_range(&mut self, flag: FlagCode) -> Result<()> {
        let visible = self.selection.selected_flags().clone();
        let axis_field = self.config.page.axis_field();
        let selection = &mut self.selection;
        let outcome = self
            .session
            .with_mut(|s| flag_selection(s, selection, axis_field, &visible, &flag))??;
        info!(
            "flagged {} records of {}/{} as {}",
            outcome.flagged, outcome.file_id, outcome.parameter, outcome.flag
        );
        for (dependent, n) in &outcome.dependents {
            debug!("  dependent {dependent}: {n} records");
        }
        self.comparison.discard_file(&outcome.redraw);
        self.refresh(UpdateOptions::renderers())?;

        let mut ev = QcEvent::new(EventKind::FLAGGED);
        ev.flag = Some(FlagMeta {
            file_id: outcome.file_id.clone(),
            parameter: outcome.parameter.clone(),
            flag: outcome.flag.clone(),
            count: outcome.flagged,
        });
        self.emit(ev);
        self.status.update_help_information(
            &format!("{} records flagged as {}", outcome.flagged, outcome.flag),
            StatusStyle::Normal,
        );
        Ok(())
    }

    fn flag_file(&self, target: FlagTarget) -> Result<FileId> {
        let file = match target {
            FlagTarget::Current => self.selection.current_file_id(),
            FlagTarget::Reference => self.selection.current_ref_file_id(),
        };
        file.cloned()
            .ok_or_else(|| QcError::missing("No file selected", "select a file to change its flags"))
    }

    fn edit_flag(
        &mut self,
        target: FlagTarget,
        code: &FlagCode,
        edit: impl FnOnce(&mut FlagSelection, &mut dyn UserPreferences) -> Result<bool>,
    ) -> Result<()> {
        let file_id = self.flag_file(target)?;
        let selection = self.flag_styles.for_file_mut(&file_id).ok_or_else(|| {
            QcError::Internal(format!("no flag selection built for {file_id}"))
        })?;
        if !edit(selection, self.prefs.as_mut())? {
            return Ok(());
        }
        debug!("flag {code} of {file_id} changed");
        self.emit(QcEvent::new(EventKind::FLAG_STYLE_CHANGED));
        self.refresh(UpdateOptions::renderers())
    }

    fn set_flag_style(&mut self, target: FlagTarget, code: FlagCode, style: FlagStyle) -> Result<()> {
        self.edit_flag(target, &code, |sel, prefs| sel.set_style(&code, style, prefs))
    }

    // ── Automatic QC ─────────────────────────────────────────────────────

    fn run_automatic_qc(&mut self) -> Result<()> {
        if self.progress.is_busy() {
            return Err(QcError::missing(
                "Busy",
                "automatic QC is already running, wait for it to finish",
            ));
        }
        let routines: Vec<String> = self
            .qc_routines
            .iter()
            .filter(|r| self.selected_routines.contains(*r))
            .cloned()
            .collect();
        if routines.is_empty() {
            return Err(QcError::missing("No routine selected", "select at least one QC routine"));
        }
        let targets: Vec<FileId> = if self.options.run_on_all_files {
            self.selection
                .file_list()
                .iter()
                .map(|(_, f)| f.clone())
                .collect()
        } else {
            self.selection.current_file_id().cloned().into_iter().collect()
        };
        if targets.is_empty() {
            return Err(QcError::missing(
                "No file selected",
                "select a file or run on all files",
            ));
        }

        let prefs = self.prefs.as_ref();
        let request = QcRoutineRequest::new(targets, routines).with_options(|routine| {
            load_value::<QcOptions>(prefs, sections::QC_OPTIONS, routine).unwrap_or_default()
        });
        info!(
            "automatic QC: {} on {} file(s)",
            request.routine_ids.join(", "),
            request.target_file_ids.len()
        );
        let session = self.session.clone();
        let slot = self.batch_result.clone();
        let handle = self
            .progress
            .run("automatic QC", move || {
                let summary = run_batch(&session, &request);
                *slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(summary);
            })
            .map_err(|e| QcError::missing("Busy", e.to_string()))?;
        self.worker = Some(handle);
        self.emit(QcEvent::new(EventKind::QC_RUN_STARTED));
        Ok(())
    }

    /// Pick up a finished batch and replay what was held back meanwhile.
    /// Returns `true` when a batch was handled.
    pub fn poll(&mut self) -> bool {
        let summary = self
            .batch_result
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let Some(summary) = summary else {
            return false;
        };
        // The worker only has its busy guard left to drop.
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("automatic QC worker panicked");
            }
        }
        self.finish_batch(summary);
        for msg in std::mem::take(&mut self.deferred) {
            self.dispatch(msg);
        }
        true
    }

    /// Wait for the running batch, then handle its result.
    pub fn join_worker(&mut self) -> bool {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("automatic QC worker panicked");
            }
        }
        self.poll()
    }

    fn finish_batch(&mut self, summary: BatchSummary) {
        let text = summary.to_text();
        match &summary.aborted {
            Some(reason) => error!("automatic QC aborted: {reason}"),
            None => info!("automatic QC finished: {}", text.replace('\n', "; ")),
        }
        let mut ev = QcEvent::new(EventKind::QC_RUN_FINISHED);
        ev.qc_run = Some(QcRunMeta {
            files: summary.files.len(),
            succeeded: summary.succeeded().iter().map(|s| s.to_string()).collect(),
            warnings: summary.warnings().len(),
            aborted: summary.aborted.clone(),
        });
        self.emit(ev);

        // A routine that aborted may still have touched the session.
        if !summary.reports.is_empty() {
            for file_id in &summary.files {
                self.comparison.discard_file(file_id);
            }
            self.update_page(UpdateOptions::renderers());
        }
        let level = if summary.aborted.is_some() {
            NoticeLevel::Error
        } else if !summary.warnings().is_empty() {
            NoticeLevel::Warning
        } else {
            NoticeLevel::Info
        };
        self.notices.push(Notice::new(level, "Automatic QC", text));
    }

    // ── Export ───────────────────────────────────────────────────────────

    fn save_file(&mut self, path: PathBuf) -> Result<()> {
        let file_id = self
            .selection
            .current_file_id()
            .cloned()
            .ok_or_else(|| QcError::missing("No file selected", "select the file to save"))?;
        self.session.with(|s| s.save_file(&file_id, &path))??;
        if let Some(dir) = path.parent() {
            self.remember_export_directory(dir)?;
        }
        self.status.update_help_information(
            &format!("Saved {file_id} to {}", path.display()),
            StatusStyle::Normal,
        );
        Ok(())
    }

    fn save_all_files(&mut self, dir: PathBuf) -> Result<()> {
        let files: Vec<FileId> = self
            .selection
            .file_list()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        if files.is_empty() {
            return Err(QcError::missing("No files loaded", "load a file before saving"));
        }
        for file_id in &files {
            let path = dir.join(format!("{file_id}.txt"));
            self.session.with(|s| s.save_file(file_id, &path))??;
        }
        self.remember_export_directory(&dir)?;
        info!("saved {} file(s) to {}", files.len(), dir.display());
        self.status.update_help_information(
            &format!("Saved {} file(s) to {}", files.len(), dir.display()),
            StatusStyle::Normal,
        );
        Ok(())
    }

    fn remember_export_directory(&mut self, dir: &Path) -> Result<()> {
        if dir.as_os_str().is_empty() {
            return Ok(());
        }
        store_value(
            self.prefs.as_mut(),
            sections::PATHS,
            EXPORT_DIRECTORY_KEY,
            &dir.to_path_buf(),
        )?;
        Ok(())
    }

    // ── Maps and options ─────────────────────────────────────────────────

    fn map_hover(&mut self, time: Option<f64>) -> Result<()> {
        let marker = match (time, self.selection.current_file_id().cloned()) {
            (Some(t), Some(file_id)) if self.config.page == PageKind::TimeSeries => {
                let window = self.config.hover_window_s;
                let color = self.config.colors.hover;
                self.session
                    .with(|s| hover_marker(s, &file_id, t, window, color))??
            }
            _ => None,
        };
        for canvas in [&mut self.maps.primary, &mut self.maps.primary_popout]
            .into_iter()
            .flatten()
        {
            canvas.hover = marker.clone();
        }
        Ok(())
    }

    fn set_map_boundaries(&mut self, boundaries: MapBoundaries) -> Result<()> {
        if boundaries.lon_min >= boundaries.lon_max || boundaries.lat_min >= boundaries.lat_max {
            return Err(QcError::missing(
                "Invalid map boundaries",
                "minimum must be below maximum",
            ));
        }
        self.map_boundaries = boundaries;
        store_value(self.prefs.as_mut(), sections::MAP, "boundaries", &boundaries)?;
        self.refresh_maps()
    }

    fn set_option(&mut self, option: PageOption, value: bool) -> Result<()> {
        match option {
            PageOption::ZoomToData => {
                self.options.zoom_to_data = value;
                store_value(self.prefs.as_mut(), sections::OPTIONS, ZOOM_TO_DATA_KEY, &value)?;
            }
            PageOption::ShowReference => {
                self.options.show_reference = value;
                self.refresh(UpdateOptions {
                    plot: true,
                    ..Default::default()
                })?;
            }
            PageOption::RunOnAllFiles => self.options.run_on_all_files = value,
        }
        Ok(())
    }
}
