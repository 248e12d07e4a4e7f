use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use sensor_qc::app::FlagTarget;
use sensor_qc::session::{Dataset, QcOptions, QcRoutine};
use sensor_qc::{
    EventController, EventKind, FileId, FlagCode, LoadRequest, MapBoundaries, MemoryPreferences,
    MemorySession, NoticeLevel, PageKind, PageMessage, QcConfig, QcEvent, QcPage, SessionError,
    SessionHandle,
};
use serde_json::json;

const CTD: &str = "time\tlat\tlon\tdepth\tTEMP [degC]\n\
2018-01-01 00:00:00\t57.0\t11.0\t1\t5\n\
2018-01-01 00:00:10\t57.0\t11.0\t2\t6\n\
2018-01-01 00:00:20\t57.0\t11.0\t3\t7\n\
2018-01-01 00:00:30\t57.0\t11.0\t4\t8\n";

const PLATFORM: &str = "time\tlat\tlon\tTEMP\n\
2018-01-01 00:00:00\t58.0\t11.5\t9\n\
2018-01-01 01:00:00\t58.0\t11.5\t9.5\n";

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn page(kind: PageKind) -> (QcPage, Receiver<QcEvent>) {
    page_with(kind, MemorySession::new())
}

fn page_with(kind: PageKind, session: MemorySession) -> (QcPage, Receiver<QcEvent>) {
    let events = EventController::new();
    let rx = events.subscribe_all();
    let mut config = QcConfig::for_page(kind);
    config.controllers.event = Some(events);
    let mut page = QcPage::new(
        config,
        SessionHandle::new(session),
        Box::new(MemoryPreferences::new()),
    );
    page.startup();
    (page, rx)
}

fn load(sampling_type: &str, path: &Path) -> PageMessage {
    PageMessage::LoadFile(LoadRequest {
        sampling_type: sampling_type.to_string(),
        data_file_path: path.to_path_buf(),
        ..Default::default()
    })
}

fn kinds(rx: &Receiver<QcEvent>) -> Vec<EventKind> {
    rx.try_iter().map(|e| e.kinds).collect()
}

fn temp_flags(page: &QcPage, file: &str) -> Vec<String> {
    page.session()
        .with(|s| s.flags(&FileId::new(file), "TEMP"))
        .unwrap()
        .unwrap()
        .iter()
        .map(|f| f.as_str().to_string())
        .collect()
}

#[test]
fn first_loaded_file_is_selected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "st1.txt", CTD);
    let (mut page, rx) = page(PageKind::Profile);

    page.dispatch(load("CTD", &path));

    assert!(page.notices.is_empty(), "{:?}", page.notices);
    assert_eq!(page.selection.current_file_id(), Some(&FileId::new("st1")));
    assert_eq!(page.sampling_types, vec!["CTD".to_string()]);
    assert_eq!(page.selection.parameter_list().to_vec(), vec!["TEMP".to_string()]);
    let seen = kinds(&rx);
    assert!(seen.contains(&EventKind::FILE_LOADED));
    assert!(seen.contains(&EventKind::FILE_SELECTED));
}

#[test]
fn empty_path_is_reported_as_missing_path() {
    let (mut page, rx) = page(PageKind::Profile);
    let _ = kinds(&rx);
    page.dispatch(load("CTD", Path::new("")));

    assert_eq!(page.notices.len(), 1);
    assert_eq!(page.notices[0].level, NoticeLevel::Warning);
    assert_eq!(page.notices[0].title, "Missing path");
    assert_eq!(kinds(&rx), vec![EventKind::NOTICE]);
}

#[test]
fn fixed_platform_needs_platform_depth() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "buoy.txt", PLATFORM);
    let (mut page, _rx) = page(PageKind::TimeSeries);

    page.dispatch(load("Fixed platform", &path));
    assert_eq!(page.notices.len(), 1);
    assert_eq!(page.notices[0].title, "Missing platform depth");
    assert!(page.selection.current_file_id().is_none());

    page.dispatch(PageMessage::DismissNotice(0));
    page.dispatch(PageMessage::SetPlatformDepth("5".into()));
    page.dispatch(load("Fixed platform", &path));
    assert!(page.notices.is_empty(), "{:?}", page.notices);
    assert_eq!(page.selection.current_file_id(), Some(&FileId::new("buoy")));
}

#[test]
fn drawn_range_flags_records_in_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "st1.txt", CTD);
    let (mut page, rx) = page(PageKind::Profile);
    page.dispatch(load("CTD", &path));
    page.dispatch(PageMessage::SelectParameter(Some("TEMP".into())));
    let _ = kinds(&rx);

    // Profile plots depth downwards: y is the negated depth.
    page.dispatch(PageMessage::RangeDrawn {
        x: [5.5, 7.5],
        y: [-1.5, -3.5],
    });
    page.dispatch(PageMessage::FlagRange(FlagCode::new("4")));

    assert!(page.notices.is_empty(), "{:?}", page.notices);
    let flags = temp_flags(&page, "st1");
    assert_eq!(flags[1], "4");
    assert_eq!(flags[2], "4");
    assert_ne!(flags[0], "4");
    assert_ne!(flags[3], "4");
    assert!(page.selection.range_spec().is_none());

    let flagged: Vec<QcEvent> = rx
        .try_iter()
        .filter(|e| e.kinds == EventKind::FLAGGED)
        .collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].flag.as_ref().map(|f| f.count), Some(2));
}

#[test]
fn hidden_flag_is_not_changed_by_a_drawn_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "st1.txt", CTD);
    let (mut page, _rx) = page(PageKind::Profile);
    page.dispatch(load("CTD", &path));
    page.dispatch(PageMessage::SelectParameter(Some("TEMP".into())));
    let unflagged = temp_flags(&page, "st1")[0].clone();

    page.dispatch(PageMessage::SetFlagIncluded {
        target: FlagTarget::Current,
        code: FlagCode::new(unflagged),
        included: false,
    });
    page.dispatch(PageMessage::RangeDrawn {
        x: [0.0, 10.0],
        y: [0.0, -10.0],
    });
    page.dispatch(PageMessage::FlagRange(FlagCode::new("3")));

    assert!(temp_flags(&page, "st1").iter().all(|f| f != "3"));
}

#[test]
fn reference_equal_to_primary_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "st1.txt", CTD);
    let (mut page, _rx) = page(PageKind::Profile);
    page.dispatch(load("CTD", &path));

    page.dispatch(PageMessage::SelectRefFile(Some(FileId::new("st1"))));

    assert_eq!(page.notices.len(), 1);
    assert_eq!(page.notices[0].level, NoticeLevel::Warning);
    assert_eq!(page.notices[0].title, "Reference file");
    assert!(page.selection.current_ref_file_id().is_none());
}

#[test]
fn automatic_qc_runs_in_the_background_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "st1.txt", CTD);
    let (mut page, rx) = page(PageKind::Profile);
    page.dispatch(load("CTD", &path));
    let _ = kinds(&rx);

    page.dispatch(PageMessage::ToggleRoutine {
        routine: "range_check".into(),
        selected: true,
    });
    let options = json!({"parameters": ["TEMP"], "max": 6.5});
    page.dispatch(PageMessage::SetQcOptions {
        routine: "range_check".into(),
        options: serde_json::from_value(options).unwrap(),
    });
    page.dispatch(PageMessage::RunAutomaticQc);
    assert!(page.join_worker());

    assert!(!page.progress.is_busy());
    assert_eq!(page.progress.completed(), 1);
    assert_eq!(page.notices.len(), 1, "{:?}", page.notices);
    assert_eq!(page.notices[0].level, NoticeLevel::Info);
    assert_eq!(page.notices[0].title, "Automatic QC");
    assert!(page.notices[0].text.contains("Succeeded: range_check"));

    let flags = temp_flags(&page, "st1");
    assert_eq!(&flags[2..], &["4".to_string(), "4".to_string()]);
    assert_ne!(flags[1], "4");

    let finished: Vec<QcEvent> = rx
        .try_iter()
        .filter(|e| e.kinds == EventKind::QC_RUN_FINISHED)
        .collect();
    assert_eq!(finished.len(), 1);
    let run = finished[0].qc_run.as_ref().unwrap();
    assert_eq!(run.files, 1);
    assert_eq!(run.succeeded, vec!["range_check".to_string()]);
    assert_eq!(run.aborted, None);
}

#[test]
fn aborted_batch_keeps_plot_and_session_in_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "st1.txt", CTD);
    let (mut page, _rx) = page(PageKind::Profile);
    page.dispatch(load("CTD", &path));
    page.dispatch(PageMessage::SelectParameter(Some("TEMP".into())));

    page.dispatch(PageMessage::ToggleRoutine {
        routine: "range_check".into(),
        selected: true,
    });
    // TEMP would be flagged before NOPE fails.
    let options = json!({"parameters": ["TEMP", "NOPE"], "max": 6.5});
    page.dispatch(PageMessage::SetQcOptions {
        routine: "range_check".into(),
        options: serde_json::from_value(options).unwrap(),
    });
    page.dispatch(PageMessage::RunAutomaticQc);
    assert!(page.join_worker());

    assert_eq!(page.notices.len(), 1, "{:?}", page.notices);
    assert_eq!(page.notices[0].level, NoticeLevel::Error);
    assert!(page.notices[0].text.contains("Aborted"));

    let bad = temp_flags(&page, "st1").iter().filter(|f| *f == "4").count();
    assert_eq!(bad, 0);
    let plotted = page
        .plot
        .series
        .iter()
        .filter(|s| s.name.starts_with("4 "))
        .map(|s| s.points.len())
        .sum::<usize>();
    assert_eq!(plotted, bad);
}

/// Holds the session until the test lets it go.
struct Gate {
    started: Sender<()>,
    release: Receiver<()>,
}

impl QcRoutine for Gate {
    fn id(&self) -> &str {
        "gate"
    }

    fn run(&self, _dataset: &mut Dataset, _options: &QcOptions) -> Result<(), SessionError> {
        let _ = self.started.send(());
        let _ = self.release.recv();
        Ok(())
    }
}

#[test]
fn messages_during_a_run_wait_for_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "st1.txt", CTD);
    let (started_tx, started) = mpsc::channel();
    let (release, release_rx) = mpsc::channel();
    let mut session = MemorySession::new();
    session.register_routine(Box::new(Gate {
        started: started_tx,
        release: release_rx,
    }));
    let (mut page, _rx) = page_with(PageKind::Profile, session);
    page.dispatch(load("CTD", &path));
    page.dispatch(PageMessage::SelectParameter(Some("TEMP".into())));
    page.dispatch(PageMessage::ToggleRoutine {
        routine: "gate".into(),
        selected: true,
    });

    page.dispatch(PageMessage::RunAutomaticQc);
    started.recv().unwrap();

    // The worker holds the session; these must return without waiting on it.
    page.dispatch(PageMessage::SelectParameter(None));
    page.dispatch(PageMessage::MapHover(Some(0.0)));
    page.dispatch(PageMessage::RunAutomaticQc);
    assert_eq!(page.selection.current_parameter(), Some("TEMP"));
    assert_eq!(page.notices.len(), 1, "{:?}", page.notices);
    assert_eq!(page.notices[0].title, "Busy");
    assert!(!page.poll());

    release.send(()).unwrap();
    assert!(page.join_worker());
    assert!(!page.progress.is_busy());
    assert_eq!(page.selection.current_parameter(), None);
    assert!(page.notices.iter().any(|n| n.text.contains("Succeeded: gate")));
}

#[test]
fn automatic_qc_without_routine_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "st1.txt", CTD);
    let (mut page, _rx) = page(PageKind::Profile);
    page.dispatch(load("CTD", &path));

    page.dispatch(PageMessage::RunAutomaticQc);

    assert!(!page.join_worker());
    assert_eq!(page.notices.len(), 1);
    assert_eq!(page.notices[0].title, "No routine selected");
    assert_eq!(page.progress.completed(), 0);
}

#[test]
fn map_boundaries_are_validated_and_stored() {
    let (mut page, _rx) = page(PageKind::TimeSeries);
    let before = page.map_boundaries;

    let inverted = MapBoundaries {
        lon_min: 12.0,
        lon_max: 10.0,
        ..before
    };
    page.dispatch(PageMessage::SetMapBoundaries(inverted));
    assert_eq!(page.notices.len(), 1);
    assert_eq!(page.notices[0].title, "Invalid map boundaries");
    assert_eq!(page.map_boundaries, before);

    let valid = MapBoundaries {
        lon_min: 9.0,
        lon_max: 13.0,
        lat_min: 55.0,
        lat_max: 60.0,
    };
    page.dispatch(PageMessage::SetMapBoundaries(valid));
    assert_eq!(page.notices.len(), 1);
    assert_eq!(page.map_boundaries, valid);
    assert_eq!(
        page.preferences().get("map", "boundaries"),
        Some(serde_json::to_value(valid).unwrap())
    );
}

#[test]
fn saved_files_keep_their_flags_and_remember_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let st1 = write(dir.path(), "st1.txt", CTD);
    let st2 = write(dir.path(), "st2.txt", CTD);
    let (mut page, _rx) = page(PageKind::Profile);
    page.dispatch(load("CTD", &st1));
    page.dispatch(load("CTD", &st2));
    page.dispatch(PageMessage::SelectParameter(Some("TEMP".into())));
    page.dispatch(PageMessage::RangeDrawn {
        x: [4.5, 5.5],
        y: [0.0, -1.5],
    });
    page.dispatch(PageMessage::FlagRange(FlagCode::new("4")));
    assert_eq!(page.export_directory(), None);

    page.dispatch(PageMessage::SaveAllFiles(out.path().to_path_buf()));
    assert!(page.notices.is_empty(), "{:?}", page.notices);
    assert_eq!(page.export_directory().as_deref(), Some(out.path()));
    assert!(out.path().join("st2.txt").exists());

    // Reload the saved copy of the flagged file under its own id.
    let saved = out.path().join("st1.txt");
    let (mut other, _rx) = self::page(PageKind::Profile);
    other.dispatch(load("CTD", &saved));
    assert_eq!(temp_flags(&other, "st1"), temp_flags(&page, "st1"));
    assert_eq!(temp_flags(&other, "st1")[0], "4");
}

#[test]
fn save_file_without_selection_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (mut page, _rx) = page(PageKind::Profile);
    page.dispatch(PageMessage::SaveFile(dir.path().join("x.txt")));
    assert_eq!(page.notices.len(), 1);
    assert_eq!(page.notices[0].title, "No file selected");
    assert!(!dir.path().join("x.txt").exists());
}
