use std::collections::BTreeSet;
use std::sync::Arc;

use sensor_qc::config::PlotColors;
use sensor_qc::data::axis::AxisRange;
use sensor_qc::data::map_overlay::{
    hover_marker, refresh, MapCanvas, MapContext, MapSlot, MapTarget, MapTargets, MarkerLayer,
    ScatterLayer,
};
use sensor_qc::data::selection::SelectionState;
use sensor_qc::session::{Dataset, SamplingSettings};
use sensor_qc::{FileId, FlagCode, MapBoundaries, MemorySession, Session};

/// Records every call it receives.
#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
}

impl MapTarget for Recorder {
    fn clear(&mut self) {
        self.calls.push("clear".into());
    }
    fn set_title(&mut self, title: &str) {
        self.calls.push(format!("title {title}"));
    }
    fn set_boundaries(&mut self, _boundaries: MapBoundaries) {
        self.calls.push("boundaries".into());
    }
    fn add_markers(&mut self, layer: MarkerLayer) {
        self.calls.push(format!("markers {}", layer.name));
    }
    fn add_scatter(&mut self, layer: ScatterLayer) {
        self.calls.push(format!("scatter {} {}", layer.name, layer.points.len()));
    }
}

fn session() -> MemorySession {
    let s = Arc::new(SamplingSettings::standard("default"));
    let mut session = MemorySession::new();
    session.insert_dataset(
        Dataset::new(FileId::new("fb"), "Ferrybox CMEMS", s.clone())
            .with_positions(
                vec![0.0, 100.0, 200.0, 300.0],
                vec![57.0, 57.1, 57.2, 57.3],
                vec![11.0, 11.1, 11.2, 11.3],
                vec![4.0; 4],
            )
            .with_parameter("TEMP", vec![10.0, 11.0, 12.0, 13.0]),
    ).unwrap();
    session.insert_dataset(
        Dataset::new(FileId::new("ctd"), "CTD SHARK", s)
            .with_positions(vec![0.0; 2], vec![58.0; 2], vec![12.0; 2], vec![1.0, 2.0])
            .with_parameter("TEMP", vec![9.0, 8.0]),
    ).unwrap();
    session
}

fn select(session: &MemorySession, file: &str, parameter: Option<&str>) -> SelectionState {
    let mut sel = SelectionState::new();
    sel.set_file_list(session.loaded_files());
    sel.set_current_file(Some(FileId::new(file))).unwrap();
    sel.set_parameter_list(session.parameters(&FileId::new(file)).unwrap());
    sel.set_parameter(parameter.map(str::to_string)).unwrap();
    sel
}

fn flags() -> BTreeSet<FlagCode> {
    [FlagCode::new("0")].into_iter().collect()
}

#[test]
fn closed_maps_are_skipped_without_error() {
    let session = session();
    let sel = select(&session, "fb", Some("TEMP"));
    let colors = PlotColors::default();
    let visible = flags();
    let ctx = MapContext {
        boundaries: MapBoundaries::default(),
        colors: &colors,
        time_range: None,
        value_range: None,
        visible_flags: &visible,
    };
    let mut targets = MapTargets::default();
    let out = refresh(&mut targets, &session, &sel, &ctx).unwrap();
    assert_eq!(out.primary_targets, 0);
    assert_eq!(out.secondary_targets, 0);
}

#[test]
fn ferrybox_draws_track_highlight_and_scatter() {
    let session = session();
    let sel = select(&session, "fb", Some("TEMP"));
    let colors = PlotColors::default();
    let visible = flags();
    let ctx = MapContext {
        boundaries: MapBoundaries::default(),
        colors: &colors,
        time_range: Some(AxisRange::new(100.0, 200.0)),
        value_range: None,
        visible_flags: &visible,
    };
    let mut main = Recorder::default();
    let mut popout = Recorder::default();
    let mut values = MapCanvas::default();
    let mut targets = MapTargets {
        primary: MapSlot {
            main: Some(&mut main),
            popout: Some(&mut popout),
        },
        secondary: MapSlot {
            main: Some(&mut values),
            popout: None,
        },
    };
    let out = refresh(&mut targets, &session, &sel, &ctx).unwrap();
    drop(targets);
    assert_eq!(out.primary_targets, 2);
    assert_eq!(out.secondary_targets, 1);

    assert_eq!(main.calls[0], "clear");
    assert!(main.calls.contains(&"markers fb track".to_string()));
    assert!(main.calls.contains(&"markers fb selection".to_string()));
    assert_eq!(main.calls, popout.calls);

    // Only the two records inside the time range end up in the scatter.
    assert_eq!(values.scatter.len(), 1);
    assert_eq!(values.scatter[0].points.len(), 2);
    assert_eq!(values.scatter[0].color_range, AxisRange::new(11.0, 12.0));
}

#[test]
fn ctd_station_is_a_single_marker_without_scatter() {
    let session = session();
    let sel = select(&session, "ctd", Some("TEMP"));
    let colors = PlotColors::default();
    let visible = flags();
    let ctx = MapContext {
        boundaries: MapBoundaries::default(),
        colors: &colors,
        time_range: None,
        value_range: None,
        visible_flags: &visible,
    };
    let mut positions = MapCanvas::default();
    let mut values = MapCanvas::default();
    let mut targets = MapTargets {
        primary: MapSlot {
            main: Some(&mut positions),
            popout: None,
        },
        secondary: MapSlot {
            main: Some(&mut values),
            popout: None,
        },
    };
    refresh(&mut targets, &session, &sel, &ctx).unwrap();
    drop(targets);
    let station = positions
        .markers
        .iter()
        .find(|l| l.name == "ctd")
        .expect("station marker");
    assert_eq!(station.points, vec![[12.0, 58.0]]);
    assert!(values.scatter.is_empty());
}

#[test]
fn hover_marker_picks_nearest_record_in_window() {
    let session = session();
    let fb = FileId::new("fb");
    let m = hover_marker(&session, &fb, 190.0, 50.0, egui::Color32::RED)
        .unwrap()
        .unwrap();
    assert_eq!(m.points, vec![[11.2, 57.2]]);
    assert!(hover_marker(&session, &fb, 5000.0, 50.0, egui::Color32::RED)
        .unwrap()
        .is_none());
}
