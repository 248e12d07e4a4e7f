use sensor_qc::data::axis::{
    AxisHolders, AxisId, AxisRange, AxisSync, PlotAxis, RangeEntry, RangeHolder, RangeSource,
    UserRange,
};
use sensor_qc::MemoryPreferences;

fn sync_from(
    sync: &mut AxisSync,
    plot: &mut PlotAxis,
    prefs: &mut MemoryPreferences,
    entry: &mut RangeEntry,
    source: RangeSource,
    extent: Option<AxisRange>,
) -> sensor_qc::Result<AxisRange> {
    let mut user = UserRange::new(prefs, "profile/value");
    let outcome = sync.sync(
        source,
        AxisHolders {
            plot,
            user: &mut user,
            widget: entry,
        },
        extent,
        true,
    )?;
    Ok(outcome.range)
}

#[test]
fn plot_range_reaches_user_and_widget_holders() {
    for (lo, hi) in [(0.0, 1.0), (-3.5, 12.25), (7.0, 7.0), (1e-3, 2e3)] {
        let mut sync = AxisSync::new(AxisId::Value);
        let mut plot = PlotAxis::new(AxisId::Value);
        let mut entry = RangeEntry::new(AxisId::Value);
        let mut prefs = MemoryPreferences::new();
        plot.observe(lo, hi);

        let r = sync_from(&mut sync, &mut plot, &mut prefs, &mut entry, RangeSource::Plot, None)
            .unwrap();
        assert_eq!(r, AxisRange::new(lo, hi));
        assert_eq!(entry.read().unwrap(), Some(AxisRange::new(lo, hi)));
        let user = UserRange::new(&mut prefs, "profile/value");
        assert_eq!(user.read().unwrap(), Some(AxisRange::new(lo, hi)));
    }
}

#[test]
fn plot_source_is_not_written_back() {
    let mut sync = AxisSync::new(AxisId::Value);
    let mut plot = PlotAxis::new(AxisId::Value);
    let mut entry = RangeEntry::new(AxisId::Value);
    let mut prefs = MemoryPreferences::new();
    plot.observe(2.0, 4.0);
    sync_from(&mut sync, &mut plot, &mut prefs, &mut entry, RangeSource::Plot, None).unwrap();
    assert_eq!(plot.take_pending(), None, "the plot must not be told to move");
    assert_eq!(prefs.writes, 1, "user preference is written through once");
}

#[test]
fn missing_user_value_falls_back_to_data_extent() {
    let mut sync = AxisSync::new(AxisId::Depth);
    let mut plot = PlotAxis::new(AxisId::Depth);
    let mut entry = RangeEntry::new(AxisId::Depth);
    let mut prefs = MemoryPreferences::new();
    let extent = AxisRange::new(0.0, 80.0);

    let r = sync_from(&mut sync, &mut plot, &mut prefs, &mut entry, RangeSource::User, Some(extent))
        .unwrap();
    assert_eq!(r, extent);
    assert_eq!(sync.current(), Some(extent));
    // Depth is drawn downwards.
    assert_eq!(plot.take_pending(), Some([-80.0, 0.0]));
    assert_eq!(entry.min_text, "0");
    assert_eq!(entry.max_text, "80");
    let user = UserRange::new(&mut prefs, "profile/value");
    assert_eq!(user.read().unwrap(), Some(extent));
}

#[test]
fn user_without_value_or_extent_is_an_input_error() {
    let mut sync = AxisSync::new(AxisId::Value);
    let mut plot = PlotAxis::new(AxisId::Value);
    let mut entry = RangeEntry::new(AxisId::Value);
    let mut prefs = MemoryPreferences::new();
    let err = sync_from(&mut sync, &mut plot, &mut prefs, &mut entry, RangeSource::User, None)
        .unwrap_err();
    assert!(matches!(err, sensor_qc::QcError::UserInputMissing { .. }));
    assert_eq!(sync.current(), None);
}

#[test]
fn reversed_entry_text_is_normalised() {
    let mut sync = AxisSync::new(AxisId::Value);
    let mut plot = PlotAxis::new(AxisId::Value);
    let mut entry = RangeEntry::new(AxisId::Value);
    let mut prefs = MemoryPreferences::new();
    entry.set_text("9", "3");
    let r = sync_from(&mut sync, &mut plot, &mut prefs, &mut entry, RangeSource::Widget, None)
        .unwrap();
    assert_eq!((r.minimum(), r.maximum()), (3.0, 9.0));
    assert_eq!(plot.take_pending(), Some([3.0, 9.0]));
}
