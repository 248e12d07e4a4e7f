//! Axis ranges and their synchronization.
//!
//! Every synchronized axis has three places that hold its range: the plot
//! (what is on screen), the user preferences (what survives a restart) and the
//! range entry widget (the min/max text fields). [`AxisSync`] keeps one
//! authoritative value and fans it out from whichever holder changed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QcError, Result};
use crate::persistence::{load_value, sections, store_value, UserPreferences};
use crate::session::memory::parse_timestamp;

// ─────────────────────────────────────────────────────────────────────────────
// AxisRange
// ─────────────────────────────────────────────────────────────────────────────

/// A closed interval with `minimum <= maximum`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct AxisRange {
    minimum: f64,
    maximum: f64,
}

impl AxisRange {
    /// Build a range from two bounds in any order.
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { minimum: a, maximum: b }
        } else {
            Self { minimum: b, maximum: a }
        }
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn span(&self) -> f64 {
        self.maximum - self.minimum
    }

    /// Inclusive at both ends; NaN is never contained.
    pub fn contains(&self, v: f64) -> bool {
        v >= self.minimum && v <= self.maximum
    }

    /// Finite extent of `values`, if any.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<Self> {
        let mut out: Option<(f64, f64)> = None;
        for &v in values {
            if !v.is_finite() {
                continue;
            }
            out = Some(match out {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        out.map(|(lo, hi)| Self::new(lo, hi))
    }

    pub fn union(&self, other: &AxisRange) -> AxisRange {
        AxisRange::new(
            self.minimum.min(other.minimum),
            self.maximum.max(other.maximum),
        )
    }

    /// Widen by `fraction` of the span on both sides (a zero span gets ±0.5).
    pub fn padded(&self, fraction: f64) -> AxisRange {
        let pad = if self.span() > 0.0 { self.span() * fraction } else { 0.5 };
        AxisRange::new(self.minimum - pad, self.maximum + pad)
    }
}

impl From<[f64; 2]> for AxisRange {
    fn from(v: [f64; 2]) -> Self {
        AxisRange::new(v[0], v[1])
    }
}

impl From<AxisRange> for [f64; 2] {
    fn from(r: AxisRange) -> Self {
        [r.minimum, r.maximum]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Axis identity
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    Value,
    /// Depth axis; drawn with the maximum at the bottom.
    Depth,
    Time,
}

impl AxisId {
    pub fn name(&self) -> &'static str {
        match self {
            AxisId::Value => "value",
            AxisId::Depth => "depth",
            AxisId::Time => "time",
        }
    }

    /// The maximum is drawn where other axes draw their minimum.
    pub fn max_is_min(&self) -> bool {
        matches!(self, AxisId::Depth)
    }

    pub fn is_time(&self) -> bool {
        matches!(self, AxisId::Time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSource {
    Plot,
    User,
    Widget,
}

/// Something that holds a copy of an axis range.
pub trait RangeHolder {
    /// Current value; `Ok(None)` when nothing is set.
    fn read(&self) -> Result<Option<AxisRange>>;

    fn write(&mut self, range: AxisRange) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Plot holder
// ─────────────────────────────────────────────────────────────────────────────

/// The plot's view of one axis, in plot coordinates.
///
/// Depth is plotted as `-depth` so that deeper values end up lower on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotAxis {
    pub axis: AxisId,
    bounds: Option<[f64; 2]>,
    pending: Option<[f64; 2]>,
}

impl PlotAxis {
    pub fn new(axis: AxisId) -> Self {
        Self {
            axis,
            bounds: None,
            pending: None,
        }
    }

    pub fn to_plot(&self, v: f64) -> f64 {
        if self.axis.max_is_min() {
            -v
        } else {
            v
        }
    }

    pub fn from_plot(&self, v: f64) -> f64 {
        self.to_plot(v)
    }

    /// Record what the plot currently shows (after user pan/zoom).
    pub fn observe(&mut self, plot_lo: f64, plot_hi: f64) {
        self.bounds = Some([plot_lo.min(plot_hi), plot_lo.max(plot_hi)]);
    }

    /// Bounds the renderer must apply on the next frame.
    pub fn take_pending(&mut self) -> Option<[f64; 2]> {
        self.pending.take()
    }

    pub fn plot_bounds(&self) -> Option<[f64; 2]> {
        self.bounds
    }
}

impl RangeHolder for PlotAxis {
    fn read(&self) -> Result<Option<AxisRange>> {
        Ok(self
            .bounds
            .map(|[lo, hi]| AxisRange::new(self.from_plot(lo), self.from_plot(hi))))
    }

    fn write(&mut self, range: AxisRange) -> Result<()> {
        let b = if self.axis.max_is_min() {
            [-range.maximum(), -range.minimum()]
        } else {
            [range.minimum(), range.maximum()]
        };
        self.bounds = Some(b);
        self.pending = Some(b);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Widget holder
// ─────────────────────────────────────────────────────────────────────────────

/// Min/max text entry for one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeEntry {
    pub axis: AxisId,
    pub min_text: String,
    pub max_text: String,
}

impl RangeEntry {
    pub fn new(axis: AxisId) -> Self {
        Self {
            axis,
            min_text: String::new(),
            max_text: String::new(),
        }
    }

    pub fn set_text(&mut self, min_text: &str, max_text: &str) {
        self.min_text = min_text.to_string();
        self.max_text = max_text.to_string();
    }

    fn parse(&self, text: &str) -> Result<f64> {
        let parsed = if self.axis.is_time() {
            parse_timestamp(text).or_else(|| text.trim().parse::<f64>().ok())
        } else {
            text.trim().parse::<f64>().ok()
        };
        parsed.filter(|v| v.is_finite()).ok_or_else(|| {
            QcError::missing(
                "Invalid range",
                format!("cannot read '{}' as a {} limit", text.trim(), self.axis.name()),
            )
        })
    }

    fn format(&self, v: f64) -> String {
        if self.axis.is_time() {
            chrono::DateTime::from_timestamp(v.round() as i64, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| v.to_string())
        } else {
            let s = format!("{:.4}", v);
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        }
    }
}

impl RangeHolder for RangeEntry {
    fn read(&self) -> Result<Option<AxisRange>> {
        if self.min_text.trim().is_empty() && self.max_text.trim().is_empty() {
            return Ok(None);
        }
        let lo = self.parse(&self.min_text)?;
        let hi = self.parse(&self.max_text)?;
        Ok(Some(AxisRange::new(lo, hi)))
    }

    fn write(&mut self, range: AxisRange) -> Result<()> {
        self.min_text = self.format(range.minimum());
        self.max_text = self.format(range.maximum());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User-preference holder
// ─────────────────────────────────────────────────────────────────────────────

/// The stored range in the user preferences; writes go straight to the store.
pub struct UserRange<'a> {
    prefs: &'a mut dyn UserPreferences,
    key: String,
}

impl<'a> UserRange<'a> {
    pub fn new(prefs: &'a mut dyn UserPreferences, key: impl Into<String>) -> Self {
        Self {
            prefs,
            key: key.into(),
        }
    }
}

impl RangeHolder for UserRange<'_> {
    fn read(&self) -> Result<Option<AxisRange>> {
        Ok(load_value(&*self.prefs, sections::AXIS_RANGE, &self.key))
    }

    fn write(&mut self, range: AxisRange) -> Result<()> {
        store_value(&mut *self.prefs, sections::AXIS_RANGE, &self.key, &range)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synchronizer
// ─────────────────────────────────────────────────────────────────────────────

/// The three holders of one axis.
pub struct AxisHolders<'a> {
    pub plot: &'a mut dyn RangeHolder,
    pub user: &'a mut dyn RangeHolder,
    pub widget: &'a mut dyn RangeHolder,
}

impl AxisHolders<'_> {
    fn get(&mut self, source: RangeSource) -> &mut dyn RangeHolder {
        match source {
            RangeSource::Plot => &mut *self.plot,
            RangeSource::User => &mut *self.user,
            RangeSource::Widget => &mut *self.widget,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOutcome {
    pub range: AxisRange,
    /// The plot holder was written and must be redrawn.
    pub redraw: bool,
    /// Nothing was stored and the data extent was used.
    pub fell_back: bool,
}

/// Authoritative range of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSync {
    pub axis: AxisId,
    current: Option<AxisRange>,
}

impl AxisSync {
    pub fn new(axis: AxisId) -> Self {
        Self {
            axis,
            current: None,
        }
    }

    pub fn current(&self) -> Option<AxisRange> {
        self.current
    }

    /// Read `source` once, make it authoritative and write it to the other
    /// holders. The plot holder is only written (and redrawn) when
    /// `propagate` is set.
    ///
    /// A `User` source with nothing stored falls back to `extent`, which is
    /// then written to all three holders.
    pub fn sync(
        &mut self,
        source: RangeSource,
        mut holders: AxisHolders<'_>,
        extent: Option<AxisRange>,
        propagate: bool,
    ) -> Result<SyncOutcome> {
        let read = holders.get(source).read()?;
        let (range, fell_back) = match (read, source) {
            (Some(r), _) => (r, false),
            (None, RangeSource::User) => {
                let r = extent.ok_or_else(|| {
                    QcError::missing("No data", format!("no {} range to show", self.axis.name()))
                })?;
                (r, true)
            }
            (None, _) => {
                return Err(QcError::missing(
                    "No range",
                    format!("enter a {} range first", self.axis.name()),
                ))
            }
        };
        self.current = Some(range);

        let mut redraw = false;
        for target in [RangeSource::Plot, RangeSource::User, RangeSource::Widget] {
            if target == source && !fell_back {
                continue;
            }
            if target == RangeSource::Plot && !(propagate || fell_back) {
                continue;
            }
            holders.get(target).write(range)?;
            redraw |= target == RangeSource::Plot;
        }
        debug!(
            "{} range synced from {:?}: {}..{} (redraw {})",
            self.axis.name(),
            source,
            range.minimum(),
            range.maximum(),
            redraw
        );
        Ok(SyncOutcome {
            range,
            redraw,
            fell_back,
        })
    }

    /// Drop the authoritative value (e.g. when the file changes).
    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPreferences;

    #[test]
    fn axis_range_normalises_and_is_inclusive() {
        let r = AxisRange::new(5.0, 1.0);
        assert_eq!((r.minimum(), r.maximum()), (1.0, 5.0));
        assert!(r.contains(1.0) && r.contains(5.0));
        assert!(!r.contains(f64::NAN));
        assert_eq!(
            AxisRange::from_values(&[3.0, f64::NAN, -1.0, 2.0]),
            Some(AxisRange::new(-1.0, 3.0))
        );
        assert_eq!(AxisRange::from_values(&[f64::NAN]), None);
    }

    #[test]
    fn axis_range_serializes_as_pair() {
        let r = AxisRange::new(2.0, 1.0);
        assert_eq!(serde_json::to_string(&r).unwrap(), "[1.0,2.0]");
        let back: AxisRange = serde_json::from_str("[9.0, 3.0]").unwrap();
        assert_eq!(back, AxisRange::new(3.0, 9.0));
    }

    #[test]
    fn depth_plot_axis_is_inverted() {
        let mut plot = PlotAxis::new(AxisId::Depth);
        plot.write(AxisRange::new(0.0, 50.0)).unwrap();
        assert_eq!(plot.take_pending(), Some([-50.0, 0.0]));
        assert_eq!(plot.read().unwrap(), Some(AxisRange::new(0.0, 50.0)));
        plot.observe(-10.0, -20.0);
        assert_eq!(plot.read().unwrap(), Some(AxisRange::new(10.0, 20.0)));
    }

    #[test]
    fn range_entry_parses_time_and_rejects_garbage() {
        let mut entry = RangeEntry::new(AxisId::Time);
        entry.set_text("2018-01-01 00:00", "2018-01-02 00:00:00");
        let r = entry.read().unwrap().unwrap();
        assert_eq!(r.span(), 86400.0);
        entry.write(r).unwrap();
        assert_eq!(entry.min_text, "2018-01-01 00:00:00");

        let mut entry = RangeEntry::new(AxisId::Value);
        entry.set_text("1.5", "abc");
        assert!(matches!(entry.read(), Err(QcError::UserInputMissing { .. })));
        entry.write(AxisRange::new(1.5, 10.0)).unwrap();
        assert_eq!((entry.min_text.as_str(), entry.max_text.as_str()), ("1.5", "10"));
    }

    #[test]
    fn widget_source_does_not_write_widget() {
        let mut prefs = MemoryPreferences::new();
        let mut plot = PlotAxis::new(AxisId::Value);
        let mut widget = RangeEntry::new(AxisId::Value);
        widget.set_text("3", "1");
        let mut sync = AxisSync::new(AxisId::Value);
        let mut user = UserRange::new(&mut prefs, "profile/value");
        let out = sync
            .sync(
                RangeSource::Widget,
                AxisHolders {
                    plot: &mut plot,
                    user: &mut user,
                    widget: &mut widget,
                },
                None,
                true,
            )
            .unwrap();
        assert!(out.redraw);
        assert_eq!(out.range, AxisRange::new(1.0, 3.0));
        // untouched text, since the widget was the source
        assert_eq!(widget.min_text, "3");
        assert_eq!(plot.read().unwrap(), Some(AxisRange::new(1.0, 3.0)));
    }

    #[test]
    fn no_propagation_still_updates_the_other_holders() {
        let mut prefs = MemoryPreferences::new();
        let mut plot = PlotAxis::new(AxisId::Value);
        plot.observe(2.0, 8.0);
        let mut widget = RangeEntry::new(AxisId::Value);
        let mut sync = AxisSync::new(AxisId::Value);
        let mut user = UserRange::new(&mut prefs, "k");
        let out = sync
            .sync(
                RangeSource::Plot,
                AxisHolders {
                    plot: &mut plot,
                    user: &mut user,
                    widget: &mut widget,
                },
                None,
                false,
            )
            .unwrap();
        assert!(!out.redraw);
        assert_eq!(sync.current(), Some(AxisRange::new(2.0, 8.0)));
        assert_eq!(user.read().unwrap(), Some(AxisRange::new(2.0, 8.0)));
        assert_eq!(widget.read().unwrap(), Some(AxisRange::new(2.0, 8.0)));
        assert_eq!(plot.take_pending(), None);
    }

    #[test]
    fn no_propagation_leaves_plot_bounds_alone() {
        let mut prefs = MemoryPreferences::new();
        let mut plot = PlotAxis::new(AxisId::Value);
        plot.observe(0.0, 1.0);
        let mut widget = RangeEntry::new(AxisId::Value);
        widget.set_text("4", "6");
        let mut sync = AxisSync::new(AxisId::Value);
        let mut user = UserRange::new(&mut prefs, "k");
        let out = sync
            .sync(
                RangeSource::Widget,
                AxisHolders {
                    plot: &mut plot,
                    user: &mut user,
                    widget: &mut widget,
                },
                None,
                false,
            )
            .unwrap();
        assert!(!out.redraw);
        assert_eq!(plot.read().unwrap(), Some(AxisRange::new(0.0, 1.0)));
        assert_eq!(plot.take_pending(), None);
        assert_eq!(user.read().unwrap(), Some(AxisRange::new(4.0, 6.0)));
    }
}
