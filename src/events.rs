//! Event system for the QC workbench.
//!
//! Embedding code can observe what the page does (files loaded, records
//! flagged, QC batches finished, ...) via [`EventController`]. Each event
//! carries a set of [`EventKind`] flags so one occurrence can match several
//! categories; a subscriber's [`EventFilter`] is an OR mask over them.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::session::{FileId, FlagCode};

// ─────────────────────────────────────────────────────────────────────────────
// EventKind – bitflags
// ─────────────────────────────────────────────────────────────────────────────

/// Bitflags describing the categories an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind(pub u64);

impl EventKind {
    // ── Files ───────────────────────────────────────────────────────────
    /// A data file was loaded into the session.
    pub const FILE_LOADED: Self = Self(1 << 0);
    /// A data file was removed from the session.
    pub const FILE_REMOVED: Self = Self(1 << 1);
    /// The current file changed.
    pub const FILE_SELECTED: Self = Self(1 << 2);
    /// The current parameter changed.
    pub const PARAMETER_SELECTED: Self = Self(1 << 3);

    // ── Ranges ──────────────────────────────────────────────────────────
    /// An axis range was synchronized.
    pub const RANGE_SYNCED: Self = Self(1 << 4);
    /// A flag range was drawn on the plot.
    pub const RANGE_DRAWN: Self = Self(1 << 5);

    // ── Flags ───────────────────────────────────────────────────────────
    /// Records were flagged.
    pub const FLAGGED: Self = Self(1 << 6);
    /// A flag style or its visibility changed.
    pub const FLAG_STYLE_CHANGED: Self = Self(1 << 7);

    // ── Comparison / QC ─────────────────────────────────────────────────
    /// The comparison view was (re)computed.
    pub const COMPARISON_UPDATED: Self = Self(1 << 8);
    /// An automatic QC batch started on the worker.
    pub const QC_RUN_STARTED: Self = Self(1 << 9);
    /// An automatic QC batch finished.
    pub const QC_RUN_FINISHED: Self = Self(1 << 10);

    // ── Rendering / user feedback ───────────────────────────────────────
    /// The maps were refreshed.
    pub const MAP_REFRESHED: Self = Self(1 << 11);
    /// A notice was shown to the user.
    pub const NOTICE: Self = Self(1 << 12);

    /// Wildcard: matches every event kind.
    pub const ALL: Self = Self(u64::MAX);

    /// Check whether `self` contains all bits in `other`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check whether `self` has at least one bit in common with `other`.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventKind {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "EMPTY");
        }
        if *self == EventKind::ALL {
            return write!(f, "ALL");
        }

        let pairs: &[(EventKind, &str)] = &[
            (EventKind::FILE_LOADED, "FILE_LOADED"),
            (EventKind::FILE_REMOVED, "FILE_REMOVED"),
            (EventKind::FILE_SELECTED, "FILE_SELECTED"),
            (EventKind::PARAMETER_SELECTED, "PARAMETER_SELECTED"),
            (EventKind::RANGE_SYNCED, "RANGE_SYNCED"),
            (EventKind::RANGE_DRAWN, "RANGE_DRAWN"),
            (EventKind::FLAGGED, "FLAGGED"),
            (EventKind::FLAG_STYLE_CHANGED, "FLAG_STYLE_CHANGED"),
            (EventKind::COMPARISON_UPDATED, "COMPARISON_UPDATED"),
            (EventKind::QC_RUN_STARTED, "QC_RUN_STARTED"),
            (EventKind::QC_RUN_FINISHED, "QC_RUN_FINISHED"),
            (EventKind::MAP_REFRESHED, "MAP_REFRESHED"),
            (EventKind::NOTICE, "NOTICE"),
        ];

        let mut names = Vec::new();
        let mut known_bits: u64 = 0;
        for (kind, name) in pairs {
            known_bits |= kind.0;
            if self.contains(*kind) {
                names.push((*name).to_string());
            }
        }
        let extra = self.0 & !known_bits;
        if extra != 0 {
            names.push(format!("0x{:x}", extra));
        }
        write!(f, "{}", names.join("|"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata – per-event-type payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FileMeta {
    pub file_id: FileId,
    pub sampling_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagMeta {
    pub file_id: FileId,
    pub parameter: String,
    pub flag: FlagCode,
    /// Records flagged (main parameter only).
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeMeta {
    pub axis: String,
    pub minimum: f64,
    pub maximum: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QcRunMeta {
    pub files: usize,
    pub succeeded: Vec<String>,
    pub warnings: usize,
    pub aborted: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoticeMeta {
    pub title: String,
    pub text: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// QcEvent – the top-level event type
// ─────────────────────────────────────────────────────────────────────────────

/// An event emitted by the QC page.
#[derive(Debug, Clone)]
pub struct QcEvent {
    pub kinds: EventKind,
    /// Seconds since the controller was created; set on emit.
    pub timestamp: f64,

    pub file: Option<FileMeta>,
    pub flag: Option<FlagMeta>,
    pub range: Option<RangeMeta>,
    pub qc_run: Option<QcRunMeta>,
    pub notice: Option<NoticeMeta>,
}

impl QcEvent {
    pub fn new(kinds: EventKind) -> Self {
        Self {
            kinds,
            timestamp: 0.0,
            file: None,
            flag: None,
            range: None,
            qc_run: None,
            notice: None,
        }
    }

    pub fn with_file(mut self, file_id: &FileId, sampling_type: &str) -> Self {
        self.file = Some(FileMeta {
            file_id: file_id.clone(),
            sampling_type: sampling_type.to_string(),
        });
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventFilter
// ─────────────────────────────────────────────────────────────────────────────

/// An OR mask: an event is delivered when `event.kinds.intersects(filter.mask)`.
#[derive(Debug, Clone, Copy)]
pub struct EventFilter {
    pub mask: EventKind,
}

impl EventFilter {
    pub const fn all() -> Self {
        Self {
            mask: EventKind::ALL,
        }
    }

    pub const fn only(mask: EventKind) -> Self {
        Self { mask }
    }

    #[inline]
    pub fn matches(&self, event: &QcEvent) -> bool {
        event.kinds.intersects(self.mask)
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventController
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct Subscriber {
    filter: EventFilter,
    sender: Sender<QcEvent>,
}

/// Collects page events and distributes them to subscribers.
///
/// Attach it to [`QcConfig`](crate::config::QcConfig) before launching the
/// UI, then call [`subscribe`](Self::subscribe) to receive events on an
/// `mpsc` channel.
#[derive(Clone)]
pub struct EventController {
    pub(crate) inner: Arc<Mutex<EventCtrlInner>>,
}

pub(crate) struct EventCtrlInner {
    pub(crate) subscribers: Vec<Subscriber>,
    pub(crate) start_instant: std::time::Instant,
}

impl EventController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventCtrlInner {
                subscribers: Vec::new(),
                start_instant: std::time::Instant::now(),
            })),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> Receiver<QcEvent> {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.subscribers.push(Subscriber { filter, sender: tx });
        rx
    }

    pub fn subscribe_all(&self) -> Receiver<QcEvent> {
        self.subscribe(EventFilter::all())
    }

    /// Send `event` to every subscriber whose filter matches; closed channels are dropped.
    pub fn emit(&self, mut event: QcEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        event.timestamp = inner.start_instant.elapsed().as_secs_f64();
        trace!("event {} at {:.3}s", event.kinds, event.timestamp);
        inner.subscribers.retain(|sub| {
            if sub.filter.matches(&event) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                true
            }
        });
    }
}

impl Default for EventController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_filter_matches_combined_kinds() {
        let filter = EventFilter::only(EventKind::FLAGGED | EventKind::QC_RUN_FINISHED);
        assert!(filter.matches(&QcEvent::new(EventKind::FLAGGED)));
        assert!(!filter.matches(&QcEvent::new(EventKind::MAP_REFRESHED)));
        assert!(filter.matches(&QcEvent::new(
            EventKind::QC_RUN_FINISHED | EventKind::NOTICE
        )));
        assert!(EventFilter::all().matches(&QcEvent::new(EventKind::NOTICE)));
    }

    #[test]
    fn controller_delivers_only_matching_events() {
        let ctrl = EventController::new();
        let rx_all = ctrl.subscribe_all();
        let rx_flags = ctrl.subscribe(EventFilter::only(EventKind::FLAGGED));

        ctrl.emit(QcEvent::new(EventKind::FILE_LOADED).with_file(&FileId::new("a"), "CTD"));
        let evt = rx_all.try_recv().unwrap();
        assert_eq!(evt.file.unwrap().file_id, FileId::new("a"));
        assert!(rx_flags.try_recv().is_err());

        ctrl.emit(QcEvent::new(EventKind::FLAGGED));
        assert!(rx_flags.try_recv().is_ok());
    }

    #[test]
    fn closed_subscribers_are_dropped() {
        let ctrl = EventController::new();
        drop(ctrl.subscribe_all());
        ctrl.emit(QcEvent::new(EventKind::NOTICE));
        assert!(ctrl.inner.lock().unwrap().subscribers.is_empty());
    }

    #[test]
    fn event_kind_display() {
        assert_eq!(format!("{}", EventKind::FLAGGED), "FLAGGED");
        assert_eq!(
            format!("{}", EventKind::FILE_LOADED | EventKind::FILE_SELECTED),
            "FILE_LOADED|FILE_SELECTED"
        );
        assert_eq!(format!("{}", EventKind::ALL), "ALL");
        assert!(format!("{}", EventKind(1 << 63)).starts_with("0x"));
    }
}
