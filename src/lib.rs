//! sensor-qc crate root: re-exports and module wiring.
//!
//! An interactive quality-control workbench for oceanographic sensor data
//! (ferrybox, fixed platforms, CTD profiles) built on egui/eframe.
//!
//! - `session`: the data-layer contract and the in-memory session
//! - `data`: selection state and the coordinators (axis sync, flagging,
//!   comparison, automatic QC, map overlays, plot model); no widgets
//! - `panels`: egui panels behind one `Panel` trait
//! - `app`: the page controller, its eframe wrapper and `run_qc_app`
//! - `config`, `controllers`, `events`, `persistence`, `error`: ambient pieces

pub mod app;
pub mod config;
pub mod controllers;
pub mod data;
pub mod error;
pub mod events;
pub mod panels;
pub mod persistence;
pub mod session;

// Public re-exports for a compact external API
pub use app::{run_qc_app, Notice, NoticeLevel, PageMessage, QcApp, QcPage};
pub use config::{FeatureFlags, MapBoundaries, PageKind, QcConfig};
pub use controllers::{ProgressController, StatusController, StatusStyle};
pub use error::{QcError, Result, SessionError};
pub use events::{EventController, EventKind, QcEvent};
pub use persistence::{JsonPreferences, MemoryPreferences, UserPreferences};
pub use session::{FileId, FlagCode, LoadRequest, MemorySession, Session, SessionHandle};
