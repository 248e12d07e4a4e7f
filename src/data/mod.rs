//! Coordinators and the state they work on. Nothing in here draws; the panels
//! render what these modules produce.

pub mod auto_qc;
pub mod axis;
pub mod comparison;
pub mod flagging;
pub mod flags;
pub mod map_overlay;
pub mod plot;
pub mod selection;
