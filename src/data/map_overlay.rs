//! Map overlays for the current selection.
//!
//! Two map slots exist: the primary map shows positions, the secondary map
//! shows ferrybox values along the track. Each slot has a main widget and an
//! optional popped-out twin; any of them may be closed, in which case it is
//! skipped.

use std::collections::BTreeSet;

use egui::Color32;
use egui_plot::MarkerShape;
use tracing::debug;

use crate::config::{MapBoundaries, PlotColors};
use crate::data::axis::AxisRange;
use crate::data::selection::SelectionState;
use crate::error::Result;
use crate::session::{FileId, FilterOptions, FlagCode, MaskOptions, Session};

/// How a sampling type is drawn on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingKind {
    FixedPlatform,
    Ctd,
    Ferrybox,
    Other,
}

impl SamplingKind {
    pub fn from_sampling_type(sampling_type: &str) -> Self {
        let s = sampling_type.to_lowercase();
        if s.contains("fixed platform") {
            SamplingKind::FixedPlatform
        } else if s.contains("ctd") {
            SamplingKind::Ctd
        } else if s.contains("ferrybox") {
            SamplingKind::Ferrybox
        } else {
            SamplingKind::Other
        }
    }
}

/// Point markers, `[lon, lat]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerLayer {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub color: Color32,
    pub marker: MarkerShape,
    pub size: f32,
    /// Drawing order; higher is on top.
    pub z: i32,
}

/// Value-coloured scatter, `[lon, lat, value]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterLayer {
    pub name: String,
    pub points: Vec<[f64; 3]>,
    pub color_range: AxisRange,
    pub colorbar_title: String,
}

/// A map widget the updater draws into.
pub trait MapTarget {
    fn clear(&mut self);
    fn set_title(&mut self, title: &str);
    fn set_boundaries(&mut self, boundaries: MapBoundaries);
    fn add_markers(&mut self, layer: MarkerLayer);
    fn add_scatter(&mut self, layer: ScatterLayer);
}

/// Render instructions kept for an egui map widget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapCanvas {
    pub title: String,
    pub boundaries: Option<MapBoundaries>,
    pub markers: Vec<MarkerLayer>,
    pub scatter: Vec<ScatterLayer>,
    /// Set by the hover handler, drawn on top of everything.
    pub hover: Option<MarkerLayer>,
}

impl MapTarget for MapCanvas {
    fn clear(&mut self) {
        self.title.clear();
        self.markers.clear();
        self.scatter.clear();
        self.hover = None;
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn set_boundaries(&mut self, boundaries: MapBoundaries) {
        self.boundaries = Some(boundaries);
    }

    fn add_markers(&mut self, layer: MarkerLayer) {
        self.markers.push(layer);
        self.markers.sort_by_key(|l| l.z);
    }

    fn add_scatter(&mut self, layer: ScatterLayer) {
        self.scatter.push(layer);
    }
}

/// A main map and its optional popped-out twin.
#[derive(Default)]
pub struct MapSlot<'a> {
    pub main: Option<&'a mut dyn MapTarget>,
    pub popout: Option<&'a mut dyn MapTarget>,
}

impl MapSlot<'_> {
    fn for_each(&mut self, mut f: impl FnMut(&mut dyn MapTarget)) {
        if let Some(t) = self.main.as_deref_mut() {
            f(t);
        }
        if let Some(t) = self.popout.as_deref_mut() {
            f(t);
        }
    }

    pub fn is_open(&self) -> bool {
        self.main.is_some() || self.popout.is_some()
    }
}

#[derive(Default)]
pub struct MapTargets<'a> {
    pub primary: MapSlot<'a>,
    pub secondary: MapSlot<'a>,
}

/// Everything besides the selection that the overlays depend on.
#[derive(Debug, Clone)]
pub struct MapContext<'a> {
    pub boundaries: MapBoundaries,
    pub colors: &'a PlotColors,
    /// Current time axis range (time-series pages).
    pub time_range: Option<AxisRange>,
    /// Current value axis range, bounds the colour scale.
    pub value_range: Option<AxisRange>,
    pub visible_flags: &'a BTreeSet<FlagCode>,
}

/// What [`refresh`] drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapRefresh {
    pub primary_targets: usize,
    pub secondary_targets: usize,
}

fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

fn positions(
    session: &dyn Session,
    file_id: &FileId,
    filter: &FilterOptions,
) -> Result<Vec<[f64; 2]>> {
    let data = session.get_data(file_id, &["lon", "lat"], filter, &MaskOptions::default())?;
    Ok(data
        .get("lon")?
        .iter()
        .zip(data.get("lat")?)
        .filter(|(lon, lat)| lon.is_finite() && lat.is_finite())
        .map(|(&lon, &lat)| [lon, lat])
        .collect())
}

fn time_filter(range: Option<AxisRange>) -> FilterOptions {
    match range {
        Some(r) => FilterOptions::time(r.minimum(), r.maximum()),
        None => FilterOptions::default(),
    }
}

fn primary_layers(
    session: &dyn Session,
    selection: &SelectionState,
    ctx: &MapContext<'_>,
) -> Result<(String, Vec<MarkerLayer>)> {
    let mut layers = Vec::new();
    let mut background = Vec::new();
    for (_, id) in session.loaded_files() {
        background.extend(positions(session, &id, &FilterOptions::default())?);
    }
    if !background.is_empty() {
        layers.push(MarkerLayer {
            name: "All files".to_string(),
            points: background,
            color: ctx.colors.background_data,
            marker: MarkerShape::Circle,
            size: 1.5,
            z: 0,
        });
    }

    let Some(file_id) = selection.current_file_id() else {
        return Ok((String::new(), layers));
    };
    let info = session.dataset(file_id)?;
    let title = info
        .station_name
        .clone()
        .unwrap_or_else(|| file_id.to_string());
    let all = positions(session, file_id, &FilterOptions::default())?;
    let mean_pos = || -> Option<[f64; 2]> {
        let lons: Vec<f64> = all.iter().map(|p| p[0]).collect();
        let lats: Vec<f64> = all.iter().map(|p| p[1]).collect();
        Some([mean(&lons)?, mean(&lats)?])
    };
    match SamplingKind::from_sampling_type(&info.sampling_type) {
        SamplingKind::FixedPlatform => {
            if let Some(p) = mean_pos() {
                layers.push(MarkerLayer {
                    name: title.clone(),
                    points: vec![p],
                    color: ctx.colors.fixed_platform,
                    marker: MarkerShape::Square,
                    size: 10.0,
                    z: 20,
                });
            }
        }
        SamplingKind::Ctd => {
            if let Some(p) = mean_pos() {
                layers.push(MarkerLayer {
                    name: title.clone(),
                    points: vec![p],
                    color: ctx.colors.ctd_station,
                    marker: MarkerShape::Diamond,
                    size: 10.0,
                    z: 21,
                });
            }
        }
        SamplingKind::Ferrybox => {
            let highlighted = positions(session, file_id, &time_filter(ctx.time_range))?;
            layers.push(MarkerLayer {
                name: format!("{title} track"),
                points: all.clone(),
                color: ctx.colors.track_base,
                marker: MarkerShape::Circle,
                size: 2.0,
                z: 10,
            });
            layers.push(MarkerLayer {
                name: format!("{title} selection"),
                points: highlighted,
                color: ctx.colors.track_highlight,
                marker: MarkerShape::Circle,
                size: 2.5,
                z: 11,
            });
        }
        SamplingKind::Other => {}
    }
    Ok((title, layers))
}

fn secondary_layer(
    session: &dyn Session,
    selection: &SelectionState,
    ctx: &MapContext<'_>,
) -> Result<Option<(String, ScatterLayer)>> {
    let (Some(file_id), Some(parameter)) =
        (selection.current_file_id(), selection.current_parameter())
    else {
        return Ok(None);
    };
    let info = session.dataset(file_id)?;
    if SamplingKind::from_sampling_type(&info.sampling_type) != SamplingKind::Ferrybox {
        return Ok(None);
    }
    let data = session.get_data(
        file_id,
        &["lon", "lat", parameter],
        &time_filter(ctx.time_range),
        &MaskOptions::include(ctx.visible_flags.iter().cloned()),
    )?;
    let values = data.get(parameter)?;
    let points: Vec<[f64; 3]> = data
        .get("lon")?
        .iter()
        .zip(data.get("lat")?)
        .zip(values)
        .filter(|((lon, lat), v)| lon.is_finite() && lat.is_finite() && v.is_finite())
        .map(|((&lon, &lat), &v)| [lon, lat, v])
        .collect();
    let color_range = match ctx.value_range {
        Some(r) => r,
        None => match AxisRange::from_values(points.iter().map(|p| &p[2])) {
            Some(r) => r,
            None => return Ok(None),
        },
    };
    let layer = ScatterLayer {
        name: parameter.to_string(),
        points,
        color_range,
        colorbar_title: session.unit(file_id, parameter).unwrap_or_default(),
    };
    Ok(Some((parameter.to_string(), layer)))
}

/// Redraw every open map from the selection.
pub fn refresh(
    targets: &mut MapTargets<'_>,
    session: &dyn Session,
    selection: &SelectionState,
    ctx: &MapContext<'_>,
) -> Result<MapRefresh> {
    let mut out = MapRefresh::default();
    if targets.primary.is_open() {
        let (title, layers) = primary_layers(session, selection, ctx)?;
        targets.primary.for_each(|t| {
            t.clear();
            t.set_boundaries(ctx.boundaries);
            t.set_title(&title);
            for l in &layers {
                t.add_markers(l.clone());
            }
            out.primary_targets += 1;
        });
    }
    if targets.secondary.is_open() {
        let layer = secondary_layer(session, selection, ctx)?;
        targets.secondary.for_each(|t| {
            t.clear();
            t.set_boundaries(ctx.boundaries);
            if let Some((title, l)) = &layer {
                t.set_title(title);
                t.add_scatter(l.clone());
            }
            out.secondary_targets += 1;
        });
    }
    debug!(
        "maps refreshed ({} primary, {} secondary)",
        out.primary_targets, out.secondary_targets
    );
    Ok(out)
}

/// Marker at the record nearest to `time`, if one lies within `window_s`.
pub fn hover_marker(
    session: &dyn Session,
    file_id: &FileId,
    time: f64,
    window_s: f64,
    color: Color32,
) -> Result<Option<MarkerLayer>> {
    let filter = FilterOptions::time(time - window_s, time + window_s);
    let data = session.get_data(file_id, &["time", "lon", "lat"], &filter, &MaskOptions::default())?;
    let times = data.get("time")?;
    let lons = data.get("lon")?;
    let lats = data.get("lat")?;
    let nearest = (0..times.len())
        .filter(|&i| lons[i].is_finite() && lats[i].is_finite())
        .min_by(|&a, &b| {
            (times[a] - time)
                .abs()
                .total_cmp(&(times[b] - time).abs())
        });
    Ok(nearest.map(|i| MarkerLayer {
        name: "hover".to_string(),
        points: vec![[lons[i], lats[i]]],
        color,
        marker: MarkerShape::Circle,
        size: 8.0,
        z: 30,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_kind_is_case_insensitive() {
        assert_eq!(
            SamplingKind::from_sampling_type("Fixed platforms"),
            SamplingKind::FixedPlatform
        );
        assert_eq!(SamplingKind::from_sampling_type("CTD SHARK"), SamplingKind::Ctd);
        assert_eq!(
            SamplingKind::from_sampling_type("Ferrybox CMEMS"),
            SamplingKind::Ferrybox
        );
        assert_eq!(
            SamplingKind::from_sampling_type("PhysicalChemical"),
            SamplingKind::Other
        );
    }

    #[test]
    fn canvas_keeps_layers_in_z_order() {
        let mut c = MapCanvas::default();
        let layer = |z| MarkerLayer {
            name: format!("{z}"),
            points: vec![],
            color: Color32::RED,
            marker: MarkerShape::Circle,
            size: 1.0,
            z,
        };
        c.add_markers(layer(21));
        c.add_markers(layer(0));
        c.add_markers(layer(20));
        let zs: Vec<i32> = c.markers.iter().map(|l| l.z).collect();
        assert_eq!(zs, vec![0, 20, 21]);
        c.clear();
        assert!(c.markers.is_empty());
    }
}
