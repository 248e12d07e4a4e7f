//! Render instructions for the main parameter plot.
//!
//! Points are in plot coordinates: profile pages plot `[value, -depth]`,
//! time-series pages plot `[time, value]`.

use egui::Color32;
use egui_plot::MarkerShape;

use crate::config::{PageKind, PlotColors};
use crate::data::axis::AxisRange;
use crate::data::flags::FlagSelection;
use crate::error::Result;
use crate::session::{FileId, FilterOptions, MaskOptions, Session};

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub color: Color32,
    pub marker: MarkerShape,
    pub size: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotModel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Other files of the same sampling type, drawn first.
    pub background: Vec<Series>,
    /// One series per visible flag of the current file.
    pub series: Vec<Series>,
    pub reference: Option<Series>,
    /// Extent of the current file, `(depth or time, value)`.
    pub extent: (Option<AxisRange>, Option<AxisRange>),
}

impl PlotModel {
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.is_empty())
    }

    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }
}

fn to_plot(page: PageKind, axis: f64, value: f64) -> [f64; 2] {
    match page {
        PageKind::Profile => [value, -axis],
        PageKind::TimeSeries => [axis, value],
    }
}

fn xy(
    session: &dyn Session,
    file_id: &FileId,
    parameter: &str,
    page: PageKind,
) -> Result<Vec<[f64; 2]>> {
    let axis_field = page.axis_field();
    let data = session.get_data(
        file_id,
        &[axis_field, parameter],
        &FilterOptions::default(),
        &MaskOptions::default(),
    )?;
    Ok(data
        .get(axis_field)?
        .iter()
        .zip(data.get(parameter)?)
        .filter(|(a, v)| a.is_finite() && v.is_finite())
        .map(|(&a, &v)| to_plot(page, a, v))
        .collect())
}

/// Extent of `parameter` in `file_id`: `(depth or time, value)`.
pub fn data_extent(
    session: &dyn Session,
    file_id: &FileId,
    parameter: &str,
    page: PageKind,
) -> Result<(Option<AxisRange>, Option<AxisRange>)> {
    let axis_field = page.axis_field();
    let data = session.get_data(
        file_id,
        &[axis_field, parameter],
        &FilterOptions::default(),
        &MaskOptions::default(),
    )?;
    let axis = data.get(axis_field)?;
    let values = data.get(parameter)?;
    let valid: Vec<usize> = (0..axis.len())
        .filter(|&i| axis[i].is_finite() && values[i].is_finite())
        .collect();
    Ok((
        AxisRange::from_values(valid.iter().map(|&i| &axis[i])),
        AxisRange::from_values(valid.iter().map(|&i| &values[i])),
    ))
}

/// Inputs of [`build_plot`] besides the session.
pub struct PlotRequest<'a> {
    pub page: PageKind,
    pub file_id: &'a FileId,
    pub parameter: &'a str,
    pub flags: &'a FlagSelection,
    pub colors: &'a PlotColors,
    /// Other files drawn behind the current one.
    pub background_files: &'a [FileId],
    /// Reference file shown in profile plots.
    pub reference: Option<&'a FileId>,
}

pub fn build_plot(session: &dyn Session, req: &PlotRequest<'_>) -> Result<PlotModel> {
    let page = req.page;
    let axis_field = page.axis_field();
    let data = session.get_data(
        req.file_id,
        &[axis_field, req.parameter],
        &FilterOptions::default(),
        &MaskOptions::default(),
    )?;
    let axis = data.get(axis_field)?;
    let values = data.get(req.parameter)?;
    let flags = session.flags(req.file_id, req.parameter)?;

    let mut series = Vec::new();
    for entry in req.flags.entries() {
        if !entry.style.included {
            continue;
        }
        let points: Vec<[f64; 2]> = (0..axis.len())
            .filter(|&i| flags.get(i) == Some(&entry.code))
            .filter(|&i| axis[i].is_finite() && values[i].is_finite())
            .map(|i| to_plot(page, axis[i], values[i]))
            .collect();
        let label = if entry.description.is_empty() {
            format!("Flag {}", entry.code)
        } else {
            format!("{} ({})", entry.code, entry.description)
        };
        series.push(Series {
            name: label,
            points,
            color: entry.style.color,
            marker: entry.style.marker,
            size: entry.style.size,
        });
    }

    let mut background = Vec::new();
    for other in req.background_files.iter().filter(|f| *f != req.file_id) {
        if !session.parameters(other)?.iter().any(|p| p == req.parameter) {
            continue;
        }
        background.push(Series {
            name: other.to_string(),
            points: xy(session, other, req.parameter, page)?,
            color: req.colors.background_data,
            marker: MarkerShape::Circle,
            size: 1.5,
        });
    }

    let reference = match (page, req.reference) {
        (PageKind::Profile, Some(r)) if session.parameters(r)?.iter().any(|p| p == req.parameter) => {
            Some(Series {
                name: format!("Reference {r}"),
                points: xy(session, r, req.parameter, page)?,
                color: req.colors.reference_data,
                marker: MarkerShape::Diamond,
                size: 5.0,
            })
        }
        _ => None,
    };

    let unit = session
        .unit(req.file_id, req.parameter)
        .map(|u| format!(" [{u}]"))
        .unwrap_or_default();
    let (x_label, y_label) = match page {
        PageKind::Profile => (format!("{}{unit}", req.parameter), "Depth [m]".to_string()),
        PageKind::TimeSeries => ("Time".to_string(), format!("{}{unit}", req.parameter)),
    };
    Ok(PlotModel {
        title: format!("{}: {}", req.file_id, req.parameter),
        x_label,
        y_label,
        background,
        series,
        reference,
        extent: data_extent(session, req.file_id, req.parameter, page)?,
    })
}
