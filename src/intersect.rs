//! Intersection of structure-set contours with axis-aligned volume slices.
//!
//! A contour belongs to a slice when its closest point along the viewing
//! axis lies within a tolerance of the slice's world coordinate. Matching
//! contours are projected to 2D in the plane of the axis and emitted both as
//! a closed outline strip and, for polygons of three or more points, as a
//! fillable face. Output order is deterministic: ROIs in structure-set
//! order, contours in stored order.

use crate::hierarchy::SeriesContent;
use crate::import::ImportOutcome;
use crate::rt::{Contour, Roi, RtStructureSet};
use crate::volume::{ViewAxis, Volume};

/// Fallback colors for ROIs without a ROIDisplayColor, cycled in ROI order.
const ROI_PALETTE: &[[u8; 3]] = &[
    [255, 99, 71],
    [60, 179, 113],
    [65, 105, 225],
    [255, 215, 0],
    [186, 85, 211],
    [0, 206, 209],
    [255, 140, 0],
    [154, 205, 50],
];

/// One slice lookup against a volume's geometry.
#[derive(Debug, Clone, Copy)]
pub struct IntersectQuery {
    pub axis: ViewAxis,
    pub slice_index: usize,
    /// Maximum axis distance for a contour to count as on-slice. Defaults to
    /// half the inter-slice step along the queried axis.
    pub tolerance: Option<f64>,
}

impl IntersectQuery {
    pub fn new(axis: ViewAxis, slice_index: usize) -> Self {
        Self {
            axis,
            slice_index,
            tolerance: None,
        }
    }

    fn resolve_tolerance(&self, volume: &Volume) -> f64 {
        self.tolerance
            .unwrap_or_else(|| volume.spacing()[self.axis.world_index()] / 2.0)
    }
}

/// A closed contour outline projected into a slice plane.
///
/// `strip` indexes `points` and revisits the first point so the polyline
/// closes: `[0, 1, .., n-1, 0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline2 {
    pub points: Vec<[f64; 2]>,
    pub strip: Vec<usize>,
}

/// A fillable polygon projected into a slice plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill2 {
    pub points: Vec<[f64; 2]>,
    pub face: Vec<usize>,
}

/// All on-slice geometry of one ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiSlice<'a> {
    pub roi: &'a Roi,
    pub color: [u8; 3],
    pub outlines: Vec<Outline2>,
    pub fills: Vec<Fill2>,
}

fn axis_distance(contour: &Contour, world: usize, position: f64) -> Option<f64> {
    contour
        .points
        .iter()
        .map(|point| (point[world] - position).abs())
        .min_by(f64::total_cmp)
}

/// Contours of one ROI lying on the queried slice.
pub fn contours_for_slice<'a>(
    roi: &'a Roi,
    volume: &Volume,
    query: IntersectQuery,
) -> Vec<&'a Contour> {
    let world = query.axis.world_index();
    let position = volume.slice_position(query.axis, query.slice_index);
    let tolerance = query.resolve_tolerance(volume);
    roi.contours
        .iter()
        .filter(|contour| {
            axis_distance(contour, world, position)
                .is_some_and(|distance| distance <= tolerance)
        })
        .collect()
}

/// Project a contour into the slice plane as a closed outline.
pub fn outline(contour: &Contour, axis: ViewAxis) -> Outline2 {
    let [h, v] = axis.plane();
    let points: Vec<[f64; 2]> = contour
        .points
        .iter()
        .map(|point| [point[h], point[v]])
        .collect();
    let mut strip: Vec<usize> = (0..points.len()).collect();
    if !points.is_empty() {
        strip.push(0);
    }
    Outline2 { points, strip }
}

/// Project a contour into the slice plane as a fillable polygon.
///
/// Polygons need at least three vertices; smaller contours yield `None`.
pub fn fill(contour: &Contour, axis: ViewAxis) -> Option<Fill2> {
    if contour.points.len() < 3 {
        return None;
    }
    let [h, v] = axis.plane();
    let points: Vec<[f64; 2]> = contour
        .points
        .iter()
        .map(|point| [point[h], point[v]])
        .collect();
    let face = (0..points.len()).collect();
    Some(Fill2 { points, face })
}

/// Display color of a ROI: its own ROIDisplayColor, or a palette color by
/// position in the structure set.
pub fn roi_color(roi: &Roi, ordinal: usize) -> [u8; 3] {
    roi.display_color
        .unwrap_or(ROI_PALETTE[ordinal % ROI_PALETTE.len()])
}

fn roi_slice<'a>(
    roi: &'a Roi,
    ordinal: usize,
    volume: &Volume,
    query: IntersectQuery,
) -> Option<RoiSlice<'a>> {
    let contours = contours_for_slice(roi, volume, query);
    if contours.is_empty() {
        return None;
    }
    let outlines = contours.iter().map(|c| outline(c, query.axis)).collect();
    let fills = contours
        .iter()
        .filter_map(|c| fill(c, query.axis))
        .collect();
    Some(RoiSlice {
        roi,
        color: roi_color(roi, ordinal),
        outlines,
        fills,
    })
}

/// Intersect every ROI of a structure set with one slice.
///
/// ROIs with no on-slice contour are omitted.
pub fn intersect_structure_set<'a>(
    set: &'a RtStructureSet,
    volume: &Volume,
    query: IntersectQuery,
) -> Vec<RoiSlice<'a>> {
    set.rois
        .iter()
        .enumerate()
        .filter_map(|(ordinal, roi)| roi_slice(roi, ordinal, volume, query))
        .collect()
}

/// Intersect every visible ROI of every structure set in an import outcome
/// with one slice.
///
/// `visible` filters ROIs; presentation layers keep visibility in a side
/// table and pass it here. Structure sets are visited in hierarchy order.
pub fn intersect_outcome<'a, F>(
    outcome: &'a ImportOutcome,
    volume: &Volume,
    query: IntersectQuery,
    mut visible: F,
) -> Vec<RoiSlice<'a>>
where
    F: FnMut(&RtStructureSet, &Roi) -> bool,
{
    let mut slices = Vec::new();
    for patient in &outcome.patients {
        for study in &patient.studies {
            for series in &study.series {
                let SeriesContent::StructureSet(set) = &series.content else {
                    continue;
                };
                for (ordinal, roi) in set.rois.iter().enumerate() {
                    if !visible(set, roi) {
                        continue;
                    }
                    if let Some(slice) = roi_slice(roi, ordinal, volume, query) {
                        slices.push(slice);
                    }
                }
            }
        }
    }
    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn volume(spacing_z: f64) -> Volume {
        Volume::new(
            Array3::zeros((5, 4, 4)),
            [1.0, 1.0, spacing_z],
            [0.0, 0.0, 0.0],
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        )
    }

    fn square_at(z: f64) -> Contour {
        Contour {
            number: None,
            geometric_type: "CLOSED_PLANAR".into(),
            points: vec![
                [0.0, 0.0, z],
                [10.0, 0.0, z],
                [10.0, 10.0, z],
                [0.0, 10.0, z],
            ],
        }
    }

    fn roi_with(contours: Vec<Contour>) -> Roi {
        Roi {
            number: 1,
            name: Some("GTV".into()),
            description: None,
            generation_algorithm: None,
            frame_of_reference_uid: "1.2.840.999.5".into(),
            display_color: None,
            contours,
        }
    }

    #[test]
    fn contour_matches_its_slice_and_not_two_away() {
        let volume = volume(1.0);
        let roi = roi_with(vec![square_at(2.0)]);
        let hit = contours_for_slice(&roi, &volume, IntersectQuery::new(ViewAxis::Axial, 2));
        assert_eq!(hit.len(), 1);
        let miss = contours_for_slice(&roi, &volume, IntersectQuery::new(ViewAxis::Axial, 4));
        assert!(miss.is_empty());
        let miss = contours_for_slice(&roi, &volume, IntersectQuery::new(ViewAxis::Axial, 0));
        assert!(miss.is_empty());
    }

    #[test]
    fn tolerance_scales_with_slice_spacing() {
        // Contour 1.2 mm off-plane: outside half of 1 mm, inside half of 3 mm.
        let roi = roi_with(vec![square_at(1.2)]);

        let fine = volume(1.0);
        let query = IntersectQuery::new(ViewAxis::Axial, 1);
        assert!(contours_for_slice(&roi, &fine, query).is_empty());

        let coarse = volume(3.0);
        // Slice 0 of the coarse volume sits at z = 0; 1.2 <= 1.5.
        let query = IntersectQuery::new(ViewAxis::Axial, 0);
        assert_eq!(contours_for_slice(&roi, &coarse, query).len(), 1);
    }

    #[test]
    fn explicit_tolerance_overrides_spacing() {
        let volume = volume(1.0);
        let roi = roi_with(vec![square_at(1.2)]);
        let query = IntersectQuery {
            axis: ViewAxis::Axial,
            slice_index: 1,
            tolerance: Some(0.5),
        };
        assert!(contours_for_slice(&roi, &volume, query).is_empty());
        let query = IntersectQuery {
            tolerance: Some(2.0),
            ..query
        };
        assert_eq!(contours_for_slice(&roi, &volume, query).len(), 1);
    }

    #[test]
    fn outline_closes_and_projects_per_axis() {
        let contour = square_at(2.0);
        let axial = outline(&contour, ViewAxis::Axial);
        assert_eq!(axial.points[1], [10.0, 0.0]);
        assert_eq!(axial.strip, vec![0, 1, 2, 3, 0]);

        let coronal = outline(&contour, ViewAxis::Coronal);
        assert_eq!(coronal.points[1], [10.0, 2.0]);

        let sagittal = outline(&contour, ViewAxis::Sagittal);
        assert_eq!(sagittal.points[2], [10.0, 2.0]);
    }

    #[test]
    fn fill_requires_three_points() {
        let mut contour = square_at(0.0);
        let filled = fill(&contour, ViewAxis::Axial).unwrap();
        assert_eq!(filled.face, vec![0, 1, 2, 3]);

        contour.points.truncate(2);
        assert!(fill(&contour, ViewAxis::Axial).is_none());
    }

    #[test]
    fn structure_set_intersection_keeps_roi_order() {
        let volume = volume(1.0);
        let set = RtStructureSet {
            sop: Default::default(),
            label: "STRUCT".into(),
            name: None,
            date: None,
            time: None,
            rois: vec![
                roi_with(vec![square_at(2.0)]),
                roi_with(vec![square_at(3.0)]),
                roi_with(vec![square_at(2.0), square_at(2.0)]),
            ],
            observations: Vec::new(),
            warnings: Vec::new(),
        };
        let slices =
            intersect_structure_set(&set, &volume, IntersectQuery::new(ViewAxis::Axial, 2));
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].outlines.len(), 1);
        assert_eq!(slices[1].outlines.len(), 2);
        assert_eq!(slices[1].fills.len(), 2);
        // Palette fallback is stable per ROI position.
        assert_eq!(slices[0].color, ROI_PALETTE[0]);
        assert_eq!(slices[1].color, ROI_PALETTE[2]);
    }
}
