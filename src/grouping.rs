//! Geometric grouping and ordering of image slices within a series.
//!
//! A series may interleave acquisitions with different orientations or
//! in-plane geometry. Slices are partitioned by a rounded geometric signature
//! (direction cosines, matrix size, pixel spacing), then each partition is
//! sorted by the scalar projection of ImagePositionPatient onto the slice
//! normal. Spacing is inferred from the median of adjacent projection deltas.

use tracing::debug;

use crate::hierarchy::ImageInstance;

/// Relative tolerance for spacing uniformity, against the median delta.
const SPACING_REL_TOLERANCE: f64 = 1e-2;
/// Absolute floor for the uniformity tolerance, in mm.
const SPACING_ABS_FLOOR: f64 = 1e-3;
/// Direction cosines are rounded to this many decimals for the group key.
const COSINE_DECIMALS: f64 = 1e3;

/// One geometrically consistent stack of slices.
///
/// `order` holds indices into the instance slice this group was computed
/// from, sorted into spatial order.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceGroup {
    pub orientation: [f64; 6],
    /// Unit normal of the slice plane (row direction × column direction).
    pub normal: [f64; 3],
    pub rows: u32,
    pub columns: u32,
    pub pixel_spacing: [f64; 2],
    pub order: Vec<usize>,
    /// Normal projections of the sorted slices, in mm.
    pub projections: Vec<f64>,
    /// Median inter-slice step; `None` for single-slice groups.
    pub spacing: Option<f64>,
    /// Whether every adjacent delta agrees with the median within tolerance.
    pub uniform: bool,
}

pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Slice normal from the six direction cosines.
pub fn slice_normal(orientation: [f64; 6]) -> [f64; 3] {
    let row = [orientation[0], orientation[1], orientation[2]];
    let col = [orientation[3], orientation[4], orientation[5]];
    cross(row, col)
}

const IDENTITY_ORIENTATION: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// Hashable signature of a slice's geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GeometryKey {
    cosines: [i64; 6],
    rows: u32,
    columns: u32,
    spacing: [i64; 2],
}

impl GeometryKey {
    fn of(instance: &ImageInstance) -> Self {
        let orientation = instance.orientation.unwrap_or(IDENTITY_ORIENTATION);
        let spacing = instance.pixel_spacing.unwrap_or([1.0, 1.0]);
        let round = |v: f64| (v * COSINE_DECIMALS).round() as i64;
        GeometryKey {
            cosines: orientation.map(round),
            rows: instance.rows,
            columns: instance.columns,
            spacing: spacing.map(round),
        }
    }
}

/// Partition a series' instances into geometric groups and sort each group.
///
/// Instances without ImageOrientationPatient share an identity-orientation
/// group; instances without ImagePositionPatient project to 0.0 and are
/// ordered by InstanceNumber instead. Group order is deterministic: groups
/// appear in first-seen order of their signature.
pub fn split_and_sort(instances: &[ImageInstance]) -> Vec<SliceGroup> {
    let mut keys: Vec<GeometryKey> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for (index, instance) in instances.iter().enumerate() {
        let key = GeometryKey::of(instance);
        match keys.iter().position(|k| *k == key) {
            Some(slot) => members[slot].push(index),
            None => {
                keys.push(key);
                members.push(vec![index]);
            }
        }
    }

    members
        .into_iter()
        .map(|group| sort_group(instances, group))
        .collect()
}

fn sort_group(instances: &[ImageInstance], mut order: Vec<usize>) -> SliceGroup {
    let first = &instances[order[0]];
    let orientation = first.orientation.unwrap_or(IDENTITY_ORIENTATION);
    let normal = slice_normal(orientation);

    let projection = |index: usize| -> f64 {
        instances[index]
            .position
            .map(|p| dot(p, normal))
            .unwrap_or(0.0)
    };

    order.sort_by(|&a, &b| {
        let (pa, pb) = (projection(a), projection(b));
        pa.total_cmp(&pb).then_with(|| {
            let na = instances[a].sop.instance_number.unwrap_or(i64::MAX);
            let nb = instances[b].sop.instance_number.unwrap_or(i64::MAX);
            na.cmp(&nb)
        })
    });

    let projections: Vec<f64> = order.iter().map(|&index| projection(index)).collect();
    let (spacing, uniform) = infer_spacing(&projections);
    if !uniform {
        debug!(
            slices = order.len(),
            "non-uniform slice spacing in group"
        );
    }

    SliceGroup {
        orientation,
        normal,
        rows: first.rows,
        columns: first.columns,
        pixel_spacing: first.pixel_spacing.unwrap_or([1.0, 1.0]),
        order,
        projections,
        spacing,
        uniform,
    }
}

/// Median adjacent delta and a uniformity verdict.
///
/// The verdict compares every delta against the median with a relative
/// tolerance, floored for sub-millimetre spacings.
fn infer_spacing(projections: &[f64]) -> (Option<f64>, bool) {
    if projections.len() < 2 {
        return (None, true);
    }
    let mut deltas: Vec<f64> = projections.windows(2).map(|w| w[1] - w[0]).collect();
    deltas.sort_by(f64::total_cmp);
    let median = deltas[deltas.len() / 2];
    let tolerance = (median.abs() * SPACING_REL_TOLERANCE).max(SPACING_ABS_FLOOR);
    let uniform = deltas.iter().all(|d| (d - median).abs() <= tolerance);
    (Some(median), uniform)
}
