//! Volume assembly from a sorted slice group.
//!
//! A [`Volume`] stores voxels as `Array3<f32>` in `(slice, row, column)`
//! order, together with the world geometry needed to map indices back to
//! patient coordinates: per-axis spacing, the origin (position of the first
//! sorted slice) and the direction cosine matrix.

use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use ndarray::{Array2, Array3, ArrayView2, s};
use thiserror::Error;

use crate::dataset::TagSet;
use crate::grouping::SliceGroup;
use crate::hierarchy::ImageInstance;

/// A viewing axis in patient space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewAxis {
    Axial,
    Coronal,
    Sagittal,
}

impl ViewAxis {
    /// Index of the world coordinate that varies across slices of this axis
    /// (x = 0, y = 1, z = 2).
    pub fn world_index(self) -> usize {
        match self {
            ViewAxis::Axial => 2,
            ViewAxis::Coronal => 1,
            ViewAxis::Sagittal => 0,
        }
    }

    /// World coordinate indices spanning the in-plane directions, in
    /// (horizontal, vertical) display order.
    pub fn plane(self) -> [usize; 2] {
        match self {
            ViewAxis::Axial => [0, 1],
            ViewAxis::Coronal => [0, 2],
            ViewAxis::Sagittal => [1, 2],
        }
    }
}

#[derive(Debug, Error)]
pub enum VolumeBuildError {
    #[error("slice group is empty")]
    NoSlices,

    #[error("inconsistent slice dimensions: expected {expected:?}, instance {sop_instance_uid} has {got:?}")]
    InconsistentDimensions {
        expected: (u32, u32),
        got: (u32, u32),
        sop_instance_uid: String,
    },

    #[error("no parsed data set for file index {file_index}")]
    MissingFile { file_index: usize },

    #[error("non-positive voxel spacing {spacing:?}")]
    NonPositiveSpacing { spacing: [f64; 3] },

    #[error("failed to decode pixel data of instance {sop_instance_uid}: {source}")]
    Decode {
        sop_instance_uid: String,
        source: dicom::pixeldata::Error,
    },
}

/// A 3D scalar field in patient space, in modality units.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
    spacing: [f64; 3],
    origin: [f64; 3],
    direction: [[f64; 3]; 3],
}

impl Volume {
    pub fn new(
        data: Array3<f32>,
        spacing: [f64; 3],
        origin: [f64; 3],
        direction: [[f64; 3]; 3],
    ) -> Self {
        Self {
            data,
            spacing,
            origin,
            direction,
        }
    }

    /// Voxel counts per world axis: `[columns, rows, slices]` = (x, y, z).
    pub fn dims(&self) -> [usize; 3] {
        let (slices, rows, columns) = self.data.dim();
        [columns, rows, slices]
    }

    /// Per-axis voxel spacing in mm, (x, y, z).
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Patient-space position of voxel (0, 0, 0).
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Row, column and slice-normal direction cosines.
    pub fn direction(&self) -> [[f64; 3]; 3] {
        self.direction
    }

    /// The voxel grid in `(slice, row, column)` order.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Voxel value at (x, y, z), or `None` out of bounds.
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        self.data.get((z, y, x)).copied()
    }

    /// Number of slices along a viewing axis.
    pub fn slice_count(&self, axis: ViewAxis) -> usize {
        let (slices, rows, columns) = self.data.dim();
        match axis {
            ViewAxis::Axial => slices,
            ViewAxis::Coronal => rows,
            ViewAxis::Sagittal => columns,
        }
    }

    /// 2D view of one slice along a viewing axis.
    pub fn slice_view(&self, axis: ViewAxis, index: usize) -> Option<ArrayView2<'_, f32>> {
        if index >= self.slice_count(axis) {
            return None;
        }
        let view = match axis {
            ViewAxis::Axial => self.data.slice(s![index, .., ..]),
            ViewAxis::Coronal => self.data.slice(s![.., index, ..]),
            ViewAxis::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(view)
    }

    /// World coordinate of slice `index` along a viewing axis.
    pub fn slice_position(&self, axis: ViewAxis, index: usize) -> f64 {
        let world = axis.world_index();
        self.origin[world] + index as f64 * self.spacing[world]
    }
}

/// Assemble a volume from a sorted slice group.
///
/// `instances` is the series' instance list the group was computed from and
/// `sets` the batch's parsed data sets, indexed by `ImageInstance::file_index`.
/// Every slice is decoded to raw stored values and rescaled with its own
/// RescaleSlope and RescaleIntercept, so voxels are in modality units.
pub fn build_volume(
    group: &SliceGroup,
    instances: &[ImageInstance],
    sets: &[Option<TagSet>],
) -> Result<Volume, VolumeBuildError> {
    if group.order.is_empty() {
        return Err(VolumeBuildError::NoSlices);
    }

    let expected = (group.rows, group.columns);
    let depth = group.order.len();
    let mut data = Array3::<f32>::zeros((depth, group.rows as usize, group.columns as usize));

    for (layer, &index) in group.order.iter().enumerate() {
        let instance = &instances[index];
        if (instance.rows, instance.columns) != expected {
            return Err(VolumeBuildError::InconsistentDimensions {
                expected,
                got: (instance.rows, instance.columns),
                sop_instance_uid: instance.sop.sop_instance_uid.clone(),
            });
        }
        let set = sets
            .get(instance.file_index)
            .and_then(Option::as_ref)
            .ok_or(VolumeBuildError::MissingFile {
                file_index: instance.file_index,
            })?;
        let slice = decode_slice(set, instance)?;
        data.slice_mut(s![layer, .., ..]).assign(&slice);
    }

    let first = &instances[group.order[0]];
    let z_spacing = group
        .spacing
        .or(first.slice_thickness)
        .unwrap_or(1.0);
    // PixelSpacing is (row spacing, column spacing) = (y, x).
    let spacing = [group.pixel_spacing[1], group.pixel_spacing[0], z_spacing];
    if spacing.iter().any(|s| *s <= 0.0) {
        return Err(VolumeBuildError::NonPositiveSpacing { spacing });
    }
    let origin = first.position.unwrap_or([0.0; 3]);
    let o = group.orientation;
    let direction = [
        [o[0], o[1], o[2]],
        [o[3], o[4], o[5]],
        group.normal,
    ];

    Ok(Volume::new(data, spacing, origin, direction))
}

fn decode_slice(
    set: &TagSet,
    instance: &ImageInstance,
) -> Result<Array2<f32>, VolumeBuildError> {
    let decode = || -> Result<Array2<f32>, dicom::pixeldata::Error> {
        let pixel_data = set.object().decode_pixel_data()?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let raw = pixel_data.to_ndarray_with_options::<f32>(&options)?;
        Ok(raw.slice_move(s![0, .., .., 0]))
    };
    let raw = decode().map_err(|source| VolumeBuildError::Decode {
        sop_instance_uid: instance.sop.sop_instance_uid.clone(),
        source,
    })?;

    let slope = instance.rescale_slope;
    let intercept = instance.rescale_intercept;
    if slope == 1.0 && intercept == 0.0 {
        Ok(raw)
    } else {
        Ok(raw.mapv_into(|v| (v as f64 * slope + intercept) as f32))
    }
}
