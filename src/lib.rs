//! # dicom-rt-volume
//!
//! Batch ingestion of DICOM Part-10 files into an owned Patient → Study →
//! Series hierarchy, with 3D volume assembly for image series and parsing of
//! radiotherapy structure sets, dose grids and plans.
//!
//! This library is part of the dicom-rs ecosystem: files are decoded with
//! [`dicom`], tags are addressed through [`dicom_dictionary_std`], and pixel
//! data lands in [`ndarray`] grids. Tag reading over a batch runs in
//! parallel using rayon; everything after that barrier is sequential and
//! deterministic. A malformed file never fails the batch: it is reported in
//! the outcome's error list and the remaining files import normally.
//!
//! Structure-set contours can be intersected with any axis-aligned slice of
//! a built volume:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! # Examples
//!
//! ## Importing a batch and querying contours on a slice
//!
//! ```no_run
//! use dicom_rt_volume::{IntersectQuery, ViewAxis, import_files, intersect_outcome};
//!
//! let files: Vec<(String, Vec<u8>)> = std::fs::read_dir("dicom")?
//!     .filter_map(Result::ok)
//!     .map(|entry| {
//!         let name = entry.file_name().to_string_lossy().into_owned();
//!         let bytes = std::fs::read(entry.path())?;
//!         Ok::<_, std::io::Error>((name, bytes))
//!     })
//!     .collect::<Result<_, _>>()?;
//!
//! let outcome = import_files(&files);
//! for error in &outcome.errors {
//!     eprintln!("{}: {}", error.file, error.message);
//! }
//!
//! if let Some(built) = outcome.volumes.first() {
//!     let middle = built.volume.slice_count(ViewAxis::Axial) / 2;
//!     let query = IntersectQuery::new(ViewAxis::Axial, middle);
//!     let on_slice = intersect_outcome(&outcome, &built.volume, query, |_, _| true);
//!     println!("{} ROIs intersect slice {middle}", on_slice.len());
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod dataset;
pub mod grouping;
pub mod hierarchy;
pub mod import;
pub mod intersect;
pub mod rt;
pub mod volume;

#[cfg(test)]
mod testutil;

pub use dataset::{ItemView, TagReadError, TagSet};
pub use hierarchy::{
    ANONYMOUS_PATIENT_ID, HierarchyBuilder, HierarchyError, ImageInstance, Patient, Series,
    SeriesContent, Study,
};
pub use import::{BuiltVolume, ImportError, ImportOutcome, import_files};
pub use intersect::{
    Fill2, IntersectQuery, Outline2, RoiSlice, intersect_outcome, intersect_structure_set,
};
pub use rt::{Contour, Roi, RtDose, RtPlan, RtStructureSet, SopCommon};
pub use volume::{ViewAxis, Volume, VolumeBuildError, build_volume};
