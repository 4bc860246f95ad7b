//! Batch import: bytes in, hierarchy + volumes + errors out.
//!
//! Tag reading is embarrassingly parallel and runs on rayon's pool; every
//! later stage (hierarchy assembly, grouping, volume construction) is
//! sequential over the gathered results. A failing file never takes the
//! batch down: its error is recorded and the remaining files proceed.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::dataset::TagSet;
use crate::grouping::split_and_sort;
use crate::hierarchy::{HierarchyBuilder, Patient, SeriesContent};
use crate::volume::{Volume, build_volume};

/// A per-file failure, keyed by the caller's file identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportError {
    pub file: String,
    pub message: String,
}

/// A volume built from one geometric sub-group of an image series.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltVolume {
    pub series_uid: String,
    /// Ordinal of the geometric sub-group within the series.
    pub group_index: usize,
    pub uniform_spacing: bool,
    pub volume: Volume,
}

/// Everything one batch produced.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub patients: Vec<Patient>,
    pub volumes: Vec<BuiltVolume>,
    pub errors: Vec<ImportError>,
}

impl ImportOutcome {
    /// Volume of a given series sub-group, if one was built.
    pub fn volume(&self, series_uid: &str, group_index: usize) -> Option<&Volume> {
        self.volumes
            .iter()
            .find(|v| v.series_uid == series_uid && v.group_index == group_index)
            .map(|v| &v.volume)
    }
}

/// Import a batch of DICOM Part-10 files given as `(identifier, bytes)`
/// pairs.
///
/// The identifier is echoed back in error reports; it is typically a file
/// name. Never panics and never fails as a whole: whatever subset of the
/// input survives is returned, with one [`ImportError`] per file or volume
/// that did not.
pub fn import_files<I, B>(files: &[(I, B)]) -> ImportOutcome
where
    I: AsRef<str> + Sync,
    B: AsRef<[u8]> + Sync,
{
    // Phase 1: parse every file in parallel, keeping input order.
    let parsed: Vec<Result<TagSet, String>> = files
        .par_iter()
        .map(|(_, bytes)| TagSet::from_part10_bytes(bytes.as_ref()).map_err(|e| e.to_string()))
        .collect();

    // Phase 2: sequential assembly over the gathered results.
    let mut errors = Vec::new();
    let mut sets: Vec<Option<TagSet>> = Vec::with_capacity(parsed.len());
    let mut builder = HierarchyBuilder::new();

    for (index, result) in parsed.into_iter().enumerate() {
        let file = files[index].0.as_ref();
        match result {
            Ok(set) => {
                if let Err(e) = builder.add(&set, index) {
                    warn!(%file, error = %e, "file not added to hierarchy");
                    errors.push(ImportError {
                        file: file.to_owned(),
                        message: e.to_string(),
                    });
                }
                sets.push(Some(set));
            }
            Err(message) => {
                warn!(%file, %message, "file failed to parse");
                errors.push(ImportError {
                    file: file.to_owned(),
                    message,
                });
                sets.push(None);
            }
        }
    }

    let patients = builder.finish();

    // Phase 3: one volume per geometric sub-group of each image series.
    let mut volumes = Vec::new();
    for patient in &patients {
        for study in &patient.studies {
            for series in &study.series {
                let SeriesContent::Images(instances) = &series.content else {
                    continue;
                };
                for (group_index, group) in split_and_sort(instances).iter().enumerate() {
                    match build_volume(group, instances, &sets) {
                        Ok(volume) => {
                            debug!(
                                series = %series.uid,
                                group_index,
                                dims = ?volume.dims(),
                                "volume built"
                            );
                            volumes.push(BuiltVolume {
                                series_uid: series.uid.clone(),
                                group_index,
                                uniform_spacing: group.uniform,
                                volume,
                            });
                        }
                        Err(e) => {
                            warn!(series = %series.uid, group_index, error = %e, "volume build failed");
                            errors.push(ImportError {
                                file: format!("{}#{}", series.uid, group_index),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    ImportOutcome {
        patients,
        volumes,
        errors,
    }
}
