//! The Patient → Study → Series hierarchy and its incremental builder.
//!
//! [`HierarchyBuilder`] consumes one parsed data set at a time, finds or
//! creates the patient, study and series nodes keyed by their UIDs, and
//! attaches the file's payload: image instances accumulate on a series, while
//! RT structure sets, doses and plans each claim their whole series. The
//! builder yields an owned tree with no references back into the source
//! objects, so results outlive the input buffers.

use dicom_dictionary_std::{tags, uids};
use thiserror::Error;
use tracing::{debug, warn};

use crate::dataset::{ItemView, TagSet};
use crate::rt::{self, RtDose, RtPlan, RtStructureSet, SopCommon};

/// Patient ID assigned to files whose PatientID element is absent or blank.
pub const ANONYMOUS_PATIENT_ID: &str = "ANONYMOUS";

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("missing StudyInstanceUID")]
    MissingStudyUid,

    #[error("missing SeriesInstanceUID")]
    MissingSeriesUid,

    #[error("missing SOPInstanceUID")]
    MissingSopInstanceUid,

    #[error("unsupported SOP class {uid:?} (modality {modality:?})")]
    UnsupportedSopClass { uid: String, modality: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patient {
    pub id: String,
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub sex: Option<String>,
    pub studies: Vec<Study>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Study {
    pub uid: String,
    pub id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub description: Option<String>,
    pub accession_number: Option<String>,
    pub referring_physician_name: Option<String>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub uid: String,
    pub number: Option<i64>,
    pub modality: String,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub content: SeriesContent,
}

/// What a series holds. Image series accumulate instances; each RT object
/// type claims its series whole.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesContent {
    Images(Vec<ImageInstance>),
    StructureSet(RtStructureSet),
    Dose(RtDose),
    Plan(RtPlan),
}

/// Per-file geometry and intensity metadata of one image slice.
///
/// `file_index` points back at the caller's input list so pixel data can be
/// decoded later without retaining the parsed object here.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInstance {
    pub sop: SopCommon,
    pub file_index: usize,
    pub rows: u32,
    pub columns: u32,
    pub position: Option<[f64; 3]>,
    pub orientation: Option<[f64; 6]>,
    pub pixel_spacing: Option<[f64; 2]>,
    pub slice_thickness: Option<f64>,
    pub slice_location: Option<f64>,
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub frame_of_reference_uid: String,
    pub acquisition_number: Option<i64>,
    pub number_of_frames: Option<u32>,
}

/// How a file is routed into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Image,
    StructureSet,
    Dose,
    Plan,
}

const IMAGE_SOP_CLASSES: &[&str] = &[
    uids::CT_IMAGE_STORAGE,
    uids::ENHANCED_CT_IMAGE_STORAGE,
    uids::MR_IMAGE_STORAGE,
    uids::ENHANCED_MR_IMAGE_STORAGE,
    uids::POSITRON_EMISSION_TOMOGRAPHY_IMAGE_STORAGE,
    uids::COMPUTED_RADIOGRAPHY_IMAGE_STORAGE,
    uids::ULTRASOUND_IMAGE_STORAGE,
    uids::X_RAY_ANGIOGRAPHIC_IMAGE_STORAGE,
];

fn classify(sop_class_uid: &str, modality: &str, has_pixel_data: bool) -> Option<ObjectKind> {
    match sop_class_uid {
        uids::RT_STRUCTURE_SET_STORAGE => return Some(ObjectKind::StructureSet),
        uids::RT_DOSE_STORAGE => return Some(ObjectKind::Dose),
        uids::RT_PLAN_STORAGE => return Some(ObjectKind::Plan),
        uid if IMAGE_SOP_CLASSES.contains(&uid) => return Some(ObjectKind::Image),
        _ => {}
    }
    // SOP class missing or private: fall back to the modality element.
    match modality {
        "RTSTRUCT" => Some(ObjectKind::StructureSet),
        "RTDOSE" => Some(ObjectKind::Dose),
        "RTPLAN" => Some(ObjectKind::Plan),
        _ if has_pixel_data => Some(ObjectKind::Image),
        _ => None,
    }
}

fn read_image_instance(view: &ItemView<'_>, sop: SopCommon, file_index: usize) -> ImageInstance {
    let position = view
        .number_array_opt(tags::IMAGE_POSITION_PATIENT)
        .filter(|v| v.len() == 3)
        .map(|v| [v[0], v[1], v[2]]);
    let orientation = view
        .number_array_opt(tags::IMAGE_ORIENTATION_PATIENT)
        .filter(|v| v.len() == 6)
        .map(|v| [v[0], v[1], v[2], v[3], v[4], v[5]]);
    let pixel_spacing = view
        .number_array_opt(tags::PIXEL_SPACING)
        .filter(|v| v.len() == 2)
        .map(|v| [v[0], v[1]]);

    ImageInstance {
        sop,
        file_index,
        rows: view.number(tags::ROWS) as u32,
        columns: view.number(tags::COLUMNS) as u32,
        position,
        orientation,
        pixel_spacing,
        slice_thickness: view.number_opt(tags::SLICE_THICKNESS),
        slice_location: view.number_opt(tags::SLICE_LOCATION),
        rescale_slope: view.number_or(tags::RESCALE_SLOPE, 1.0),
        rescale_intercept: view.number_or(tags::RESCALE_INTERCEPT, 0.0),
        window_center: view.number_opt(tags::WINDOW_CENTER),
        window_width: view.number_opt(tags::WINDOW_WIDTH),
        frame_of_reference_uid: view.string(tags::FRAME_OF_REFERENCE_UID),
        acquisition_number: view.int_opt(tags::ACQUISITION_NUMBER),
        number_of_frames: view.int_opt(tags::NUMBER_OF_FRAMES).map(|n| n as u32),
    }
}

fn fill_empty(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Incremental hierarchy assembly over a batch of files.
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    patients: Vec<Patient>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one parsed file into the tree.
    ///
    /// Files without a study or series UID, and files of an unsupported SOP
    /// class, are rejected; the tree is unchanged in that case. Re-adding a
    /// file is idempotent: image instances deduplicate on SOPInstanceUID and
    /// RT objects replace the previous payload of their series.
    pub fn add(&mut self, set: &TagSet, file_index: usize) -> Result<(), HierarchyError> {
        let view = set.view();
        let sop = SopCommon::read(&view);

        if sop.study_instance_uid.is_empty() {
            return Err(HierarchyError::MissingStudyUid);
        }
        if sop.series_instance_uid.is_empty() {
            return Err(HierarchyError::MissingSeriesUid);
        }
        if sop.sop_instance_uid.is_empty() {
            return Err(HierarchyError::MissingSopInstanceUid);
        }
        let kind = classify(&sop.sop_class_uid, &sop.modality, view.has(tags::PIXEL_DATA))
            .ok_or_else(|| HierarchyError::UnsupportedSopClass {
            uid: sop.sop_class_uid.clone(),
            modality: sop.modality.clone(),
        })?;

        let content = match kind {
            ObjectKind::Image => {
                let instance = read_image_instance(&view, sop.clone(), file_index);
                SeriesContent::Images(vec![instance])
            }
            ObjectKind::StructureSet => {
                SeriesContent::StructureSet(rt::parse_structure_set(&view))
            }
            ObjectKind::Dose => SeriesContent::Dose(rt::parse_dose(&view)),
            ObjectKind::Plan => SeriesContent::Plan(rt::parse_plan(&view)),
        };

        self.attach(&sop, content);
        Ok(())
    }

    fn attach(&mut self, sop: &SopCommon, content: SeriesContent) {
        let patient = self.patient_entry(sop);
        let study = Self::study_entry(patient, sop);
        let series = Self::series_entry(study, sop, &content);

        match (&mut series.content, content) {
            (SeriesContent::Images(existing), SeriesContent::Images(new)) => {
                for instance in new {
                    let uid = &instance.sop.sop_instance_uid;
                    if existing.iter().any(|i| &i.sop.sop_instance_uid == uid) {
                        debug!(sop_instance = %uid, "duplicate instance ignored");
                    } else {
                        existing.push(instance);
                    }
                }
            }
            (slot, new) => {
                // RT payloads replace on reimport; a switched content kind is
                // worth flagging.
                if std::mem::discriminant(&*slot) != std::mem::discriminant(&new) {
                    warn!(series = %series.uid, "series content kind changed on reimport");
                } else if !matches!(new, SeriesContent::Images(_)) {
                    warn!(series = %series.uid, "RT object replaced on reimport");
                }
                *slot = new;
            }
        }
    }

    fn patient_entry(&mut self, sop: &SopCommon) -> &mut Patient {
        let id = if sop.patient_id.is_empty() {
            ANONYMOUS_PATIENT_ID.to_owned()
        } else {
            sop.patient_id.clone()
        };
        let index = match self.patients.iter().position(|p| p.id == id) {
            Some(index) => index,
            None => {
                self.patients.push(Patient {
                    id,
                    ..Patient::default()
                });
                self.patients.len() - 1
            }
        };
        let patient = &mut self.patients[index];
        fill_empty(&mut patient.name, sop.patient_name.clone());
        fill_empty(&mut patient.birth_date, sop.patient_birth_date.clone());
        fill_empty(&mut patient.sex, sop.patient_sex.clone());
        patient
    }

    fn study_entry<'a>(patient: &'a mut Patient, sop: &SopCommon) -> &'a mut Study {
        let uid = &sop.study_instance_uid;
        let index = match patient.studies.iter().position(|s| &s.uid == uid) {
            Some(index) => index,
            None => {
                patient.studies.push(Study {
                    uid: uid.clone(),
                    ..Study::default()
                });
                patient.studies.len() - 1
            }
        };
        let study = &mut patient.studies[index];
        fill_empty(&mut study.id, sop.study_id.clone());
        fill_empty(&mut study.date, sop.study_date.clone());
        fill_empty(&mut study.time, sop.study_time.clone());
        fill_empty(&mut study.description, sop.study_description.clone());
        fill_empty(&mut study.accession_number, sop.accession_number.clone());
        fill_empty(
            &mut study.referring_physician_name,
            sop.referring_physician_name.clone(),
        );
        study
    }

    fn series_entry<'a>(
        study: &'a mut Study,
        sop: &SopCommon,
        content: &SeriesContent,
    ) -> &'a mut Series {
        let uid = &sop.series_instance_uid;
        let index = match study.series.iter().position(|s| &s.uid == uid) {
            Some(index) => index,
            None => {
                let empty = match content {
                    SeriesContent::Images(_) => SeriesContent::Images(Vec::new()),
                    other => other.clone(),
                };
                study.series.push(Series {
                    uid: uid.clone(),
                    number: None,
                    modality: String::new(),
                    description: None,
                    date: None,
                    time: None,
                    content: empty,
                });
                study.series.len() - 1
            }
        };
        let series = &mut study.series[index];
        if series.number.is_none() {
            series.number = sop.series_number;
        }
        if series.modality.is_empty() {
            series.modality = sop.modality.clone();
        }
        fill_empty(&mut series.description, sop.series_description.clone());
        fill_empty(&mut series.date, sop.series_date.clone());
        fill_empty(&mut series.time, sop.series_time.clone());
        series
    }

    /// Finish the batch, yielding the owned tree.
    pub fn finish(self) -> Vec<Patient> {
        self.patients
    }
}
