//! Radiotherapy object parsing: structure sets, dose grids and plans.
//!
//! Record shapes follow the RT IODs closely enough for a viewer: a structure
//! set joins its three ROI sequences on the shared ROI number, a dose carries
//! its grid geometry and scaling, and a plan carries fraction groups and the
//! beam → control point tree. All field access goes through the non-throwing
//! accessors of [`crate::dataset::ItemView`]; a malformed ROI, contour, beam
//! or control point is skipped with a warning collected on the record, never
//! aborting its siblings.

use dicom_dictionary_std::tags;
use tracing::warn;

use crate::dataset::ItemView;

/// Identity block shared by every supported object type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SopCommon {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,
    pub study_id: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub accession_number: Option<String>,
    pub referring_physician_name: Option<String>,
    pub study_description: Option<String>,
    pub series_number: Option<i64>,
    pub series_date: Option<String>,
    pub series_time: Option<String>,
    pub series_description: Option<String>,
    pub modality: String,
    pub instance_number: Option<i64>,
}

impl SopCommon {
    pub fn read(view: &ItemView<'_>) -> Self {
        SopCommon {
            sop_class_uid: view.string(tags::SOP_CLASS_UID),
            sop_instance_uid: view.string(tags::SOP_INSTANCE_UID),
            series_instance_uid: view.string(tags::SERIES_INSTANCE_UID),
            study_instance_uid: view.string(tags::STUDY_INSTANCE_UID),
            patient_id: view.string(tags::PATIENT_ID),
            patient_name: view.string_opt(tags::PATIENT_NAME),
            patient_birth_date: view.string_opt(tags::PATIENT_BIRTH_DATE),
            patient_sex: view.string_opt(tags::PATIENT_SEX),
            study_id: view.string_opt(tags::STUDY_ID),
            study_date: view.string_opt(tags::STUDY_DATE),
            study_time: view.string_opt(tags::STUDY_TIME),
            accession_number: view.string_opt(tags::ACCESSION_NUMBER),
            referring_physician_name: view.string_opt(tags::REFERRING_PHYSICIAN_NAME),
            study_description: view.string_opt(tags::STUDY_DESCRIPTION),
            series_number: view.int_opt(tags::SERIES_NUMBER),
            series_date: view.string_opt(tags::SERIES_DATE),
            series_time: view.string_opt(tags::SERIES_TIME),
            series_description: view.string_opt(tags::SERIES_DESCRIPTION),
            modality: view.string(tags::MODALITY),
            instance_number: view.int_opt(tags::INSTANCE_NUMBER),
        }
    }
}

/// One contour of an ROI: a closed planar polygon in patient coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub number: Option<i64>,
    /// Geometric type as declared by the file, e.g. `CLOSED_PLANAR`.
    pub geometric_type: String,
    pub points: Vec<[f64; 3]>,
}

/// A region of interest with its contour stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    pub number: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub generation_algorithm: Option<String>,
    pub frame_of_reference_uid: String,
    pub display_color: Option<[u8; 3]>,
    pub contours: Vec<Contour>,
}

/// An entry of the RT ROI observations sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiObservation {
    pub observation_number: i64,
    pub referenced_roi_number: i64,
    pub label: Option<String>,
    pub interpreted_type: Option<String>,
    pub interpreter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RtStructureSet {
    pub sop: SopCommon,
    pub label: String,
    pub name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub rois: Vec<Roi>,
    pub observations: Vec<RoiObservation>,
    /// Sub-items that failed to parse and were skipped.
    pub warnings: Vec<String>,
}

/// Grid geometry of a dose distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoseGrid {
    pub rows: u32,
    pub columns: u32,
    pub number_of_frames: Option<u32>,
    pub pixel_spacing: [f64; 2],
    pub position: [f64; 3],
    pub orientation: [f64; 6],
    pub slice_thickness: Option<f64>,
    pub frame_of_reference_uid: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RtDose {
    pub sop: SopCommon,
    pub dose_units: String,
    pub dose_type: String,
    pub summation_type: String,
    pub grid_scaling: Option<f64>,
    /// Frame offsets along the grid normal, in mm.
    pub grid_frame_offsets: Option<Vec<f64>>,
    pub grid: DoseGrid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeamLimitingDevicePositions {
    pub device_type: String,
    pub leaf_jaw_positions: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPoint {
    pub index: i64,
    pub nominal_beam_energy: Option<f64>,
    pub gantry_angle: Option<f64>,
    pub beam_limiting_device_angle: Option<f64>,
    pub patient_support_angle: Option<f64>,
    pub isocenter: Option<[f64; 3]>,
    pub cumulative_meterset_weight: f64,
    pub device_positions: Vec<BeamLimitingDevicePositions>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Beam {
    pub number: i64,
    pub name: Option<String>,
    pub beam_type: String,
    pub radiation_type: String,
    pub treatment_machine_name: Option<String>,
    pub source_axis_distance: Option<f64>,
    pub final_cumulative_meterset_weight: Option<f64>,
    pub control_points: Vec<ControlPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FractionGroup {
    pub number: i64,
    pub fractions_planned: Option<i64>,
    pub beam_count: i64,
    pub referenced_beam_numbers: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RtPlan {
    pub sop: SopCommon,
    pub label: String,
    pub name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub geometry: String,
    pub fraction_groups: Vec<FractionGroup>,
    pub beams: Vec<Beam>,
    pub warnings: Vec<String>,
}

/// Parse an RT Structure Set data set.
///
/// ROI definitions, contour geometry and observations are joined on the ROI
/// number. ROIs without a number and contours with malformed point data are
/// skipped and reported through `warnings`.
pub fn parse_structure_set(view: &ItemView<'_>) -> RtStructureSet {
    let sop = SopCommon::read(view);
    let mut warnings = Vec::new();

    let contour_items = view.items(tags::ROI_CONTOUR_SEQUENCE);
    let mut rois = Vec::new();
    for roi_item in view.items(tags::STRUCTURE_SET_ROI_SEQUENCE) {
        let Some(number) = roi_item.int_opt(tags::ROI_NUMBER) else {
            warnings.push("ROI without ROINumber skipped".to_owned());
            warn!(series = %sop.series_instance_uid, "ROI without ROINumber skipped");
            continue;
        };

        // The matching geometry item references this ROI by number.
        let geometry = contour_items
            .iter()
            .find(|item| item.int_opt(tags::REFERENCED_ROI_NUMBER) == Some(number));

        let mut display_color = None;
        let mut contours = Vec::new();
        if let Some(geometry) = geometry {
            display_color = read_display_color(geometry);
            for contour_item in geometry.items(tags::CONTOUR_SEQUENCE) {
                match read_contour(&contour_item) {
                    Ok(contour) => contours.push(contour),
                    Err(message) => {
                        warnings.push(format!("ROI {number}: {message}"));
                        warn!(roi = number, %message, "contour skipped");
                    }
                }
            }
        }

        rois.push(Roi {
            number,
            name: roi_item.string_opt(tags::ROI_NAME),
            description: roi_item.string_opt(tags::ROI_DESCRIPTION),
            generation_algorithm: roi_item.string_opt(tags::ROI_GENERATION_ALGORITHM),
            frame_of_reference_uid: roi_item.string(tags::REFERENCED_FRAME_OF_REFERENCE_UID),
            display_color,
            contours,
        });
    }

    let observations = view
        .items(tags::RTROI_OBSERVATIONS_SEQUENCE)
        .iter()
        .map(|item| RoiObservation {
            observation_number: item.int_opt(tags::OBSERVATION_NUMBER).unwrap_or(0),
            referenced_roi_number: item.int_opt(tags::REFERENCED_ROI_NUMBER).unwrap_or(0),
            label: item.string_opt(tags::ROI_OBSERVATION_LABEL),
            interpreted_type: item.string_opt(tags::RTROI_INTERPRETED_TYPE),
            interpreter: item.string_opt(tags::ROI_INTERPRETER),
        })
        .collect();

    RtStructureSet {
        sop,
        label: view.string(tags::STRUCTURE_SET_LABEL),
        name: view.string_opt(tags::STRUCTURE_SET_NAME),
        date: view.string_opt(tags::STRUCTURE_SET_DATE),
        time: view.string_opt(tags::STRUCTURE_SET_TIME),
        rois,
        observations,
        warnings,
    }
}

fn read_display_color(item: &ItemView<'_>) -> Option<[u8; 3]> {
    let values = item.number_array_opt(tags::ROI_DISPLAY_COLOR)?;
    if values.len() != 3 {
        return None;
    }
    Some([
        values[0].clamp(0.0, 255.0) as u8,
        values[1].clamp(0.0, 255.0) as u8,
        values[2].clamp(0.0, 255.0) as u8,
    ])
}

fn read_contour(item: &ItemView<'_>) -> Result<Contour, String> {
    let Some(data) = item.number_array_opt(tags::CONTOUR_DATA) else {
        return Err("contour data missing or unparseable".to_owned());
    };
    if data.len() % 3 != 0 {
        return Err(format!(
            "contour data length {} is not a multiple of 3",
            data.len()
        ));
    }
    let points = data
        .chunks_exact(3)
        .map(|triple| [triple[0], triple[1], triple[2]])
        .collect();
    Ok(Contour {
        number: item.int_opt(tags::CONTOUR_NUMBER),
        geometric_type: item.string(tags::CONTOUR_GEOMETRIC_TYPE),
        points,
    })
}

/// Parse an RT Dose data set.
pub fn parse_dose(view: &ItemView<'_>) -> RtDose {
    let grid = DoseGrid {
        rows: view.number(tags::ROWS) as u32,
        columns: view.number(tags::COLUMNS) as u32,
        number_of_frames: view.int_opt(tags::NUMBER_OF_FRAMES).map(|n| n as u32),
        pixel_spacing: pair_or(view.number_array(tags::PIXEL_SPACING), [1.0, 1.0]),
        position: triple_or(view.number_array(tags::IMAGE_POSITION_PATIENT), [0.0; 3]),
        orientation: orientation_or_default(view.number_array(tags::IMAGE_ORIENTATION_PATIENT)),
        slice_thickness: view.number_opt(tags::SLICE_THICKNESS),
        frame_of_reference_uid: view.string(tags::FRAME_OF_REFERENCE_UID),
    };

    RtDose {
        sop: SopCommon::read(view),
        dose_units: view.string(tags::DOSE_UNITS),
        dose_type: view.string(tags::DOSE_TYPE),
        summation_type: view.string(tags::DOSE_SUMMATION_TYPE),
        grid_scaling: view.number_opt(tags::DOSE_GRID_SCALING),
        grid_frame_offsets: view.number_array_opt(tags::GRID_FRAME_OFFSET_VECTOR),
        grid,
    }
}

/// Parse an RT Plan data set: fraction groups, then beams with their nested
/// control point sequences.
pub fn parse_plan(view: &ItemView<'_>) -> RtPlan {
    let sop = SopCommon::read(view);
    let mut warnings = Vec::new();

    let fraction_groups = view
        .items(tags::FRACTION_GROUP_SEQUENCE)
        .iter()
        .map(|item| FractionGroup {
            number: item.int_opt(tags::FRACTION_GROUP_NUMBER).unwrap_or(0),
            fractions_planned: item.int_opt(tags::NUMBER_OF_FRACTIONS_PLANNED),
            beam_count: item.int_opt(tags::NUMBER_OF_BEAMS).unwrap_or(0),
            referenced_beam_numbers: item
                .items(tags::REFERENCED_BEAM_SEQUENCE)
                .iter()
                .filter_map(|beam| beam.int_opt(tags::REFERENCED_BEAM_NUMBER))
                .collect(),
        })
        .collect();

    let mut beams = Vec::new();
    for beam_item in view.items(tags::BEAM_SEQUENCE) {
        let Some(number) = beam_item.int_opt(tags::BEAM_NUMBER) else {
            warnings.push("beam without BeamNumber skipped".to_owned());
            warn!(series = %sop.series_instance_uid, "beam without BeamNumber skipped");
            continue;
        };

        let control_points = beam_item
            .items(tags::CONTROL_POINT_SEQUENCE)
            .iter()
            .map(read_control_point)
            .collect();

        beams.push(Beam {
            number,
            name: beam_item.string_opt(tags::BEAM_NAME),
            beam_type: beam_item.string(tags::BEAM_TYPE),
            radiation_type: beam_item.string(tags::RADIATION_TYPE),
            treatment_machine_name: beam_item.string_opt(tags::TREATMENT_MACHINE_NAME),
            source_axis_distance: beam_item.number_opt(tags::SOURCE_AXIS_DISTANCE),
            final_cumulative_meterset_weight: beam_item
                .number_opt(tags::FINAL_CUMULATIVE_METERSET_WEIGHT),
            control_points,
        });
    }

    RtPlan {
        label: view.string(tags::RT_PLAN_LABEL),
        name: view.string_opt(tags::RT_PLAN_NAME),
        date: view.string_opt(tags::RT_PLAN_DATE),
        time: view.string_opt(tags::RT_PLAN_TIME),
        geometry: view.string(tags::RT_PLAN_GEOMETRY),
        fraction_groups,
        beams,
        warnings,
        sop,
    }
}

fn read_control_point(item: &ItemView<'_>) -> ControlPoint {
    let isocenter = item
        .number_array_opt(tags::ISOCENTER_POSITION)
        .filter(|values| values.len() == 3)
        .map(|values| [values[0], values[1], values[2]]);

    let device_positions = item
        .items(tags::BEAM_LIMITING_DEVICE_POSITION_SEQUENCE)
        .iter()
        .map(|bld| BeamLimitingDevicePositions {
            device_type: bld.string(tags::RT_BEAM_LIMITING_DEVICE_TYPE),
            leaf_jaw_positions: bld.number_array(tags::LEAF_JAW_POSITIONS),
        })
        .collect();

    ControlPoint {
        index: item.int_opt(tags::CONTROL_POINT_INDEX).unwrap_or(0),
        nominal_beam_energy: item.number_opt(tags::NOMINAL_BEAM_ENERGY),
        gantry_angle: item.number_opt(tags::GANTRY_ANGLE),
        beam_limiting_device_angle: item.number_opt(tags::BEAM_LIMITING_DEVICE_ANGLE),
        patient_support_angle: item.number_opt(tags::PATIENT_SUPPORT_ANGLE),
        isocenter,
        cumulative_meterset_weight: item.number(tags::CUMULATIVE_METERSET_WEIGHT),
        device_positions,
    }
}

fn pair_or(values: Vec<f64>, default: [f64; 2]) -> [f64; 2] {
    if values.len() == 2 {
        [values[0], values[1]]
    } else {
        default
    }
}

fn triple_or(values: Vec<f64>, default: [f64; 3]) -> [f64; 3] {
    if values.len() == 3 {
        [values[0], values[1], values[2]]
    } else {
        default
    }
}

fn orientation_or_default(values: Vec<f64>) -> [f64; 6] {
    if values.len() == 6 {
        [
            values[0], values[1], values[2], values[3], values[4], values[5],
        ]
    } else {
        [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
    }
}
