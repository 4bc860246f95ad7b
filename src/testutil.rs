//! Shared builders for in-memory test data sets.

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, Tag, VR};
use dicom::dicom_value;
use dicom::object::InMemDicomObject;
use dicom::object::mem::InMemElement;
use dicom_dictionary_std::{tags, uids};

pub(crate) fn ds(tag: Tag, vr: VR, value: &str) -> InMemElement {
    DataElement::new(tag, vr, dicom_value!(Str, value))
}

pub(crate) fn int_str(tag: Tag, value: &str) -> InMemElement {
    ds(tag, VR::IS, value)
}

pub(crate) fn ui(tag: Tag, value: &str) -> InMemElement {
    ds(tag, VR::UI, value)
}

pub(crate) fn seq(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    DataElement::new(tag, VR::SQ, DataSetSequence::from(items))
}

pub(crate) fn item_with(elements: Vec<InMemElement>) -> InMemDicomObject {
    InMemDicomObject::from_element_iter(elements)
}

/// Identity elements shared by the synthetic objects below.
fn identity(
    sop_class_uid: &str,
    sop_instance_uid: &str,
    series_uid: &str,
    modality: &str,
) -> Vec<InMemElement> {
    vec![
        ui(tags::SOP_CLASS_UID, sop_class_uid),
        ui(tags::SOP_INSTANCE_UID, sop_instance_uid),
        ui(tags::SERIES_INSTANCE_UID, series_uid),
        ui(tags::STUDY_INSTANCE_UID, "1.2.840.999.1"),
        ds(tags::PATIENT_ID, VR::LO, "PAT001"),
        ds(tags::PATIENT_NAME, VR::PN, "Doe^Jane"),
        ds(tags::MODALITY, VR::CS, modality),
    ]
}

/// A minimal RT Structure Set data set with one contour per ROI.
///
/// Each ROI tuple is `(number, name, contour points)`; contours are emitted
/// as `CLOSED_PLANAR`.
pub(crate) fn structure_set_object(
    series_uid: &str,
    rois: &[(i64, &str, &[[f64; 3]])],
) -> InMemDicomObject {
    let roi_items = rois
        .iter()
        .map(|(number, name, _)| {
            item_with(vec![
                int_str(tags::ROI_NUMBER, &number.to_string()),
                ds(tags::ROI_NAME, VR::LO, name),
                ui(tags::REFERENCED_FRAME_OF_REFERENCE_UID, "1.2.840.999.5"),
            ])
        })
        .collect();

    let geometry_items = rois
        .iter()
        .map(|(number, _, points)| {
            let data: Vec<String> = points
                .iter()
                .flat_map(|p| p.iter().map(|v| v.to_string()))
                .collect();
            let contour = item_with(vec![
                ds(tags::CONTOUR_GEOMETRIC_TYPE, VR::CS, "CLOSED_PLANAR"),
                int_str(tags::NUMBER_OF_CONTOUR_POINTS, &points.len().to_string()),
                DataElement::new(
                    tags::CONTOUR_DATA,
                    VR::DS,
                    dicom::core::PrimitiveValue::Strs(data.into_iter().collect()),
                ),
            ]);
            item_with(vec![
                int_str(tags::REFERENCED_ROI_NUMBER, &number.to_string()),
                DataElement::new(
                    tags::ROI_DISPLAY_COLOR,
                    VR::IS,
                    dicom_value!(Strs, ["255", "0", "0"]),
                ),
                seq(tags::CONTOUR_SEQUENCE, vec![contour]),
            ])
        })
        .collect();

    let mut elements = identity(
        uids::RT_STRUCTURE_SET_STORAGE,
        "1.2.840.999.4.1",
        series_uid,
        "RTSTRUCT",
    );
    elements.push(ds(tags::STRUCTURE_SET_LABEL, VR::SH, "STRUCT"));
    elements.push(seq(tags::STRUCTURE_SET_ROI_SEQUENCE, roi_items));
    elements.push(seq(tags::ROI_CONTOUR_SEQUENCE, geometry_items));
    item_with(elements)
}

/// A single-frame monochrome image data set positioned at `position`.
///
/// Pixel data is 16-bit little endian, all samples set to `value`.
pub(crate) fn image_object(
    series_uid: &str,
    sop_instance_uid: &str,
    instance_number: i64,
    rows: u16,
    columns: u16,
    position: [f64; 3],
    value: u16,
) -> InMemDicomObject {
    let pixels: Vec<u16> = vec![value; rows as usize * columns as usize];
    let mut elements = identity(
        uids::CT_IMAGE_STORAGE,
        sop_instance_uid,
        series_uid,
        "CT",
    );
    elements.extend([
        int_str(tags::INSTANCE_NUMBER, &instance_number.to_string()),
        ui(tags::FRAME_OF_REFERENCE_UID, "1.2.840.999.5"),
        DataElement::new(tags::ROWS, VR::US, dicom_value!(U16, [rows])),
        DataElement::new(tags::COLUMNS, VR::US, dicom_value!(U16, [columns])),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, dicom_value!(U16, [16])),
        DataElement::new(tags::BITS_STORED, VR::US, dicom_value!(U16, [16])),
        DataElement::new(tags::HIGH_BIT, VR::US, dicom_value!(U16, [15])),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, dicom_value!(U16, [0])),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, dicom_value!(U16, [1])),
        ds(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2"),
        DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            dicom_value!(Strs, ["1.0", "1.0"]),
        ),
        DataElement::new(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            dicom_value!(Strs, ["1", "0", "0", "0", "1", "0"]),
        ),
        DataElement::new(
            tags::IMAGE_POSITION_PATIENT,
            VR::DS,
            dicom::core::PrimitiveValue::Strs(
                position.iter().map(|v| v.to_string()).collect(),
            ),
        ),
        ds(tags::RESCALE_SLOPE, VR::DS, "1"),
        ds(tags::RESCALE_INTERCEPT, VR::DS, "0"),
        DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            dicom::core::PrimitiveValue::U16(pixels.into_iter().collect()),
        ),
    ]);
    item_with(elements)
}
