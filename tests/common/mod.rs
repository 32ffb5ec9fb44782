//! Synthetic MR DICOM fixtures for loader tests.
#![allow(dead_code)]

use std::path::Path;

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};

pub const ROWS: u16 = 4;
pub const COLUMNS: u16 = 3;

/// Attributes of one synthetic image. `None` leaves the attribute out.
#[derive(Clone, Copy)]
pub struct Slice {
    pub echo_time: Option<f64>,
    pub slice_location: Option<f64>,
    pub rows: u16,
    pub columns: u16,
    pub pixel_spacing: Option<(f64, f64)>,
    pub slice_thickness: Option<f64>,
    pub value: u16,
}

impl Slice {
    pub fn new(echo_time: f64, slice_location: f64, value: u16) -> Self {
        Self {
            echo_time: Some(echo_time),
            slice_location: Some(slice_location),
            rows: ROWS,
            columns: COLUMNS,
            pixel_spacing: Some((0.75, 0.75)),
            slice_thickness: Some(5.0),
            value,
        }
    }
}

fn ds(value: f64) -> PrimitiveValue {
    PrimitiveValue::from(format!("{value}"))
}

pub fn write_slice(path: &Path, slice: Slice) {
    let mut obj = InMemDicomObject::new_empty();

    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(uids::MR_IMAGE_STORAGE),
    ));
    obj.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("MR")));
    if let Some(echo_time) = slice.echo_time {
        obj.put(DataElement::new(tags::ECHO_TIME, VR::DS, ds(echo_time)));
    }
    if let Some(slice_location) = slice.slice_location {
        obj.put(DataElement::new(tags::SLICE_LOCATION, VR::DS, ds(slice_location)));
    }
    if let Some(thickness) = slice.slice_thickness {
        obj.put(DataElement::new(tags::SLICE_THICKNESS, VR::DS, ds(thickness)));
    }
    if let Some((row, column)) = slice.pixel_spacing {
        obj.put(DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            PrimitiveValue::Strs(vec![format!("{row}"), format!("{column}")].into()),
        ));
    }

    obj.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)));
    obj.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(slice.rows)));
    obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(slice.columns)));
    obj.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)));
    obj.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)));
    obj.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)));
    obj.put(DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)));

    let pixels = vec![slice.value; usize::from(slice.rows) * usize::from(slice.columns)];
    obj.put(DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(pixels.into())));

    let instance_uid = format!("2.25.{}", u64::from(slice.value) + 1_000 * u64::from(slice.rows));
    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::MR_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(instance_uid),
        )
        .unwrap();
    file.write_to_file(path).unwrap();
}

pub fn write_slices(dir: &Path, slices: &[Slice]) {
    for (i, slice) in slices.iter().enumerate() {
        write_slice(&dir.join(format!("img{i:03}.dcm")), *slice);
    }
}
