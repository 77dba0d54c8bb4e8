//! Fixtures shared by the integration tests: tiny synthetic DICOM studies and
//! NIfTI output trees.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::tags;
use dicom_pipeline::{Volume, geometry::ImageGeometry};
use ndarray::Array3;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub const PATIENT_ID: &str = "HNSCC-01-0001";
pub const STUDY_UID: &str = "1.2.826.0.1.3680043.8.498.1";
pub const CT_SERIES_UID: &str = "1.2.826.0.1.3680043.8.498.2.58373";
pub const RTSTRUCT_SERIES_UID: &str = "1.2.826.0.1.3680043.8.498.3.77001";
pub const IMAGE_ID: &str = "58373";

const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
const RT_STRUCTURE_SET_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.481.3";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// In-plane size and number of slices of the synthetic CT
pub const ROWS: u16 = 8;
pub const COLUMNS: u16 = 8;
pub const SLICES: usize = 4;

fn put_str(object: &mut InMemDicomObject, tag: dicom::core::Tag, vr: VR, value: &str) {
    object.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

fn put_strs(object: &mut InMemDicomObject, tag: dicom::core::Tag, vr: VR, values: &[String]) {
    object.put(DataElement::new(
        tag,
        vr,
        PrimitiveValue::Strs(values.iter().cloned().collect()),
    ));
}

fn put_u16(object: &mut InMemDicomObject, tag: dicom::core::Tag, value: u16) {
    object.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn put_sequence(object: &mut InMemDicomObject, tag: dicom::core::Tag, items: Vec<InMemDicomObject>) {
    object.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
}

fn write(object: InMemDicomObject, sop_class: &str, sop_instance: &str, path: &Path) {
    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
        .media_storage_sop_class_uid(sop_class)
        .media_storage_sop_instance_uid(sop_instance);
    object
        .with_meta(meta)
        .unwrap()
        .write_to_file(path)
        .unwrap();
}

fn decimal(value: f64) -> String {
    format!("{value}")
}

fn common_attributes(object: &mut InMemDicomObject, modality: &str, series_uid: &str) {
    put_str(object, tags::PATIENT_ID, VR::LO, PATIENT_ID);
    put_str(object, tags::STUDY_INSTANCE_UID, VR::UI, STUDY_UID);
    put_str(object, tags::SERIES_INSTANCE_UID, VR::UI, series_uid);
    put_str(object, tags::MODALITY, VR::CS, modality);
}

/// Write an axial CT series with 1mm voxels at the origin, slices written in
/// reverse order. Stored values are `k * 100 + 1024` with a -1024 rescale.
pub fn write_ct_series(directory: &Path) -> Vec<PathBuf> {
    write_ct_series_with_uid(directory, CT_SERIES_UID)
}

pub fn write_ct_series_with_uid(directory: &Path, series_uid: &str) -> Vec<PathBuf> {
    std::fs::create_dir_all(directory).unwrap();
    (0..SLICES)
        .rev()
        .map(|k| {
            let sop_instance = format!("{series_uid}.{}", k + 1);
            let mut object = InMemDicomObject::new_empty();
            common_attributes(&mut object, "CT", series_uid);
            put_str(&mut object, tags::SOP_CLASS_UID, VR::UI, CT_IMAGE_STORAGE);
            put_str(&mut object, tags::SOP_INSTANCE_UID, VR::UI, &sop_instance);
            put_str(&mut object, tags::FRAME_OF_REFERENCE_UID, VR::UI, STUDY_UID);
            put_str(&mut object, tags::INSTANCE_NUMBER, VR::IS, &(k + 1).to_string());
            put_strs(
                &mut object,
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                &[decimal(0.0), decimal(0.0), decimal(k as f64)],
            );
            put_strs(
                &mut object,
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                &["1", "0", "0", "0", "1", "0"].map(String::from),
            );
            put_strs(&mut object, tags::PIXEL_SPACING, VR::DS, &["1", "1"].map(String::from));
            put_str(&mut object, tags::SLICE_THICKNESS, VR::DS, "1");
            put_str(&mut object, tags::RESCALE_INTERCEPT, VR::DS, "-1024");
            put_str(&mut object, tags::RESCALE_SLOPE, VR::DS, "1");

            put_u16(&mut object, tags::SAMPLES_PER_PIXEL, 1);
            put_str(&mut object, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
            put_u16(&mut object, tags::ROWS, ROWS);
            put_u16(&mut object, tags::COLUMNS, COLUMNS);
            put_u16(&mut object, tags::BITS_ALLOCATED, 16);
            put_u16(&mut object, tags::BITS_STORED, 16);
            put_u16(&mut object, tags::HIGH_BIT, 15);
            put_u16(&mut object, tags::PIXEL_REPRESENTATION, 0);

            let stored = (k as u16) * 100 + 1024;
            let pixels: Vec<u8> = (0..ROWS as usize * COLUMNS as usize)
                .flat_map(|_| stored.to_le_bytes())
                .collect();
            object.put(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                PrimitiveValue::from(pixels),
            ));

            let path = directory.join(format!("CT{:03}.dcm", k + 1));
            write(object, CT_IMAGE_STORAGE, &sop_instance, &path);
            path
        })
        .collect()
}

/// A square contour on plane `z`, enclosing voxel centres 2..=4 in x and y.
fn square_contour(z: f64) -> InMemDicomObject {
    let points: Vec<String> = [(1.5, 1.5), (4.5, 1.5), (4.5, 4.5), (1.5, 4.5)]
        .iter()
        .flat_map(|&(x, y)| [decimal(x), decimal(y), decimal(z)])
        .collect();
    let mut contour = InMemDicomObject::new_empty();
    put_str(&mut contour, tags::CONTOUR_GEOMETRIC_TYPE, VR::CS, "CLOSED_PLANAR");
    put_str(
        &mut contour,
        tags::NUMBER_OF_CONTOUR_POINTS,
        VR::IS,
        &(points.len() / 3).to_string(),
    );
    put_strs(&mut contour, tags::CONTOUR_DATA, VR::DS, &points);
    contour
}

/// Write an RT structure set referencing the CT series with one contoured
/// ROI per name in `contoured` and one empty ROI per name in `empty`.
pub fn write_rtstruct(directory: &Path, contoured: &[&str], empty: &[&str]) -> PathBuf {
    write_rtstruct_for(directory, RTSTRUCT_SERIES_UID, CT_SERIES_UID, contoured, empty)
}

/// Structure set `series_uid` drawn on the image series `referenced_uid`.
pub fn write_rtstruct_for(
    directory: &Path,
    series_uid: &str,
    referenced_uid: &str,
    contoured: &[&str],
    empty: &[&str],
) -> PathBuf {
    std::fs::create_dir_all(directory).unwrap();
    let sop_instance = format!("{series_uid}.1");
    let mut object = InMemDicomObject::new_empty();
    common_attributes(&mut object, "RTSTRUCT", series_uid);
    put_str(&mut object, tags::SOP_CLASS_UID, VR::UI, RT_STRUCTURE_SET_STORAGE);
    put_str(&mut object, tags::SOP_INSTANCE_UID, VR::UI, &sop_instance);

    let mut referenced_series = InMemDicomObject::new_empty();
    put_str(&mut referenced_series, tags::SERIES_INSTANCE_UID, VR::UI, referenced_uid);
    let mut referenced_study = InMemDicomObject::new_empty();
    put_str(
        &mut referenced_study,
        tags::REFERENCED_SOP_INSTANCE_UID,
        VR::UI,
        STUDY_UID,
    );
    put_sequence(
        &mut referenced_study,
        tags::RT_REFERENCED_SERIES_SEQUENCE,
        vec![referenced_series],
    );
    let mut frame = InMemDicomObject::new_empty();
    put_str(&mut frame, tags::FRAME_OF_REFERENCE_UID, VR::UI, STUDY_UID);
    put_sequence(
        &mut frame,
        tags::RT_REFERENCED_STUDY_SEQUENCE,
        vec![referenced_study],
    );
    put_sequence(
        &mut object,
        tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
        vec![frame],
    );

    let rois = contoured
        .iter()
        .chain(empty)
        .enumerate()
        .map(|(n, name)| {
            let mut roi = InMemDicomObject::new_empty();
            put_str(&mut roi, tags::ROI_NUMBER, VR::IS, &(n + 1).to_string());
            put_str(&mut roi, tags::ROI_NAME, VR::LO, name);
            roi
        })
        .collect();
    put_sequence(&mut object, tags::STRUCTURE_SET_ROI_SEQUENCE, rois);

    let roi_contours = (0..contoured.len())
        .map(|n| {
            let mut roi_contour = InMemDicomObject::new_empty();
            put_str(
                &mut roi_contour,
                tags::REFERENCED_ROI_NUMBER,
                VR::IS,
                &(n + 1).to_string(),
            );
            put_sequence(
                &mut roi_contour,
                tags::CONTOUR_SEQUENCE,
                vec![square_contour(1.0), square_contour(2.0)],
            );
            roi_contour
        })
        .collect();
    put_sequence(&mut object, tags::ROI_CONTOUR_SEQUENCE, roi_contours);

    let path = directory.join("RS.dcm");
    write(object, RT_STRUCTURE_SET_STORAGE, &sop_instance, &path);
    path
}

/// `dim` volume with 1mm voxels and a gradient so the display window is not flat.
pub fn gradient_volume(dim: (usize, usize, usize)) -> Volume {
    let data = Array3::from_shape_fn(dim, |(k, j, i)| (k * 100 + j * 10 + i) as f32);
    Volume::new(data, ImageGeometry::identity([1.0, 1.0, 1.0]))
}

/// Box mask of `dim` with voxels `1..3` set along each axis.
pub fn box_mask(dim: (usize, usize, usize)) -> Volume {
    let mut data = Array3::<f32>::zeros(dim);
    data.slice_mut(ndarray::s![1..3, 1..3, 1..3]).fill(1.0);
    Volume::new(data, ImageGeometry::identity([1.0, 1.0, 1.0]))
}

pub fn write_image(path: &Path, dim: (usize, usize, usize)) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    gradient_volume(dim).write_nifti(path).unwrap();
}

pub fn write_mask(path: &Path, dim: (usize, usize, usize)) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    box_mask(dim).write_nifti(path).unwrap();
}

/// Counts events per level, to assert on what a stage logged.
#[derive(Clone, Default)]
pub struct LevelCounter {
    errors: Arc<AtomicUsize>,
    warnings: Arc<AtomicUsize>,
}

impl LevelCounter {
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level == Level::ERROR {
            self.errors.fetch_add(1, Ordering::SeqCst);
        } else if level == Level::WARN {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` with `counter` collecting every event emitted on this thread.
pub fn with_counter<T>(counter: &LevelCounter, f: impl FnOnce() -> T) -> T {
    use tracing_subscriber::layer::SubscriberExt;
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    tracing::subscriber::with_default(subscriber, f)
}
