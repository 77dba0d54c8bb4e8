use crate::{enums::SortBy, geometry, geometry::ImageGeometry, volume::Volume};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Missing orientation information")]
    MissingOrientation,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

struct Slice {
    order: Option<f64>,
    position: Option<[f64; 3]>,
    image: Array2<f32>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from the DICOM objects of one image series
    ///
    /// Voxel values have the modality rescale applied (e.g. Hounsfield units
    /// for CT) and no VOI windowing.
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent or
    /// the spatial attributes are missing
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let orientation =
            Self::get_orientation(dicom_objects).ok_or(VolumeLoaderError::MissingOrientation)?;
        let normal = geometry::cross(
            [orientation[0], orientation[1], orientation[2]],
            [orientation[3], orientation[4], orientation[5]],
        );

        let mut slices: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_slice(dicom_object, &sort_by, normal))
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_slices(&mut slices, sort_by);
        Self::validate_dimensions(&slices)?;

        let (row_spacing, column_spacing, thickness) =
            Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;

        let origin = slices[0].position.unwrap_or([0.0; 3]);
        let mut image_geometry = ImageGeometry::new(
            origin,
            [orientation[0], orientation[1], orientation[2]],
            [orientation[3], orientation[4], orientation[5]],
            [column_spacing, row_spacing, thickness],
        );
        if let Some((distance, direction)) = Self::get_slice_step(&slices) {
            image_geometry.spacing[2] = distance;
            image_geometry.slice_direction = direction;
        }

        debug!(
            slices = slices.len(),
            spacing = ?image_geometry.spacing,
            "built volume from DICOM slices"
        );

        let volume_array = Self::build_volume_array(&slices);
        Ok(Volume::new(volume_array, image_geometry))
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_slice(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        normal: [f64; 3],
    ) -> Option<Slice> {
        let position = Self::get_position(dicom_object);
        let order = Self::get_sort_order(dicom_object, sort_by, position, normal)?;
        let Some(image) = Self::decode_image(dicom_object) else {
            warn!(
                sop_instance_uid = %dicom_object.meta().media_storage_sop_instance_uid(),
                "skipping slice without decodable pixel data"
            );
            return None;
        };
        Some(Slice {
            order,
            position,
            image,
        })
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<[f64; 3]> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        (pos.len() >= 3).then(|| [pos[0], pos[1], pos[2]])
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        position: Option<[f64; 3]>,
        normal: [f64; 3],
    ) -> Option<Option<f64>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let position = position?;
                Some(Some(geometry::dot(position, normal)))
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(f64::from);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::Default)
            .with_voi_lut(VoiLutOption::Identity);
        let values: Vec<f32> = pixel_data.to_vec_frame_with_options(0, &options).ok()?;
        let (rows, columns) = (pixel_data.rows() as usize, pixel_data.columns() as usize);
        Array2::from_shape_vec((rows, columns), values).ok()
    }

    fn sort_slices(slices: &mut [Slice], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    fn validate_dimensions(slices: &[Slice]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[Slice]) -> Array3<f32> {
        let (height, width) = slices[0].image.dim();
        let depth = slices.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.image);
        }

        volume
    }

    /// Distance and direction between the first two slices, if they differ in position
    fn get_slice_step(slices: &[Slice]) -> Option<(f64, [f64; 3])> {
        let first = slices.first()?.position?;
        let second = slices.get(1)?.position?;
        let step = geometry::sub(second, first);
        let distance = geometry::dot(step, step).sqrt();
        (distance > f64::EPSILON).then(|| (distance, step.map(|v| v / distance)))
    }

    fn get_orientation(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<[f64; 6]> {
        dicom_objects.iter().find_map(|dicom_object| {
            let values = dicom_object
                .element(tags::IMAGE_ORIENTATION_PATIENT)
                .ok()?
                .to_multi_float64()
                .ok()?;
            let orientation: [f64; 6] = values.get(..6)?.try_into().ok()?;
            Some(orientation)
        })
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f64, f64, f64)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;
            if pixel_spacing.len() < 2 {
                return None;
            }

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()
                .and_then(|element| element.to_float64().ok())
                .unwrap_or(1.0);

            Some((pixel_spacing[0], pixel_spacing[1], slice_thickness))
        })
    }
}
