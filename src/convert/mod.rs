//! Write preprocessed DICOM series into the NIfTI output tree.
//!
//! ```text
//! <output>/<patient_id>/images/<image_id>.nii.gz
//! <output>/<patient_id>/structures/RTSTRUCT_<image_id>/<structure>.nii.gz
//! ```

pub mod pt;
pub mod rtstruct;

use crate::enums::{Modality, SortBy};
use crate::error::Result;
use crate::geometry::ImageGeometry;
use crate::preprocess::{PreprocessedResult, SeriesEntry};
use crate::volume::write_mask_nifti;
use crate::volume_loader::VolumeLoader;

use dicom::object::open_file;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const IMAGES_DIR: &str = "images";
pub const STRUCTURES_DIR: &str = "structures";
pub const STRUCTURE_SET_PREFIX: &str = "RTSTRUCT";
pub const NIFTI_SUFFIX: &str = ".nii.gz";

/// Number of trailing series UID digits used as the image id
const IMAGE_ID_LEN: usize = 5;

/// Identifier of an image series in output file names: the last five digits
/// of the series UID, separators dropped so the id never starts with a dot.
pub fn image_id(series_uid: &str) -> String {
    let digits: Vec<char> = series_uid
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    digits[digits.len().saturating_sub(IMAGE_ID_LEN)..]
        .iter()
        .collect()
}

/// Name of the directory holding the masks drawn on `image_id`.
pub fn structure_set_dir_name(image_id: &str) -> String {
    format!("{STRUCTURE_SET_PREFIX}_{image_id}")
}

/// A converted image series, kept to rasterise its structure sets.
struct ConvertedImage {
    image_id: String,
    patient_dir: PathBuf,
    geometry: ImageGeometry,
    dim: (usize, usize, usize),
}

pub struct ConvertData {
    preprocessed: PreprocessedResult,
    output_directory: PathBuf,
}

impl ConvertData {
    pub fn new(preprocessed: PreprocessedResult, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            preprocessed,
            output_directory: output_directory.into(),
        }
    }

    /// Convert images first, then the structure sets drawn on them.
    pub fn convert(self) -> Result<()> {
        let mut converted: HashMap<String, ConvertedImage> = HashMap::new();
        let mut written: HashSet<PathBuf> = HashSet::new();

        for series in &self.preprocessed.series {
            match &series.modality {
                modality if modality.is_image() => {
                    let image = self.convert_image(series)?;
                    converted.insert(series.series_uid.clone(), image);
                }
                Modality::RTSTRUCT => {}
                other => warn!(
                    series_uid = %series.series_uid,
                    modality = ?other,
                    "skipping unsupported modality"
                ),
            }
        }

        for series in &self.preprocessed.series {
            if series.modality == Modality::RTSTRUCT {
                self.convert_structure_set(series, &converted, &mut written)?;
            }
        }

        info!(
            images = converted.len(),
            directory = %self.output_directory.display(),
            "conversion complete"
        );
        Ok(())
    }

    fn patient_dir(&self, series: &SeriesEntry) -> PathBuf {
        let patient = sanitize_component(&series.patient_id);
        let patient = if patient.is_empty() {
            "unknown".to_string()
        } else {
            patient
        };
        self.output_directory.join(patient)
    }

    fn convert_image(&self, series: &SeriesEntry) -> Result<ConvertedImage> {
        let mut volume = VolumeLoader::load_from_file_paths(&series.files, SortBy::default())?;
        if series.modality == Modality::PT {
            if let Some(first) = series.files.first() {
                pt::apply_suv(first, &mut volume)?;
            }
        }

        let image_id = image_id(&series.series_uid);
        let patient_dir = self.patient_dir(series);
        let images_dir = patient_dir.join(IMAGES_DIR);
        fs::create_dir_all(&images_dir)?;
        let path = images_dir.join(format!("{image_id}{NIFTI_SUFFIX}"));
        volume.write_nifti(&path)?;
        info!(
            series_uid = %series.series_uid,
            modality = ?series.modality,
            path = %path.display(),
            "converted image"
        );

        Ok(ConvertedImage {
            image_id,
            patient_dir,
            dim: volume.dim(),
            geometry: volume.geometry,
        })
    }

    fn convert_structure_set(
        &self,
        series: &SeriesEntry,
        converted: &HashMap<String, ConvertedImage>,
        written: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        let Some(image) = series
            .referenced_series_uid
            .as_ref()
            .and_then(|uid| converted.get(uid))
        else {
            error!(
                series_uid = %series.series_uid,
                referenced = ?series.referenced_series_uid,
                "referenced image series was not converted, skipping structure set"
            );
            return Ok(());
        };

        let structure_dir = image
            .patient_dir
            .join(STRUCTURES_DIR)
            .join(structure_set_dir_name(&image.image_id));
        fs::create_dir_all(&structure_dir)?;

        for file in &series.files {
            self.write_structures(file, image, &structure_dir, written)?;
        }
        Ok(())
    }

    fn write_structures(
        &self,
        file: &Path,
        image: &ConvertedImage,
        structure_dir: &Path,
        written: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        let object = open_file(file)?;
        let structures = rtstruct::read_structures(&object);
        let names = rtstruct::output_names(&structures);

        for (structure, name) in structures.iter().zip(names) {
            if structure.contours.is_empty() {
                debug!(structure = %structure.name, "structure has no contours");
            }
            let mask = rtstruct::rasterize(structure, &image.geometry, image.dim);
            let path = structure_dir.join(format!("{name}{NIFTI_SUFFIX}"));
            if !written.insert(path.clone()) {
                warn!(
                    structure = %structure.name,
                    path = %path.display(),
                    "structure written by another structure set on this image, overwriting"
                );
            }
            write_mask_nifti(&path, &mask, &image.geometry)?;
            debug!(path = %path.display(), "wrote structure");
        }
        info!(
            structures = structures.len(),
            directory = %structure_dir.display(),
            "converted structure set"
        );
        Ok(())
    }
}

/// Keep a DICOM identifier usable as one path component.
fn sanitize_component(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_id_is_uid_suffix() {
        assert_eq!(
            image_id("1.3.6.1.4.1.14519.5.2.1.5168.2407.163011305453486311316858373"),
            "58373"
        );
        assert_eq!(image_id("1.2"), "12");
        assert_eq!(image_id("12345"), "12345");
    }

    #[test]
    fn image_id_never_starts_with_separator() {
        let id = image_id("1.2.840.113619.2.55.3.604688119.969.1268071029.6789");
        assert_eq!(id, "96789");
        assert!(!id.starts_with('.'));
    }

    #[test]
    fn structure_dir_embeds_image_id_after_separator() {
        let name = structure_set_dir_name("58373");
        assert_eq!(name, "RTSTRUCT_58373");
        assert_eq!(name.split('_').nth(1), Some("58373"));
    }

    #[test]
    fn patient_ids_become_safe_directory_names() {
        assert_eq!(sanitize_component("HNSCC-01-0199"), "HNSCC-01-0199");
        assert_eq!(sanitize_component("a/b c"), "a_b_c");
        assert_eq!(sanitize_component(".."), "");
    }
}
