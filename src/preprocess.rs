//! Scan fetched DICOM files and group them into series ready for conversion.

use crate::enums::Modality;
use crate::error::Result;

use dicom::object::{InMemDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use dicom::core::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Directory (inside the output directory) holding pipeline bookkeeping files
pub const STATE_DIR: &str = ".pipeline";
pub const PREPROCESSED_FILE: &str = "preprocessed.json";

/// One DICOM series found in the working directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub patient_id: String,
    pub study_uid: String,
    pub series_uid: String,
    pub modality: Modality,
    /// Image series an RTSTRUCT was drawn on
    pub referenced_series_uid: Option<String>,
    pub files: Vec<PathBuf>,
}

/// Output of [`PreprocessData::preprocess`], consumed by the convert stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessedResult {
    pub series: Vec<SeriesEntry>,
}

impl PreprocessedResult {
    pub fn find_series(&self, series_uid: &str) -> Option<&SeriesEntry> {
        self.series.iter().find(|entry| entry.series_uid == series_uid)
    }
}

pub struct PreprocessData {
    working_directory: PathBuf,
    output_directory: PathBuf,
}

struct FileRecord {
    patient_id: String,
    study_uid: String,
    series_uid: String,
    modality: Modality,
    referenced_series_uid: Option<String>,
}

impl PreprocessData {
    pub fn new(working_directory: impl Into<PathBuf>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            output_directory: output_directory.into(),
        }
    }

    /// Group every readable DICOM file under the working directory by series.
    ///
    /// The result is also written to `<output>/.pipeline/preprocessed.json`.
    pub fn preprocess(&self) -> Result<PreprocessedResult> {
        let mut grouped: BTreeMap<String, SeriesEntry> = BTreeMap::new();

        for entry in WalkDir::new(&self.working_directory).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(record) = Self::read_record(path) else {
                continue;
            };

            grouped
                .entry(record.series_uid.clone())
                .or_insert_with(|| SeriesEntry {
                    patient_id: record.patient_id,
                    study_uid: record.study_uid,
                    series_uid: record.series_uid,
                    modality: record.modality,
                    referenced_series_uid: record.referenced_series_uid,
                    files: Vec::new(),
                })
                .files
                .push(path.to_path_buf());
        }

        let mut result = PreprocessedResult {
            series: grouped.into_values().collect(),
        };
        for series in &mut result.series {
            series.files.sort();
        }

        info!(
            series = result.series.len(),
            directory = %self.working_directory.display(),
            "preprocessed DICOM data"
        );
        self.persist(&result)?;
        Ok(result)
    }

    fn persist(&self, result: &PreprocessedResult) -> Result<()> {
        let state_dir = self.output_directory.join(STATE_DIR);
        fs::create_dir_all(&state_dir)?;
        let path = state_dir.join(PREPROCESSED_FILE);
        fs::write(&path, serde_json::to_vec_pretty(result)?)?;
        debug!(path = %path.display(), "wrote preprocess summary");
        Ok(())
    }

    fn read_record(path: &Path) -> Option<FileRecord> {
        let object = match OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
        {
            Ok(object) => object,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "not a DICOM file");
                return None;
            }
        };

        let (Some(series_uid), Some(modality)) = (
            read_string(&object, tags::SERIES_INSTANCE_UID),
            read_string(&object, tags::MODALITY),
        ) else {
            warn!(path = %path.display(), "DICOM file without series UID or modality");
            return None;
        };
        let modality = Modality::parse(&modality);

        let referenced_series_uid = if modality == Modality::RTSTRUCT {
            referenced_series_uid(&object)
        } else {
            None
        };

        Some(FileRecord {
            patient_id: read_string(&object, tags::PATIENT_ID).unwrap_or_default(),
            study_uid: read_string(&object, tags::STUDY_INSTANCE_UID).unwrap_or_default(),
            series_uid,
            modality,
            referenced_series_uid,
        })
    }
}

pub(crate) fn read_string(object: &InMemDicomObject, tag: Tag) -> Option<String> {
    let value = object.element(tag).ok()?.to_str().ok()?;
    let value = value.trim_end_matches(['\0', ' ']).trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Referenced Frame of Reference > RT Referenced Study > RT Referenced Series
fn referenced_series_uid(object: &InMemDicomObject) -> Option<String> {
    let frames = object
        .element(tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE)
        .ok()?
        .items()?;
    frames.iter().find_map(|frame| {
        let studies = frame
            .element(tags::RT_REFERENCED_STUDY_SEQUENCE)
            .ok()?
            .items()?;
        studies.iter().find_map(|study| {
            let series = study
                .element(tags::RT_REFERENCED_SERIES_SEQUENCE)
                .ok()?
                .items()?;
            series
                .iter()
                .find_map(|item| read_string(item, tags::SERIES_INSTANCE_UID))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn non_dicom_files_are_ignored() {
        let working = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::write(working.path().join("notes.txt"), b"hello").unwrap();

        let result = PreprocessData::new(working.path(), output.path())
            .preprocess()
            .unwrap();

        assert!(result.series.is_empty());
        assert!(output.path().join(STATE_DIR).join(PREPROCESSED_FILE).is_file());
    }

    #[test]
    fn series_lookup_by_uid() {
        let result = PreprocessedResult {
            series: vec![SeriesEntry {
                patient_id: "P1".into(),
                study_uid: "1.2".into(),
                series_uid: "1.2.3".into(),
                modality: Modality::CT,
                referenced_series_uid: None,
                files: vec![],
            }],
        };
        assert!(result.find_series("1.2.3").is_some());
        assert!(result.find_series("1.2.4").is_none());
    }
}
