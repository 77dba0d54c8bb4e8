use std::path::PathBuf;

use thiserror::Error;

use crate::volume_loader::VolumeLoaderError;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Volume error: {0}")]
    Volume(#[from] VolumeLoaderError),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::error::NiftiError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input directory not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Structure directory name has no '_' separated image id: {0}")]
    MalformedStructureDir(String),

    #[error("Unsupported NIfTI dimensionality: {0}")]
    UnsupportedDimensionality(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}
