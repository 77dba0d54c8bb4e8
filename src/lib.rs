//! # DICOM pipeline library
//!
//! This crate fetches DICOM studies, converts them to NIfTI and renders PNG
//! previews so the conversion can be checked by eye.
//!
//! It builds on the dicom-rs ecosystem for reading DICOM files and on the
//! `nifti` crate for writing volumes. A run goes through three stages that
//! only communicate through the filesystem:
//!  - Fetch: an [`InputSource`] places DICOM files in a working directory
//!  - Preprocess: files are grouped into series
//!  - Convert: image series become `images/<id>.nii.gz`, RT structure sets
//!    become one mask per structure in `structures/RTSTRUCT_<id>/`
//!
//! The output tree can then be visualised. Images and structure sets are
//! discovered by path pattern, so any tree with the same layout works:
//!
//! ```text
//! <output>/<patient>/images/<id>.nii.gz
//! <output>/<patient>/images/<id>.png
//! <output>/<patient>/structures/RTSTRUCT_<id>/<structure>.nii.gz
//! <output>/<patient>/structures/RTSTRUCT_<id>.png
//! ```
//!
//! Everything runs on the calling thread with blocking I/O.
//!
//! # Examples
//!
//! ## Converting and visualising data on disk
//!
//! ```no_run
//! # use dicom_pipeline::{FilesystemInput, VisualiseData, run};
//! # use std::path::Path;
//! let mut input = FilesystemInput::new("dicom");
//! run(&mut input, Path::new("output")).expect("should have converted the study");
//!
//! let report = VisualiseData::new("output")
//!     .visualise()
//!     .expect("should have rendered the output tree");
//! println!("{} images rendered", report.images.len());
//! ```
//!
//! ## Loading a DICOM series as a volume
//!
//! ```no_run
//! # use dicom_pipeline::{VolumeLoader, Orientation, Interpolation, SortBy};
//! # use std::path::PathBuf;
//! let volume = VolumeLoader::load_from_directory(&PathBuf::from("dicom"), SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//! let image = volume
//!     .get_image_from_axis(
//!         volume.dim().2 / 2,
//!         Orientation::Sagittal,
//!         Interpolation::Linear,
//!         volume.intensity_window(),
//!     )
//!     .expect("should have returned image at center of volume");
//! image.save("result.png").expect("should have saved the slice");
//! ```

pub mod config;
pub mod convert;
pub mod enums;
pub mod error;
pub mod geometry;
pub mod input;
mod interpolator;
pub mod logging;
pub mod pipeline;
pub mod preprocess;
pub mod visualise;
pub mod volume;
pub mod volume_loader;

pub use config::{PipelineConfig, VisualiseConfig};
pub use convert::ConvertData;
pub use enums::{Interpolation, Modality, Orientation, SortBy};
pub use error::{PipelineError, Result};
pub use input::{FilesystemInput, InputSource, TestInput, WebInput};
pub use pipeline::{run, run_test, run_with_config};
pub use preprocess::{PreprocessData, PreprocessedResult};
pub use visualise::{VisualiseData, VisualiseReport};
pub use volume::Volume;
pub use volume_loader::VolumeLoader;
