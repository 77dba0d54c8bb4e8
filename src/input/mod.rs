//! Sources that place DICOM data into a working directory.

mod web;

pub use web::{TEST_DATA_URL, TestInput, WebInput};

use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Anything able to populate a working directory with DICOM files.
pub trait InputSource {
    /// Directory the fetched data lands in
    fn working_directory(&self) -> &Path;

    /// Retrieve the data. Called once per pipeline run.
    fn fetch_data(&mut self) -> Result<()>;
}

/// DICOM data that already lives on the local filesystem.
#[derive(Clone, Debug)]
pub struct FilesystemInput {
    working_directory: PathBuf,
}

impl FilesystemInput {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
        }
    }
}

impl InputSource for FilesystemInput {
    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn fetch_data(&mut self) -> Result<()> {
        if !self.working_directory.is_dir() {
            return Err(PipelineError::InputNotFound(self.working_directory.clone()));
        }
        debug!(directory = %self.working_directory.display(), "using data on disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn filesystem_input_requires_existing_directory() {
        let dir = tempdir().unwrap();
        let mut present = FilesystemInput::new(dir.path());
        assert!(present.fetch_data().is_ok());

        let mut missing = FilesystemInput::new(dir.path().join("nope"));
        assert!(matches!(
            missing.fetch_data(),
            Err(PipelineError::InputNotFound(_))
        ));
    }
}
