//! Runtime configuration, resolved once at startup and passed into the stages.

use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};

/// Settings for the visualisation stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisualiseConfig {
    /// Integer upsampling applied when saving figures
    scale: u32,
}

impl VisualiseConfig {
    pub fn new(scale: u32) -> Result<Self> {
        if scale == 0 {
            return Err(PipelineError::InvalidConfig(
                "figure scale must be at least 1".into(),
            ));
        }
        Ok(Self { scale })
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }
}

impl Default for VisualiseConfig {
    fn default() -> Self {
        Self { scale: 1 }
    }
}

/// Settings for a whole pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    output_directory: PathBuf,
    visualise: bool,
    visualise_config: VisualiseConfig,
}

impl PipelineConfig {
    pub fn new(
        output_directory: PathBuf,
        visualise: bool,
        visualise_config: VisualiseConfig,
    ) -> Result<Self> {
        if output_directory.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "output directory cannot be empty".into(),
            ));
        }
        Ok(Self {
            output_directory,
            visualise,
            visualise_config,
        })
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn visualise(&self) -> bool {
        self.visualise
    }

    pub fn visualise_config(&self) -> &VisualiseConfig {
        &self.visualise_config
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            visualise: false,
            visualise_config: VisualiseConfig::default(),
        }
    }
}
