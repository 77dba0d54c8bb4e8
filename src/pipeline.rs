//! Fetch → preprocess → convert, with optional visualisation.
//!
//! Stages talk to each other through the filesystem only. Any error aborts
//! the run; nothing is retried.

use crate::config::PipelineConfig;
use crate::convert::ConvertData;
use crate::error::Result;
use crate::input::{InputSource, TestInput};
use crate::preprocess::PreprocessData;
use crate::visualise::VisualiseData;

use std::fs;
use std::path::Path;
use tracing::info;

pub const WORKING_DIR: &str = "working";
pub const OUTPUT_DIR: &str = "output";

/// Fetch the input, then preprocess and convert it into `output_directory`.
pub fn run<I: InputSource + ?Sized>(input: &mut I, output_directory: &Path) -> Result<()> {
    input.fetch_data()?;

    let preprocessed =
        PreprocessData::new(input.working_directory(), output_directory).preprocess()?;
    ConvertData::new(preprocessed, output_directory).convert()?;

    info!(directory = %output_directory.display(), "pipeline run complete");
    Ok(())
}

/// [`run`], followed by rendering the output tree when enabled.
pub fn run_with_config<I: InputSource + ?Sized>(
    input: &mut I,
    config: &PipelineConfig,
) -> Result<()> {
    run(input, config.output_directory())?;

    if config.visualise() {
        VisualiseData::new(config.output_directory())
            .with_config(config.visualise_config().clone())
            .visualise()?;
    }
    Ok(())
}

/// Run against the public test dataset, under `directory/working` and
/// `directory/output`. Existing directories are reused.
pub fn run_test(directory: &Path) -> Result<()> {
    let working = directory.join(WORKING_DIR);
    let output = directory.join(OUTPUT_DIR);
    fs::create_dir_all(&working)?;
    fs::create_dir_all(&output)?;

    let mut input = TestInput::new(working);
    run(&mut input, &output)
}
