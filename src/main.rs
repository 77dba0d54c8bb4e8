use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dicom_pipeline::{
    FilesystemInput, InputSource, PipelineConfig, VisualiseConfig, VisualiseData, WebInput,
    logging::{self, LogConfig},
    run_test, run_with_config,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "dicom-pipeline")]
#[command(about = "Fetch DICOM studies, convert them to NIfTI and render visual checks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, preprocess and convert a study
    Run {
        #[command(flatten)]
        source: Source,
        /// Directory receiving the NIfTI tree
        #[arg(short, long, env = "DICOM_PIPELINE_OUTPUT", default_value = ".")]
        output: PathBuf,
        /// Working directory for downloaded data (with --url)
        #[arg(long, env = "DICOM_PIPELINE_WORKING", default_value = "working")]
        working: PathBuf,
        /// Render PNG previews after converting
        #[arg(long, env = "DICOM_PIPELINE_VISUALISE")]
        visualise: bool,
        /// Integer upsampling of the rendered previews
        #[arg(long, env = "DICOM_PIPELINE_SCALE", default_value_t = 1)]
        scale: u32,
    },
    /// Run the pipeline on the public HNSCC test dataset
    Test {
        /// Directory holding working/ and output/
        #[arg(long, env = "DICOM_PIPELINE_TEST_DIR", default_value = "./testdata")]
        directory: PathBuf,
    },
    /// Render PNG previews for an existing output tree
    Visualise {
        /// Output directory of a previous run
        output: PathBuf,
        /// Integer upsampling of the rendered previews
        #[arg(long, env = "DICOM_PIPELINE_SCALE", default_value_t = 1)]
        scale: u32,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// Directory of DICOM files already on disk
    #[arg(short, long, env = "DICOM_PIPELINE_INPUT")]
    input: Option<PathBuf>,
    /// URL of a zip archive of DICOM files
    #[arg(long, env = "DICOM_PIPELINE_URL")]
    url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            output,
            working,
            visualise,
            scale,
        } => {
            logging::init(&LogConfig::default())?;
            let config = PipelineConfig::new(output, visualise, VisualiseConfig::new(scale)?)?;
            let mut input: Box<dyn InputSource> = match (source.input, source.url) {
                (Some(directory), _) => Box::new(FilesystemInput::new(directory)),
                (None, Some(url)) => Box::new(WebInput::new(url, working)),
                (None, None) => anyhow::bail!("either --input or --url is required"),
            };
            run_with_config(input.as_mut(), &config).context("pipeline run failed")?;
        }
        Commands::Test { directory } => {
            logging::init(&LogConfig::test_run())?;
            run_test(&directory).context("test run failed")?;
        }
        Commands::Visualise { output, scale } => {
            logging::init(&LogConfig::default())?;
            let report = VisualiseData::new(&output)
                .with_config(VisualiseConfig::new(scale)?)
                .visualise()
                .with_context(|| format!("failed to visualise {}", output.display()))?;
            info!(
                missing_images = report.missing_images.len(),
                empty_structure_sets = report.empty_structure_sets.len(),
                "skipped structure sets"
            );
        }
    }

    Ok(())
}
