//! Render PNG previews next to the converted NIfTI files.
//!
//! There is no index of the output tree: images are found as
//! `**/images/*.nii.gz` and structure sets as `**/structures/*`. A structure
//! directory is linked to its image through the id after the first `_` in its
//! name (`RTSTRUCT_58373` → `images/*58373*.nii.gz`).

mod figure;

pub use figure::{Contour, Figure, OrthoRenderer, Renderer};

use crate::config::VisualiseConfig;
use crate::convert::{IMAGES_DIR, NIFTI_SUFFIX, STRUCTURES_DIR};
use crate::error::{PipelineError, Result};
use crate::volume::Volume;

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

/// What a visualisation run produced and skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisualiseReport {
    /// PNGs written for images
    pub images: Vec<PathBuf>,
    /// PNGs written for structure sets
    pub structure_sets: Vec<PathBuf>,
    /// Linkage keys with no matching image
    pub missing_images: Vec<String>,
    /// Structure directories without any mask
    pub empty_structure_sets: Vec<PathBuf>,
}

pub struct VisualiseData<R = OrthoRenderer> {
    output_directory: PathBuf,
    renderer: R,
    config: VisualiseConfig,
}

impl VisualiseData<OrthoRenderer> {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self::with_renderer(output_directory, OrthoRenderer::default())
    }
}

impl<R: Renderer> VisualiseData<R> {
    pub fn with_renderer(output_directory: impl Into<PathBuf>, renderer: R) -> Self {
        Self {
            output_directory: output_directory.into(),
            renderer,
            config: VisualiseConfig::default(),
        }
    }

    pub fn with_config(mut self, config: VisualiseConfig) -> Self {
        self.config = config;
        self
    }

    /// Render every image, then every structure set over its linked image.
    ///
    /// # Errors
    ///
    /// Unreadable files and structure directories whose name carries no
    /// image id abort the run. Structure sets without a linked image or
    /// without masks are logged and skipped.
    pub fn visualise(&self) -> Result<VisualiseReport> {
        let mut report = VisualiseReport::default();
        self.visualise_images(&mut report)?;
        self.visualise_structures(&mut report)?;
        info!(
            images = report.images.len(),
            structure_sets = report.structure_sets.len(),
            "visualisation complete"
        );
        Ok(report)
    }

    fn visualise_images(&self, report: &mut VisualiseReport) -> Result<()> {
        for img_filename in image_files(&self.output_directory) {
            let img_filename = img_filename?;
            let image = Volume::from_nifti(&img_filename)?;
            let figure = self.renderer.render(&image, &[])?;

            // save image alongside nifti
            let vis_filename = png_path_for(&img_filename);
            figure.save(&vis_filename, self.config.scale())?;
            debug!("created visualisation {}", vis_filename.display());
            report.images.push(vis_filename);
        }
        Ok(())
    }

    fn visualise_structures(&self, report: &mut VisualiseReport) -> Result<()> {
        for struct_dir in structure_entries(&self.output_directory) {
            let struct_dir = struct_dir?;

            // Make sure this is a structure directory
            if !struct_dir.is_dir() {
                continue;
            }

            let dir_name = file_name(&struct_dir);
            let img_id = linkage_key(&dir_name)?;

            let Some(img_file) = find_linked_image(&struct_dir, img_id)? else {
                error!("Linked image {} not found", img_id);
                report.missing_images.push(img_id.to_string());
                continue;
            };

            let image = Volume::from_nifti(&img_file)?;
            let masks = load_masks(&struct_dir)?;

            if masks.is_empty() {
                warn!(
                    "No contours found in structure directory: {}",
                    struct_dir.display()
                );
                report.empty_structure_sets.push(struct_dir);
                continue;
            }

            let figure = self.renderer.render(&image, &masks)?;

            // save next to the structure directory, named after it
            let vis_filename = structure_png_path(&struct_dir, &dir_name);
            figure.save(&vis_filename, self.config.scale())?;
            debug!("created visualisation {}", vis_filename.display());
            report.structure_sets.push(vis_filename);
        }
        Ok(())
    }
}

/// Lazily yield `**/images/*.nii.gz` under `root`.
pub fn image_files(root: &Path) -> impl Iterator<Item = Result<PathBuf>> {
    children_of(root, IMAGES_DIR).filter_map(|entry| match entry {
        Ok(entry) if !entry.file_type().is_dir() && is_nifti(entry.path()) => {
            Some(Ok(entry.into_path()))
        }
        Ok(_) => None,
        Err(e) => Some(Err(e)),
    })
}

/// Lazily yield `**/structures/*` under `root`, files included.
pub fn structure_entries(root: &Path) -> impl Iterator<Item = Result<PathBuf>> {
    children_of(root, STRUCTURES_DIR).map(|entry| entry.map(DirEntry::into_path))
}

/// Entries directly inside any non hidden directory called `parent_name`.
fn children_of(root: &Path, parent_name: &'static str) -> impl Iterator<Item = Result<DirEntry>> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(move |entry| match entry {
            Ok(entry) => {
                let in_parent = entry
                    .path()
                    .parent()
                    .and_then(Path::file_name)
                    .is_some_and(|name| name == parent_name);
                in_parent.then_some(Ok(entry))
            }
            Err(e) => Some(Err(PipelineError::from(e))),
        })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_nifti(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(NIFTI_SUFFIX))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `images/58373.nii.gz` → `images/58373.png`
pub fn png_path_for(image_path: &Path) -> PathBuf {
    let name = file_name(image_path);
    let stem = name.strip_suffix(NIFTI_SUFFIX).unwrap_or(&name);
    image_path.with_file_name(format!("{stem}.png"))
}

/// `structures/RTSTRUCT_58373` → `structures/RTSTRUCT_58373.png`
pub fn structure_png_path(struct_dir: &Path, dir_name: &str) -> PathBuf {
    struct_dir
        .parent()
        .unwrap_or(struct_dir)
        .join(format!("{dir_name}.png"))
}

/// Image id encoded after the first `_` of a structure directory name.
pub fn linkage_key(dir_name: &str) -> Result<&str> {
    dir_name
        .split('_')
        .nth(1)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| PipelineError::MalformedStructureDir(dir_name.to_string()))
}

/// First image (lexicographic) in the sibling `images/` directory whose name
/// contains `key`.
pub fn find_linked_image(struct_dir: &Path, key: &str) -> Result<Option<PathBuf>> {
    let Some(images_dir) = struct_dir
        .parent()
        .and_then(Path::parent)
        .map(|patient_dir| patient_dir.join(IMAGES_DIR))
    else {
        return Ok(None);
    };
    if !images_dir.is_dir() {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(&images_dir)? {
        let path = entry?.path();
        let name = file_name(&path);
        if !name.starts_with('.') && name.contains(key) && is_nifti(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();

    if candidates.len() > 1 {
        debug!(
            key,
            candidates = candidates.len(),
            "several linked images, using the first"
        );
    }
    Ok(candidates.into_iter().next())
}

/// Every `*.nii.gz` directly inside a structure directory, named by file stem.
fn load_masks(struct_dir: &Path) -> Result<Vec<Contour>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(struct_dir)? {
        let path = entry?.path();
        if !file_name(&path).starts_with('.') && is_nifti(&path) && !path.is_dir() {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let name = file_name(&path);
            let name = name.strip_suffix(NIFTI_SUFFIX).unwrap_or(&name).to_string();
            Ok(Contour {
                name,
                mask: Volume::from_nifti(&path)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn linkage_key_is_second_underscore_component() {
        assert_eq!(linkage_key("RTSTRUCT_58373").unwrap(), "58373");
        assert_eq!(linkage_key("RTSTRUCT_58373_extra").unwrap(), "58373");
        assert!(matches!(
            linkage_key("RTSTRUCT58373"),
            Err(PipelineError::MalformedStructureDir(_))
        ));
        assert!(linkage_key("RTSTRUCT_").is_err());
    }

    #[test]
    fn png_paths_follow_the_naming_rules() {
        assert_eq!(
            png_path_for(Path::new("out/p/images/58373.nii.gz")),
            PathBuf::from("out/p/images/58373.png")
        );
        assert_eq!(
            structure_png_path(Path::new("out/p/structures/RTSTRUCT_58373"), "RTSTRUCT_58373"),
            PathBuf::from("out/p/structures/RTSTRUCT_58373.png")
        );
    }

    #[test]
    fn linked_image_is_first_lexicographic_match() {
        let root = tempdir().unwrap();
        let images = root.path().join("p").join(IMAGES_DIR);
        let structures = root.path().join("p").join(STRUCTURES_DIR).join("RTSTRUCT_123");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&structures).unwrap();
        for name in ["b_123.nii.gz", "a_123.nii.gz", "a_123.png", "999.nii.gz"] {
            fs::write(images.join(name), b"").unwrap();
        }

        let linked = find_linked_image(&structures, "123").unwrap();
        assert_eq!(linked, Some(images.join("a_123.nii.gz")));
        assert_eq!(find_linked_image(&structures, "555").unwrap(), None);
    }

    #[test]
    fn discovery_matches_direct_children_only() {
        let root = tempdir().unwrap();
        let images = root.path().join("p").join(IMAGES_DIR);
        let nested = images.join("nested");
        let structures = root.path().join("p").join(STRUCTURES_DIR);
        let hidden = root.path().join(".pipeline").join(IMAGES_DIR);
        for dir in [&nested, &structures.join("RTSTRUCT_1"), &hidden] {
            fs::create_dir_all(dir).unwrap();
        }
        fs::write(images.join("1.nii.gz"), b"").unwrap();
        fs::write(images.join("1.png"), b"").unwrap();
        fs::write(nested.join("2.nii.gz"), b"").unwrap();
        fs::write(hidden.join("3.nii.gz"), b"").unwrap();
        fs::write(structures.join("RTSTRUCT_1.png"), b"").unwrap();

        let found: Vec<_> = image_files(root.path()).map(Result::unwrap).collect();
        assert_eq!(found, vec![images.join("1.nii.gz")]);

        let entries: Vec<_> = structure_entries(root.path()).map(Result::unwrap).collect();
        assert_eq!(entries, vec![
            structures.join("RTSTRUCT_1"),
            structures.join("RTSTRUCT_1.png"),
        ]);
    }
}
