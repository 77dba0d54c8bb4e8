use crate::enums::{Interpolation, Orientation};
use crate::error::Result;
use crate::volume::Volume;

use image::{DynamicImage, Rgb, RgbImage, imageops, imageops::FilterType};
use ndarray::Array2;
use std::path::Path;
use tracing::warn;

/// Outline colours, cycled per structure
const PALETTE: [[u8; 3]; 8] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
];

/// A named binary mask drawn as an outline over its image.
pub struct Contour {
    pub name: String,
    pub mask: Volume,
}

/// Rendered visualisation, ready to be saved.
#[derive(Clone, Debug)]
pub struct Figure {
    canvas: RgbImage,
}

impl Figure {
    pub fn new(canvas: RgbImage) -> Self {
        Self { canvas }
    }

    pub fn canvas(&self) -> &RgbImage {
        &self.canvas
    }

    /// Save as PNG, upsampled by an integer `scale`.
    pub fn save(&self, path: &Path, scale: u32) -> Result<()> {
        if scale > 1 {
            let (width, height) = self.canvas.dimensions();
            imageops::resize(&self.canvas, width * scale, height * scale, FilterType::Nearest)
                .save(path)?;
        } else {
            self.canvas.save(path)?;
        }
        Ok(())
    }
}

/// Turns an image (and optional contours) into a [`Figure`].
pub trait Renderer {
    fn render(&self, image: &Volume, contours: &[Contour]) -> Result<Figure>;
}

/// Axial, coronal and sagittal cuts side by side.
///
/// The cuts go through the centre of the volume, or through the centre of
/// mass of the contours when there are any.
#[derive(Clone, Copy, Debug)]
pub struct OrthoRenderer {
    pub interpolation: Interpolation,
}

impl Default for OrthoRenderer {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Linear,
        }
    }
}

impl Renderer for OrthoRenderer {
    fn render(&self, image: &Volume, contours: &[Contour]) -> Result<Figure> {
        let window = image.intensity_window();
        let cut = Self::cut_point(image, contours);

        let contours: Vec<&Contour> = contours
            .iter()
            .filter(|contour| {
                let matches = contour.mask.dim() == image.dim();
                if !matches {
                    warn!(
                        structure = %contour.name,
                        "mask grid differs from image grid, not drawn"
                    );
                }
                matches
            })
            .collect();

        let mut panels = Vec::with_capacity(Orientation::ALL.len());
        for orientation in Orientation::ALL {
            let index = match orientation {
                Orientation::Axial => cut.0,
                Orientation::Coronal => cut.1,
                Orientation::Sagittal => cut.2,
            };
            let Some(gray) =
                image.get_image_from_axis(index, orientation, self.interpolation, window)
            else {
                continue;
            };
            let mut panel = DynamicImage::ImageLuma8(gray).into_rgb8();
            for (n, contour) in contours.iter().enumerate() {
                if let Some(mask) =
                    contour
                        .mask
                        .get_display_slice(index, orientation, Interpolation::Nearest)
                {
                    Self::draw_outline(&mut panel, &mask, PALETTE[n % PALETTE.len()]);
                }
            }
            panels.push(panel);
        }

        Ok(Figure::new(Self::compose(&panels)))
    }
}

impl OrthoRenderer {
    fn cut_point(image: &Volume, contours: &[Contour]) -> (usize, usize, usize) {
        let centres: Vec<_> = contours
            .iter()
            .filter_map(|contour| contour.mask.center_of_mass())
            .collect();
        if centres.is_empty() {
            return image.center();
        }
        let n = centres.len();
        let mean = |axis: fn(&(usize, usize, usize)) -> usize| {
            centres.iter().map(axis).sum::<usize>() / n
        };
        let (depth, height, width) = image.dim();
        (
            mean(|c| c.0).min(depth.saturating_sub(1)),
            mean(|c| c.1).min(height.saturating_sub(1)),
            mean(|c| c.2).min(width.saturating_sub(1)),
        )
    }

    fn draw_outline(panel: &mut RgbImage, mask: &Array2<f32>, colour: [u8; 3]) {
        let (height, width) = mask.dim();
        let inside = |y: isize, x: isize| {
            y >= 0
                && x >= 0
                && (y as usize) < height
                && (x as usize) < width
                && mask[[y as usize, x as usize]] > 0.5
        };
        for y in 0..height as isize {
            for x in 0..width as isize {
                if !inside(y, x) {
                    continue;
                }
                let edge = [(-1, 0), (1, 0), (0, -1), (0, 1)]
                    .iter()
                    .any(|(dy, dx)| !inside(y + dy, x + dx));
                if edge && (x as u32) < panel.width() && (y as u32) < panel.height() {
                    panel.put_pixel(x as u32, y as u32, Rgb(colour));
                }
            }
        }
    }

    fn compose(panels: &[RgbImage]) -> RgbImage {
        let width = panels.iter().map(RgbImage::width).sum::<u32>().max(1);
        let height = panels.iter().map(RgbImage::height).max().unwrap_or(1).max(1);
        let mut canvas = RgbImage::new(width, height);
        let mut offset = 0i64;
        for panel in panels {
            imageops::replace(&mut canvas, panel, offset, 0);
            offset += i64::from(panel.width());
        }
        canvas
    }
}
