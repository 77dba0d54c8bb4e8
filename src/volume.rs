use crate::enums::Interpolation;
use crate::enums::Orientation;
use crate::error::{PipelineError, Result};
use crate::geometry::ImageGeometry;
use crate::interpolator::Interpolator;

use image::ImageBuffer;
use image::Luma;
use ndarray::Array2;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::Ix3;
use ndarray::s;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions, writer::WriterOptions};
use std::path::Path;

/// Upper bound of voxels inspected when estimating the display window
const WINDOW_SAMPLES: usize = 200_000;

/// NIFTI_UNITS_MM
const UNITS_MM: u8 = 2;

/// Scalar volume stored as `(depth, height, width)`, i.e. `(k, j, i)`.
pub struct Volume {
    pub data: Array3<f32>,
    pub geometry: ImageGeometry,
    pub interpolated_dim: (u32, u32, u32),
}

impl Volume {
    pub fn new(data: Array3<f32>, geometry: ImageGeometry) -> Self {
        Self {
            interpolated_dim: Interpolator::get_isotropic_dimensions(geometry.spacing, data.dim()),
            data,
            geometry,
        }
    }

    /// Read a `.nii` or `.nii.gz` file. 4-D files yield their first volume.
    pub fn from_nifti(path: &Path) -> Result<Self> {
        let object = ReaderOptions::new().read_file(path)?;
        let geometry = geometry_from_header(object.header());
        let data = object.into_volume().into_ndarray::<f32>()?;
        let data = match data.ndim() {
            3 => data.into_dimensionality::<Ix3>()?,
            4 => data.index_axis_move(Axis(3), 0).into_dimensionality::<Ix3>()?,
            n => return Err(PipelineError::UnsupportedDimensionality(n)),
        };
        // NIfTI arrays are (x, y, z)
        let data = data.reversed_axes().as_standard_layout().into_owned();
        Ok(Self::new(data, geometry))
    }

    /// Write the volume as NIfTI, gzip compressed when `path` ends in `.gz`.
    pub fn write_nifti(&self, path: &Path) -> Result<()> {
        let header = header_for(&self.geometry);
        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(&self.data.view().reversed_axes())?;
        Ok(())
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get the voxel spacing along (x, y, z)
    pub fn spacing(&self) -> (f32, f32, f32) {
        let [x, y, z] = self.geometry.spacing;
        (x as f32, y as f32, z as f32)
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    #[inline]
    pub(crate) fn normalize_to_u8(value: f32, window: (f32, f32)) -> u8 {
        let (low, high) = window;
        if high <= low {
            return if value > low { 255 } else { 0 };
        }
        (((value - low) / (high - low)) * 255.0).clamp(0.0, 255.0) as u8
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: &Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice_result = match orientation {
            Orientation::Axial => self.data().slice(s![index, .., ..]),
            Orientation::Coronal => self.data().slice(s![.., index, ..]),
            Orientation::Sagittal => self.data().slice(s![.., .., index]),
        };
        Some(slice_result)
    }

    fn get_output_dimensions(&self, orientation: &Orientation) -> (u32, u32) {
        // Always return (width, height) - standard image convention
        match orientation {
            Orientation::Axial => {
                // Looking down Z-axis: X is width, Y is height
                (self.interpolated_dim.2, self.interpolated_dim.1)
            }
            Orientation::Coronal => {
                // Looking down Y-axis: X is width, Z is height
                (self.interpolated_dim.2, self.interpolated_dim.0)
            }
            Orientation::Sagittal => {
                // Looking down X-axis: Y is width, Z is height
                (self.interpolated_dim.1, self.interpolated_dim.0)
            }
        }
    }

    /// Slice prepared for display: resampled to isotropic aspect and, for
    /// coronal and sagittal cuts, with the last slice on the top row.
    pub fn get_display_slice(
        &self,
        index: usize,
        orientation: Orientation,
        interpolation: Interpolation,
    ) -> Option<Array2<f32>> {
        let slice = self.get_slice_from_axis(index, &orientation)?;
        let slice = match orientation {
            Orientation::Axial => slice,
            Orientation::Coronal | Orientation::Sagittal => slice.slice_move(s![..;-1, ..]),
        };

        let sample: fn(&ArrayView2<f32>, f32, f32) -> f32 = match interpolation {
            // Axial doesn't need interpolation (already isotropic in-plane)
            _ if matches!(orientation, Orientation::Axial) => return Some(slice.to_owned()),
            Interpolation::None => return Some(slice.to_owned()),
            Interpolation::Linear => Interpolator::bilinear_interpolate,
            Interpolation::Nearest => Interpolator::nearest_interpolate,
        };
        let (width, height) = self.get_output_dimensions(&orientation);
        Some(Self::interpolate_slice(&slice, width, height, sample))
    }

    /// Grayscale rendering of one cut through the volume.
    pub fn get_image_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        interpolation: Interpolation,
        window: (f32, f32),
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let slice = self.get_display_slice(index, orientation, interpolation)?;
        Self::slice_to_image(&slice.view(), window)
    }

    // Extract slice to image conversion
    fn slice_to_image(
        slice: &ArrayView2<'_, f32>,
        window: (f32, f32),
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .iter()
            .map(|&v| Self::normalize_to_u8(v, window))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    fn interpolate_slice(
        slice: &ArrayView2<'_, f32>,
        width: u32,
        height: u32,
        sample: fn(&ArrayView2<f32>, f32, f32) -> f32,
    ) -> Array2<f32> {
        let (slice_height, slice_width) = slice.dim();

        Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            // Normalized coordinates with half-pixel offset
            let norm_x = (x as f32 + 0.5) / width as f32;
            let norm_y = (y as f32 + 0.5) / height as f32;

            // Convert back to source coordinates
            let src_x = norm_x * slice_width as f32 - 0.5;
            let src_y = norm_y * slice_height as f32 - 0.5;

            // Clamp to valid range
            let src_x = src_x.max(0.0).min((slice_width - 1) as f32);
            let src_y = src_y.max(0.0).min((slice_height - 1) as f32);

            sample(slice, src_y, src_x)
        })
    }

    fn is_valid_index(&self, index: usize, orientation: &Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }

    /// Display window spanning the 1st to 99th intensity percentile.
    pub fn intensity_window(&self) -> (f32, f32) {
        let step = (self.data.len() / WINDOW_SAMPLES).max(1);
        let mut values: Vec<f32> = self
            .data
            .iter()
            .step_by(step)
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return (0.0, 1.0);
        }
        values.sort_by(f32::total_cmp);
        let at = |q: f32| values[((values.len() - 1) as f32 * q).round() as usize];
        (at(0.01), at(0.99))
    }

    /// Mean `(k, j, i)` index of voxels above one half, if there are any.
    pub fn center_of_mass(&self) -> Option<(usize, usize, usize)> {
        let mut sum = (0.0f64, 0.0f64, 0.0f64);
        let mut count = 0usize;
        for ((k, j, i), &value) in self.data.indexed_iter() {
            if value > 0.5 {
                sum.0 += k as f64;
                sum.1 += j as f64;
                sum.2 += i as f64;
                count += 1;
            }
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some((
            (sum.0 / n).round() as usize,
            (sum.1 / n).round() as usize,
            (sum.2 / n).round() as usize,
        ))
    }

    pub fn center(&self) -> (usize, usize, usize) {
        let (depth, height, width) = self.dim();
        (depth / 2, height / 2, width / 2)
    }
}

/// Write a binary mask on the grid described by `geometry`.
pub(crate) fn write_mask_nifti(
    path: &Path,
    mask: &Array3<u8>,
    geometry: &ImageGeometry,
) -> Result<()> {
    let header = header_for(geometry);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&mask.view().reversed_axes())?;
    Ok(())
}

fn header_for(geometry: &ImageGeometry) -> NiftiHeader {
    let [sx, sy, sz] = geometry.spacing;
    let [srow_x, srow_y, srow_z] = geometry.nifti_affine();
    let mut header = NiftiHeader::default();
    header.pixdim = [1.0, sx as f32, sy as f32, sz as f32, 1.0, 1.0, 1.0, 1.0];
    header.xyzt_units = UNITS_MM;
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header.qform_code = 0;
    header.sform_code = 1;
    header.srow_x = srow_x;
    header.srow_y = srow_y;
    header.srow_z = srow_z;
    header
}

fn geometry_from_header(header: &NiftiHeader) -> ImageGeometry {
    if header.sform_code > 0 {
        return ImageGeometry::from_nifti_affine([header.srow_x, header.srow_y, header.srow_z]);
    }
    let spacing = [1, 2, 3].map(|axis| {
        let value = header.pixdim[axis].abs() as f64;
        if value > 0.0 { value } else { 1.0 }
    });
    ImageGeometry::identity(spacing)
}
