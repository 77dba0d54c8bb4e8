//! RT structure sets: contour extraction and rasterisation onto an image grid.

use crate::geometry::ImageGeometry;
use crate::preprocess::read_string;

use dicom::object::InMemDicomObject;
use dicom_dictionary_std::tags;
use ndarray::{Array3, ArrayViewMut2, Axis};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

const CLOSED_PLANAR: &str = "CLOSED_PLANAR";

/// One ROI of a structure set with its planar contours in patient space.
#[derive(Clone, Debug, PartialEq)]
pub struct Structure {
    pub number: i32,
    pub name: String,
    pub contours: Vec<Vec<[f64; 3]>>,
}

/// Read every ROI declared in the structure set, with or without contours.
pub fn read_structures(object: &InMemDicomObject) -> Vec<Structure> {
    let mut structures: BTreeMap<i32, Structure> = BTreeMap::new();

    let rois = object
        .element(tags::STRUCTURE_SET_ROI_SEQUENCE)
        .ok()
        .and_then(|element| element.items());
    for roi in rois.into_iter().flatten() {
        let Some(number) = read_int(roi, tags::ROI_NUMBER) else {
            continue;
        };
        let name = read_string(roi, tags::ROI_NAME).unwrap_or_else(|| format!("ROI_{number}"));
        structures.insert(
            number,
            Structure {
                number,
                name,
                contours: Vec::new(),
            },
        );
    }

    let roi_contours = object
        .element(tags::ROI_CONTOUR_SEQUENCE)
        .ok()
        .and_then(|element| element.items());
    for roi_contour in roi_contours.into_iter().flatten() {
        let Some(number) = read_int(roi_contour, tags::REFERENCED_ROI_NUMBER) else {
            continue;
        };
        let Some(structure) = structures.get_mut(&number) else {
            warn!(roi = number, "contour references undeclared ROI");
            continue;
        };
        let contours = roi_contour
            .element(tags::CONTOUR_SEQUENCE)
            .ok()
            .and_then(|element| element.items());
        for contour in contours.into_iter().flatten() {
            if let Some(points) = read_closed_contour(contour) {
                structure.contours.push(points);
            }
        }
    }

    structures.into_values().collect()
}

fn read_int(object: &InMemDicomObject, tag: dicom::core::Tag) -> Option<i32> {
    object.element(tag).ok()?.to_int::<i32>().ok()
}

fn read_closed_contour(contour: &InMemDicomObject) -> Option<Vec<[f64; 3]>> {
    let geometric_type =
        read_string(contour, tags::CONTOUR_GEOMETRIC_TYPE).unwrap_or_else(|| CLOSED_PLANAR.into());
    if geometric_type != CLOSED_PLANAR {
        debug!(%geometric_type, "ignoring non planar contour");
        return None;
    }
    let data = contour
        .element(tags::CONTOUR_DATA)
        .ok()?
        .to_multi_float64()
        .ok()?;
    let points: Vec<[f64; 3]> = data
        .chunks_exact(3)
        .map(|point| [point[0], point[1], point[2]])
        .collect();
    (points.len() >= 3).then_some(points)
}

/// Burn a structure's contours into a `(depth, height, width)` mask.
///
/// Voxel centres inside an odd number of contours on their slice are set.
pub fn rasterize(
    structure: &Structure,
    geometry: &ImageGeometry,
    dim: (usize, usize, usize),
) -> Array3<u8> {
    let mut mask = Array3::<u8>::zeros(dim);

    for contour in &structure.contours {
        let indices: Vec<[f64; 3]> = contour
            .iter()
            .map(|&point| geometry.patient_to_index(point))
            .collect();
        let k = indices.iter().map(|index| index[2]).sum::<f64>() / indices.len() as f64;
        let k = k.round();
        if k < 0.0 || k >= dim.0 as f64 {
            warn!(
                structure = %structure.name,
                slice = k,
                "contour lies outside the image volume"
            );
            continue;
        }
        let polygon: Vec<(f64, f64)> = indices.iter().map(|index| (index[0], index[1])).collect();
        fill_polygon(mask.index_axis_mut(Axis(0), k as usize), &polygon);
    }

    mask
}

/// Even-odd scanline fill at pixel centres, toggling so that overlapping
/// contours cut holes.
fn fill_polygon(mut slice: ArrayViewMut2<u8>, polygon: &[(f64, f64)]) {
    let (height, width) = slice.dim();
    let mut crossings = Vec::new();

    for row in 0..height {
        let y = row as f64;
        crossings.clear();
        for (n, &(x0, y0)) in polygon.iter().enumerate() {
            let (x1, y1) = polygon[(n + 1) % polygon.len()];
            if (y0 <= y && y1 > y) || (y1 <= y && y0 > y) {
                crossings.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let start = span[0].ceil().max(0.0) as i64;
            let end = span[1].floor().min(width as f64 - 1.0) as i64;
            for column in start..=end {
                slice[[row, column as usize]] ^= 1;
            }
        }
    }
}

/// Make ROI names usable as file names, keeping them unique within a set.
pub fn output_names(structures: &[Structure]) -> Vec<String> {
    let mut seen = HashSet::new();
    structures
        .iter()
        .map(|structure| {
            let mut name = sanitize_name(&structure.name);
            if name.is_empty() {
                name = format!("ROI_{}", structure.number);
            }
            if !seen.insert(name.clone()) {
                name = format!("{name}_{}", structure.number);
                seen.insert(name.clone());
            }
            name
        })
        .collect()
}

fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}
