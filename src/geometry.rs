//! Spatial placement of a voxel grid in DICOM patient space.
//!
//! DICOM describes positions in LPS millimetres, NIfTI in RAS. All conversions
//! between the two go through [`ImageGeometry`].

/// Placement of a `(depth, height, width)` voxel grid in patient space (LPS, mm).
///
/// Voxel index `(i, j, k)` is column, row and slice.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageGeometry {
    pub origin: [f64; 3],
    /// Direction of increasing column index (first ImageOrientationPatient triplet)
    pub row_direction: [f64; 3],
    /// Direction of increasing row index (second ImageOrientationPatient triplet)
    pub column_direction: [f64; 3],
    pub slice_direction: [f64; 3],
    /// Voxel size along `(i, j, k)`
    pub spacing: [f64; 3],
}

impl ImageGeometry {
    pub fn new(
        origin: [f64; 3],
        row_direction: [f64; 3],
        column_direction: [f64; 3],
        spacing: [f64; 3],
    ) -> Self {
        let row_direction = normalize(row_direction);
        let column_direction = normalize(column_direction);
        Self {
            origin,
            row_direction,
            column_direction,
            slice_direction: normalize(cross(row_direction, column_direction)),
            spacing,
        }
    }

    /// Axis aligned grid at the origin.
    pub fn identity(spacing: [f64; 3]) -> Self {
        Self::new([0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], spacing)
    }

    pub fn index_to_patient(&self, index: [f64; 3]) -> [f64; 3] {
        let mut point = self.origin;
        for (axis, direction) in self.directions().iter().enumerate() {
            let step = index[axis] * self.spacing[axis];
            for (p, d) in point.iter_mut().zip(direction) {
                *p += step * d;
            }
        }
        point
    }

    /// Continuous voxel index of a patient space point.
    pub fn patient_to_index(&self, point: [f64; 3]) -> [f64; 3] {
        let offset = sub(point, self.origin);
        let mut index = [0.0; 3];
        for (axis, direction) in self.directions().iter().enumerate() {
            index[axis] = dot(offset, *direction) / self.spacing[axis];
        }
        index
    }

    /// Rows of the NIfTI sform (RAS), i.e. `srow_x`, `srow_y`, `srow_z`.
    pub fn nifti_affine(&self) -> [[f32; 4]; 3] {
        let directions = self.directions();
        let mut rows = [[0.0f32; 4]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            // LPS -> RAS flips the first two patient axes
            let sign = if r < 2 { -1.0 } else { 1.0 };
            for axis in 0..3 {
                row[axis] = (sign * directions[axis][r] * self.spacing[axis]) as f32;
            }
            row[3] = (sign * self.origin[r]) as f32;
        }
        rows
    }

    /// Inverse of [`ImageGeometry::nifti_affine`].
    pub fn from_nifti_affine(rows: [[f32; 4]; 3]) -> Self {
        let mut origin = [0.0; 3];
        let mut columns = [[0.0f64; 3]; 3];
        for (r, row) in rows.iter().enumerate() {
            let sign = if r < 2 { -1.0 } else { 1.0 };
            origin[r] = sign * row[3] as f64;
            for axis in 0..3 {
                columns[axis][r] = sign * row[axis] as f64;
            }
        }
        let spacing = columns.map(norm);
        let mut geometry = Self::new(origin, columns[0], columns[1], spacing);
        // keep the stored slice axis even for left handed grids
        geometry.slice_direction = normalize(columns[2]);
        geometry
    }

    fn directions(&self) -> [[f64; 3]; 3] {
        [
            self.row_direction,
            self.column_direction,
            self.slice_direction,
        ]
    }
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

fn normalize(a: [f64; 3]) -> [f64; 3] {
    let length = norm(a);
    if length == 0.0 {
        return a;
    }
    a.map(|v| v / length)
}
