pub mod nifti_io;
pub mod resample;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModalityTag {
    #[serde(rename = "CT")]
    Ct,
    #[serde(rename = "PT")]
    Pet,
}

impl ModalityTag {
    /// Maps a DICOM (0008,0060) modality code. `None` for codes the pipeline ignores.
    pub fn from_dicom(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "CT" => Some(Self::Ct),
            "PT" | "PET" => Some(Self::Pet),
            _ => None,
        }
    }

    /// Output subfolder for converted volumes of this modality.
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Ct => "CT",
            Self::Pet => "PT",
        }
    }
}

/// Voxel-to-world transform in mm, stored as the top three rows of a 4x4 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub rows: [[f64; 4]; 3],
}

impl Affine {
    pub fn from_spacing(spacing: [f32; 3]) -> Self {
        let [sx, sy, sz] = spacing.map(f64::from);
        Self {
            rows: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
            ],
        }
    }

    pub fn apply(&self, ijk: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (r, row) in self.rows.iter().enumerate() {
            out[r] = row[0] * ijk[0] + row[1] * ijk[1] + row[2] * ijk[2] + row[3];
        }
        out
    }

    /// `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let m = |r: usize, c: usize| self.rows[r][c];
        let det = m(0, 0) * (m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1))
            - m(0, 1) * (m(1, 0) * m(2, 2) - m(1, 2) * m(2, 0))
            + m(0, 2) * (m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0));
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let mut lin = [[0.0; 3]; 3];
        lin[0][0] = (m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1)) * inv_det;
        lin[0][1] = (m(0, 2) * m(2, 1) - m(0, 1) * m(2, 2)) * inv_det;
        lin[0][2] = (m(0, 1) * m(1, 2) - m(0, 2) * m(1, 1)) * inv_det;
        lin[1][0] = (m(1, 2) * m(2, 0) - m(1, 0) * m(2, 2)) * inv_det;
        lin[1][1] = (m(0, 0) * m(2, 2) - m(0, 2) * m(2, 0)) * inv_det;
        lin[1][2] = (m(0, 2) * m(1, 0) - m(0, 0) * m(1, 2)) * inv_det;
        lin[2][0] = (m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0)) * inv_det;
        lin[2][1] = (m(0, 1) * m(2, 0) - m(0, 0) * m(2, 1)) * inv_det;
        lin[2][2] = (m(0, 0) * m(1, 1) - m(0, 1) * m(1, 0)) * inv_det;

        let t = [m(0, 3), m(1, 3), m(2, 3)];
        let mut rows = [[0.0; 4]; 3];
        for r in 0..3 {
            rows[r][..3].copy_from_slice(&lin[r]);
            rows[r][3] = -(lin[r][0] * t[0] + lin[r][1] * t[1] + lin[r][2] * t[2]);
        }
        Some(Self { rows })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub dims: [usize; 3],
    pub spacing: [f32; 3],
    pub affine: Affine,
}

impl Geometry {
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn voxel_volume_ml(&self) -> f64 {
        self.spacing.iter().map(|s| f64::from(*s)).product::<f64>() / 1000.0
    }

    /// Same grid: identical dims and spacing within `tol` mm on every axis.
    pub fn same_grid(&self, other: &Geometry, tol: f32) -> bool {
        self.dims == other.dims
            && self
                .spacing
                .iter()
                .zip(other.spacing.iter())
                .all(|(a, b)| (a - b).abs() <= tol)
    }
}

/// One converted series. Immutable after loading.
#[derive(Debug, Clone)]
pub struct Volume {
    pub series: String,
    pub tag: ModalityTag,
    pub geometry: Geometry,
    pub data: Array3<f32>,
}

impl Volume {
    pub fn new(series: &str, tag: ModalityTag, geometry: Geometry, data: Array3<f32>) -> Self {
        Self {
            series: series.to_string(),
            tag,
            geometry,
            data,
        }
    }
}
