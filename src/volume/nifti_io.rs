use std::path::Path;

use anyhow::{Context, Result, bail};
use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::volume::{Affine, Geometry};

const SFORM_SCANNER_ANAT: i16 = 1;
const XYZT_UNITS_MM: u8 = 2;

pub fn read_f32(path: &Path) -> Result<(Geometry, Array3<f32>)> {
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("failed to read NIfTI {}", path.display()))?;
    let header = obj.header().clone();
    let data = obj
        .into_volume()
        .into_ndarray::<f32>()
        .with_context(|| format!("failed to decode voxels of {}", path.display()))?;
    let data = into_array3(data).with_context(|| format!("unsupported shape in {}", path.display()))?;
    let geometry = geometry_from_header(&header, data.dim())?;
    Ok((geometry, data))
}

pub fn write_f32(path: &Path, geometry: &Geometry, data: &Array3<f32>) -> Result<()> {
    let header = header_from_geometry(geometry);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(data)
        .with_context(|| format!("failed to write NIfTI {}", path.display()))?;
    Ok(())
}

pub fn write_labels(path: &Path, geometry: &Geometry, data: &Array3<u8>) -> Result<()> {
    let header = header_from_geometry(geometry);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(data)
        .with_context(|| format!("failed to write NIfTI {}", path.display()))?;
    Ok(())
}

fn into_array3(data: ArrayD<f32>) -> Result<Array3<f32>> {
    let data = match data.ndim() {
        3 => data,
        4 if data.shape()[3] == 1 => data.index_axis_move(Axis(3), 0),
        n => bail!("expected a 3D volume, got {} dimensions {:?}", n, data.shape()),
    };
    Ok(data.into_dimensionality::<Ix3>()?)
}

pub fn geometry_from_header(
    header: &NiftiHeader,
    dims: (usize, usize, usize),
) -> Result<Geometry> {
    let [_, dx, dy, dz, ..] = header.pixdim;
    let spacing = [dx.abs(), dy.abs(), dz.abs()];
    if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        bail!("invalid voxel spacing {:?}", spacing);
    }
    Ok(Geometry {
        dims: [dims.0, dims.1, dims.2],
        spacing,
        affine: affine_from_header(header, spacing),
    })
}

/// sform first, then qform, then plain spacing.
fn affine_from_header(header: &NiftiHeader, spacing: [f32; 3]) -> Affine {
    if header.sform_code > 0 {
        let row = |r: [f32; 4]| r.map(f64::from);
        return Affine {
            rows: [row(header.srow_x), row(header.srow_y), row(header.srow_z)],
        };
    }
    if header.qform_code > 0 {
        let (b, c, d) = (
            f64::from(header.quatern_b),
            f64::from(header.quatern_c),
            f64::from(header.quatern_d),
        );
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let [sx, sy, sz] = spacing.map(f64::from);
        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - b * b - c * c],
        ];
        let t = [
            f64::from(header.quatern_x),
            f64::from(header.quatern_y),
            f64::from(header.quatern_z),
        ];
        let mut rows = [[0.0; 4]; 3];
        for i in 0..3 {
            rows[i] = [r[i][0] * sx, r[i][1] * sy, r[i][2] * sz * qfac, t[i]];
        }
        return Affine { rows };
    }
    Affine::from_spacing(spacing)
}

pub fn header_from_geometry(geometry: &Geometry) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    let [nx, ny, nz] = geometry.dims;
    header.dim = [3, nx as u16, ny as u16, nz as u16, 1, 1, 1, 1];
    let [sx, sy, sz] = geometry.spacing;
    header.pixdim = [1.0, sx, sy, sz, 1.0, 1.0, 1.0, 1.0];
    header.xyzt_units = XYZT_UNITS_MM;
    header.sform_code = SFORM_SCANNER_ANAT;
    header.qform_code = 0;
    let row = |r: [f64; 4]| r.map(|v| v as f32);
    header.srow_x = row(geometry.affine.rows[0]);
    header.srow_y = row(geometry.affine.rows[1]);
    header.srow_z = row(geometry.affine.rows[2]);
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qform_header(quatern_b: f32) -> NiftiHeader {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 1;
        header.pixdim = [1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 1.0];
        header.quatern_b = quatern_b;
        header.quatern_c = 0.0;
        header.quatern_d = 0.0;
        header.quatern_x = 10.0;
        header.quatern_y = -20.0;
        header.quatern_z = 30.5;
        header
    }

    #[test]
    fn qform_offset_is_the_translation_column() {
        let geometry = geometry_from_header(&qform_header(0.0), (4, 4, 4)).unwrap();
        assert_eq!(
            geometry.affine.rows,
            [
                [2.0, 0.0, 0.0, 10.0],
                [0.0, 3.0, 0.0, -20.0],
                [0.0, 0.0, 4.0, 30.5],
            ]
        );
    }

    #[test]
    fn qform_rotation_flips_y_and_z() {
        let geometry = geometry_from_header(&qform_header(1.0), (4, 4, 4)).unwrap();
        assert_eq!(
            geometry.affine.rows,
            [
                [2.0, 0.0, 0.0, 10.0],
                [0.0, -3.0, 0.0, -20.0],
                [0.0, 0.0, -4.0, 30.5],
            ]
        );
    }
}
