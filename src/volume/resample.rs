use anyhow::{Result, bail};
use ndarray::{Array3, Axis};

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::volume::{Geometry, Volume};

/// Nearest-neighbour resampling of `src` onto `target`. Voxels mapping outside
/// the source field of view take `fill`.
pub fn resample_nearest(src: &Volume, target: &Geometry, fill: f32) -> Result<Array3<f32>> {
    if src.geometry.same_grid(target, 1e-4) && src.geometry.affine == target.affine {
        return Ok(src.data.clone());
    }
    let Some(world_to_src) = src.geometry.affine.inverse() else {
        bail!("source affine of series '{}' is singular", src.series);
    };
    let [nx, ny, nz] = target.dims;
    let [sx, sy, sz] = src.geometry.dims;
    let mut out = Array3::<f32>::from_elem((nx, ny, nz), fill);

    let fill_slice = |k: usize, mut plane: ndarray::ArrayViewMut2<'_, f32>| {
        for j in 0..ny {
            for i in 0..nx {
                let world = target.affine.apply([i as f64, j as f64, k as f64]);
                let [fi, fj, fk] = world_to_src.apply(world);
                let (ri, rj, rk) = (fi.round(), fj.round(), fk.round());
                if ri < 0.0 || rj < 0.0 || rk < 0.0 {
                    continue;
                }
                let (ui, uj, uk) = (ri as usize, rj as usize, rk as usize);
                if ui < sx && uj < sy && uk < sz {
                    plane[[i, j]] = src.data[[ui, uj, uk]];
                }
            }
        }
    };

    #[cfg(feature = "mt")]
    out.axis_iter_mut(Axis(2))
        .into_par_iter()
        .enumerate()
        .for_each(|(k, plane)| fill_slice(k, plane));

    #[cfg(not(feature = "mt"))]
    out.axis_iter_mut(Axis(2))
        .enumerate()
        .for_each(|(k, plane)| fill_slice(k, plane));

    Ok(out)
}
