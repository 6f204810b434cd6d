//! Projection of detector pixels into reciprocal space
//!
//! Pixel stacks are arrays of any leading shape whose trailing axis holds
//! the (x, y, z) coordinate of a pixel center in real space. The beam hits
//! a sample at the origin; a pixel's scattering vector is the difference
//! between its outgoing direction and the incident direction, scaled by the
//! wave number.

use crate::rotation::{cross3, dot3, norm3, Vector3};
use crate::slice::check_voxel_grid;
use crate::{check_coordinate_axis, pixel_vectors, GeometryError, Result};
use log::debug;
use ndarray::{Array, Array4, ArrayBase, Axis, Data, Dimension, RemoveAxis};

pub const MICRON_TO_METER: f64 = 1e-6;

/// Reciprocal positions of a pixel stack together with its radiometric corrections.
#[derive(Debug, Clone)]
pub struct ReciprocalGeometry<D: Dimension> {
    pub positions: Array<f64, D>,
    pub norms: Array<f64, D::Smaller>,
    pub polarization: Array<f64, D::Smaller>,
    pub solid_angle: Array<f64, D::Smaller>,
}

fn unit(v: &Vector3, what: &str) -> Result<Vector3> {
    let norm = norm3(v);
    if norm == 0. || !norm.is_finite() {
        return Err(GeometryError::InvalidArgument(format!(
            "{what} {v:?} has no direction"
        )));
    }
    Ok([v[0] / norm, v[1] / norm, v[2] / norm])
}

fn per_pixel<S, D, F>(pixel_center: &ArrayBase<S, D>, mut f: F) -> Result<Array<f64, D::Smaller>>
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
    F: FnMut(&Vector3) -> f64,
{
    let vectors = pixel_vectors(pixel_center, "pixel centers")?;
    let dim = pixel_center.raw_dim().remove_axis(Axis(pixel_center.ndim() - 1));
    let mut out = Array::zeros(dim);
    for (o, v) in out.iter_mut().zip(vectors.iter()) {
        *o = f(v);
    }
    Ok(out)
}

/// `k · (dir_pixel − dir_beam)` for every pixel; the stack shape is preserved.
pub fn reciprocal_space_pixel_position<S, D>(
    pixel_center: &ArrayBase<S, D>,
    wave_vector: &Vector3,
) -> Result<Array<f64, D>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    check_coordinate_axis(pixel_center.shape(), "pixel centers")?;
    let k = norm3(wave_vector);
    let beam = unit(wave_vector, "wave vector")?;

    let mut reciprocal = pixel_center.to_owned();
    let last = Axis(reciprocal.ndim() - 1);
    for mut lane in reciprocal.lanes_mut(last) {
        let norm = norm3(&[lane[0], lane[1], lane[2]]);
        for i in 0..3 {
            lane[i] = k * (lane[i] / norm - beam[i]);
        }
    }
    Ok(reciprocal)
}

/// `|dir_pixel × p̂|²`, i.e. `1 − cos²` of the angle to the polarization vector.
pub fn polarization_correction<S, D>(
    pixel_center: &ArrayBase<S, D>,
    polarization: &Vector3,
) -> Result<Array<f64, D::Smaller>>
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
{
    let p = unit(polarization, "polarization vector")?;
    per_pixel(pixel_center, |v| {
        let norm = norm3(v);
        let dir = [v[0] / norm, v[1] / norm, v[2] / norm];
        let c = cross3(&dir, &p);
        dot3(&c, &c)
    })
}

/// Solid angle subtended by each pixel: `area / r² · |cos(incidence)|`.
///
/// `pixel_center` and `pixel_area` must use matching length units; the
/// incidence angle is measured against `detector_normal`.
pub fn solid_angle<S, D, S2, E>(
    pixel_center: &ArrayBase<S, D>,
    pixel_area: &ArrayBase<S2, E>,
    detector_normal: &Vector3,
) -> Result<Array<f64, D::Smaller>>
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
    S2: Data<Elem = f64>,
    E: Dimension,
{
    check_coordinate_axis(pixel_center.shape(), "pixel centers")?;
    let stack_shape = &pixel_center.shape()[..pixel_center.ndim() - 1];
    if pixel_area.shape() != stack_shape {
        return Err(GeometryError::ShapeMismatch {
            what: "pixel areas",
            expected: stack_shape.to_vec(),
            found: pixel_area.shape().to_vec(),
        });
    }
    let normal = unit(detector_normal, "detector normal")?;

    let mut solid = per_pixel(pixel_center, |v| {
        let norm = norm3(v);
        let cosine = (dot3(v, &normal) / norm).abs();
        cosine / (norm * norm)
    })?;
    solid
        .iter_mut()
        .zip(pixel_area.iter())
        .for_each(|(s, area)| *s *= area);
    Ok(solid)
}

/// Reciprocal positions, their norms and both corrections in one pass.
///
/// `length_scale` converts the pixel positions into the length unit of
/// `pixel_area` for the solid angle only, e.g. [`MICRON_TO_METER`] for
/// positions in micrometres and areas in square metres.
pub fn reciprocal_position_and_corrections<S, D, S2, E>(
    pixel_position: &ArrayBase<S, D>,
    pixel_area: &ArrayBase<S2, E>,
    wave_vector: &Vector3,
    polarization: &Vector3,
    detector_normal: &Vector3,
    length_scale: f64,
) -> Result<ReciprocalGeometry<D>>
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
    S2: Data<Elem = f64>,
    E: Dimension,
{
    let positions = reciprocal_space_pixel_position(pixel_position, wave_vector)?;
    let norms = per_pixel(&positions, norm3)?;
    let polarization = polarization_correction(pixel_position, polarization)?;
    let scaled = pixel_position.mapv(|v| v * length_scale);
    let solid_angle = solid_angle(&scaled, pixel_area, detector_normal)?;

    debug!(
        "projected {} pixels, max |q| = {:.4e}",
        norms.len(),
        norms.iter().cloned().fold(0_f64, f64::max)
    );

    Ok(ReciprocalGeometry {
        positions,
        norms,
        polarization,
        solid_angle,
    })
}

/// Coordinates of every voxel center of a centered cubic grid, `[i, j, k, xyz]`.
pub fn reciprocal_mesh(voxel_num: usize, voxel_length: f64) -> Result<Array4<f64>> {
    check_voxel_grid(voxel_num, voxel_length)?;
    let half = ((voxel_num - 1) / 2) as f64;
    Ok(Array4::from_shape_fn(
        (voxel_num, voxel_num, voxel_num, 3),
        |(i, j, k, c)| {
            let idx = [i, j, k][c] as f64;
            (idx - half) * voxel_length
        },
    ))
}
