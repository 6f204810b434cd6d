//! Sets of orientations: regular sweeps of a circle or of the unit
//! 3-sphere, and uniformly random draws.

use crate::rotation::{
    angle_axis_to_quaternion, angle_axis_to_rot3d, quaternion_to_rot3d, Matrix3, Quaternion,
    RotationAxis,
};
use crate::{GeometryError, Result};
use log::debug;
use ndarray::{Array2, ArrayBase, Data, Ix2};
use rand::Rng;
use std::f64::consts::PI;

/// Default cap on the number of spacing refinements of [`points_on_2sphere`].
pub const MAX_ITER: usize = 1000;

// Surface area of the unit 3-sphere in R⁴.
const HYPERSPHERE_AREA: f64 = 2. * PI * PI;

// Upper bound on the spacing factor once the refinement cap is hit.
const SHRINK: f64 = 0.999;

// Spacing factor after a sweep that produced `count` points.
fn rescale(count: usize, target: f64) -> f64 {
    match count {
        0 => 0.5,
        _ => (count as f64 / target).cbrt(),
    }
}

/// How [`random_rotation`] picks its rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RandomAxis {
    /// Uniform angle in `[0, 2π)` about a fixed axis.
    Fixed(RotationAxis),
    /// Uniform (Haar) over all rotations.
    Uniform,
}

/// `num_pts` rotations about `axis` at angles `k · 2π / num_pts`.
pub fn points_on_1sphere(num_pts: usize, axis: &RotationAxis) -> Result<Vec<Quaternion>> {
    axis.unit_vector()?;
    let increment = 2. * PI / num_pts as f64;
    (0..num_pts)
        .map(|k| angle_axis_to_quaternion(axis, k as f64 * increment))
        .collect()
}

// One sweep of the hyperspherical angles (w1, w2, w3) with spacing `delta`.
fn hypersphere_sweep(delta: f64) -> Vec<Quaternion> {
    let mut points = Vec::new();
    let mut w1 = 0.5 * delta;
    while w1 < PI {
        let (sin1, cos1) = w1.sin_cos();
        let delta2 = delta / sin1;
        let mut w2 = 0.5 * delta2;
        while w2 < PI {
            let (sin2, cos2) = w2.sin_cos();
            let delta3 = delta2 / sin2;
            let mut w3 = 0.5 * delta3;
            while w3 < 2. * PI {
                let (sin3, cos3) = w3.sin_cos();
                points.push(Quaternion::new(
                    cos1,
                    sin1 * cos2,
                    sin1 * sin2 * cos3,
                    sin1 * sin2 * sin3,
                ));
                w3 += delta3;
            }
            w2 += delta2;
        }
        w1 += delta;
    }
    points
}

/// Exactly `num_pts` unit quaternions spread evenly over the 3-sphere.
pub fn points_on_2sphere(num_pts: usize) -> Vec<Quaternion> {
    points_on_2sphere_with_cap(num_pts, MAX_ITER)
}

/// [`points_on_2sphere`] with an explicit cap on the spacing refinements.
///
/// The spacing is rescaled by `(count / num_pts)^(1/3)` after every sweep
/// until a sweep yields exactly `num_pts` points or the cap is reached.
/// Past the cap the spacing only shrinks, and the first `num_pts` points of
/// the first sweep that reaches the target are returned.
pub fn points_on_2sphere_with_cap(num_pts: usize, max_iter: usize) -> Vec<Quaternion> {
    if num_pts == 0 {
        return Vec::new();
    }
    let target = num_pts as f64;
    let mut delta = (HYPERSPHERE_AREA / target).cbrt();
    let mut points = hypersphere_sweep(delta);
    let mut iteration = 1;
    while points.len() != num_pts && iteration < max_iter {
        delta *= rescale(points.len(), target);
        points = hypersphere_sweep(delta);
        iteration += 1;
    }
    while points.len() < num_pts {
        delta *= rescale(points.len(), target).min(SHRINK);
        points = hypersphere_sweep(delta);
        iteration += 1;
    }
    debug!(
        "2-sphere sweep: {} points after {} passes, spacing {:.6}",
        points.len(),
        iteration,
        delta
    );
    points.truncate(num_pts);
    points
}

fn random_quaternion<R: Rng + ?Sized>(rng: &mut R) -> Quaternion {
    let u1: f64 = rng.gen();
    let u2: f64 = rng.gen();
    let u3: f64 = rng.gen();
    let (r1, r2) = ((1. - u1).sqrt(), u1.sqrt());
    let (sin2, cos2) = (2. * PI * u2).sin_cos();
    let (sin3, cos3) = (2. * PI * u3).sin_cos();
    Quaternion::new(r1 * sin2, r1 * cos2, r2 * sin3, r2 * cos3).canonical()
}

/// `num_pts` independent uniformly distributed unit quaternions, `w ≥ 0`.
pub fn random_quaternions<R: Rng + ?Sized>(num_pts: usize, rng: &mut R) -> Vec<Quaternion> {
    (0..num_pts).map(|_| random_quaternion(rng)).collect()
}

pub fn random_rotation<R: Rng + ?Sized>(mode: &RandomAxis, rng: &mut R) -> Result<Matrix3> {
    match mode {
        RandomAxis::Fixed(axis) => angle_axis_to_rot3d(axis, 2. * PI * rng.gen::<f64>()),
        RandomAxis::Uniform => Ok(quaternion_to_rot3d(&random_quaternion(rng))),
    }
}

/// Orientations as rows `(w, x, y, z)`.
pub fn orientations_to_array(orientations: &[Quaternion]) -> Array2<f64> {
    Array2::from_shape_fn((orientations.len(), 4), |(l, c)| {
        orientations[l].to_array()[c]
    })
}

pub fn orientations_from_array<S>(array: &ArrayBase<S, Ix2>) -> Result<Vec<Quaternion>>
where
    S: Data<Elem = f64>,
{
    if array.ncols() != 4 {
        return Err(GeometryError::ShapeMismatch {
            what: "orientations",
            expected: vec![array.nrows(), 4],
            found: array.shape().to_vec(),
        });
    }
    Ok(array
        .rows()
        .into_iter()
        .map(|row| Quaternion::new(row[0], row[1], row[2], row[3]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::{determinant, mat_mul, mat_vec, transpose, IDENTITY};
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn assert_orthonormal(rot: &Matrix3) {
        let product = mat_mul(rot, &transpose(rot));
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(product[i][j], IDENTITY[i][j], epsilon = 1e-12);
            }
        }
        assert_abs_diff_eq!(determinant(rot), 1., epsilon = 1e-12);
    }

    #[test]
    fn test_circle_about_z() {
        let points = points_on_1sphere(4, &RotationAxis::Z).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], Quaternion::identity());

        let expected = [[1., 0., 0.], [0., 1., 0.], [-1., 0., 0.], [0., -1., 0.]];
        for (q, e) in points.iter().zip(expected.iter()) {
            let v = mat_vec(&quaternion_to_rot3d(q), &[1., 0., 0.]);
            for i in 0..3 {
                assert_abs_diff_eq!(v[i], e[i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_circle_honours_every_axis() {
        for axis in [
            RotationAxis::X,
            RotationAxis::Y,
            RotationAxis::Z,
            RotationAxis::Explicit([1., 1., 0.]),
        ] {
            let unit = axis.unit_vector().unwrap();
            let points = points_on_1sphere(7, &axis).unwrap();
            for (k, q) in points.iter().enumerate() {
                let fixed = mat_vec(&quaternion_to_rot3d(q), &unit);
                for i in 0..3 {
                    assert_abs_diff_eq!(fixed[i], unit[i], epsilon = 1e-12);
                }
                for other in points.iter().skip(k + 1) {
                    let distance: f64 = q
                        .to_array()
                        .iter()
                        .zip(other.to_array().iter())
                        .map(|(a, b)| (a - b).abs())
                        .sum();
                    assert!(distance > 1e-9);
                }
            }
        }
        assert!(points_on_1sphere(3, &RotationAxis::Explicit([0., 0., 0.])).is_err());
        assert!(points_on_1sphere(0, &RotationAxis::Y).unwrap().is_empty());
    }

    #[test]
    fn test_2sphere_count_is_exact() {
        for n in [1, 2, 5, 10, 37, 100, 500] {
            let points = points_on_2sphere(n);
            assert_eq!(points.len(), n);
            for q in points.iter() {
                assert_abs_diff_eq!(q.norm(), 1., epsilon = 1e-12);
            }
        }
        assert!(points_on_2sphere(0).is_empty());
    }

    #[test]
    fn test_2sphere_without_refinement() {
        let points = points_on_2sphere_with_cap(60, 0);
        assert_eq!(points.len(), 60);
        let points = points_on_2sphere_with_cap(60, 1);
        assert_eq!(points.len(), 60);
    }

    #[test]
    fn test_random_quaternions_are_reproducible() {
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let first = random_quaternions(50, &mut a);
        let second = random_quaternions(50, &mut b);
        assert_eq!(first, second);
        for q in first.iter() {
            assert_abs_diff_eq!(q.norm(), 1., epsilon = 1e-12);
            assert!(q.w >= 0.);
        }
        let mut c = ChaCha8Rng::seed_from_u64(8);
        assert_ne!(first, random_quaternions(50, &mut c));
    }

    #[test]
    fn test_random_rotations_are_proper() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..20 {
            assert_orthonormal(&random_rotation(&RandomAxis::Uniform, &mut rng).unwrap());
            let rot = random_rotation(&RandomAxis::Fixed(RotationAxis::Y), &mut rng).unwrap();
            assert_orthonormal(&rot);
            let y = mat_vec(&rot, &[0., 1., 0.]);
            assert_abs_diff_eq!(y[1], 1., epsilon = 1e-12);
        }
    }

    #[test]
    fn test_uniform_rotations_have_no_preferred_direction() {
        let mut rng = ChaCha8Rng::seed_from_u64(1234);
        let n = 20000;
        let mut mean = [0_f64; 3];
        for _ in 0..n {
            let rot = random_rotation(&RandomAxis::Uniform, &mut rng).unwrap();
            let v = mat_vec(&rot, &[0., 0., 1.]);
            for i in 0..3 {
                mean[i] += v[i] / n as f64;
            }
        }
        for m in mean.iter() {
            assert!(m.abs() < 0.03, "mean direction {mean:?}");
        }
    }

    #[test]
    fn test_orientation_array_conversion() {
        let quats = vec![Quaternion::identity(), Quaternion::new(0., 1., 0., 0.)];
        let array = orientations_to_array(&quats);
        assert_eq!(array.shape(), &[2, 4]);
        assert_eq!(array[[1, 1]], 1.);
        assert_eq!(orientations_from_array(&array).unwrap(), quats);
        let wrong = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            orientations_from_array(&wrong),
            Err(GeometryError::ShapeMismatch { .. })
        ));
    }
}
