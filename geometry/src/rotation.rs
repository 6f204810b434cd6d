//! Conversions between rotation representations
//!
//! Rotations are carried either as a unit [`Quaternion`] or as a 3x3
//! [`Matrix3`]. The quaternion to matrix convention is the active, right
//! handed one: `R · v` rotates `v` by the quaternion's angle about its axis.

use crate::{check_coordinate_axis, GeometryError, Result};
use ndarray::{Array, ArrayBase, Axis, Data, Dimension};
use std::ops::{Mul, Neg};
use std::str::FromStr;

pub type Matrix3 = [[f64; 3]; 3];
pub type Vector3 = [f64; 3];

pub const IDENTITY: Matrix3 = [[1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];

/// Axis of a rotation, resolved once where user input enters the crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationAxis {
    X,
    Y,
    Z,
    Explicit(Vector3),
}

impl RotationAxis {
    /// Unit vector along the axis. Explicit axes are normalized here.
    pub fn unit_vector(&self) -> Result<Vector3> {
        match *self {
            RotationAxis::X => Ok([1., 0., 0.]),
            RotationAxis::Y => Ok([0., 1., 0.]),
            RotationAxis::Z => Ok([0., 0., 1.]),
            RotationAxis::Explicit(v) => {
                let norm = norm3(&v);
                if norm == 0.0 || !norm.is_finite() {
                    return Err(GeometryError::InvalidArgument(format!(
                        "rotation axis {v:?} cannot be normalized"
                    )));
                }
                Ok([v[0] / norm, v[1] / norm, v[2] / norm])
            }
        }
    }
}

impl FromStr for RotationAxis {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "x" => Ok(RotationAxis::X),
            "y" => Ok(RotationAxis::Y),
            "z" => Ok(RotationAxis::Z),
            _ => Err(GeometryError::InvalidArgument(format!(
                "axis should be 'x', 'y', 'z' or a 3D vector, got {s:?}"
            ))),
        }
    }
}

impl TryFrom<&[f64]> for RotationAxis {
    type Error = GeometryError;

    fn try_from(v: &[f64]) -> Result<Self> {
        match *v {
            [x, y, z] => Ok(RotationAxis::Explicit([x, y, z])),
            _ => Err(GeometryError::InvalidArgument(format!(
                "axis should be 'x', 'y', 'z' or a 3D vector, got {} components",
                v.len()
            ))),
        }
    }
}

impl From<Vector3> for RotationAxis {
    fn from(v: Vector3) -> Self {
        RotationAxis::Explicit(v)
    }
}

/// A quaternion `w + xi + yj + zk`; unit quaternions represent rotations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1., 0., 0., 0.)
    }

    pub fn from_array(q: [f64; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Scale to unit length. A zero quaternion is returned unchanged.
    pub fn normalize(&self) -> Self {
        let norm = self.norm();
        if norm == 0.0 {
            return *self;
        }
        Self::new(self.w / norm, self.x / norm, self.y / norm, self.z / norm)
    }

    pub fn conjugate(&self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// The representative of `±q` with a non-negative scalar part.
    pub fn canonical(&self) -> Self {
        if self.w < 0.0 {
            -*self
        } else {
            *self
        }
    }
}

impl Neg for Quaternion {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.w, -self.x, -self.y, -self.z)
    }
}

impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }
}

/// Rodrigues matrix for a rotation of `theta` radians about `axis`.
pub fn angle_axis_to_rot3d(axis: &RotationAxis, theta: f64) -> Result<Matrix3> {
    let [a, b, c] = axis.unit_vector()?;
    let cos_theta = theta.cos();
    let sin_theta = theta.sin();
    let bracket = 1. - cos_theta;
    let a_bracket = a * bracket;
    let b_bracket = b * bracket;
    let c_bracket = c * bracket;
    let a_sin_theta = a * sin_theta;
    let b_sin_theta = b * sin_theta;
    let c_sin_theta = c * sin_theta;

    Ok([
        [
            a * a_bracket + cos_theta,
            a * b_bracket - c_sin_theta,
            a * c_bracket + b_sin_theta,
        ],
        [
            b * a_bracket + c_sin_theta,
            b * b_bracket + cos_theta,
            b * c_bracket - a_sin_theta,
        ],
        [
            c * a_bracket - b_sin_theta,
            c * b_bracket + a_sin_theta,
            c * c_bracket + cos_theta,
        ],
    ])
}

pub fn angle_axis_to_quaternion(axis: &RotationAxis, theta: f64) -> Result<Quaternion> {
    let [a, b, c] = axis.unit_vector()?;
    let half = theta / 2.;
    let s = half.sin();
    Ok(Quaternion::new(half.cos(), s * a, s * b, s * c))
}

/// Rotation matrix of a quaternion.
///
/// The quaternion is used as given; callers must pass a unit quaternion,
/// otherwise the result is a scaled rotation rather than an orthonormal one.
pub fn quaternion_to_rot3d(quat: &Quaternion) -> Matrix3 {
    let (q0, q1, q2, q3) = (quat.w, quat.x, quat.y, quat.z);
    let q01 = q0 * q1;
    let q02 = q0 * q2;
    let q03 = q0 * q3;
    let q11 = q1 * q1;
    let q12 = q1 * q2;
    let q13 = q1 * q3;
    let q22 = q2 * q2;
    let q23 = q2 * q3;
    let q33 = q3 * q3;

    [
        [1. - 2. * (q22 + q33), 2. * (q12 - q03), 2. * (q13 + q02)],
        [2. * (q12 + q03), 1. - 2. * (q11 + q33), 2. * (q23 - q01)],
        [2. * (q13 - q02), 2. * (q23 + q01), 1. - 2. * (q11 + q22)],
    ]
}

/// Quaternion of a rotation matrix, inverse of [`quaternion_to_rot3d`] up to sign.
///
/// The branch is picked from the trace or the largest diagonal element so the
/// scale factor `s` never gets close to zero.
pub fn rot3d_to_quaternion(rot: &Matrix3) -> Quaternion {
    let [[r00, r01, r02], [r10, r11, r12], [r20, r21, r22]] = *rot;
    let tr = r00 + r11 + r22;

    if tr > 0. {
        // s = 4 w
        let s = (tr + 1.).sqrt() * 2.;
        Quaternion::new(0.25 * s, (r21 - r12) / s, (r02 - r20) / s, (r10 - r01) / s)
    } else if r00 > r11 && r00 > r22 {
        // s = 4 x
        let s = (1. + r00 - r11 - r22).sqrt() * 2.;
        Quaternion::new((r21 - r12) / s, 0.25 * s, (r01 + r10) / s, (r02 + r20) / s)
    } else if r11 > r22 {
        // s = 4 y
        let s = (1. + r11 - r00 - r22).sqrt() * 2.;
        Quaternion::new((r02 - r20) / s, (r01 + r10) / s, 0.25 * s, (r12 + r21) / s)
    } else {
        // s = 4 z
        let s = (1. + r22 - r00 - r11).sqrt() * 2.;
        Quaternion::new((r10 - r01) / s, (r02 + r20) / s, (r12 + r21) / s, 0.25 * s)
    }
}

/// Body 3-2-3 Euler angles to a rotation matrix, `Rz(psi) Ry(theta) Rz(phi)`.
#[deprecated(note = "Euler angle conventions are used inconsistently; use quaternions instead")]
pub fn euler_to_rot3d(psi: f64, theta: f64, phi: f64) -> Matrix3 {
    let rphi = [
        [phi.cos(), -phi.sin(), 0.],
        [phi.sin(), phi.cos(), 0.],
        [0., 0., 1.],
    ];
    let rtheta = [
        [theta.cos(), 0., theta.sin()],
        [0., 1., 0.],
        [-theta.sin(), 0., theta.cos()],
    ];
    let rpsi = [
        [psi.cos(), -psi.sin(), 0.],
        [psi.sin(), psi.cos(), 0.],
        [0., 0., 1.],
    ];
    mat_mul(&rpsi, &mat_mul(&rtheta, &rphi))
}

/// Body 3-2-1 Euler angles (yaw `psi`, pitch `theta`, roll `phi`) to a quaternion.
#[deprecated(note = "Euler angle conventions are used inconsistently; use quaternions instead")]
pub fn euler_to_quaternion(psi: f64, theta: f64, phi: f64) -> Quaternion {
    let cy = (psi * 0.5).cos();
    let sy = (psi * 0.5).sin();
    let cp = (theta * 0.5).cos();
    let sp = (theta * 0.5).sin();
    let cr = (phi * 0.5).cos();
    let sr = (phi * 0.5).sin();

    Quaternion::new(
        cy * cp * cr + sy * sp * sr,
        cy * cp * sr - sy * sp * cr,
        sy * cp * sr + cy * sp * cr,
        sy * cp * cr - cy * sp * sr,
    )
}

/// Right-handed rotation angle and axis of a unit quaternion.
///
/// A rotation by a multiple of a full turn (`w = ±1`) has no defined axis;
/// `(0, [1, 0, 0])` is returned for it.
pub fn quaternion_to_angle_axis(quat: &Quaternion) -> (f64, Vector3) {
    let half_angle = quat.w.clamp(-1., 1.).acos();
    let s = half_angle.sin();
    if s < f64::EPSILON {
        return (0., [1., 0., 0.]);
    }
    (2. * half_angle, [quat.x / s, quat.y / s, quat.z / s])
}

pub fn mat_mul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0_f64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

pub fn mat_vec(m: &Matrix3, v: &Vector3) -> Vector3 {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

pub fn transpose(m: &Matrix3) -> Matrix3 {
    let mut out = [[0_f64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = m[j][i];
        }
    }
    out
}

/// Signed cofactor matrix, `cofactor[i][j] = (-1)^(i+j) · minor(i, j)`.
fn cofactors(m: &Matrix3) -> Matrix3 {
    let others = |i: usize| match i {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let mut cofactor = [[0_f64; 3]; 3];
    for i in 0..3 {
        let (r0, r1) = others(i);
        for j in 0..3 {
            let (c0, c1) = others(j);
            let sign = match (i + j) % 2 {
                0 => 1.,
                _ => -1.,
            };
            cofactor[i][j] = sign * (m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]);
        }
    }
    cofactor
}

pub fn determinant(m: &Matrix3) -> f64 {
    let cofactor = cofactors(m);
    (0..3).map(|i| m[0][i] * cofactor[0][i]).sum()
}

/// General 3x3 inverse through the adjugate.
pub fn invert(m: &Matrix3) -> Result<Matrix3> {
    let cofactor = cofactors(m);
    let det: f64 = (0..3).map(|i| m[0][i] * cofactor[0][i]).sum();
    if det == 0. || !det.is_finite() {
        return Err(GeometryError::InvalidArgument(format!(
            "matrix {m:?} is singular"
        )));
    }
    let mut inverse = [[0_f64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            inverse[i][j] = cofactor[j][i] / det;
        }
    }
    Ok(inverse)
}

/// Apply `rot` to every position of a pixel stack (`positions · rotᵀ`).
pub fn rotate_pixels<S, D>(rot: &Matrix3, positions: &ArrayBase<S, D>) -> Result<Array<f64, D>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    check_coordinate_axis(positions.shape(), "pixel positions")?;
    let mut rotated = positions.to_owned();
    let last = Axis(rotated.ndim() - 1);
    for mut lane in rotated.lanes_mut(last) {
        let r = mat_vec(rot, &[lane[0], lane[1], lane[2]]);
        lane[0] = r[0];
        lane[1] = r[1];
        lane[2] = r[2];
    }
    Ok(rotated)
}

pub(crate) fn norm3(v: &Vector3) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

pub(crate) fn dot3(a: &Vector3, b: &Vector3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross3(a: &Vector3, b: &Vector3) -> Vector3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
