//! Orientation algebra and trilinear slicing of reciprocal-space volumes.
//!
//! The crate turns detector pixel positions into reciprocal-space
//! coordinates, rotates them by a set of orientations and samples a cubic
//! intensity volume along each rotated detector surface. Multi-panel
//! patterns can then be scattered back into a single 2D image.

pub mod assemble;
pub mod orientation;
pub mod reciprocal;
pub mod rotation;
pub mod slice;

use thiserror::Error;

pub use assemble::{assemble_image_stack, assemble_image_stack_batch};
pub use orientation::{
    points_on_1sphere, points_on_2sphere, random_quaternions, random_rotation, RandomAxis,
};
pub use reciprocal::{reciprocal_position_and_corrections, ReciprocalGeometry};
pub use rotation::{Matrix3, Quaternion, RotationAxis, Vector3};
pub use slice::{take_n_slices, take_slice, BoundaryPolicy, SliceOptions, SliceVolume, Stencil};

/// Errors raised by the geometry routines.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("pixel {pixel} at voxel coordinate {coordinate:?} lies outside a volume of side {voxel_num}")]
    OutOfVolume {
        pixel: usize,
        coordinate: [f64; 3],
        voxel_num: usize,
    },
}

pub type Result<T> = std::result::Result<T, GeometryError>;

/// Pixel stacks carry their coordinates along a trailing axis of length 3.
pub(crate) fn check_coordinate_axis(shape: &[usize], what: &'static str) -> Result<()> {
    match shape.last() {
        Some(3) => Ok(()),
        _ => {
            let mut expected = shape.to_vec();
            expected.pop();
            expected.push(3);
            Err(GeometryError::ShapeMismatch {
                what,
                expected,
                found: shape.to_vec(),
            })
        }
    }
}

/// Flatten a pixel stack into its 3-vectors, in logical (row-major) order.
pub(crate) fn pixel_vectors<S, D>(
    positions: &ndarray::ArrayBase<S, D>,
    what: &'static str,
) -> Result<Vec<Vector3>>
where
    S: ndarray::Data<Elem = f64>,
    D: ndarray::Dimension,
{
    check_coordinate_axis(positions.shape(), what)?;
    let last = ndarray::Axis(positions.ndim() - 1);
    Ok(positions
        .lanes(last)
        .into_iter()
        .map(|lane| [lane[0], lane[1], lane[2]])
        .collect())
}
