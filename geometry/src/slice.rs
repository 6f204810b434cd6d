//! Trilinear slicing of a cubic reciprocal-space volume
//!
//! A volume of odd side `N` is centered on the origin of reciprocal space:
//! voxel `(N-1)/2` along every axis sits at `q = 0` and neighbouring voxels
//! are `voxel_length` apart. A pixel at `q` reads the volume at voxel
//! coordinate `q / voxel_length + (N-1)/2` by weighting the eight voxels
//! of the enclosing cell.
//!
//! Positions outside `[0, N-1]` are handled according to a
//! [`BoundaryPolicy`]; no corner index ever leaves the volume.

use crate::rotation::{invert, mat_vec, quaternion_to_rot3d, Matrix3, Quaternion, Vector3};
use crate::{pixel_vectors, GeometryError, Result};
use log::{debug, info};
use ndarray::{Array, ArrayBase, ArrayD, ArrayView3, Axis, Data, Dimension, IxDyn, RemoveAxis};
use rayon::prelude::*;
use std::borrow::Cow;
use std::str::FromStr;
use std::time::Instant;

/// What to do with a pixel whose voxel coordinate falls outside the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryPolicy {
    /// Fail with [`GeometryError::OutOfVolume`].
    #[default]
    Reject,
    /// Move the coordinate onto the nearest face of the volume.
    Clamp,
}

impl FromStr for BoundaryPolicy {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(BoundaryPolicy::Reject),
            "clamp" => Ok(BoundaryPolicy::Clamp),
            _ => Err(GeometryError::InvalidArgument(format!(
                "boundary policy should be 'reject' or 'clamp', got {s:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceOptions {
    /// Rotate the detector by the inverse of each orientation.
    pub inverse: bool,
    pub boundary: BoundaryPolicy,
}

/// The eight voxels around one sampling point and their trilinear weights.
///
/// Corner `c` is `base + OFFSETS[c]`; weights are non-negative and sum to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stencil {
    pub base: [usize; 3],
    pub weights: [f64; 8],
}

impl Stencil {
    pub const OFFSETS: [[usize; 3]; 8] = [
        [0, 0, 0],
        [0, 0, 1],
        [0, 1, 0],
        [0, 1, 1],
        [1, 0, 0],
        [1, 0, 1],
        [1, 1, 0],
        [1, 1, 1],
    ];

    /// Stencil at a voxel coordinate already known to lie in `[0, N-1]³`.
    ///
    /// A coordinate on the upper face uses the cell below it with a
    /// fractional part of one, so `base + 1` stays inside the volume.
    fn at(coord: &Vector3, voxel_num: usize) -> Self {
        let top = voxel_num.saturating_sub(2);
        let mut base = [0_usize; 3];
        let mut frac = [0_f64; 3];
        for i in 0..3 {
            base[i] = (coord[i].floor() as usize).min(top);
            frac[i] = coord[i] - base[i] as f64;
        }

        let mut weights = [0_f64; 8];
        for (w, offset) in weights.iter_mut().zip(Self::OFFSETS.iter()) {
            *w = (0..3)
                .map(|i| match offset[i] {
                    0 => 1. - frac[i],
                    _ => frac[i],
                })
                .product();
        }
        Self { base, weights }
    }

    pub fn corners(&self) -> [[usize; 3]; 8] {
        let mut corners = [[0_usize; 3]; 8];
        for (corner, offset) in corners.iter_mut().zip(Self::OFFSETS.iter()) {
            for i in 0..3 {
                corner[i] = self.base[i] + offset[i];
            }
        }
        corners
    }

    /// Row-major indices `ix·N² + iy·N + iz` of the corners, capped at `N-1`
    /// per axis (the cap is only reached by zero-weight corners of a
    /// single-voxel volume).
    pub fn flat_indices(&self, voxel_num: usize) -> [usize; 8] {
        let cap = voxel_num.saturating_sub(1);
        let mut flat = [0_usize; 8];
        for (f, corner) in flat.iter_mut().zip(self.corners().iter()) {
            let [ix, iy, iz] = corner.map(|c| c.min(cap));
            *f = ix * voxel_num * voxel_num + iy * voxel_num + iz;
        }
        flat
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

pub(crate) fn check_voxel_grid(voxel_num: usize, voxel_length: f64) -> Result<()> {
    if voxel_num % 2 == 0 {
        return Err(GeometryError::InvalidArgument(format!(
            "volume side must be a positive odd number, got {voxel_num}"
        )));
    }
    if !(voxel_length > 0.) || !voxel_length.is_finite() {
        return Err(GeometryError::InvalidArgument(format!(
            "voxel length must be positive, got {voxel_length}"
        )));
    }
    Ok(())
}

fn voxel_coordinate(position: &Vector3, voxel_length: f64, voxel_num: usize) -> Vector3 {
    let shift = ((voxel_num - 1) / 2) as f64;
    position.map(|p| p / voxel_length + shift)
}

fn stencil_at(
    pixel: usize,
    mut coord: Vector3,
    voxel_num: usize,
    policy: BoundaryPolicy,
) -> Result<Stencil> {
    let max = (voxel_num - 1) as f64;
    let inside = |c: &f64| (0.0..=max).contains(c);
    match policy {
        BoundaryPolicy::Reject if !coord.iter().all(inside) => {
            return Err(GeometryError::OutOfVolume {
                pixel,
                coordinate: coord,
                voxel_num,
            })
        }
        BoundaryPolicy::Clamp if coord.iter().any(|c| c.is_nan()) => {
            return Err(GeometryError::OutOfVolume {
                pixel,
                coordinate: coord,
                voxel_num,
            })
        }
        BoundaryPolicy::Clamp => coord.iter_mut().for_each(|c| *c = c.clamp(0., max)),
        BoundaryPolicy::Reject => {}
    }
    Ok(Stencil::at(&coord, voxel_num))
}

/// A cubic volume prepared for sampling: flattened row-major data, its side
/// length in voxels and the reciprocal-space length of one voxel edge.
#[derive(Debug, Clone)]
pub struct SliceVolume<'a> {
    data: Cow<'a, [f64]>,
    voxel_num: usize,
    voxel_length: f64,
}

impl<'a> SliceVolume<'a> {
    /// Borrow a volume for slicing. Volumes not laid out in standard order
    /// are copied once.
    pub fn new(volume: ArrayView3<'a, f64>, voxel_length: f64) -> Result<Self> {
        let (nx, ny, nz) = volume.dim();
        if nx != ny || nx != nz {
            return Err(GeometryError::ShapeMismatch {
                what: "volume",
                expected: vec![nx, nx, nx],
                found: vec![nx, ny, nz],
            });
        }
        check_voxel_grid(nx, voxel_length)?;
        let data = match volume.to_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(volume.iter().cloned().collect()),
        };
        Ok(Self {
            data,
            voxel_num: nx,
            voxel_length,
        })
    }

    pub fn voxel_num(&self) -> usize {
        self.voxel_num
    }

    pub fn voxel_length(&self) -> f64 {
        self.voxel_length
    }

    pub fn voxel_coordinate(&self, position: &Vector3) -> Vector3 {
        voxel_coordinate(position, self.voxel_length, self.voxel_num)
    }

    /// Stencil of the reciprocal-space `position`; `pixel` only labels errors.
    pub fn stencil(&self, pixel: usize, position: &Vector3, policy: BoundaryPolicy) -> Result<Stencil> {
        stencil_at(pixel, self.voxel_coordinate(position), self.voxel_num, policy)
    }

    /// Weighted sum of the stencil's corner intensities.
    pub fn gather(&self, stencil: &Stencil) -> f64 {
        stencil
            .flat_indices(self.voxel_num)
            .iter()
            .zip(stencil.weights.iter())
            .map(|(&idx, w)| w * self.data[idx])
            .sum()
    }

    pub fn interpolate(&self, position: &Vector3, policy: BoundaryPolicy) -> Result<f64> {
        Ok(self.gather(&self.stencil(0, position, policy)?))
    }
}

/// Interpolation stencils of every pixel of a stack, in row-major pixel order.
pub fn weights_and_indices<S, D>(
    positions: &ArrayBase<S, D>,
    voxel_length: f64,
    voxel_num: usize,
    policy: BoundaryPolicy,
) -> Result<Vec<Stencil>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    check_voxel_grid(voxel_num, voxel_length)?;
    pixel_vectors(positions, "pixel positions")?
        .iter()
        .enumerate()
        .map(|(t, p)| stencil_at(t, voxel_coordinate(p, voxel_length, voxel_num), voxel_num, policy))
        .collect()
}

/// Gather one pattern of shape `pattern_dim` from precomputed stencils.
pub fn take_one_slice<E: Dimension>(
    stencils: &[Stencil],
    volume: &SliceVolume,
    pattern_dim: E,
) -> Result<Array<f64, E>> {
    if stencils.len() != pattern_dim.size() {
        return Err(GeometryError::ShapeMismatch {
            what: "stencils",
            expected: vec![pattern_dim.size()],
            found: vec![stencils.len()],
        });
    }
    let values: Vec<f64> = stencils.iter().map(|s| volume.gather(s)).collect();
    let shape = pattern_dim.slice().to_vec();
    Array::from_shape_vec(pattern_dim, values).map_err(|_| stack_error("stencils", shape))
}

fn stack_error(what: &'static str, expected: Vec<usize>) -> GeometryError {
    let found = vec![expected.iter().product()];
    GeometryError::ShapeMismatch {
        what,
        expected,
        found,
    }
}

fn pattern_dim<S, D>(pixel_momentum: &ArrayBase<S, D>) -> D::Smaller
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
{
    pixel_momentum
        .raw_dim()
        .remove_axis(Axis(pixel_momentum.ndim() - 1))
}

fn sample_pixel(
    rot: &Matrix3,
    pixel: usize,
    position: &Vector3,
    volume: &SliceVolume,
    policy: BoundaryPolicy,
) -> Result<f64> {
    let rotated = mat_vec(rot, position);
    Ok(volume.gather(&volume.stencil(pixel, &rotated, policy)?))
}

/// Sample the volume on the detector surface rotated by `rotation`.
///
/// The result has the pixel stack's shape without the coordinate axis.
pub fn take_slice<S, D>(
    rotation: &Matrix3,
    pixel_momentum: &ArrayBase<S, D>,
    volume: &SliceVolume,
    policy: BoundaryPolicy,
) -> Result<Array<f64, D::Smaller>>
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
{
    let pixels = pixel_vectors(pixel_momentum, "pixel momentum")?;
    let values = pixels
        .par_iter()
        .enumerate()
        .map(|(t, p)| sample_pixel(rotation, t, p, volume, policy))
        .collect::<Result<Vec<f64>>>()?;
    let dim = pattern_dim(pixel_momentum);
    let shape = dim.slice().to_vec();
    Array::from_shape_vec(dim, values).map_err(|_| stack_error("slice", shape))
}

/// One slice per orientation, stacked along a new leading axis.
///
/// Orientations are independent and processed in parallel; slot `l` of the
/// result always belongs to `orientations[l]`.
pub fn take_n_slices<S, D>(
    pixel_momentum: &ArrayBase<S, D>,
    volume: &SliceVolume,
    orientations: &[Quaternion],
    options: &SliceOptions,
) -> Result<Array<f64, <D::Smaller as Dimension>::Larger>>
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
{
    let now = Instant::now();
    let pixels = pixel_vectors(pixel_momentum, "pixel momentum")?;
    let dim = pattern_dim(pixel_momentum);
    debug!(
        "slicing {} orientations over {} pixels, volume side {}",
        orientations.len(),
        pixels.len(),
        volume.voxel_num()
    );

    // one row of `num_pixels` values per orientation, filled in place
    let num_pixels = pixels.len();
    let mut values = vec![0_f64; orientations.len() * num_pixels];
    values
        .par_chunks_mut(num_pixels.max(1))
        .zip(orientations.par_iter())
        .try_for_each(|(row, quat)| -> Result<()> {
            let mut rot = quaternion_to_rot3d(quat);
            if options.inverse {
                rot = invert(&rot)?;
            }
            row.par_iter_mut()
                .zip(pixels.par_iter())
                .enumerate()
                .try_for_each(|(t, (value, p))| -> Result<()> {
                    *value = sample_pixel(&rot, t, p, volume, options.boundary)?;
                    Ok(())
                })
        })?;

    let mut shape = vec![orientations.len()];
    shape.extend_from_slice(dim.slice());
    let stacked = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .and_then(|stack| stack.into_dimensionality::<<D::Smaller as Dimension>::Larger>())
        .map_err(|_| stack_error("slice stack", shape))?;

    info!(
        "Finished {} slices in {:?}",
        orientations.len(),
        now.elapsed()
    );
    Ok(stacked)
}
