//! Scatter per-panel patterns into a single 2D detector image.
//!
//! `index_map[p, i, j]` holds the `(x, y)` image pixel that receives panel
//! `p`'s pixel `(i, j)`. The image is sized to the largest index plus one;
//! pixels no panel maps to stay zero and, where two panel pixels share a
//! destination, the one visited last (panel order, then row-major) wins.

use crate::{GeometryError, Result};
use ndarray::{Array2, Array3, ArrayBase, ArrayView3, ArrayViewMut2, Axis, Data, Ix3, Ix4};

fn check_index_map(stack_shape: &[usize], map_shape: &[usize]) -> Result<()> {
    let mut expected = stack_shape.to_vec();
    expected.push(2);
    if map_shape != expected.as_slice() {
        return Err(GeometryError::ShapeMismatch {
            what: "index map",
            expected,
            found: map_shape.to_vec(),
        });
    }
    Ok(())
}

fn image_extent<S>(index_map: &ArrayBase<S, Ix4>) -> (usize, usize)
where
    S: Data<Elem = usize>,
{
    let extent = |c: usize| {
        index_map
            .index_axis(Axis(3), c)
            .iter()
            .max()
            .map_or(0, |m| m + 1)
    };
    (extent(0), extent(1))
}

fn scatter<S>(mut image: ArrayViewMut2<f64>, panels: ArrayView3<f64>, index_map: &ArrayBase<S, Ix4>)
where
    S: Data<Elem = usize>,
{
    for ((p, i, j), value) in panels.indexed_iter() {
        let x = index_map[[p, i, j, 0]];
        let y = index_map[[p, i, j, 1]];
        image[[x, y]] = *value;
    }
}

/// Assemble one `(panel, x, y)` stack into a 2D image.
pub fn assemble_image_stack<S, S2>(
    image_stack: &ArrayBase<S, Ix3>,
    index_map: &ArrayBase<S2, Ix4>,
) -> Result<Array2<f64>>
where
    S: Data<Elem = f64>,
    S2: Data<Elem = usize>,
{
    check_index_map(image_stack.shape(), index_map.shape())?;
    let mut image = Array2::zeros(image_extent(index_map));
    scatter(image.view_mut(), image_stack.view(), index_map);
    Ok(image)
}

/// Assemble every entry of an `(n, panel, x, y)` stack with a shared map.
pub fn assemble_image_stack_batch<S, S2>(
    image_stack: &ArrayBase<S, Ix4>,
    index_map: &ArrayBase<S2, Ix4>,
) -> Result<Array3<f64>>
where
    S: Data<Elem = f64>,
    S2: Data<Elem = usize>,
{
    check_index_map(&image_stack.shape()[1..], index_map.shape())?;
    let (rows, cols) = image_extent(index_map);
    let mut images = Array3::zeros((image_stack.len_of(Axis(0)), rows, cols));
    for (image, panels) in images.outer_iter_mut().zip(image_stack.outer_iter()) {
        scatter(image, panels, index_map);
    }
    Ok(images)
}
