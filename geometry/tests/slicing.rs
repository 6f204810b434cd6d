use approx::assert_abs_diff_eq;
use geometry::orientation::{orientations_from_array, orientations_to_array};
use geometry::reciprocal::{reciprocal_mesh, MICRON_TO_METER};
use geometry::rotation::{angle_axis_to_quaternion, rot3d_to_quaternion};
use geometry::slice::weights_and_indices;
use geometry::{
    assemble_image_stack_batch, points_on_2sphere, random_quaternions,
    reciprocal_position_and_corrections, take_n_slices, take_slice, BoundaryPolicy, Quaternion,
    RotationAxis, SliceOptions, SliceVolume,
};
use ndarray::{Array3, Array4, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Two 4x5 panels, 100 µm pixels, 5 cm from the sample, stacked along x.
fn detector() -> (Array4<f64>, Array3<f64>, Array4<usize>) {
    let (panels, rows, cols) = (2, 4, 5);
    let pixel = 100.;
    let positions = Array4::from_shape_fn((panels, rows, cols, 3), |(p, i, j, c)| match c {
        0 => ((p * rows + i) as f64 - 3.5) * pixel,
        1 => (j as f64 - 2.) * pixel,
        _ => 5e4,
    });
    let areas = Array3::from_elem((panels, rows, cols), 1e-8);
    let index_map = Array4::from_shape_fn((panels, rows, cols, 2), |(p, i, j, c)| match c {
        0 => p * rows + i,
        _ => j,
    });
    (positions, areas, index_map)
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn constant_volume_gives_constant_patterns() {
    init();
    let (positions, areas, index_map) = detector();
    let geom = reciprocal_position_and_corrections(
        &positions,
        &areas,
        &[0., 0., 1.],
        &[1., 0., 0.],
        &[0., 0., 1.],
        MICRON_TO_METER,
    )
    .unwrap();
    assert_eq!(geom.positions.shape(), &[2, 4, 5, 3]);
    let q_max = geom.norms.iter().cloned().fold(0., f64::max);

    let voxel_num = 11;
    let voxel_length = 2. * q_max / (voxel_num - 1) as f64 * 1.01;
    let volume = Array3::from_elem((voxel_num, voxel_num, voxel_num), 3.25);
    let sv = SliceVolume::new(volume.view(), voxel_length).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let orientations = random_quaternions(8, &mut rng);
    let slices = take_n_slices(&geom.positions, &sv, &orientations, &SliceOptions::default()).unwrap();
    assert_eq!(slices.shape(), &[8, 2, 4, 5]);
    for value in slices.iter() {
        assert_abs_diff_eq!(*value, 3.25, epsilon = 1e-12);
    }

    let images = assemble_image_stack_batch(&slices, &index_map).unwrap();
    assert_eq!(images.shape(), &[8, 8, 5]);
    for value in images.iter() {
        assert_abs_diff_eq!(*value, 3.25, epsilon = 1e-12);
    }
}

#[test]
fn mesh_sampled_volume_reproduces_linear_field() {
    init();
    let voxel_num = 9;
    let voxel_length = 0.25;
    let mesh = reciprocal_mesh(voxel_num, voxel_length).unwrap();
    // f(q) = 2 qx - qy + 0.5 qz sampled on the mesh
    let volume = mesh.map_axis(Axis(3), |q| 2. * q[0] - q[1] + 0.5 * q[2]);
    let sv = SliceVolume::new(volume.view(), voxel_length).unwrap();

    let pixels = ndarray::array![[0.3, -0.2, 0.1], [0.0, 0.7, -0.45], [-0.6, 0.1, 0.33]];
    let q = angle_axis_to_quaternion(&RotationAxis::Explicit([0.3, 1., -0.2]), 1.1).unwrap();
    let rot = geometry::rotation::quaternion_to_rot3d(&q);
    let pattern = take_slice(&rot, &pixels, &sv, BoundaryPolicy::Reject).unwrap();
    let rotated = geometry::rotation::rotate_pixels(&rot, &pixels).unwrap();
    for (value, r) in pattern.iter().zip(rotated.outer_iter()) {
        assert_abs_diff_eq!(*value, 2. * r[0] - r[1] + 0.5 * r[2], epsilon = 1e-10);
    }
}

#[test]
fn hypersphere_orientations_slice_in_order() {
    init();
    let orientations = points_on_2sphere(24);
    let round_trip = orientations_from_array(&orientations_to_array(&orientations)).unwrap();
    assert_eq!(round_trip, orientations);

    let volume = Array3::from_shape_fn((7, 7, 7), |(i, j, k)| (i * i + 2 * j + 3 * k) as f64);
    let sv = SliceVolume::new(volume.view(), 1.).unwrap();
    let pixels = ndarray::array![[[1.0, 0.5, -0.5], [2.0, -1.0, 0.25]]];
    let options = SliceOptions {
        inverse: false,
        boundary: BoundaryPolicy::Clamp,
    };
    let slices = take_n_slices(&pixels, &sv, &orientations, &options).unwrap();
    assert_eq!(slices.shape(), &[24, 1, 2]);
    for (l, q) in orientations.iter().enumerate() {
        let rot = geometry::rotation::quaternion_to_rot3d(q);
        let single = take_slice(&rot, &pixels, &sv, BoundaryPolicy::Clamp).unwrap();
        assert_eq!(slices.index_axis(Axis(0), l), single);
        // the quaternion recovered from the matrix describes the same rotation
        let back = rot3d_to_quaternion(&rot);
        let dot: f64 = back.to_array().iter().zip(q.to_array().iter()).map(|(a, b)| a * b).sum();
        assert_abs_diff_eq!(dot.abs(), 1., epsilon = 1e-9);
    }
}

#[test]
fn stencils_cover_every_pixel() {
    let (positions, _, _) = detector();
    let scaled = positions.mapv(|v| v * 1e-6);
    let stencils = weights_and_indices(&scaled, 0.01, 21, BoundaryPolicy::Reject).unwrap();
    assert_eq!(stencils.len(), 2 * 4 * 5);
    for s in stencils.iter() {
        assert_abs_diff_eq!(s.weight_sum(), 1., epsilon = 1e-12);
    }
    let identity = [Quaternion::identity()];
    let volume = Array3::<f64>::zeros((3, 3, 3));
    let sv = SliceVolume::new(volume.view(), 1e-6).unwrap();
    assert!(take_n_slices(&scaled, &sv, &identity, &SliceOptions::default()).is_err());
}
