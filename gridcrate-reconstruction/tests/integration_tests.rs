//! Integration tests for gridcrate-reconstruction
//!
//! These tests run a sensor-like structured cloud through the whole pipeline:
//! denoising, normal estimation, hole filling, compaction and meshing.

use approx::assert_relative_eq;
use gridcrate_algorithms::{
    HoleFillerSettings, MagicFilter, MagicFilterSettings, NormalsEstimator,
    NormalsEstimatorSettings, PointCloudHoleFiller, SorFilter, SorFilterSettings,
};
use gridcrate_core::{
    Intensity, Matrix3f, Matrix4f, Normals, Point3f, PointCloud, StructuredPointCloud,
};
use gridcrate_reconstruction::{create_mesh, MeshRecSettings};

const WIDTH: usize = 40;
const HEIGHT: usize = 30;

fn intrinsic() -> Matrix3f {
    Matrix3f::from_rows([[500.0, 0.0, 20.0], [0.0, 500.0, 15.0], [0.0, 0.0, 1.0]])
}

/// Point seen at pixel `(i, j)` at depth `z` through [`intrinsic`]
fn pixel_point(i: usize, j: usize, z: f32) -> Point3f {
    Point3f::new(
        (j as f32 - 20.0) * z / 500.0,
        (i as f32 - 15.0) * z / 500.0,
        z,
    )
}

/// Wall at depth 1000 with a far blob, a spike and an enclosed hole
fn scan() -> StructuredPointCloud<'static, Point3f> {
    let points = (0..WIDTH * HEIGHT)
        .map(|idx| pixel_point(idx / WIDTH, idx % WIDTH, 1000.0))
        .collect();
    let mut pcd = StructuredPointCloud::new(points, WIDTH, HEIGHT, Point3f::default()).unwrap();

    for i in 2..4 {
        for j in 2..4 {
            pcd[(i, j)] = pixel_point(i, j, 1500.0);
        }
    }
    pcd[(20, 10)] = pixel_point(20, 10, 1200.0);
    for i in 14..17 {
        for j in 25..28 {
            pcd.invalidate(i, j);
        }
    }
    pcd
}

#[test]
fn test_full_pipeline() {
    let mut pcd = scan();
    pcd.add_property_with::<Intensity>(vec![100; WIDTH * HEIGHT])
        .unwrap();

    let magic = MagicFilterSettings::default()
        .set_width(WIDTH)
        .set_height(HEIGHT)
        .set_reduce(1)
        .set_min_area(20);
    MagicFilter::new(magic).apply(&mut pcd).unwrap();
    assert!(!pcd.point_valid(2, 2));
    assert!(!pcd.point_valid(20, 10));
    assert_eq!(pcd.valid_count(), WIDTH * HEIGHT - 9 - 4 - 1);

    let sor = SorFilterSettings::new(WIDTH, HEIGHT).with_sigma_multiplier(3.0);
    SorFilter::new(sor).apply(&mut pcd).unwrap();
    assert!(pcd.point_valid(10, 20));
    // The clean wall keeps its border and the rims of its gaps
    assert_eq!(pcd.valid_count(), WIDTH * HEIGHT - 9 - 4 - 1);
    assert!(pcd.point_valid(0, 0));
    assert!(pcd.point_valid(13, 25));

    let normals = NormalsEstimatorSettings::new(WIDTH, HEIGHT).with_window_size(3);
    NormalsEstimator::new(normals)
        .unwrap()
        .estimate(&mut pcd)
        .unwrap();
    let n = pcd.standard_property::<Normals>().unwrap()[pcd.index_of(10, 20)];
    assert_relative_eq!(n.z(), -1.0, epsilon = 1e-3);

    let filler = PointCloudHoleFiller::new(HoleFillerSettings::new(
        WIDTH,
        HEIGHT,
        intrinsic(),
        Matrix4f::identity(),
    ));
    let filled = filler.fill(&mut pcd, 20.0).unwrap();
    assert!(filled >= 9);
    assert!(pcd.point_valid(15, 26));
    assert_relative_eq!(pcd[(15, 26)].z(), 1000.0, epsilon = 1e-1);

    let compact = pcd.pointcloud();
    assert_eq!(compact.len(), pcd.valid_count());
    assert!(compact.has_property::<Normals>());
    assert_eq!(
        compact.standard_property::<Intensity>().map(<[u16]>::len),
        Some(compact.len())
    );

    let mesh = create_mesh(&compact, &MeshRecSettings::default().with_resolution(5.0)).unwrap();
    assert_eq!(mesh.n_vertices(), compact.len());
    assert!(mesh.n_faces() > compact.len());
    let n_vertices = mesh.n_vertices() as i32;
    assert!(mesh
        .faces()
        .iter()
        .all(|f| f.iter().all(|&idx| idx >= 0 && idx < n_vertices)));

    // Estimated normals point at the sensor, and so do the faces
    assert!(mesh.face_normals().iter().all(|n| n.z() < 0.0));
}

#[test]
fn test_mesh_of_dense_planar_sample() {
    let points: Vec<Point3f> = (0..20 * 20)
        .map(|idx| pixel_point(idx / 20, idx % 20, 800.0))
        .collect();
    let pcd = PointCloud::from_points(points);

    let settings = MeshRecSettings::default()
        .with_resolution(2.0)
        .with_samples_per_node(1.0);
    let mesh = create_mesh(&pcd, &settings).unwrap();

    assert_eq!(mesh.n_vertices(), 400);
    assert_eq!(mesh.vertices(), pcd.points());
    assert_eq!(mesh.n_faces(), 2 * 19 * 19);
    assert!(mesh.validate_faces().is_ok());
}

#[test]
fn test_mesh_of_empty_cloud() {
    let pcd = PointCloud::<Point3f>::new();
    let mesh = create_mesh(&pcd, &MeshRecSettings::default()).unwrap();
    assert_eq!(mesh.n_vertices(), 0);
    assert_eq!(mesh.n_faces(), 0);
}
