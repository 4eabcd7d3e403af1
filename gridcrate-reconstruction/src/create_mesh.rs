//! Mesh reconstruction from a cleaned point cloud

use crate::delaunay::{delaunay_triangulation_2d, project_3d_to_2d, ProjectionMethod};
use crate::parallel;
use gridcrate_core::{
    ensure, Error, Intensity, Mesh3f, Normals, Point3f, Point3i, PointCloud, Result,
};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Settings of [`create_mesh`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshRecSettings {
    /// Voxel edge length, and the largest circumradius of a supported triangle
    pub resolution: f32,
    /// Mean number of points per voxel a triangle's vertices must see
    pub samples_per_node: f32,
    /// Also keep unsupported triangles up to this circumradius
    pub max_hole_radius: Option<f32>,
}

impl Default for MeshRecSettings {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            samples_per_node: 1.0,
            max_hole_radius: None,
        }
    }
}

impl MeshRecSettings {
    pub fn with_resolution(mut self, resolution: f32) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_samples_per_node(mut self, samples_per_node: f32) -> Self {
        self.samples_per_node = samples_per_node;
        self
    }

    pub fn with_max_hole_radius(mut self, max_hole_radius: f32) -> Self {
        self.max_hole_radius = Some(max_hole_radius);
        self
    }
}

type Voxel = (i64, i64, i64);

fn voxel_of(p: &Point3f, resolution: f32) -> Voxel {
    let cell = |v: f32| (v / resolution).floor() as i64;
    (cell(p.x()), cell(p.y()), cell(p.z()))
}

/// Circumradius of a 3D triangle, infinite for degenerate ones
fn circumradius(a: &Vector3<f32>, b: &Vector3<f32>, c: &Vector3<f32>) -> f32 {
    let double_area = (b - a).cross(&(c - a)).norm();
    if double_area <= f32::EPSILON {
        return f32::INFINITY;
    }
    (b - a).norm() * (c - b).norm() * (a - c).norm() / (2.0 * double_area)
}

/// Triangulate `pcd` into a mesh over its own points.
///
/// The points are projected to the plane and Delaunay-triangulated. A
/// triangle survives when its circumradius is at most `resolution` and its
/// vertices' voxels hold on average at least `samples_per_node` points, or,
/// with `max_hole_radius` set, when its circumradius is at most that radius.
/// Faces are wound to agree with the input normals where present, and to face
/// the sensor origin otherwise.
///
/// The mesh vertices are the input points in input order; `Normals` and
/// `Intensity` are carried over.
///
/// # Example
/// ```rust
/// use gridcrate_core::{Point3f, PointCloud};
/// use gridcrate_reconstruction::{create_mesh, MeshRecSettings};
///
/// fn main() -> gridcrate_core::Result<()> {
///     let points = (0..16)
///         .map(|idx| Point3f::new((idx % 4) as f32, (idx / 4) as f32, 5.0))
///         .collect();
///     let pcd = PointCloud::from_points(points);
///
///     let mesh = create_mesh(&pcd, &MeshRecSettings::default())?;
///     assert_eq!(mesh.n_vertices(), 16);
///     assert_eq!(mesh.n_faces(), 18);
///     Ok(())
/// }
/// ```
///
/// # Errors
/// A contract error if `resolution` is not positive or `samples_per_node` is
/// negative.
#[track_caller]
pub fn create_mesh(
    pcd: &PointCloud<'_, Point3f>,
    settings: &MeshRecSettings,
) -> Result<Mesh3f<'static>> {
    ensure(
        settings.resolution > 0.0,
        format!("resolution must be positive, got {}", settings.resolution),
    )?;
    ensure(
        settings.samples_per_node >= 0.0,
        format!(
            "samples_per_node must not be negative, got {}",
            settings.samples_per_node
        ),
    )?;

    let points = pcd.points();
    let mut mesh = if points.len() < 3 {
        debug!("{} points are too few to triangulate", points.len());
        Mesh3f::from_parts(points.to_vec(), Vec::new())
    } else {
        let faces = triangulate(pcd, settings)?;
        Mesh3f::from_parts(points.to_vec(), faces)
    };

    if let Some(normals) = pcd.standard_property::<Normals>() {
        mesh.add_property_with::<Normals>(normals.to_vec())?;
    }
    if let Some(intensity) = pcd.standard_property::<Intensity>() {
        mesh.add_property_with::<Intensity>(intensity.to_vec())?;
    }
    mesh.validate_faces()?;

    info!(
        "Reconstructed mesh with {} vertices and {} faces",
        mesh.n_vertices(),
        mesh.n_faces()
    );
    Ok(mesh)
}

fn triangulate(pcd: &PointCloud<'_, Point3f>, settings: &MeshRecSettings) -> Result<Vec<Point3i>> {
    let points = pcd.points();
    let method = ProjectionMethod::select(points);
    let projected = project_3d_to_2d(points, method);
    let triangles = delaunay_triangulation_2d(&projected);

    let mut occupancy: HashMap<Voxel, usize> = HashMap::new();
    for p in points {
        *occupancy.entry(voxel_of(p, settings.resolution)).or_default() += 1;
    }
    let density: Vec<f32> = points
        .iter()
        .map(|p| occupancy[&voxel_of(p, settings.resolution)] as f32)
        .collect();

    let normals = pcd.standard_property::<Normals>();
    let kept: Vec<Option<[usize; 3]>> = parallel::parallel_map(&triangles, |&[a, b, c]| {
        let (pa, pb, pc) = (
            points[a].to_vector(),
            points[b].to_vector(),
            points[c].to_vector(),
        );
        let radius = circumradius(&pa, &pb, &pc);
        let mean_density = (density[a] + density[b] + density[c]) / 3.0;
        let supported =
            radius <= settings.resolution && mean_density >= settings.samples_per_node;
        let gap_fill = settings.max_hole_radius.is_some_and(|r| radius <= r);
        if !(supported || gap_fill) {
            return None;
        }

        let face_normal = (pb - pa).cross(&(pc - pa));
        let reference = normals
            .map(|n| n[a].to_vector() + n[b].to_vector() + n[c].to_vector())
            .filter(|n| n.norm() > f32::EPSILON)
            .unwrap_or_else(|| -(pa + pb + pc));
        Some(if face_normal.dot(&reference) < 0.0 {
            [a, c, b]
        } else {
            [a, b, c]
        })
    });

    debug!(
        "{} Delaunay triangles from {:?} projection, {} kept at resolution {}",
        triangles.len(),
        method,
        kept.iter().flatten().count(),
        settings.resolution
    );

    kept.into_iter()
        .flatten()
        .map(|[a, b, c]| Ok(Point3i::new(face_index(a)?, face_index(b)?, face_index(c)?)))
        .collect()
}

fn face_index(index: usize) -> Result<i32> {
    i32::try_from(index)
        .map_err(|_| Error::InvalidData(format!("vertex index {} does not fit a face", index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `n x n` grid with unit spacing on the plane `z`
    fn grid(n: usize, z: f32) -> PointCloud<'static, Point3f> {
        (0..n * n)
            .map(|idx| Point3f::new((idx % n) as f32, (idx / n) as f32, z))
            .collect()
    }

    fn normals_of(mesh: &Mesh3f<'_>) -> Vec<Vector3<f32>> {
        mesh.face_normals().iter().map(Point3f::to_vector).collect()
    }

    #[test]
    fn test_invalid_settings() {
        let pcd = grid(3, 1.0);
        let err = create_mesh(&pcd, &MeshRecSettings::default().with_resolution(0.0)).unwrap_err();
        assert!(err.is_contract());

        let err = create_mesh(&pcd, &MeshRecSettings::default().with_samples_per_node(-1.0))
            .unwrap_err();
        assert!(err.is_contract());
    }

    #[test]
    fn test_too_few_points() {
        let pcd: PointCloud<Point3f> =
            vec![Point3f::new(0.0, 0.0, 1.0), Point3f::new(1.0, 0.0, 1.0)].into();
        let mesh = create_mesh(&pcd, &MeshRecSettings::default()).unwrap();
        assert_eq!(mesh.n_vertices(), 2);
        assert_eq!(mesh.n_faces(), 0);
    }

    #[test]
    fn test_dense_plane_faces_sensor() {
        let pcd = grid(10, 1.0);
        let mesh = create_mesh(&pcd, &MeshRecSettings::default()).unwrap();

        assert_eq!(mesh.n_vertices(), 100);
        assert_eq!(mesh.vertices(), pcd.points());
        assert_eq!(mesh.n_faces(), 2 * 9 * 9);
        assert!(normals_of(&mesh).iter().all(|n| n.z < 0.0));
    }

    #[test]
    fn test_winding_follows_normals() {
        let mut pcd = grid(5, 1.0);
        pcd.add_property_with::<Normals>(vec![Point3f::new(0.0, 0.0, 1.0); 25])
            .unwrap();

        let mesh = create_mesh(&pcd, &MeshRecSettings::default()).unwrap();
        assert_eq!(mesh.n_faces(), 32);
        assert!(normals_of(&mesh).iter().all(|n| n.z > 0.0));
        assert!(mesh.has_property::<Normals>());
    }

    #[test]
    fn test_coarse_triangles_dropped_unless_gap_filled() {
        let pcd = grid(5, 1.0);

        // Unit right triangles have a circumradius of about 0.71
        let fine = MeshRecSettings::default().with_resolution(0.5);
        assert_eq!(create_mesh(&pcd, &fine).unwrap().n_faces(), 0);

        let gap_filled = fine.with_max_hole_radius(1.0);
        assert_eq!(create_mesh(&pcd, &gap_filled).unwrap().n_faces(), 32);
    }

    #[test]
    fn test_sparse_voxels_unsupported() {
        let pcd = grid(5, 1.0);
        let settings = MeshRecSettings::default().with_samples_per_node(5.0);
        assert_eq!(create_mesh(&pcd, &settings).unwrap().n_faces(), 0);
    }

    #[test]
    fn test_intensity_carried_over() {
        let mut pcd = grid(4, 2.0);
        let intensity: Vec<u16> = (0..16).collect();
        pcd.add_property_with::<Intensity>(intensity.clone()).unwrap();

        let mesh = create_mesh(&pcd, &MeshRecSettings::default()).unwrap();
        assert_eq!(mesh.standard_property::<Intensity>(), Some(&intensity[..]));
        assert!(!mesh.has_property::<Normals>());
    }

    #[test]
    fn test_plane_through_sensor_uses_pca() {
        let pcd = grid(6, 0.0);
        let mesh = create_mesh(&pcd, &MeshRecSettings::default()).unwrap();

        assert_eq!(mesh.n_vertices(), 36);
        assert!(mesh.n_faces() > 0);
        assert!(mesh.validate_faces().is_ok());
    }

    #[test]
    fn test_circumradius() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(2.0, 0.0, 0.0);
        let c = Vector3::new(0.0, 2.0, 0.0);
        assert!((circumradius(&a, &b, &c) - 2.0f32.sqrt()).abs() < 1e-6);
        assert!(circumradius(&a, &b, &(b * 2.0)).is_infinite());
    }
}
