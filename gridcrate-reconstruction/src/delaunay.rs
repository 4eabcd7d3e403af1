//! Delaunay triangulation of projected point clouds
//!
//! Points are mapped to the plane, either along the sensor view rays or onto
//! their principal plane, and triangulated there with `spade`. Every planar
//! vertex carries the index of the 3D point it came from.

use crate::parallel;
use gridcrate_core::Point3f;
use nalgebra::{Matrix3, Vector3};
use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation};
use tracing::debug;

/// Projection methods for 3D to 2D mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMethod {
    /// Along the sensor view rays, `(x / z, y / z)`
    Perspective,
    /// Onto the plane of the two largest principal components
    Pca,
}

impl ProjectionMethod {
    /// Perspective when every point lies in front of the sensor, PCA otherwise
    pub fn select(points: &[Point3f]) -> Self {
        if !points.is_empty() && points.iter().all(|p| p.z() > 0.0) {
            ProjectionMethod::Perspective
        } else {
            ProjectionMethod::Pca
        }
    }
}

/// Planar vertex remembering its source point
#[derive(Debug, Clone, Copy)]
struct IndexedVertex {
    position: Point2<f64>,
    index: usize,
}

impl HasPosition for IndexedVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

/// Project 3D points to 2D using the given method
pub fn project_3d_to_2d(points: &[Point3f], method: ProjectionMethod) -> Vec<Point2<f64>> {
    match method {
        ProjectionMethod::Perspective => parallel::parallel_map(points, |p| {
            Point2::new(f64::from(p.x() / p.z()), f64::from(p.y() / p.z()))
        }),
        ProjectionMethod::Pca => project_using_pca(points),
    }
}

/// Project points onto the plane spanned by their two main directions
fn project_using_pca(points: &[Point3f]) -> Vec<Point2<f64>> {
    if points.is_empty() {
        return Vec::new();
    }

    let centroid =
        points.iter().map(Point3f::to_vector).sum::<Vector3<f32>>() / points.len() as f32;
    let mut covariance = Matrix3::zeros();
    for point in points {
        let diff = point.to_vector() - centroid;
        covariance += diff * diff.transpose();
    }

    let eigen = covariance.symmetric_eigen();
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let u: Vector3<f32> = eigen.eigenvectors.column(order[0]).into_owned();
    let v: Vector3<f32> = eigen.eigenvectors.column(order[1]).into_owned();

    parallel::parallel_map(points, |point| {
        let diff = point.to_vector() - centroid;
        Point2::new(f64::from(diff.dot(&u)), f64::from(diff.dot(&v)))
    })
}

/// Delaunay triangles of `projected`, as indices into the input.
///
/// Non-finite positions and positions `spade` rejects are left out of the
/// triangulation. Of several points projecting to the same position only the
/// last is used. Triangles are counterclockwise in the plane.
pub fn delaunay_triangulation_2d(projected: &[Point2<f64>]) -> Vec<[usize; 3]> {
    let mut triangulation: DelaunayTriangulation<IndexedVertex> = DelaunayTriangulation::new();

    let mut skipped = 0;
    for (index, &position) in projected.iter().enumerate() {
        if !(position.x.is_finite() && position.y.is_finite()) {
            skipped += 1;
            continue;
        }
        if let Err(e) = triangulation.insert(IndexedVertex { position, index }) {
            debug!("Skipping point {} in Delaunay triangulation: {:?}", index, e);
            skipped += 1;
        }
    }
    if skipped > 0 {
        debug!("{} of {} points left out of the triangulation", skipped, projected.len());
    }

    triangulation
        .inner_faces()
        .map(|face| face.vertices().map(|v| v.data().index))
        .collect()
}
