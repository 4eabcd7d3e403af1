//! Core traits for gridcrate

use crate::mesh::Mesh3f;
use crate::point::Point3f;
use crate::point_cloud::{PointCloud, PointCloudBase};
use crate::property::Normals;
use crate::structured::StructuredPointCloud;
use crate::transform::Transform3D;

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Find up to `k` nearest neighbors of the point at index `query`,
    /// excluding the point itself, sorted by increasing distance
    fn find_k_nearest(&self, query: usize, k: usize) -> Vec<(usize, f32)>;
}

/// Axis-aligned extent of a set of points
pub trait BoundingBox {
    /// Get the `(min, max)` corners, or `None` without points
    fn bounding_box(&self) -> Option<(Point3f, Point3f)>;

    /// Get the center point of the object
    fn center(&self) -> Option<Point3f> {
        let (min, max) = self.bounding_box()?;
        Some(Point3f::new(
            (min.x() + max.x()) / 2.0,
            (min.y() + max.y()) / 2.0,
            (min.z() + max.z()) / 2.0,
        ))
    }
}

/// Trait for objects that can be transformed
pub trait Transformable {
    /// Apply a transformation to the object
    fn transform(&mut self, transform: &Transform3D);
}

fn bounds<'p>(points: impl Iterator<Item = &'p Point3f>) -> Option<(Point3f, Point3f)> {
    points.fold(None, |acc, p| {
        let (mut min, mut max) = acc.unwrap_or((*p, *p));
        for k in 0..3 {
            min[k] = min[k].min(p[k]);
            max[k] = max[k].max(p[k]);
        }
        Some((min, max))
    })
}

impl BoundingBox for PointCloudBase<'_, Point3f> {
    fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        bounds(self.iter())
    }
}

/// Empty cells are ignored
impl BoundingBox for StructuredPointCloud<'_, Point3f> {
    fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        let empty = *self.empty_value();
        bounds(self.iter().filter(|p| **p != empty))
    }
}

fn transform_points<'p>(points: impl Iterator<Item = &'p mut Point3f>, transform: &Transform3D) {
    for point in points {
        *point = transform.transform_point(point);
    }
}

fn transform_normals(base: &mut PointCloudBase<'_, Point3f>, transform: &Transform3D) {
    if let Some(normals) = base.standard_property_mut::<Normals>() {
        for n in normals.iter_mut() {
            let v = transform.transform_vector(&n.to_vector());
            *n = Point3f::from(v.try_normalize(f32::EPSILON).unwrap_or(v));
        }
    }
}

impl Transformable for PointCloud<'_, Point3f> {
    fn transform(&mut self, transform: &Transform3D) {
        transform_points(self.iter_mut(), transform);
        transform_normals(self, transform);
    }
}

/// Empty cells keep the sentinel value
impl Transformable for StructuredPointCloud<'_, Point3f> {
    fn transform(&mut self, transform: &Transform3D) {
        let empty = *self.empty_value();
        transform_points(self.iter_mut().filter(|p| **p != empty), transform);
        transform_normals(self, transform);
    }
}

impl Transformable for Mesh3f<'_> {
    fn transform(&mut self, transform: &Transform3D) {
        transform_points(self.iter_mut(), transform);
        transform_normals(self, transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_bounding_box() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(-1.0, 2.0, 0.5),
            Point3f::new(3.0, -2.0, 1.5),
        ]);
        let (min, max) = cloud.bounding_box().unwrap();
        assert_eq!(min, Point3f::new(-1.0, -2.0, 0.5));
        assert_eq!(max, Point3f::new(3.0, 2.0, 1.5));
        assert_eq!(cloud.center(), Some(Point3f::new(1.0, 0.0, 1.0)));

        assert!(PointCloud::<Point3f>::new().bounding_box().is_none());
    }

    #[test]
    fn test_structured_bounding_box_skips_empty_cells() {
        let mut pcd = StructuredPointCloud::filled(2, 2, Point3f::default());
        pcd[(0, 0)] = Point3f::new(1.0, 1.0, 1.0);
        pcd[(1, 1)] = Point3f::new(2.0, 3.0, 4.0);

        let (min, max) = pcd.bounding_box().unwrap();
        assert_eq!(min, Point3f::new(1.0, 1.0, 1.0));
        assert_eq!(max, Point3f::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_transform_moves_points_and_rotates_normals() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let rotation = crate::point::Quaternionf::new(0.0, 0.0, half, half);
        let t = Transform3D::from_quaternion(rotation, Vector3::new(0.0, 0.0, 1.0));

        let mut cloud = PointCloud::from_points(vec![Point3f::new(1.0, 0.0, 0.0)]);
        cloud
            .add_property_with::<Normals>(vec![Point3f::new(1.0, 0.0, 0.0)])
            .unwrap();
        cloud.transform(&t);

        assert_relative_eq!(cloud[0].to_vector(), Vector3::new(0.0, 1.0, 1.0), epsilon = 1e-6);
        let n = cloud.standard_property::<Normals>().unwrap()[0];
        assert_relative_eq!(n.to_vector(), Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_structured_transform_keeps_sentinel() {
        let mut pcd = StructuredPointCloud::filled(2, 1, Point3f::default());
        pcd[(0, 1)] = Point3f::new(1.0, 1.0, 1.0);
        pcd.transform(&Transform3D::translation(Vector3::new(1.0, 0.0, 0.0)));

        assert!(!pcd.point_valid(0, 0));
        assert_eq!(pcd[(0, 1)], Point3f::new(2.0, 1.0, 1.0));
    }
}
