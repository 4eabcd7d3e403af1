//! Interfaces to file codecs and other producers/consumers of point data
//!
//! Codecs live outside this crate; they only need to implement these traits to
//! be driven by [`PointCloud::write_to`](crate::PointCloud::write_to),
//! [`PointCloud::read_from`](crate::PointCloud::read_from) and the mesh
//! equivalents.

use crate::error::Result;
use crate::point::{Point3f, Point3i};

/// Sink for point cloud and mesh data
pub trait PointCloudWriter {
    fn write_vertices(&mut self, vertices: &[Point3f]) -> Result<()>;

    fn write_normals(&mut self, normals: &[Point3f]) -> Result<()>;

    fn write_faces(&mut self, faces: &[Point3i]) -> Result<()>;

    fn write_intensity(&mut self, intensity: &[u16]) -> Result<()>;
}

/// Source of point cloud and mesh data
///
/// Every method returns `None` when the source does not carry that data.
pub trait PointCloudReader {
    fn read_points(&mut self) -> Option<Vec<Point3f>>;

    fn read_point_normals(&mut self) -> Option<Vec<Point3f>>;

    fn read_faces(&mut self) -> Option<Vec<Point3i>>;

    fn read_intensity(&mut self) -> Option<Vec<u16>>;
}
