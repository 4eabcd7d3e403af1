//! # Gridcrate Reconstruction
//!
//! Surface reconstruction for cleaned point clouds.
//!
//! [`create_mesh`] triangulates a point cloud over its own points: the cloud
//! is projected to the plane, Delaunay-triangulated, and triangles not
//! supported by the local sampling density are dropped.

pub mod create_mesh;
pub mod delaunay;
pub mod parallel;

// Re-export commonly used items
pub use create_mesh::*;
pub use delaunay::{delaunay_triangulation_2d, project_3d_to_2d, ProjectionMethod};
