//! Core data structures and traits for gridcrate
//!
//! This crate provides the data model shared by every processing stage: the
//! fixed-size [`Matrix`] primitive, per-point attribute storage, unstructured
//! and grid-structured point clouds, meshes, and the collaborator traits codecs
//! implement.

pub mod error;
pub mod io;
pub mod mesh;
pub mod point;
pub mod point_cloud;
pub mod property;
pub mod roi;
pub mod structured;
pub mod traits;
pub mod transform;

pub use error::*;
pub use io::*;
pub use mesh::*;
pub use point::*;
pub use point_cloud::*;
pub use property::*;
pub use roi::*;
pub use structured::*;
pub use traits::*;
pub use transform::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Vector3};
