//! # Gridcrate Algorithms
//!
//! Processing stages for structured point clouds.
//!
//! Every stage works in place on a [`gridcrate_core::StructuredPointCloud`]
//! whose dimensions match its settings. Filters remove points by setting them
//! to the cloud's empty value; the normals estimator attaches a
//! [`gridcrate_core::Normals`] property; the hole filler synthesizes points
//! inside small enclosed gaps.

pub mod grid;
pub mod hole_filling;
pub mod magic;
pub mod magic_sor;
pub mod normals;
pub mod sor;

// Re-export commonly used items
pub use grid::{label_components, Components, Connectivity, GridNeighborSearch};
pub use hole_filling::*;
pub use magic::*;
pub use magic_sor::*;
pub use normals::*;
pub use sor::*;
