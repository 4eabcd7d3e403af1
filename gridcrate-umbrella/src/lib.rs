//! # Gridcrate
//!
//! Processing of structured range images for Rust.
//!
//! This is the umbrella crate that provides convenient access to all gridcrate
//! functionality. You can use this crate to get everything in one place, or use
//! individual crates for more granular control over dependencies.
//!
//! ## Features
//!
//! - **Core**: Data model (Matrix, PointCloud, StructuredPointCloud, Mesh, properties)
//! - **Algorithms**: Outlier filters, normal estimation and hole filling
//! - **Reconstruction**: Meshing of cleaned point clouds
//!
//! ## Quick Start
//!
//! ```rust
//! use gridcrate::prelude::*;
//!
//! fn main() -> Result<()> {
//!     // A 4x4 frame from the sensor, one cell without a measurement
//!     let points = (0..16)
//!         .map(|idx| Point3f::new((idx % 4) as f32, (idx / 4) as f32, 10.0))
//!         .collect();
//!     let mut frame = StructuredPointCloud::new(points, 4, 4, Point3f::default())?;
//!     frame.invalidate(1, 1);
//!
//!     let settings = SorFilterSettings::new(4, 4).with_minimum_neighbours(2);
//!     SorFilter::new(settings).apply(&mut frame)?;
//!
//!     let settings = NormalsEstimatorSettings::new(4, 4).with_window_size(3);
//!     NormalsEstimator::new(settings)?.estimate(&mut frame)?;
//!
//!     let mesh = create_mesh(&frame.pointcloud(), &MeshRecSettings::default())?;
//!     assert_eq!(mesh.n_vertices(), frame.valid_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables algorithms and reconstruction
//! - `algorithms`: Filters, normal estimation and hole filling
//! - `reconstruction`: Mesh reconstruction
//! - `all`: Enables all features

// Re-export core functionality
pub use gridcrate_core::*;

// Re-export sub-crates
#[cfg(feature = "algorithms")]
pub use gridcrate_algorithms as algorithms;

#[cfg(feature = "reconstruction")]
pub use gridcrate_reconstruction as reconstruction;

/// Convenient imports for common use cases
pub mod prelude {
    pub use gridcrate_core::*;

    #[cfg(feature = "algorithms")]
    pub use gridcrate_algorithms::*;

    #[cfg(feature = "reconstruction")]
    pub use gridcrate_reconstruction::{create_mesh, MeshRecSettings};
}
