//! Normal estimation on structured point clouds

use crate::grid::window;
use gridcrate_core::{ensure, Normals, Point3f, Result, StructuredPointCloud};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which side of the surface normals point to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormalOrientation {
    /// Towards the sensor at the origin of the cloud frame
    #[default]
    TowardSensor,
    AwayFromSensor,
}

/// Settings of [`NormalsEstimator`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalsEstimatorSettings {
    pub width: usize,
    pub height: usize,
    /// Side of the square neighbourhood; odd and at least 3
    pub window_size: u8,
    /// Largest accepted angle in degrees between a normal and the line of sight
    pub max_angle: f32,
    pub filter_by_angle: bool,
    #[serde(default)]
    pub orientation: NormalOrientation,
}

impl NormalsEstimatorSettings {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            window_size: 5,
            max_angle: 80.0,
            filter_by_angle: false,
            orientation: NormalOrientation::TowardSensor,
        }
    }

    pub fn with_window_size(mut self, window_size: u8) -> Self {
        self.window_size = window_size;
        self
    }

    /// Invalidate points seen at more than `max_angle` degrees
    pub fn with_angle_filter(mut self, max_angle: f32) -> Self {
        self.max_angle = max_angle;
        self.filter_by_angle = true;
        self
    }

    pub fn with_orientation(mut self, orientation: NormalOrientation) -> Self {
        self.orientation = orientation;
        self
    }
}

/// Estimates per-point normals by fitting a plane to each grid neighbourhood
#[derive(Debug, Clone)]
pub struct NormalsEstimator {
    settings: NormalsEstimatorSettings,
}

impl NormalsEstimator {
    /// # Errors
    /// A contract error unless `window_size` is odd and at least 3.
    #[track_caller]
    pub fn new(settings: NormalsEstimatorSettings) -> Result<Self> {
        ensure(
            settings.window_size >= 3 && settings.window_size % 2 == 1,
            format!(
                "window size must be odd and at least 3, got {}",
                settings.window_size
            ),
        )?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &NormalsEstimatorSettings {
        &self.settings
    }

    /// Attach a [`Normals`] property to `pcd`, replacing any existing one.
    ///
    /// Cells without a measurement, or whose neighbourhood is too sparse or
    /// degenerate for a plane fit, get the zero normal.
    #[track_caller]
    pub fn estimate(&self, pcd: &mut StructuredPointCloud<'_, Point3f>) -> Result<()> {
        let settings = &self.settings;
        pcd.check_dimensions(settings.width, settings.height)?;

        let radius = usize::from(settings.window_size / 2);
        let (width, height) = (pcd.width(), pcd.height());
        let cloud = &*pcd;

        let mut normals: Vec<Point3f> = (0..cloud.len())
            .into_par_iter()
            .map(|idx| {
                if !cloud.is_valid(idx) {
                    return Point3f::default();
                }
                let (rows, cols) = window((idx / width, idx % width), radius, width, height);
                let neighbourhood: Vec<Vector3<f32>> = rows
                    .flat_map(|i| cols.clone().map(move |j| i * width + j))
                    .filter(|&n| cloud.is_valid(n))
                    .map(|n| cloud[n].to_vector())
                    .collect();

                let Some(normal) = fit_plane_normal(&neighbourhood) else {
                    return Point3f::default();
                };
                let to_sensor = -cloud[idx].to_vector();
                let toward = normal.dot(&to_sensor) >= 0.0;
                let flip = match settings.orientation {
                    NormalOrientation::TowardSensor => !toward,
                    NormalOrientation::AwayFromSensor => toward,
                };
                Point3f::from(if flip { -normal } else { normal })
            })
            .collect();

        let degenerate = (0..pcd.len())
            .filter(|&idx| pcd.is_valid(idx) && normals[idx] == Point3f::default())
            .count();
        debug!(
            "Estimated normals with a {}x{} window, {} degenerate neighbourhoods",
            settings.window_size, settings.window_size, degenerate
        );

        let mut rejected = Vec::new();
        if settings.filter_by_angle {
            let max_cos = settings.max_angle.to_radians().cos();
            for (idx, normal) in normals.iter_mut().enumerate() {
                if *normal == Point3f::default() {
                    continue;
                }
                let Some(line_of_sight) = pcd[idx].to_vector().try_normalize(f32::EPSILON) else {
                    continue;
                };
                if normal.to_vector().dot(&line_of_sight).abs() < max_cos {
                    *normal = Point3f::default();
                    rejected.push(idx);
                }
            }
        }

        pcd.set_property::<Normals>(normals)?;
        for &idx in &rejected {
            pcd.invalidate_index(idx);
        }

        if settings.filter_by_angle {
            info!(
                "Estimated normals for {} points, rejected {} beyond {} degrees",
                pcd.valid_count() + rejected.len(),
                rejected.len(),
                settings.max_angle
            );
        } else {
            info!("Estimated normals for {} points", pcd.valid_count());
        }
        Ok(())
    }
}

/// Unit normal of the least-squares plane through `points`, or `None` for
/// fewer than 3 points or a collinear or coincident set
pub(crate) fn fit_plane_normal(points: &[Vector3<f32>]) -> Option<Vector3<f32>> {
    if points.len() < 3 {
        return None;
    }

    let centroid = points.iter().sum::<Vector3<f32>>() / points.len() as f32;
    let mut covariance = Matrix3::zeros();
    for p in points {
        let diff = p - centroid;
        covariance += diff * diff.transpose();
    }

    let eigen = covariance.symmetric_eigen();
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let (middle, largest) = (eigen.eigenvalues[order[1]], eigen.eigenvalues[order[2]]);

    // A plane needs two significant directions of spread
    if largest <= f32::EPSILON || middle <= largest * 1e-6 {
        return None;
    }

    eigen
        .eigenvectors
        .column(order[0])
        .into_owned()
        .try_normalize(f32::EPSILON)
}
