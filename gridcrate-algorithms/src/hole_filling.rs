//! Filling of small enclosed holes using the camera model

use crate::grid::{label_components, offset_cell, Connectivity};
use gridcrate_core::{
    Error, Matrix3f, Matrix4f, Point3f, Result, StructuredPointCloud, Transform3D,
};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Settings of [`PointCloudHoleFiller`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoleFillerSettings {
    pub width: usize,
    pub height: usize,
    /// Camera matrix mapping camera-frame rays to pixels `(column, row, 1)`
    pub intrinsic: Matrix3f,
    /// Rigid transform from the cloud frame to the camera frame
    pub extrinsic: Matrix4f,
}

impl HoleFillerSettings {
    pub fn new(width: usize, height: usize, intrinsic: Matrix3f, extrinsic: Matrix4f) -> Self {
        Self {
            width,
            height,
            intrinsic,
            extrinsic,
        }
    }
}

/// Synthesizes points inside small regions of empty cells
///
/// A hole is a 4-connected region of empty cells that does not touch the
/// image border. Its rim is the set of valid cells edge-adjacent to it. Holes
/// whose rim fits in a sphere of `max_hole_radius` around the rim centroid are
/// filled: each cell receives a camera depth interpolated from the rim by
/// inverse squared pixel distance and is back-projected along its pixel ray.
#[derive(Debug, Clone)]
pub struct PointCloudHoleFiller {
    settings: HoleFillerSettings,
}

/// Camera model with both directions precomputed
struct Camera {
    extrinsic: Transform3D,
    extrinsic_inv: Transform3D,
    intrinsic_inv: Matrix3<f32>,
}

impl Camera {
    fn depth(&self, p: &Point3f) -> f32 {
        self.extrinsic.transform_point(p).z()
    }

    /// Cloud-frame point seen at pixel `(i, j)` at camera depth `depth`
    fn back_project(&self, (i, j): (usize, usize), depth: f32) -> Option<Point3f> {
        let ray = self.intrinsic_inv * Vector3::new(j as f32, i as f32, 1.0);
        if ray.z.abs() <= f32::EPSILON {
            return None;
        }
        let in_camera = Point3f::from(ray * (depth / ray.z));
        Some(self.extrinsic_inv.transform_point(&in_camera))
    }
}

impl PointCloudHoleFiller {
    pub fn new(settings: HoleFillerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &HoleFillerSettings {
        &self.settings
    }

    /// Fill the holes of `pcd` no larger than `max_hole_radius`, in cloud units.
    ///
    /// Attributes of filled cells keep their existing values. Returns the
    /// number of filled cells.
    ///
    /// # Errors
    /// A contract error if the cloud is not `width x height` or if either
    /// camera matrix is singular.
    #[track_caller]
    pub fn fill(
        &self,
        pcd: &mut StructuredPointCloud<'_, Point3f>,
        max_hole_radius: f32,
    ) -> Result<usize> {
        let settings = &self.settings;
        pcd.check_dimensions(settings.width, settings.height)?;

        let Some(intrinsic_inv) = Matrix3::<f32>::from(settings.intrinsic).try_inverse() else {
            return Err(Error::contract("intrinsic matrix is singular"));
        };
        let extrinsic = Transform3D::from(settings.extrinsic);
        let Some(extrinsic_inv) = extrinsic.inverse() else {
            return Err(Error::contract("extrinsic matrix is singular"));
        };
        let camera = Camera {
            extrinsic,
            extrinsic_inv,
            intrinsic_inv,
        };

        let (width, height) = (pcd.width(), pcd.height());
        let components = label_components(
            width,
            height,
            Connectivity::Four,
            |idx| !pcd.is_valid(idx),
            |_, _| true,
        );
        let regions = components.members();
        let cloud = &*pcd;

        let filled: Vec<Option<Vec<(usize, Point3f)>>> = regions
            .par_iter()
            .map(|cells| fill_region(cloud, &camera, cells, max_hole_radius))
            .collect();

        let accepted = filled.iter().flatten().count();
        debug!(
            "Hole filler: {} empty regions, {} accepted with radius <= {}",
            regions.len(),
            accepted,
            max_hole_radius
        );

        let mut count = 0;
        for (idx, point) in filled.into_iter().flatten().flatten() {
            pcd[idx] = point;
            count += 1;
        }

        info!("Hole filler filled {} cells in {} holes", count, accepted);
        Ok(count)
    }
}

/// New points for one empty region, or `None` if it is not a fillable hole
fn fill_region(
    pcd: &StructuredPointCloud<'_, Point3f>,
    camera: &Camera,
    cells: &[usize],
    max_hole_radius: f32,
) -> Option<Vec<(usize, Point3f)>> {
    let (width, height) = (pcd.width(), pcd.height());
    let on_border = |idx: usize| {
        let (i, j) = (idx / width, idx % width);
        i == 0 || j == 0 || i + 1 == height || j + 1 == width
    };
    if cells.iter().any(|&idx| on_border(idx)) {
        return None;
    }

    let mut rim: Vec<usize> = cells
        .iter()
        .flat_map(|&idx| {
            Connectivity::Four
                .offsets()
                .iter()
                .filter_map(move |&offset| {
                    offset_cell((idx / width, idx % width), offset, width, height)
                })
        })
        .map(|(i, j)| i * width + j)
        .filter(|&n| pcd.is_valid(n))
        .collect();
    rim.sort_unstable();
    rim.dedup();
    if rim.len() < 3 {
        return None;
    }

    let centroid =
        rim.iter().map(|&n| pcd[n].to_vector()).sum::<Vector3<f32>>() / rim.len() as f32;
    let radius = rim
        .iter()
        .map(|&n| (pcd[n].to_vector() - centroid).norm())
        .fold(0.0f32, f32::max);
    if radius > max_hole_radius {
        return None;
    }

    let rim_depths: Vec<((usize, usize), f32)> = rim
        .iter()
        .map(|&n| ((n / width, n % width), camera.depth(&pcd[n])))
        .collect();

    let points = cells
        .iter()
        .filter_map(|&idx| {
            let (i, j) = (idx / width, idx % width);
            let (weighted, total) = rim_depths.iter().fold(
                (0.0f32, 0.0f32),
                |(weighted, total), &((ri, rj), depth)| {
                    let di = ri as f32 - i as f32;
                    let dj = rj as f32 - j as f32;
                    let w = 1.0 / (di * di + dj * dj);
                    (weighted + w * depth, total + w)
                },
            );
            camera
                .back_project((i, j), weighted / total)
                .map(|p| (idx, p))
        })
        .collect();
    Some(points)
}
