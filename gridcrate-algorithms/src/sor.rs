//! Statistical outlier removal on structured point clouds

use crate::grid::GridNeighborSearch;
use gridcrate_core::{NearestNeighborSearch, Point3f, Result, StructuredPointCloud};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Settings of [`SorFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SorFilterSettings {
    pub width: usize,
    pub height: usize,
    /// Neighbours averaged per point; zero disables the filter
    pub minimum_neighbours: u8,
    /// Points further than this many standard deviations above the mean
    /// neighbour distance are removed
    pub sigma_multiplier: f32,
}

impl SorFilterSettings {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            minimum_neighbours: 8,
            sigma_multiplier: 1.0,
        }
    }

    pub fn with_minimum_neighbours(mut self, minimum_neighbours: u8) -> Self {
        self.minimum_neighbours = minimum_neighbours;
        self
    }

    pub fn with_sigma_multiplier(mut self, sigma_multiplier: f32) -> Self {
        self.sigma_multiplier = sigma_multiplier;
        self
    }
}

/// Statistical outlier removal filter
///
/// For every valid point the mean distance to its `minimum_neighbours`
/// nearest valid neighbours is computed, searching a grid window around the
/// point. The mean is taken per grid step: it is divided by the mean pixel
/// distance of the same neighbours, so cells at the image border or next to
/// gaps, whose nearest neighbours sit further away on the grid, score like
/// interior cells of the same surface. Points whose score exceeds the global
/// mean by more than `sigma_multiplier` standard deviations are set to the
/// empty value, as are points that do not find enough neighbours.
///
/// # Example
/// ```rust
/// use gridcrate_core::{Point3f, StructuredPointCloud};
/// use gridcrate_algorithms::{SorFilter, SorFilterSettings};
///
/// fn main() -> gridcrate_core::Result<()> {
///     let points = (0..16)
///         .map(|idx| Point3f::new((idx % 4) as f32, (idx / 4) as f32, 10.0))
///         .collect();
///     let mut pcd = StructuredPointCloud::new(points, 4, 4, Point3f::default())?;
///
///     let settings = SorFilterSettings::new(4, 4).with_minimum_neighbours(2);
///     SorFilter::new(settings).apply(&mut pcd)?;
///     assert_eq!(pcd.valid_count(), 16);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SorFilter {
    settings: SorFilterSettings,
}

impl SorFilter {
    pub fn new(settings: SorFilterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SorFilterSettings {
        &self.settings
    }

    /// Remove statistical outliers in place
    ///
    /// # Errors
    /// A contract error if the cloud is not `width x height`.
    #[track_caller]
    pub fn apply(&self, pcd: &mut StructuredPointCloud<'_, Point3f>) -> Result<()> {
        let settings = &self.settings;
        pcd.check_dimensions(settings.width, settings.height)?;

        let k = usize::from(settings.minimum_neighbours);
        if k == 0 {
            debug!("SOR filter disabled (minimum_neighbours = 0)");
            return Ok(());
        }

        let valid = pcd.valid_count();
        if valid == 0 {
            return Ok(());
        }

        let groups = (0..pcd.len())
            .map(|idx| pcd.is_valid(idx).then_some(0))
            .collect();
        let removed = remove_statistical_outliers(pcd, k, settings.sigma_multiplier, groups, 1);
        info!("SOR filter removed {} of {} points", removed, valid);
        Ok(())
    }
}

/// Scores within `f32` rounding of the threshold are kept
const THRESHOLD_TOLERANCE: f64 = 1e-5;

/// Pixel distance between cells `a` and `b` of a grid `width` cells wide
fn grid_distance(a: usize, b: usize, width: usize) -> f32 {
    let di = (a / width).abs_diff(b / width) as f32;
    let dj = (a % width).abs_diff(b % width) as f32;
    (di * di + dj * dj).sqrt()
}

/// Running mean and standard deviation of one group, accumulated in `f64`
#[derive(Debug, Clone, Copy, Default)]
struct DistanceStats {
    count: usize,
    sum: f64,
    squared_deviation: f64,
}

impl DistanceStats {
    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn std_dev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.squared_deviation / self.count as f64).sqrt()
        }
    }
}

/// Invalidate the statistical outliers of every group of cells.
///
/// `groups` assigns each cell to one of `n_groups` groups, or to none; cells
/// outside any group are left alone. Neighbour search and statistics are both
/// restricted to a cell's own group. Returns the number of invalidated cells.
pub(crate) fn remove_statistical_outliers(
    pcd: &mut StructuredPointCloud<'_, Point3f>,
    k: usize,
    sigma_multiplier: f32,
    groups: Vec<Option<usize>>,
    n_groups: usize,
) -> usize {
    let outliers: Vec<usize> = {
        let width = pcd.width();
        let search = GridNeighborSearch::with_groups(pcd, k, groups);

        // None: the cell found fewer than k neighbours
        let means: Vec<Option<f32>> = (0..pcd.len())
            .into_par_iter()
            .map(|idx| {
                search.group(idx)?;
                let neighbours = search.find_k_nearest(idx, k);
                if neighbours.len() < k {
                    return None;
                }
                let metric: f32 = neighbours.iter().map(|(_, d)| d).sum();
                let steps: f32 = neighbours
                    .iter()
                    .map(|(n, _)| grid_distance(idx, *n, width))
                    .sum();
                Some(metric / steps)
            })
            .collect();

        let mut stats = vec![DistanceStats::default(); n_groups];
        for (idx, mean) in means.iter().enumerate() {
            if let (Some(g), Some(m)) = (search.group(idx), mean) {
                stats[g].count += 1;
                stats[g].sum += f64::from(*m);
            }
        }
        let group_means: Vec<f64> = stats.iter().map(DistanceStats::mean).collect();
        for (idx, mean) in means.iter().enumerate() {
            if let (Some(g), Some(m)) = (search.group(idx), mean) {
                stats[g].squared_deviation += (f64::from(*m) - group_means[g]).powi(2);
            }
        }

        let thresholds: Vec<f64> = stats
            .iter()
            .map(|s| {
                s.mean() * (1.0 + THRESHOLD_TOLERANCE) + f64::from(sigma_multiplier) * s.std_dev()
            })
            .collect();
        if n_groups == 1 {
            debug!(
                "SOR mean distance {:.6}, std dev {:.6}, threshold {:.6} (window radius {})",
                stats[0].mean(),
                stats[0].std_dev(),
                thresholds[0],
                search.radius()
            );
        }

        means
            .iter()
            .enumerate()
            .filter_map(|(idx, mean)| {
                let g = search.group(idx)?;
                match mean {
                    Some(m) if f64::from(*m) <= thresholds[g] => None,
                    _ => Some(idx),
                }
            })
            .collect()
    };

    for &idx in &outliers {
        pcd.invalidate_index(idx);
    }
    outliers.len()
}
