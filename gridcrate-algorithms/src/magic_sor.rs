//! Cluster-aware statistical outlier removal

use crate::grid::{label_components, Connectivity};
use crate::sor::remove_statistical_outliers;
use gridcrate_core::{Point3f, Result, StructuredPointCloud};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Settings of [`MagicSorFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagicSorFilterSettings {
    pub width: usize,
    pub height: usize,
    /// Clusters of fewer valid cells are removed outright
    pub minimal_cluster_size: usize,
    pub sigma_multiplier: f32,
    /// Neighbours averaged per point; zero skips the statistical pass
    pub minimum_neighbours: u8,
}

impl MagicSorFilterSettings {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            minimal_cluster_size: 20,
            sigma_multiplier: 1.0,
            minimum_neighbours: 8,
        }
    }

    pub fn with_minimal_cluster_size(mut self, minimal_cluster_size: usize) -> Self {
        self.minimal_cluster_size = minimal_cluster_size;
        self
    }

    pub fn with_sigma_multiplier(mut self, sigma_multiplier: f32) -> Self {
        self.sigma_multiplier = sigma_multiplier;
        self
    }

    pub fn with_minimum_neighbours(mut self, minimum_neighbours: u8) -> Self {
        self.minimum_neighbours = minimum_neighbours;
        self
    }
}

/// Drops small clusters of valid cells, then runs statistical outlier
/// removal inside every surviving cluster
#[derive(Debug, Clone)]
pub struct MagicSorFilter {
    settings: MagicSorFilterSettings,
}

impl MagicSorFilter {
    pub fn new(settings: MagicSorFilterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MagicSorFilterSettings {
        &self.settings
    }

    #[track_caller]
    pub fn apply(&self, pcd: &mut StructuredPointCloud<'_, Point3f>) -> Result<()> {
        let settings = &self.settings;
        pcd.check_dimensions(settings.width, settings.height)?;

        let valid = pcd.valid_count();
        if valid == 0 {
            return Ok(());
        }

        let components = label_components(
            pcd.width(),
            pcd.height(),
            Connectivity::Eight,
            |idx| pcd.is_valid(idx),
            |_, _| true,
        );

        // Surviving clusters are renumbered densely so statistics stay compact
        let mut cluster_of = vec![None; components.len()];
        let mut n_clusters = 0;
        for (label, &size) in components.sizes.iter().enumerate() {
            if size >= settings.minimal_cluster_size {
                cluster_of[label] = Some(n_clusters);
                n_clusters += 1;
            }
        }
        debug!(
            "Magic-SOR: {} clusters, {} below {} cells",
            components.len(),
            components.len() - n_clusters,
            settings.minimal_cluster_size
        );

        let mut removed = 0;
        let mut groups = Vec::with_capacity(pcd.len());
        for (idx, label) in components.labels.iter().enumerate() {
            let group = label.and_then(|l| cluster_of[l]);
            if label.is_some() && group.is_none() {
                pcd.invalidate_index(idx);
                removed += 1;
            }
            groups.push(group);
        }

        let k = usize::from(settings.minimum_neighbours);
        if k > 0 && n_clusters > 0 {
            removed += remove_statistical_outliers(
                pcd,
                k,
                settings.sigma_multiplier,
                groups,
                n_clusters,
            );
        }

        info!("Magic-SOR filter removed {} of {} points", removed, valid);
        Ok(())
    }
}
