//! Depth-sliced connected component denoising

use crate::grid::{offset_cell, Connectivity, UnionFind};
use gridcrate_core::{ensure, Point3f, Result, StructuredPointCloud};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Settings of [`MagicFilter`]
///
/// # Example
/// ```rust
/// use gridcrate_algorithms::MagicFilterSettings;
///
/// let settings = MagicFilterSettings::default()
///     .set_width(2448)
///     .set_height(2048)
///     .set_min_area(50);
/// assert_eq!(settings.num_bins, 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagicFilterSettings {
    pub width: usize,
    pub height: usize,
    /// Components covering fewer cells are removed
    pub min_area: usize,
    /// Number of depth slices components may not cross
    pub num_bins: usize,
    /// Side of the square blocks the grid is processed in
    pub reduce: usize,
    pub connectivity: Connectivity,
}

impl Default for MagicFilterSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            min_area: 20,
            num_bins: 100,
            reduce: 2,
            connectivity: Connectivity::Eight,
        }
    }
}

impl MagicFilterSettings {
    pub fn set_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn set_height(mut self, height: usize) -> Self {
        self.height = height;
        self
    }

    pub fn set_min_area(mut self, min_area: usize) -> Self {
        self.min_area = min_area;
        self
    }

    pub fn set_num_bins(mut self, num_bins: usize) -> Self {
        self.num_bins = num_bins;
        self
    }

    pub fn set_reduce(mut self, reduce: usize) -> Self {
        self.reduce = reduce;
        self
    }

    pub fn set_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }
}

/// Removes small connected patches of similar depth
///
/// The valid depth range is sliced into `num_bins` bins and every bin is
/// labeled as its own foreground: neighbouring cells join the same component
/// only when their depths fall into the same bin. Components covering fewer
/// than `min_area` cells are emptied. With `reduce > 1` connectivity is
/// computed on `reduce x reduce` blocks. A block takes part in the labeling of
/// every bin it holds a cell of, and counts the cells of that bin as its area.
#[derive(Debug, Clone)]
pub struct MagicFilter {
    settings: MagicFilterSettings,
}

/// Cells of one depth bin inside one `reduce x reduce` block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slice {
    bin: usize,
    area: usize,
}

/// Depth slices of every block, flattened into labeling nodes
#[derive(Debug)]
struct BlockSlices {
    slices: Vec<Slice>,
    /// Node range of block `b` is `first[b]..first[b + 1]`
    first: Vec<usize>,
}

impl BlockSlices {
    fn nodes(&self, block: usize) -> std::ops::Range<usize> {
        self.first[block]..self.first[block + 1]
    }

    /// Node of `bin` in `block`, if the block holds a cell of that bin
    fn node(&self, block: usize, bin: usize) -> Option<usize> {
        let range = self.nodes(block);
        let start = range.start;
        self.slices[range]
            .binary_search_by_key(&bin, |s| s.bin)
            .ok()
            .map(|k| start + k)
    }
}

impl MagicFilter {
    pub fn new(settings: MagicFilterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MagicFilterSettings {
        &self.settings
    }

    #[track_caller]
    pub fn apply(&self, pcd: &mut StructuredPointCloud<'_, Point3f>) -> Result<()> {
        let settings = &self.settings;
        pcd.check_dimensions(settings.width, settings.height)?;
        ensure(settings.num_bins > 0, "num_bins must be positive")?;
        ensure(settings.reduce > 0, "reduce must be positive")?;

        let (width, height, reduce) = (pcd.width(), pcd.height(), settings.reduce);
        let bins = depth_bins(pcd, settings.num_bins);
        let valid = bins.iter().flatten().count();
        if valid == 0 {
            return Ok(());
        }

        let block_width = width.div_ceil(reduce);
        let block_height = height.div_ceil(reduce);
        let block_of = |idx: usize| (idx / width / reduce) * block_width + (idx % width) / reduce;
        let blocks = block_slices(&bins, block_width * block_height, block_of);

        let mut uf = UnionFind::new(blocks.slices.len());
        for bi in 0..block_height {
            for bj in 0..block_width {
                let b = bi * block_width + bj;
                for &offset in settings.connectivity.backward_offsets() {
                    let Some((ni, nj)) = offset_cell((bi, bj), offset, block_width, block_height)
                    else {
                        continue;
                    };
                    let nb = ni * block_width + nj;
                    for node in blocks.nodes(b) {
                        if let Some(other) = blocks.node(nb, blocks.slices[node].bin) {
                            uf.union(node, other);
                        }
                    }
                }
            }
        }

        let roots: Vec<usize> = (0..blocks.slices.len()).map(|n| uf.find(n)).collect();
        let mut areas = vec![0; blocks.slices.len()];
        for (node, slice) in blocks.slices.iter().enumerate() {
            areas[roots[node]] += slice.area;
        }
        let n_components = roots.iter().enumerate().filter(|(n, r)| n == *r).count();
        debug!(
            "Magic filter: {} components over {}x{} blocks, {} below {} cells",
            n_components,
            block_width,
            block_height,
            roots
                .iter()
                .enumerate()
                .filter(|(n, r)| n == *r && areas[*n] < settings.min_area)
                .count(),
            settings.min_area
        );

        let mut removed = 0;
        for (idx, bin) in bins.iter().enumerate() {
            let Some(node) = bin.and_then(|bin| blocks.node(block_of(idx), bin)) else {
                continue;
            };
            if areas[roots[node]] < settings.min_area {
                pcd.invalidate_index(idx);
                removed += 1;
            }
        }

        info!("Magic filter removed {} of {} points", removed, valid);
        Ok(())
    }
}

/// Group the binned cells by block, one sorted slice per bin present
fn block_slices<B>(bins: &[Option<usize>], n_blocks: usize, block_of: B) -> BlockSlices
where
    B: Fn(usize) -> usize,
{
    let mut per_block: Vec<Vec<Slice>> = vec![Vec::new(); n_blocks];
    for (idx, bin) in bins.iter().enumerate() {
        let Some(bin) = *bin else { continue };
        let slices = &mut per_block[block_of(idx)];
        match slices.binary_search_by_key(&bin, |s| s.bin) {
            Ok(k) => slices[k].area += 1,
            Err(k) => slices.insert(k, Slice { bin, area: 1 }),
        }
    }

    let mut first = Vec::with_capacity(n_blocks + 1);
    first.push(0);
    let mut slices = Vec::new();
    for block in per_block {
        slices.extend(block);
        first.push(slices.len());
    }
    BlockSlices { slices, first }
}

/// Depth bin of every valid cell
fn depth_bins(pcd: &StructuredPointCloud<'_, Point3f>, num_bins: usize) -> Vec<Option<usize>> {
    let (z_min, z_max) = pcd
        .iter()
        .enumerate()
        .filter(|(idx, _)| pcd.is_valid(*idx))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (_, p)| {
            (lo.min(p.z()), hi.max(p.z()))
        });
    let range = z_max - z_min;

    (0..pcd.len())
        .map(|idx| {
            if !pcd.is_valid(idx) {
                return None;
            }
            if range <= 0.0 {
                return Some(0);
            }
            let t = (pcd[idx].z() - z_min) / range;
            Some(((t * num_bins as f32) as usize).min(num_bins - 1))
        })
        .collect()
}
