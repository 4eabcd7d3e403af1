//! Neighbourhood and connectivity helpers on the pixel grid

use gridcrate_core::{NearestNeighborSearch, Point3f, StructuredPointCloud};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Which grid cells count as adjacent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// Edge-sharing cells only
    Four,
    /// Edge- and corner-sharing cells
    #[default]
    Eight,
}

impl Connectivity {
    /// Offsets `(di, dj)` of the neighbours already visited in a row-major scan
    pub(crate) fn backward_offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &[(-1, 0), (0, -1)],
            Connectivity::Eight => &[(-1, -1), (-1, 0), (-1, 1), (0, -1)],
        }
    }

    /// Offsets `(di, dj)` of every neighbour
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &[(-1, 0), (0, -1), (0, 1), (1, 0)],
            Connectivity::Eight => &[
                (-1, -1),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ],
        }
    }
}

/// Cell `(i + di, j + dj)` if it lies on a `width x height` grid
pub fn offset_cell(
    (i, j): (usize, usize),
    (di, dj): (isize, isize),
    width: usize,
    height: usize,
) -> Option<(usize, usize)> {
    let ni = i.checked_add_signed(di)?;
    let nj = j.checked_add_signed(dj)?;
    (ni < height && nj < width).then_some((ni, nj))
}

/// Row and column ranges of the square window of `radius` around `(i, j)`,
/// clipped to the grid
pub fn window(
    (i, j): (usize, usize),
    radius: usize,
    width: usize,
    height: usize,
) -> (Range<usize>, Range<usize>) {
    (
        i.saturating_sub(radius)..(i + radius + 1).min(height),
        j.saturating_sub(radius)..(j + radius + 1).min(width),
    )
}

/// Disjoint-set forest with union by rank and path halving
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub(crate) fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return;
        }

        match self.rank[root_x].cmp(&self.rank[root_y]) {
            std::cmp::Ordering::Less => {
                self.parent[root_x] = root_y;
            }
            std::cmp::Ordering::Greater => {
                self.parent[root_y] = root_x;
            }
            std::cmp::Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] = self.rank[root_x].saturating_add(1);
            }
        }
    }
}

/// Result of connected component labeling
#[derive(Debug, Clone, Default)]
pub struct Components {
    /// Component of every cell, `None` for background cells
    pub labels: Vec<Option<usize>>,
    /// Number of cells in every component
    pub sizes: Vec<usize>,
}

impl Components {
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Cell indices of every component, in row-major order
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members: Vec<Vec<usize>> =
            self.sizes.iter().map(|&n| Vec::with_capacity(n)).collect();
        for (idx, label) in self.labels.iter().enumerate() {
            if let Some(l) = label {
                members[*l].push(idx);
            }
        }
        members
    }
}

/// Label the connected components of a `width x height` grid.
///
/// Cells for which `foreground` is false are background. Two adjacent
/// foreground cells are joined when `same(a, b)` holds for their flat indices.
/// Labels are numbered in row-major order of each component's first cell.
pub fn label_components<F, S>(
    width: usize,
    height: usize,
    connectivity: Connectivity,
    foreground: F,
    same: S,
) -> Components
where
    F: Fn(usize) -> bool,
    S: Fn(usize, usize) -> bool,
{
    let n = width * height;
    let is_fg: Vec<bool> = (0..n).map(&foreground).collect();
    let mut uf = UnionFind::new(n);

    for i in 0..height {
        for j in 0..width {
            let idx = i * width + j;
            if !is_fg[idx] {
                continue;
            }
            for &offset in connectivity.backward_offsets() {
                if let Some((ni, nj)) = offset_cell((i, j), offset, width, height) {
                    let nidx = ni * width + nj;
                    if is_fg[nidx] && same(idx, nidx) {
                        uf.union(idx, nidx);
                    }
                }
            }
        }
    }

    let mut root_label = vec![usize::MAX; n];
    let mut components = Components {
        labels: vec![None; n],
        sizes: Vec::new(),
    };
    for idx in 0..n {
        if !is_fg[idx] {
            continue;
        }
        let root = uf.find(idx);
        if root_label[root] == usize::MAX {
            root_label[root] = components.sizes.len();
            components.sizes.push(0);
        }
        let label = root_label[root];
        components.labels[idx] = Some(label);
        components.sizes[label] += 1;
    }
    components
}

/// k-nearest neighbour search restricted to a square window on the grid.
///
/// Only valid cells are candidates. When groups are given, a query only sees
/// cells of its own group.
#[derive(Debug, Clone)]
pub struct GridNeighborSearch<'p> {
    points: &'p [Point3f],
    width: usize,
    height: usize,
    groups: Vec<Option<usize>>,
    radius: usize,
}

impl<'p> GridNeighborSearch<'p> {
    /// Search among every valid cell, with a window sized for `k` neighbours
    pub fn new(pcd: &'p StructuredPointCloud<'_, Point3f>, k: usize) -> Self {
        let groups = (0..pcd.len())
            .map(|idx| pcd.is_valid(idx).then_some(0))
            .collect();
        Self::with_groups(pcd, k, groups)
    }

    /// Search among cells sharing the query's group; `None` excludes a cell
    pub fn with_groups(
        pcd: &'p StructuredPointCloud<'_, Point3f>,
        k: usize,
        groups: Vec<Option<usize>>,
    ) -> Self {
        Self {
            points: pcd.points(),
            width: pcd.width(),
            height: pcd.height(),
            groups,
            radius: Self::window_radius(k),
        }
    }

    /// Smallest window radius whose `(2r + 1)^2 - 1` cells hold at least `2k` candidates
    pub fn window_radius(k: usize) -> usize {
        let mut r = 1;
        while (2 * r + 1) * (2 * r + 1) - 1 < 2 * k {
            r += 1;
        }
        r
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Group of cell `idx`, `None` if it takes no part in the search
    pub fn group(&self, idx: usize) -> Option<usize> {
        self.groups.get(idx).copied().flatten()
    }
}

impl NearestNeighborSearch for GridNeighborSearch<'_> {
    fn find_k_nearest(&self, query: usize, k: usize) -> Vec<(usize, f32)> {
        let Some(group) = self.group(query) else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let q = self.points[query].to_vector();
        let cell = (query / self.width, query % self.width);
        let (rows, cols) = window(cell, self.radius, self.width, self.height);

        let mut candidates: Vec<(usize, f32)> = Vec::with_capacity(rows.len() * cols.len());
        for i in rows {
            for j in cols.clone() {
                let idx = i * self.width + j;
                if idx != query && self.groups[idx] == Some(group) {
                    let distance = (self.points[idx].to_vector() - q).norm();
                    candidates.push((idx, distance));
                }
            }
        }

        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        candidates.truncate(k);
        candidates
    }
}
