//! Point clouds laid out on the sensor pixel grid

use crate::error::{ensure, Result};
use crate::point::{Matrix, Scalar};
use crate::point_cloud::{cast_points, PointCloud, PointCloudBase, Storage};
use crate::roi::Roi2ui;
use std::ops::{Deref, DerefMut, Index, IndexMut};

/// A point cloud of `height` rows by `width` columns stored row-major.
///
/// Cells holding `empty_value` carry no measurement. Filters remove points by
/// overwriting them with that value, so the grid shape never changes.
#[derive(Debug, Clone)]
pub struct StructuredPointCloud<'a, T> {
    base: PointCloudBase<'a, T>,
    width: usize,
    height: usize,
    empty_value: T,
}

impl<T: Default> Default for StructuredPointCloud<'_, T> {
    fn default() -> Self {
        Self {
            base: PointCloudBase::default(),
            width: 0,
            height: 0,
            empty_value: T::default(),
        }
    }
}

impl<T> StructuredPointCloud<'static, T> {
    /// Take ownership of `points`, which must hold `width * height` cells
    #[track_caller]
    pub fn new(points: Vec<T>, width: usize, height: usize, empty_value: T) -> Result<Self> {
        ensure(points.len() == width * height, "wrong point cloud size")?;
        Ok(Self {
            base: PointCloudBase::from_storage(Storage::Owned(points)),
            width,
            height,
            empty_value,
        })
    }

    /// A `width x height` grid where every cell is empty
    pub fn filled(width: usize, height: usize, empty_value: T) -> Self
    where
        T: Clone,
    {
        Self {
            base: PointCloudBase::from_storage(Storage::Owned(vec![
                empty_value.clone();
                width * height
            ])),
            width,
            height,
            empty_value,
        }
    }
}

impl<'a, T> StructuredPointCloud<'a, T> {
    /// Wrap a caller-owned buffer of `width * height` cells without copying it
    #[track_caller]
    pub fn from_slice(
        points: &'a mut [T],
        width: usize,
        height: usize,
        empty_value: T,
    ) -> Result<Self> {
        ensure(points.len() == width * height, "wrong point cloud size")?;
        Ok(Self {
            base: PointCloudBase::from_storage(Storage::Borrowed(points)),
            width,
            height,
            empty_value,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn empty_value(&self) -> &T {
        &self.empty_value
    }

    pub fn set_empty_value(&mut self, empty_value: T) {
        self.empty_value = empty_value;
    }

    /// Flat index of row `i`, column `j`
    pub fn index_of(&self, i: usize, j: usize) -> usize {
        i * self.width + j
    }

    /// Fail unless the grid is `width x height`
    #[track_caller]
    pub fn check_dimensions(&self, width: usize, height: usize) -> Result<()> {
        ensure(
            self.width == width && self.height == height,
            format!(
                "point cloud is {}x{}, expected {}x{}",
                self.width, self.height, width, height
            ),
        )
    }

    /// Replace the contents with an owned grid of empty cells
    pub fn create(&mut self, width: usize, height: usize)
    where
        T: Clone,
    {
        self.base.reset(vec![self.empty_value.clone(); width * height]);
        self.width = width;
        self.height = height;
    }

    /// Replace the contents with `points`, which must hold `width * height` cells
    #[track_caller]
    pub fn create_from(&mut self, points: Vec<T>, width: usize, height: usize) -> Result<()> {
        ensure(points.len() == width * height, "wrong point cloud size")?;
        self.base.reset(points);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Iterate over the grid rows
    pub fn rows(&self) -> std::slice::ChunksExact<'_, T> {
        self.base.points().chunks_exact(self.width.max(1))
    }

    pub fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, T> {
        let width = self.width.max(1);
        self.base.points_mut().chunks_exact_mut(width)
    }

    pub fn into_owned(self) -> StructuredPointCloud<'static, T>
    where
        T: Clone,
    {
        StructuredPointCloud {
            base: PointCloud::from_base(self.base).into_owned().into_base(),
            width: self.width,
            height: self.height,
            empty_value: self.empty_value,
        }
    }
}

impl<T: PartialEq + Clone> StructuredPointCloud<'_, T> {
    /// Whether cell `(i, j)` holds a measurement
    pub fn point_valid(&self, i: usize, j: usize) -> bool {
        self[(i, j)] != self.empty_value
    }

    /// Whether the cell at flat index `idx` holds a measurement
    pub fn is_valid(&self, idx: usize) -> bool {
        self.base[idx] != self.empty_value
    }

    pub fn invalidate(&mut self, i: usize, j: usize) {
        let idx = self.index_of(i, j);
        self.invalidate_index(idx);
    }

    pub fn invalidate_index(&mut self, idx: usize) {
        let empty = self.empty_value.clone();
        self.base[idx] = empty;
    }

    /// Number of cells holding a measurement
    pub fn valid_count(&self) -> usize {
        self.base
            .iter()
            .filter(|p| **p != self.empty_value)
            .count()
    }

    /// Empty every cell outside `roi`, whose `x` runs along columns.
    /// Returns the number of cells that were valid before.
    pub fn mask_outside(&mut self, roi: &Roi2ui) -> usize {
        let width = self.width;
        let empty = self.empty_value.clone();
        let mut masked = 0;
        for (idx, p) in self.base.iter_mut().enumerate() {
            let (i, j) = (idx / width, idx % width);
            let inside = u32::try_from(i)
                .ok()
                .zip(u32::try_from(j).ok())
                .is_some_and(|(y, x)| roi.contains(x, y));
            if !inside && *p != empty {
                *p = empty.clone();
                masked += 1;
            }
        }
        masked
    }

    /// Compact into an unstructured cloud of the valid cells in row-major order.
    ///
    /// Every attribute is carried along and stays index-aligned with the points.
    pub fn pointcloud(&self) -> PointCloud<'static, T> {
        let keep: Vec<bool> = self.base.iter().map(|p| *p != self.empty_value).collect();
        let points = self
            .base
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(p, _)| p.clone())
            .collect();
        PointCloud::from_base(PointCloudBase::from_parts(
            Storage::Owned(points),
            self.base.properties().select(&keep),
        ))
    }
}

impl<T: Scalar, const R: usize, const C: usize> StructuredPointCloud<'_, Matrix<T, R, C>> {
    /// Convert every cell and the sentinel to scalar type `U`
    pub fn cast<U: Scalar>(&self) -> Result<StructuredPointCloud<'static, Matrix<U, R, C>>> {
        let points = cast_points(self.points())?;
        let empty_value = cast_points::<T, U, R, C>(std::slice::from_ref(&self.empty_value))?[0];
        Ok(StructuredPointCloud {
            base: PointCloudBase::from_parts(Storage::Owned(points), self.properties().clone()),
            width: self.width,
            height: self.height,
            empty_value,
        })
    }
}

impl<'a, T> Deref for StructuredPointCloud<'a, T> {
    type Target = PointCloudBase<'a, T>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<T> DerefMut for StructuredPointCloud<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl<T> Index<usize> for StructuredPointCloud<'_, T> {
    type Output = T;

    fn index(&self, idx: usize) -> &T {
        &self.base[idx]
    }
}

impl<T> IndexMut<usize> for StructuredPointCloud<'_, T> {
    fn index_mut(&mut self, idx: usize) -> &mut T {
        &mut self.base[idx]
    }
}

impl<T> Index<(usize, usize)> for StructuredPointCloud<'_, T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        assert!(
            i < self.height && j < self.width,
            "cell ({i}, {j}) out of bounds for {}x{}",
            self.width,
            self.height
        );
        &self.base[i * self.width + j]
    }
}

impl<T> IndexMut<(usize, usize)> for StructuredPointCloud<'_, T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        assert!(
            i < self.height && j < self.width,
            "cell ({i}, {j}) out of bounds for {}x{}",
            self.width,
            self.height
        );
        let idx = i * self.width + j;
        &mut self.base[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{Point3d, Point3f};
    use crate::property::{Confidence, Intensity, Normals};

    fn grid() -> StructuredPointCloud<'static, Point3f> {
        // 3 columns, 2 rows; (0, 1) and (1, 2) are empty
        let e = Point3f::default();
        StructuredPointCloud::new(
            vec![
                Point3f::new(0.0, 0.0, 1.0),
                e,
                Point3f::new(2.0, 0.0, 1.0),
                Point3f::new(0.0, 1.0, 1.0),
                Point3f::new(1.0, 1.0, 1.0),
                e,
            ],
            3,
            2,
            e,
        )
        .unwrap()
    }

    #[test]
    fn test_size_is_checked() {
        let err = StructuredPointCloud::new(vec![Point3f::default(); 5], 3, 2, Point3f::default())
            .unwrap_err();
        assert!(err.is_contract());

        let mut buffer = vec![Point3f::default(); 6];
        assert!(StructuredPointCloud::from_slice(&mut buffer, 2, 3, Point3f::default()).is_ok());
    }

    #[test]
    fn test_grid_addressing() {
        let pcd = grid();
        assert_eq!(pcd.len(), 6);
        assert_eq!(pcd.index_of(1, 1), 4);
        assert_eq!(pcd[(1, 0)], Point3f::new(0.0, 1.0, 1.0));
        assert_eq!(pcd[2], Point3f::new(2.0, 0.0, 1.0));
        assert_eq!(pcd.rows().count(), 2);
        assert_eq!(pcd.rows().nth(1).unwrap()[1], Point3f::new(1.0, 1.0, 1.0));
    }

    #[test]
    #[should_panic]
    fn test_column_out_of_range_panics() {
        let pcd = grid();
        let _ = pcd[(0, 3)];
    }

    #[test]
    fn test_point_valid_is_exact() {
        let mut pcd = grid();
        assert!(pcd.point_valid(0, 0));
        assert!(!pcd.point_valid(0, 1));
        assert!(!pcd.point_valid(1, 2));
        assert_eq!(pcd.valid_count(), 4);

        // A point one ulp away from the sentinel is a real measurement.
        pcd[(0, 1)] = Point3f::new(0.0, 0.0, f32::MIN_POSITIVE);
        assert!(pcd.point_valid(0, 1));

        pcd.invalidate(1, 0);
        assert!(!pcd.point_valid(1, 0));
        assert_eq!(pcd.valid_count(), 4);
    }

    #[test]
    fn test_custom_sentinel() {
        let nan = Point3f::new(0.0, 0.0, -1.0);
        let mut pcd = StructuredPointCloud::filled(2, 2, nan);
        assert_eq!(pcd.valid_count(), 0);
        pcd[(1, 1)] = Point3f::new(1.0, 1.0, 1.0);
        assert_eq!(pcd.valid_count(), 1);
    }

    #[test]
    fn test_compaction_keeps_attributes_aligned() {
        let mut pcd = grid();
        pcd.add_property_with::<Intensity>(vec![10, 11, 12, 13, 14, 15])
            .unwrap();
        let custom = pcd
            .add_named_property_with::<f32>("range", vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5])
            .unwrap();

        let cloud = pcd.pointcloud();
        assert_eq!(cloud.len(), pcd.valid_count());
        assert_eq!(cloud[1], Point3f::new(2.0, 0.0, 1.0));
        assert_eq!(
            cloud.standard_property::<Intensity>(),
            Some(&[10u16, 12, 13, 14][..])
        );
        assert_eq!(cloud.property(custom).unwrap(), &[0.0, 0.2, 0.3, 0.4]);
        assert!(!cloud.has_property::<Normals>());
    }

    #[test]
    fn test_mask_outside_roi() {
        let mut pcd = grid();
        // Keep columns 0..2 of row 0 only
        let masked = pcd.mask_outside(&Roi2ui::new(0, 0, 2, 1));
        assert_eq!(masked, 3);
        assert_eq!(pcd.valid_count(), 1);
        assert!(pcd.point_valid(0, 0));
    }

    #[test]
    fn test_mask_outside_unbounded_roi() {
        let mut pcd = grid();
        let masked = pcd.mask_outside(&Roi2ui::new(1, 0, u32::MAX, u32::MAX));
        assert_eq!(masked, 2);
        assert!(pcd.point_valid(0, 2));
        assert!(pcd.point_valid(1, 1));
        assert!(!pcd.point_valid(0, 0));
    }

    #[test]
    fn test_create_resets_to_empty_grid() {
        let mut pcd = grid();
        pcd.add_property::<Confidence>();
        pcd.create(4, 4);
        assert_eq!((pcd.width(), pcd.height()), (4, 4));
        assert_eq!(pcd.len(), 16);
        assert_eq!(pcd.valid_count(), 0);
        assert!(pcd.properties().is_empty());

        assert!(pcd
            .create_from(vec![Point3f::default(); 3], 2, 2)
            .unwrap_err()
            .is_contract());
    }

    #[test]
    fn test_dimension_check() {
        let pcd = grid();
        assert!(pcd.check_dimensions(3, 2).is_ok());
        assert!(pcd.check_dimensions(2, 3).unwrap_err().is_contract());
    }

    #[test]
    fn test_cast() {
        let pcd = grid();
        let cast: StructuredPointCloud<Point3d> = pcd.cast().unwrap();
        assert_eq!(cast.valid_count(), 4);
        assert_eq!(*cast.empty_value(), Point3d::default());
        assert_eq!(cast[(1, 1)], Point3d::new(1.0, 1.0, 1.0));
    }
}
