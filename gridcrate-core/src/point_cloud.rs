//! Point cloud data structures and functionality

use crate::error::{ensure, Error, Result};
use crate::io::{PointCloudReader, PointCloudWriter};
use crate::point::{Matrix, Point3f, Scalar};
use crate::property::{
    Intensity, Normals, PropertyContainer, PropertyHandle, PropertyValue, StandardProperty,
};
use std::ops::{Deref, DerefMut, Index, IndexMut};

/// Backing memory of a point or face array
#[derive(Debug)]
pub enum Storage<'a, T> {
    /// The container owns its elements
    Owned(Vec<T>),
    /// The elements live in a caller-provided buffer
    Borrowed(&'a mut [T]),
}

impl<'a, T> Storage<'a, T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Storage::Owned(_))
    }
}

impl<T: Clone> Storage<'_, T> {
    /// Take the elements out, copying them if they are borrowed
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s.to_vec(),
        }
    }
}

/// Cloning always yields owned storage, so the copy never aliases the buffer.
impl<T: Clone> Clone for Storage<'_, T> {
    fn clone(&self) -> Self {
        Storage::Owned(self.as_slice().to_vec())
    }
}

impl<T> Default for Storage<'_, T> {
    fn default() -> Self {
        Storage::Owned(Vec::new())
    }
}

/// Points plus their per-point attributes.
///
/// Every attribute array holds exactly [`len`](Self::len) elements. The point
/// count can only be changed by the owning wrapper types, which re-establish
/// that invariant.
#[derive(Debug, Clone)]
pub struct PointCloudBase<'a, T> {
    storage: Storage<'a, T>,
    properties: PropertyContainer,
}

impl<T> Default for PointCloudBase<'_, T> {
    fn default() -> Self {
        Self {
            storage: Storage::default(),
            properties: PropertyContainer::new(),
        }
    }
}

impl<'a, T> PointCloudBase<'a, T> {
    pub(crate) fn from_storage(storage: Storage<'a, T>) -> Self {
        Self {
            storage,
            properties: PropertyContainer::new(),
        }
    }

    pub(crate) fn from_parts(storage: Storage<'a, T>, properties: PropertyContainer) -> Self {
        Self {
            storage,
            properties,
        }
    }

    /// Replace the points with an owned array and drop every attribute
    pub(crate) fn reset(&mut self, points: Vec<T>) {
        self.storage = Storage::Owned(points);
        self.properties.clear();
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Whether the points are owned rather than borrowed
    pub fn is_owned(&self) -> bool {
        self.storage.is_owned()
    }

    pub fn points(&self) -> &[T] {
        self.storage.as_slice()
    }

    pub fn points_mut(&mut self) -> &mut [T] {
        self.storage.as_mut_slice()
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points().iter()
    }

    /// Get a mutable iterator over the points
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.points_mut().iter_mut()
    }

    pub fn properties(&self) -> &PropertyContainer {
        &self.properties
    }

    /// Attach a default-initialised standard attribute
    pub fn add_property<P: StandardProperty>(&mut self) -> PropertyHandle<P::Value> {
        self.add_named_property(P::NAME)
    }

    /// Attach a standard attribute holding `data`, one value per point
    #[track_caller]
    pub fn add_property_with<P: StandardProperty>(
        &mut self,
        data: Vec<P::Value>,
    ) -> Result<PropertyHandle<P::Value>> {
        self.add_named_property_with(P::NAME, data)
    }

    /// Attach a default-initialised custom attribute
    pub fn add_named_property<V: PropertyValue>(&mut self, name: &str) -> PropertyHandle<V> {
        let data = vec![V::default(); self.len()];
        self.properties.add(name, data)
    }

    /// Attach a custom attribute holding `data`, one value per point
    #[track_caller]
    pub fn add_named_property_with<V: PropertyValue>(
        &mut self,
        name: &str,
        data: Vec<V>,
    ) -> Result<PropertyHandle<V>> {
        ensure(data.len() == self.len(), "wrong property size")?;
        Ok(self.properties.add(name, data))
    }

    /// Overwrite a standard attribute, attaching it first if absent
    #[track_caller]
    pub fn set_property<P: StandardProperty>(
        &mut self,
        data: Vec<P::Value>,
    ) -> Result<PropertyHandle<P::Value>> {
        ensure(data.len() == self.len(), "wrong property size")?;
        let handle = self.standard_handle::<P>();
        if handle.is_valid() {
            self.properties.get_mut(handle)?.data_mut().clone_from_slice(&data);
            Ok(handle)
        } else {
            Ok(self.properties.add(P::NAME, data))
        }
    }

    #[track_caller]
    pub fn remove_property<V: PropertyValue>(&mut self, handle: PropertyHandle<V>) -> Result<()> {
        self.properties.remove(handle)
    }

    /// Drop a standard attribute; returns whether it was present
    pub fn remove_standard_property<P: StandardProperty>(&mut self) -> bool {
        let handle = self.standard_handle::<P>();
        self.properties.remove(handle).is_ok()
    }

    #[track_caller]
    pub fn property<V: PropertyValue>(&self, handle: PropertyHandle<V>) -> Result<&[V]> {
        Ok(self.properties.get(handle)?.data())
    }

    #[track_caller]
    pub fn property_mut<V: PropertyValue>(
        &mut self,
        handle: PropertyHandle<V>,
    ) -> Result<&mut [V]> {
        Ok(self.properties.get_mut(handle)?.data_mut())
    }

    /// Handle of the attribute called `name` with values of type `V`
    pub fn property_handle<V: PropertyValue>(&self, name: &str) -> PropertyHandle<V> {
        self.properties.handle(name)
    }

    pub fn standard_handle<P: StandardProperty>(&self) -> PropertyHandle<P::Value> {
        self.properties.handle(P::NAME)
    }

    pub fn standard_property<P: StandardProperty>(&self) -> Option<&[P::Value]> {
        self.property(self.standard_handle::<P>()).ok()
    }

    pub fn standard_property_mut<P: StandardProperty>(&mut self) -> Option<&mut [P::Value]> {
        let handle = self.standard_handle::<P>();
        self.property_mut(handle).ok()
    }

    pub fn has_property<P: StandardProperty>(&self) -> bool {
        self.standard_handle::<P>().is_valid()
    }
}

impl<T> Index<usize> for PointCloudBase<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points()[index]
    }
}

impl<T> IndexMut<usize> for PointCloudBase<'_, T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.points_mut()[index]
    }
}

impl<'a, 'b, T> IntoIterator for &'b PointCloudBase<'a, T> {
    type Item = &'b T;
    type IntoIter = std::slice::Iter<'b, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Vertex data read from a [`PointCloudReader`] before it is committed
pub(crate) struct VertexData {
    points: Vec<Point3f>,
    normals: Option<Vec<Point3f>>,
    intensity: Option<Vec<u16>>,
}

impl VertexData {
    #[track_caller]
    pub(crate) fn read<R: PointCloudReader + ?Sized>(reader: &mut R) -> Result<Self> {
        let points = reader.read_points().ok_or(Error::MissingData("points"))?;
        let normals = reader.read_point_normals();
        let intensity = reader.read_intensity();

        let n = points.len();
        ensure(
            normals.as_ref().map_or(true, |v| v.len() == n),
            "wrong property size",
        )?;
        ensure(
            intensity.as_ref().map_or(true, |v| v.len() == n),
            "wrong property size",
        )?;

        Ok(Self {
            points,
            normals,
            intensity,
        })
    }

    /// Install the data; sizes were checked on read so this cannot fail
    pub(crate) fn assign(self, base: &mut PointCloudBase<'_, Point3f>) {
        base.reset(self.points);
        if let Some(normals) = self.normals {
            base.properties.add(Normals::NAME, normals);
        }
        if let Some(intensity) = self.intensity {
            base.properties.add(Intensity::NAME, intensity);
        }
    }
}

impl PointCloudBase<'_, Point3f> {
    pub(crate) fn write_vertex_data<W: PointCloudWriter + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<()> {
        writer.write_vertices(self.points())?;
        if let Some(normals) = self.standard_property::<Normals>() {
            writer.write_normals(normals)?;
        }
        if let Some(intensity) = self.standard_property::<Intensity>() {
            writer.write_intensity(intensity)?;
        }
        Ok(())
    }
}

/// A generic unstructured point cloud
#[derive(Debug, Clone)]
pub struct PointCloud<'a, T> {
    base: PointCloudBase<'a, T>,
}

impl<T> Default for PointCloud<'_, T> {
    fn default() -> Self {
        Self {
            base: PointCloudBase::default(),
        }
    }
}

impl<T> PointCloud<'static, T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a point cloud from a vector of points
    pub fn from_points(points: Vec<T>) -> Self {
        Self {
            base: PointCloudBase::from_storage(Storage::Owned(points)),
        }
    }
}

impl<'a, T> PointCloud<'a, T> {
    /// Wrap a caller-owned buffer without copying it
    pub fn from_slice(points: &'a mut [T]) -> Self {
        Self {
            base: PointCloudBase::from_storage(Storage::Borrowed(points)),
        }
    }

    pub(crate) fn from_base(base: PointCloudBase<'a, T>) -> Self {
        Self { base }
    }

    pub(crate) fn into_base(self) -> PointCloudBase<'a, T> {
        self.base
    }

    /// Replace the contents with `size` default points in owned storage
    pub fn create(&mut self, size: usize)
    where
        T: Default + Clone,
    {
        self.base.reset(vec![T::default(); size]);
    }

    /// Replace the contents with `points` in owned storage
    pub fn create_from(&mut self, points: Vec<T>) {
        self.base.reset(points);
    }

    /// Detach from any borrowed buffer
    pub fn into_owned(self) -> PointCloud<'static, T>
    where
        T: Clone,
    {
        let PointCloudBase {
            storage,
            properties,
        } = self.base;
        PointCloud::from_base(PointCloudBase::from_parts(
            Storage::Owned(storage.into_vec()),
            properties,
        ))
    }
}

impl<T: Scalar, const R: usize, const C: usize> PointCloud<'_, Matrix<T, R, C>> {
    /// Convert every point to scalar type `U`; attributes are copied unchanged
    pub fn cast<U: Scalar>(&self) -> Result<PointCloud<'static, Matrix<U, R, C>>> {
        let points = cast_points(self.points())?;
        Ok(PointCloud::from_base(PointCloudBase::from_parts(
            Storage::Owned(points),
            self.properties.clone(),
        )))
    }
}

pub(crate) fn cast_points<T: Scalar, U: Scalar, const R: usize, const C: usize>(
    points: &[Matrix<T, R, C>],
) -> Result<Vec<Matrix<U, R, C>>> {
    points
        .iter()
        .map(|p| {
            p.cast::<U>().ok_or_else(|| {
                Error::InvalidData(format!(
                    "point {p:?} is not representable as {}",
                    std::any::type_name::<U>()
                ))
            })
        })
        .collect()
}

impl PointCloud<'_, Point3f> {
    /// Write points, then normals and intensity when present
    pub fn write_to<W: PointCloudWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        self.write_vertex_data(writer)
    }

    /// Replace the contents with what `reader` supplies.
    ///
    /// Points are mandatory; normals and intensity are attached when the
    /// reader has them. On error the cloud is left untouched.
    #[track_caller]
    pub fn read_from<R: PointCloudReader + ?Sized>(&mut self, reader: &mut R) -> Result<()> {
        let data = VertexData::read(reader)?;
        data.assign(&mut self.base);
        Ok(())
    }
}

impl<'a, T> Deref for PointCloud<'a, T> {
    type Target = PointCloudBase<'a, T>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<T> DerefMut for PointCloud<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl<T> FromIterator<T> for PointCloud<'static, T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_points(Vec::from_iter(iter))
    }
}

impl<T> From<Vec<T>> for PointCloud<'static, T> {
    fn from(points: Vec<T>) -> Self {
        Self::from_points(points)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::point::{Point3d, Point3i};
    use crate::property::Confidence;

    /// In-memory codec recording everything written to it
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub vertices: Option<Vec<Point3f>>,
        pub normals: Option<Vec<Point3f>>,
        pub faces: Option<Vec<Point3i>>,
        pub intensity: Option<Vec<u16>>,
    }

    impl PointCloudWriter for Recorder {
        fn write_vertices(&mut self, vertices: &[Point3f]) -> Result<()> {
            self.vertices = Some(vertices.to_vec());
            Ok(())
        }

        fn write_normals(&mut self, normals: &[Point3f]) -> Result<()> {
            self.normals = Some(normals.to_vec());
            Ok(())
        }

        fn write_faces(&mut self, faces: &[Point3i]) -> Result<()> {
            self.faces = Some(faces.to_vec());
            Ok(())
        }

        fn write_intensity(&mut self, intensity: &[u16]) -> Result<()> {
            self.intensity = Some(intensity.to_vec());
            Ok(())
        }
    }

    impl PointCloudReader for Recorder {
        fn read_points(&mut self) -> Option<Vec<Point3f>> {
            self.vertices.clone()
        }

        fn read_point_normals(&mut self) -> Option<Vec<Point3f>> {
            self.normals.clone()
        }

        fn read_faces(&mut self) -> Option<Vec<Point3i>> {
            self.faces.clone()
        }

        fn read_intensity(&mut self) -> Option<Vec<u16>> {
            self.intensity.clone()
        }
    }

    fn sample() -> PointCloud<'static, Point3f> {
        PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 1.0),
            Point3f::new(1.0, 0.0, 1.0),
            Point3f::new(0.0, 1.0, 1.0),
        ])
    }

    #[test]
    fn test_point_cloud_creation() {
        let cloud = sample();
        assert_eq!(cloud.len(), 3);
        assert!(cloud.is_owned());
        assert_eq!(cloud[1], Point3f::new(1.0, 0.0, 1.0));

        let empty = PointCloud::<Point3f>::new();
        assert!(empty.is_empty());
        assert!(empty.is_owned());
    }

    #[test]
    fn test_borrowed_storage_writes_through() {
        let mut buffer = vec![Point3f::default(); 2];
        {
            let mut cloud = PointCloud::from_slice(&mut buffer);
            assert!(!cloud.is_owned());
            cloud[1] = Point3f::new(1.0, 2.0, 3.0);
        }
        assert_eq!(buffer[1], Point3f::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_clone_of_borrowed_is_owned() {
        let mut buffer = vec![Point3f::new(1.0, 1.0, 1.0)];
        let cloud = PointCloud::from_slice(&mut buffer);
        let mut copy = cloud.clone();
        assert!(copy.is_owned());
        copy[0] = Point3f::default();
        assert_eq!(cloud[0], Point3f::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_create_switches_to_owned() {
        let mut buffer = vec![Point3f::default(); 4];
        let mut cloud = PointCloud::from_slice(&mut buffer);
        cloud.add_property::<Intensity>();

        cloud.create(2);
        assert!(cloud.is_owned());
        assert_eq!(cloud.len(), 2);
        assert!(cloud.properties().is_empty());
    }

    #[test]
    fn test_property_size_is_checked() {
        let mut cloud = sample();
        let err = cloud.add_property_with::<Intensity>(vec![1, 2]).unwrap_err();
        assert!(err.is_contract());

        let h = cloud.add_property_with::<Intensity>(vec![1, 2, 3]).unwrap();
        assert_eq!(cloud.property(h).unwrap(), &[1, 2, 3]);
        assert_eq!(cloud.standard_property::<Intensity>(), Some(&[1u16, 2, 3][..]));
    }

    #[test]
    fn test_set_property_overwrites() {
        let mut cloud = sample();
        let first = cloud.set_property::<Confidence>(vec![1, 1, 1]).unwrap();
        let second = cloud.set_property::<Confidence>(vec![2, 2, 2]).unwrap();
        assert_eq!(first, second);
        assert_eq!(cloud.properties().len(), 1);
        assert_eq!(cloud.property(first).unwrap(), &[2, 2, 2]);
    }

    #[test]
    fn test_custom_property() {
        let mut cloud = sample();
        let h = cloud.add_named_property::<f64>("range");
        cloud.property_mut(h).unwrap()[2] = 4.5;
        assert_eq!(cloud.property_handle::<f64>("range"), h);
        assert_eq!(cloud.property(h).unwrap(), &[0.0, 0.0, 4.5]);

        cloud.remove_property(h).unwrap();
        assert!(cloud.property(h).unwrap_err().is_contract());
        assert!(!cloud.remove_standard_property::<Normals>());
    }

    #[test]
    fn test_cast_copies_properties() {
        let mut cloud = sample();
        cloud.add_property_with::<Intensity>(vec![7, 8, 9]).unwrap();

        let cast: PointCloud<Point3d> = cloud.cast().unwrap();
        assert_eq!(cast.len(), 3);
        assert_eq!(cast[1], Point3d::new(1.0, 0.0, 1.0));
        assert_eq!(cast.standard_property::<Intensity>(), Some(&[7u16, 8, 9][..]));

        let back: PointCloud<Point3f> = cast.cast().unwrap();
        assert_eq!(back.points(), cloud.points());
    }

    #[test]
    fn test_cast_failure() {
        let cloud = PointCloud::from_points(vec![Point3f::new(1e12, 0.0, 0.0)]);
        assert!(matches!(cloud.cast::<i32>(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_write_then_read() {
        let mut cloud = sample();
        cloud
            .add_property_with::<Normals>(vec![Point3f::new(0.0, 0.0, -1.0); 3])
            .unwrap();

        let mut codec = Recorder::default();
        cloud.write_to(&mut codec).unwrap();
        assert_eq!(codec.vertices.as_deref(), Some(cloud.points()));
        assert!(codec.intensity.is_none());

        let mut read = PointCloud::<Point3f>::new();
        read.read_from(&mut codec).unwrap();
        assert_eq!(read.points(), cloud.points());
        assert!(read.has_property::<Normals>());
        assert!(!read.has_property::<Intensity>());
    }

    #[test]
    fn test_failed_read_leaves_cloud_untouched() {
        let mut cloud = sample();
        let mut codec = Recorder::default();
        let err = cloud.read_from(&mut codec).unwrap_err();
        assert!(matches!(err, Error::MissingData("points")));
        assert_eq!(cloud.len(), 3);

        codec.vertices = Some(vec![Point3f::default(); 2]);
        codec.intensity = Some(vec![1]);
        assert!(cloud.read_from(&mut codec).unwrap_err().is_contract());
        assert_eq!(cloud.len(), 3);
    }
}
