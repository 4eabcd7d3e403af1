//! Fixed-size matrix type and the point aliases built on it
//!
//! [`Matrix`] is a small stack-allocated row-major aggregate used for points,
//! normals, colors and camera matrices. Linear algebra is done by converting
//! to the equivalent `nalgebra` type.

use crate::error::{ensure, Result};
use nalgebra::{Point3, SMatrix, Vector3};
use num_traits::{NumCast, One, Zero};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut, Neg};

/// Element type of a [`Matrix`]
pub trait Scalar:
    Copy + PartialEq + PartialOrd + fmt::Debug + Default + NumCast + Send + Sync + 'static
{
}

impl<T> Scalar for T where
    T: Copy + PartialEq + PartialOrd + fmt::Debug + Default + NumCast + Send + Sync + 'static
{
}

/// A `R x C` matrix with `R, C` in `1..=4`, stored row-major
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix<T, const R: usize, const C: usize> {
    data: [[T; C]; R],
}

/// A 3D point with single precision coordinates
pub type Point3f = Matrix<f32, 3, 1>;

/// A 3D point with double precision coordinates
pub type Point3d = Matrix<f64, 3, 1>;

/// Integer triple, used for triangle faces
pub type Point3i = Matrix<i32, 3, 1>;

/// 8-bit RGB triple
pub type Point3ub = Matrix<u8, 3, 1>;

/// Integer pixel coordinate
pub type Point2i = Matrix<i32, 2, 1>;

pub type Quaternionf = Matrix<f32, 4, 1>;
pub type Quaterniond = Matrix<f64, 4, 1>;
pub type Matrix3f = Matrix<f32, 3, 3>;
pub type Matrix4f = Matrix<f32, 4, 4>;
pub type Matrix4d = Matrix<f64, 4, 4>;

impl<T: Scalar, const R: usize, const C: usize> Matrix<T, R, C> {
    const SHAPE: () = assert!(
        R >= 1 && R <= 4 && C >= 1 && C <= 4,
        "matrix dimensions must lie in 1..=4"
    );

    pub const ROWS: usize = R;
    pub const COLS: usize = C;
    pub const SIZE: usize = R * C;

    /// Create a matrix from its rows
    pub fn from_rows(data: [[T; C]; R]) -> Self {
        let () = Self::SHAPE;
        Self { data }
    }

    /// Create a matrix with every element set to `value`
    pub fn from_element(value: T) -> Self {
        Self::from_rows([[value; C]; R])
    }

    /// Create a matrix from exactly `R * C` row-major values
    #[track_caller]
    pub fn from_slice(values: &[T]) -> Result<Self> {
        ensure(
            values.len() == R * C,
            format!("matrix needs {} elements, got {}", R * C, values.len()),
        )?;
        let mut m = Self::default();
        for (dst, src) in m.iter_mut().zip(values) {
            *dst = *src;
        }
        Ok(m)
    }

    /// Element at compile-time flat index `I`
    pub fn get<const I: usize>(&self) -> T {
        const { assert!(I < R * C, "matrix index out of bounds") };
        self[I]
    }

    pub fn x(&self) -> T {
        const { assert!((R == 1 || C == 1) && R * C > 0, "x() needs a vector") };
        self[0]
    }

    pub fn y(&self) -> T {
        const { assert!((R == 1 || C == 1) && R * C > 1, "y() needs a vector of size >= 2") };
        self[1]
    }

    pub fn z(&self) -> T {
        const { assert!((R == 1 || C == 1) && R * C > 2, "z() needs a vector of size >= 3") };
        self[2]
    }

    pub fn w(&self) -> T {
        const { assert!((R == 1 || C == 1) && R * C > 3, "w() needs a vector of size 4") };
        self[3]
    }

    /// Iterate over the elements in row-major order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter().flat_map(|row| row.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.data.iter_mut().flat_map(|row| row.iter_mut())
    }

    /// Convert every element to `U`, or `None` if some value does not fit
    pub fn cast<U: Scalar>(&self) -> Option<Matrix<U, R, C>> {
        let mut out = Matrix::<U, R, C>::default();
        for (dst, src) in out.iter_mut().zip(self.iter()) {
            *dst = <U as NumCast>::from(*src)?;
        }
        Some(out)
    }
}

impl<T: Scalar + Zero + One, const N: usize> Matrix<T, N, N> {
    pub fn identity() -> Self {
        let mut m = Self::from_element(T::zero());
        for i in 0..N {
            m.data[i][i] = T::one();
        }
        m
    }
}

impl<T: Scalar> Matrix<T, 2, 1> {
    pub fn new(x: T, y: T) -> Self {
        Self::from_rows([[x], [y]])
    }
}

impl<T: Scalar> Matrix<T, 3, 1> {
    pub fn new(x: T, y: T, z: T) -> Self {
        Self::from_rows([[x], [y], [z]])
    }

    pub fn to_vector(&self) -> Vector3<T> {
        Vector3::new(self[0], self[1], self[2])
    }

    pub fn to_point(&self) -> Point3<T> {
        Point3::new(self[0], self[1], self[2])
    }
}

impl<T: Scalar> Matrix<T, 4, 1> {
    pub fn new(x: T, y: T, z: T, w: T) -> Self {
        Self::from_rows([[x], [y], [z], [w]])
    }
}

impl<T: Scalar, const R: usize, const C: usize> Default for Matrix<T, R, C> {
    fn default() -> Self {
        Self::from_element(T::default())
    }
}

impl<T: Scalar, const R: usize, const C: usize> Index<usize> for Matrix<T, R, C> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        assert!(i < R * C, "matrix index {i} out of bounds for {R}x{C}");
        &self.data[i / C][i % C]
    }
}

impl<T: Scalar, const R: usize, const C: usize> IndexMut<usize> for Matrix<T, R, C> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        assert!(i < R * C, "matrix index {i} out of bounds for {R}x{C}");
        &mut self.data[i / C][i % C]
    }
}

impl<T: Scalar, const R: usize, const C: usize> Index<(usize, usize)> for Matrix<T, R, C> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        assert!(i < R && j < C, "matrix index ({i}, {j}) out of bounds for {R}x{C}");
        &self.data[i][j]
    }
}

impl<T: Scalar, const R: usize, const C: usize> IndexMut<(usize, usize)> for Matrix<T, R, C> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        assert!(i < R && j < C, "matrix index ({i}, {j}) out of bounds for {R}x{C}");
        &mut self.data[i][j]
    }
}

impl<T: Scalar + Neg<Output = T>, const R: usize, const C: usize> Neg for Matrix<T, R, C> {
    type Output = Self;

    fn neg(mut self) -> Self {
        for v in self.iter_mut() {
            *v = -*v;
        }
        self
    }
}

impl<T: Scalar, const R: usize, const C: usize> From<Matrix<T, R, C>> for SMatrix<T, R, C> {
    fn from(m: Matrix<T, R, C>) -> Self {
        SMatrix::from_fn(|i, j| m.data[i][j])
    }
}

impl<T: Scalar, const R: usize, const C: usize> From<SMatrix<T, R, C>> for Matrix<T, R, C> {
    fn from(m: SMatrix<T, R, C>) -> Self {
        let mut out = Self::default();
        for i in 0..R {
            for j in 0..C {
                out.data[i][j] = m[(i, j)];
            }
        }
        out
    }
}

impl<T: Scalar> From<Matrix<T, 3, 1>> for Point3<T> {
    fn from(p: Matrix<T, 3, 1>) -> Self {
        p.to_point()
    }
}

impl<T: Scalar> From<Point3<T>> for Matrix<T, 3, 1> {
    fn from(p: Point3<T>) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

impl<T: Scalar + Serialize, const R: usize, const C: usize> Serialize for Matrix<T, R, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(R * C)?;
        for value in self.iter() {
            tuple.serialize_element(value)?;
        }
        tuple.end()
    }
}

impl<'de, T, const R: usize, const C: usize> Deserialize<'de> for Matrix<T, R, C>
where
    T: Scalar + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MatrixVisitor<T, const R: usize, const C: usize>(PhantomData<T>);

        impl<'de, T, const R: usize, const C: usize> Visitor<'de> for MatrixVisitor<T, R, C>
        where
            T: Scalar + Deserialize<'de>,
        {
            type Value = Matrix<T, R, C>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a sequence of {} numbers", R * C)
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut m = Matrix::<T, R, C>::default();
                for i in 0..R * C {
                    m[i] = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(m)
            }
        }

        deserializer.deserialize_tuple(R * C, MatrixVisitor::<T, R, C>(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_accessors() {
        let p = Point3f::new(1.0, 2.0, 3.0);
        assert_eq!(p.x(), 1.0);
        assert_eq!(p.y(), 2.0);
        assert_eq!(p.z(), 3.0);
        assert_eq!(p.get::<2>(), 3.0);
        assert_eq!(p[(1, 0)], 2.0);

        let q = Quaternionf::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!(q.w(), 1.0);
    }

    #[test]
    fn test_row_major_layout() {
        let m = Matrix3f::from_rows([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        assert_eq!(m[1], 2.0);
        assert_eq!(m[3], 4.0);
        assert_eq!(m[(2, 1)], 8.0);
        let values: Vec<f32> = m.iter().copied().collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_non_square_row_major_layout() {
        let m = Matrix::<i32, 2, 3>::from_rows([[1, 2, 3], [4, 5, 6]]);
        assert_eq!(m[(1, 0)], 4);
        assert_eq!(m[4], 5);
    }

    #[test]
    fn test_from_slice_checks_size() {
        assert!(Point3f::from_slice(&[1.0, 2.0, 3.0]).is_ok());
        let err = Point3f::from_slice(&[1.0, 2.0]).unwrap_err();
        assert!(err.is_contract());
    }

    #[test]
    #[should_panic]
    fn test_index_out_of_bounds_panics() {
        let m = Matrix3f::identity();
        let _ = m[(0, 3)];
    }

    #[test]
    fn test_negation_and_equality() {
        let p = Point3i::new(1, -2, 3);
        assert_eq!(-p, Point3i::new(-1, 2, -3));
        assert_ne!(p, -p);
    }

    #[test]
    fn test_cast_round_trip() {
        let p = Point3f::new(0.1, -2.5, 1e7);
        let d: Point3d = p.cast().unwrap();
        let back: Point3f = d.cast().unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_checked_cast_rejects_out_of_range() {
        let p = Point3f::new(300.0, 0.0, 1.0);
        assert!(p.cast::<u8>().is_none());
        assert_eq!(Point3f::new(255.0, 0.0, 1.0).cast::<u8>(), Some(Point3ub::new(255, 0, 1)));
        assert!(Point3f::new(f32::NAN, 0.0, 0.0).cast::<i32>().is_none());
    }

    #[test]
    fn test_nalgebra_conversion() {
        let m = Matrix4f::identity();
        let na: nalgebra::Matrix4<f32> = m.into();
        assert_eq!(na, nalgebra::Matrix4::identity());

        let k = Matrix3f::from_rows([[500.0, 0.0, 320.0], [0.0, 500.0, 240.0], [0.0, 0.0, 1.0]]);
        let na_k: nalgebra::Matrix3<f32> = k.into();
        assert_relative_eq!(na_k[(0, 2)], 320.0);
        assert_eq!(Matrix3f::from(na_k), k);

        let v = Point3f::new(1.0, 2.0, 3.0).to_vector();
        assert_eq!(v, nalgebra::Vector3::new(1.0, 2.0, 3.0));
    }
}
