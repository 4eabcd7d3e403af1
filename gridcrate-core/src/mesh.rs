//! Mesh data structures and functionality

use crate::error::{ensure, Error, Result};
use crate::io::{PointCloudReader, PointCloudWriter};
use crate::point::{Point3f, Point3i};
use crate::point_cloud::{PointCloudBase, Storage, VertexData};
use nalgebra::Vector3;
use std::ops::{Deref, DerefMut};

/// Vertices with per-vertex attributes plus a face index array
#[derive(Debug, Clone)]
pub struct Mesh<'a, V, F = Point3i> {
    base: PointCloudBase<'a, V>,
    faces: Storage<'a, F>,
}

/// A triangle mesh over single precision vertices
pub type Mesh3f<'a> = Mesh<'a, Point3f, Point3i>;

impl<V, F> Default for Mesh<'_, V, F> {
    fn default() -> Self {
        Self {
            base: PointCloudBase::default(),
            faces: Storage::default(),
        }
    }
}

impl<V, F> Mesh<'static, V, F> {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from vertices and faces
    pub fn from_parts(vertices: Vec<V>, faces: Vec<F>) -> Self {
        Self {
            base: PointCloudBase::from_storage(Storage::Owned(vertices)),
            faces: Storage::Owned(faces),
        }
    }
}

impl<'a, V, F> Mesh<'a, V, F> {
    /// Wrap caller-owned vertex and face buffers without copying them
    pub fn from_slices(vertices: &'a mut [V], faces: &'a mut [F]) -> Self {
        Self {
            base: PointCloudBase::from_storage(Storage::Borrowed(vertices)),
            faces: Storage::Borrowed(faces),
        }
    }

    /// Get the number of vertices
    pub fn n_vertices(&self) -> usize {
        self.base.len()
    }

    /// Get the number of faces
    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn vertices(&self) -> &[V] {
        self.base.points()
    }

    pub fn faces(&self) -> &[F] {
        self.faces.as_slice()
    }

    pub fn faces_mut(&mut self) -> &mut [F] {
        self.faces.as_mut_slice()
    }

    /// Whether both vertex and face arrays are owned
    pub fn is_owned(&self) -> bool {
        self.base.is_owned() && self.faces.is_owned()
    }

    /// Replace the contents with default vertices and faces in owned storage
    pub fn create(&mut self, n_vertices: usize, n_faces: usize)
    where
        V: Default + Clone,
        F: Default + Clone,
    {
        self.base.reset(vec![V::default(); n_vertices]);
        self.faces = Storage::Owned(vec![F::default(); n_faces]);
    }

    /// Replace the contents with `vertices` and `faces` in owned storage
    pub fn create_from(&mut self, vertices: Vec<V>, faces: Vec<F>) {
        self.base.reset(vertices);
        self.faces = Storage::Owned(faces);
    }
}

impl Mesh<'_, Point3f, Point3i> {
    /// Fail unless every face references existing vertices
    #[track_caller]
    pub fn validate_faces(&self) -> Result<()> {
        let n = self.n_vertices();
        let bad = self
            .faces()
            .iter()
            .position(|f| f.iter().any(|&v| usize::try_from(v).map_or(true, |v| v >= n)));
        match bad {
            Some(idx) => ensure(
                false,
                format!(
                    "face {idx} {:?} references a vertex outside 0..{n}",
                    self.faces()[idx]
                ),
            ),
            None => Ok(()),
        }
    }

    /// Unit normal of every face, zero for degenerate faces and for faces
    /// referencing a vertex that does not exist.
    pub fn face_normals(&self) -> Vec<Point3f> {
        let vertices = self.vertices();
        let vertex = |v: i32| {
            usize::try_from(v)
                .ok()
                .and_then(|v| vertices.get(v))
                .map(Point3f::to_vector)
        };
        self.faces()
            .iter()
            .map(|face| {
                let (Some(v0), Some(v1), Some(v2)) =
                    (vertex(face.x()), vertex(face.y()), vertex(face.z()))
                else {
                    return Point3f::default();
                };

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                Point3f::from(
                    edge1
                        .cross(&edge2)
                        .try_normalize(f32::EPSILON)
                        .unwrap_or_else(Vector3::zeros),
                )
            })
            .collect()
    }

    /// Write the vertex data, then the faces
    pub fn write_to<W: PointCloudWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        self.base.write_vertex_data(writer)?;
        writer.write_faces(self.faces())
    }

    /// Replace the contents with what `reader` supplies; faces are mandatory.
    ///
    /// On error the mesh is left untouched.
    #[track_caller]
    pub fn read_from<R: PointCloudReader + ?Sized>(&mut self, reader: &mut R) -> Result<()> {
        let data = VertexData::read(reader)?;
        let faces = reader.read_faces().ok_or(Error::MissingData("faces"))?;
        data.assign(&mut self.base);
        self.faces = Storage::Owned(faces);
        Ok(())
    }
}

impl<'a, V, F> Deref for Mesh<'a, V, F> {
    type Target = PointCloudBase<'a, V>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<V, F> DerefMut for Mesh<'_, V, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}
